//! End-to-end tests of the evaluation pipeline.

extern crate cseval;

use cseval::eval::{EngineConfig, Outcome, ScriptEngine, Severity};
use cseval::runner::ds::value::Value;
use std::time::Duration;

fn evaluate(code: &str) -> cseval::eval::EvaluationResult {
    ScriptEngine::default().evaluate(code)
}

#[test]
fn test_simple_expression() {
    let result = evaluate("1+1");
    match &result.outcome {
        Outcome::Success {
            return_value,
            return_type,
        } => {
            assert!(matches!(return_value, Value::Int(2)));
            assert_eq!(return_type.as_deref(), Some("int"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(result.code, "1+1");
    assert_eq!(result.console_out, "");
}

#[test]
fn test_console_and_value() {
    let result = evaluate("Console.WriteLine(\"hi\"); 5");
    assert_eq!(result.console_out, "hi\n");
    assert!(matches!(result.return_value(), Some(Value::Int(5))));
}

#[test]
fn test_no_return_value_has_no_type() {
    let result = evaluate("var x = 1;");
    match result.outcome {
        Outcome::Success {
            return_value,
            return_type,
        } => {
            assert!(return_value.is_null());
            assert!(return_type.is_none());
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn test_syntax_error_yields_diagnostics() {
    let result = evaluate("1+");
    let diagnostics = result.diagnostics();
    assert!(!diagnostics.is_empty());
    assert!(diagnostics.iter().all(|d| d.severity == Severity::Error));
    assert!(result.return_value().is_none());
    assert!(result.exception().is_none());
}

#[test]
fn test_semantic_error_yields_diagnostics() {
    let result = evaluate("undefinedThing + 1");
    assert_eq!(result.diagnostics()[0].id, "E0103");
    assert_eq!(result.diagnostics()[0].location.start_line, 0);
}

#[test]
fn test_thrown_exception_is_reported() {
    let result = evaluate("throw new Exception(\"boom\")");
    assert_eq!(result.exception(), Some(("Exception", "boom")));
    assert!(result.diagnostics().is_empty());
    assert!(result.execution_time > Duration::ZERO);
}

#[test]
fn test_trailing_throw_after_statements() {
    let result = evaluate("var n = 2;\nthrow new ArgumentException($\"bad {n}\")  ");
    assert_eq!(result.exception(), Some(("ArgumentException", "bad 2")));
}

#[test]
fn test_console_kept_when_script_throws() {
    let result = evaluate("Console.Write(\"partial\"); throw new InvalidOperationException(\"late\");");
    assert_eq!(result.console_out, "partial");
    assert_eq!(result.exception(), Some(("InvalidOperationException", "late")));
}

#[test]
fn test_friendly_type_names() {
    let result = evaluate("new List<int> { 1 }");
    assert!(matches!(
        &result.outcome,
        Outcome::Success { return_type: Some(t), .. } if t == "List<int>"
    ));
    let result = evaluate("new int[2, 2]");
    assert!(matches!(
        &result.outcome,
        Outcome::Success { return_type: Some(t), .. } if t == "int[,]"
    ));
}

#[test]
fn test_using_directive_is_hoisted() {
    let result = evaluate("using System.Text;\nEncoding.UTF8.GetBytes(\"ab\").Length");
    assert!(matches!(result.return_value(), Some(Value::Int(2))));
}

#[test]
fn test_unknown_reference_fails_preprocessing() {
    let result = evaluate("#r \"Contoso.Widgets\"\n1");
    let diagnostics = result.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].message, "Unable to resolve reference 'Contoso.Widgets'");
}

#[test]
fn test_console_output_is_capped() {
    let engine = ScriptEngine::new(EngineConfig::default().with_max_console_output(8));
    let result = engine.evaluate("for (var i = 0; i < 100; i++) Console.Write(\"x\");");
    assert!(result.console_out.len() <= 8);
    assert!(result.exception().is_none());
}

#[test]
fn test_call_depth_is_capped() {
    let engine = ScriptEngine::new(EngineConfig::default().with_max_call_depth(50));
    let result = engine.evaluate("int Down(int n) { return n == 0 ? 0 : Down(n - 1); } Down(1000)");
    assert_eq!(
        result.exception().map(|(kind, _)| kind),
        Some("InsufficientExecutionStackException")
    );
}

#[test]
fn test_evaluations_are_isolated() {
    let engine = ScriptEngine::default();
    let first = engine.evaluate("var shared = 1; shared");
    let second = engine.evaluate("shared");
    assert!(matches!(first.return_value(), Some(Value::Int(1))));
    assert_eq!(second.diagnostics()[0].id, "E0103");
}
