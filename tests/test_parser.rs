//! Parser integration tests.

extern crate cseval;

use cseval::parser::ast::{ExprKind, StatementType};
use cseval::parser::ScriptParser;

#[test]
fn test_script_with_trailing_expression() {
    let program = ScriptParser::parse_to_ast_from_str("var x = 1;\nx + 1").unwrap();
    assert_eq!(program.body.len(), 1);
    assert!(matches!(program.body[0].kind, StatementType::Declaration(_)));
    let trailing = program.trailing_expression.expect("trailing expression");
    assert!(matches!(trailing.kind, ExprKind::Binary { .. }));
}

#[test]
fn test_script_without_trailing_expression() {
    let program = ScriptParser::parse_to_ast_from_str("Console.WriteLine(1);").unwrap();
    assert_eq!(program.body.len(), 1);
    assert!(program.trailing_expression.is_none());
}

#[test]
fn test_incomplete_expression_is_reported() {
    let err = ScriptParser::parse_to_ast_from_str("1+").unwrap_err();
    assert_eq!(err.id, "E1733");
    assert_eq!(err.message, "Expected expression");
    assert_eq!(err.meta.start_line, 1);
}

#[test]
fn test_method_body_has_no_trailing_expression() {
    assert!(ScriptParser::parse_method_body("return 1;").is_ok());
    assert!(ScriptParser::parse_method_body("1 + 1").is_err());
}

#[test]
fn test_local_function_and_control_flow() {
    let source = r#"
int Fib(int n) { return n < 2 ? n : Fib(n - 1) + Fib(n - 2); }
var total = 0;
foreach (var i in Enumerable.Range(0, 5)) {
    if (i % 2 == 0) continue;
    total += Fib(i);
}
try { throw new Exception("x"); } catch (Exception e) { } finally { }
total
"#;
    let program = ScriptParser::parse_to_ast_from_str(source).unwrap();
    assert!(matches!(program.body[0].kind, StatementType::LocalFunction(_)));
    assert!(program
        .body
        .iter()
        .any(|s| matches!(s.kind, StatementType::Foreach { .. })));
    assert!(program.body.iter().any(|s| matches!(s.kind, StatementType::Try { .. })));
    assert!(program.trailing_expression.is_some());
}

#[test]
fn test_positions_are_one_based() {
    let err = ScriptParser::parse_to_ast_from_str("var a = 1;\nvar b = ;").unwrap_err();
    assert_eq!(err.meta.start_line, 2);
    assert!(err.meta.start_column > 1);
}
