//! Compiler and VM tests: scripts are compiled to bytecode and executed
//! directly, without the service pipeline.

extern crate cseval;

use cseval::eval::ExecutionContext;
use cseval::runner::ds::error::ScriptError;
use cseval::runner::ds::types::TypeKind;
use cseval::runner::ds::value::Value;
use cseval::runner::jit::{compile, execute};
use cseval::runner::plugin::types::EvalContext;

fn run_with_ctx(code: &str) -> (Result<Value, ScriptError>, EvalContext) {
    let compilation = compile(&ExecutionContext::new(code), "test_vm");
    if compilation.has_errors() {
        panic!("{:?} failed to compile: {:?}", code, compilation.diagnostics);
    }
    let unit = compilation.unit.expect("unit");
    let mut ctx = EvalContext::default();
    let result = execute(&unit, &mut ctx);
    (result, ctx)
}

fn run(code: &str) -> Value {
    match run_with_ctx(code).0 {
        Ok(value) => value,
        Err(e) => panic!("{:?} threw {}: {}", code, e.kind().name(), e.message()),
    }
}

fn run_int(code: &str) -> i32 {
    match run(code) {
        Value::Int(n) => n,
        other => panic!("{:?} returned {:?}, expected int", code, other),
    }
}

fn run_text(code: &str) -> String {
    run(code).to_display_string()
}

fn run_error(code: &str) -> ScriptError {
    match run_with_ctx(code).0 {
        Ok(value) => panic!("{:?} returned {:?}, expected an exception", code, value),
        Err(e) => e,
    }
}

// ── Expressions ───────────────────────────────────────────────

#[test]
fn test_arithmetic_precedence() {
    assert_eq!(run_int("3 + 4 * 2"), 11);
    assert_eq!(run_int("(3 + 4) * 2"), 14);
    assert_eq!(run_int("17 % 5"), 2);
}

#[test]
fn test_integer_overflow_wraps() {
    assert_eq!(run_int("int.MaxValue + 1"), i32::MIN);
}

#[test]
fn test_long_literal() {
    assert!(matches!(run("5000000000L"), Value::Long(5_000_000_000)));
}

#[test]
fn test_string_concatenation_and_bools() {
    assert_eq!(run_text("\"a\" + 1 + true"), "a1True");
}

#[test]
fn test_interpolated_string() {
    assert_eq!(run_text("var n = 3; $\"n={n}, twice={n * 2}\""), "n=3, twice=6");
}

#[test]
fn test_conditional_and_coalesce() {
    assert_eq!(run_int("var x = 5; x > 3 ? 1 : 0"), 1);
    assert_eq!(run_text("string s = null; s ?? \"fallback\""), "fallback");
}

#[test]
fn test_compound_assignment_and_increment() {
    assert_eq!(run_int("var x = 1; x += 4; x *= 3; x++; x"), 16);
    assert_eq!(run_int("var x = 1; var y = x++; y"), 1);
    assert_eq!(run_int("var x = 1; var y = ++x; y"), 2);
}

#[test]
fn test_decimal_keeps_scale() {
    assert_eq!(run_text("1.50m + 2.25m"), "3.75");
}

#[test]
fn test_integer_division_by_zero() {
    let err = run_error("var z = 0; 1 / z");
    assert_eq!(err.kind(), TypeKind::DivideByZeroException);
}

// ── Statements ────────────────────────────────────────────────

#[test]
fn test_for_loop_sum() {
    assert_eq!(run_int("var sum = 0; for (var i = 0; i < 5; i++) { sum += i; } sum"), 10);
}

#[test]
fn test_while_and_do_while() {
    assert_eq!(run_int("var n = 0; while (n < 7) n++; n"), 7);
    assert_eq!(run_int("var n = 10; do { n++; } while (n < 5); n"), 11);
}

#[test]
fn test_break_and_continue() {
    let code = r#"
var count = 0;
for (var i = 0; i < 10; i++) {
    if (i % 2 == 0) continue;
    if (i > 7) break;
    count++;
}
count
"#;
    assert_eq!(run_int(code), 4);
}

#[test]
fn test_foreach_over_list() {
    assert_eq!(run_int("var total = 0; foreach (var x in new List<int> { 1, 2, 3 }) total += x; total"), 6);
}

#[test]
fn test_local_function_recursion() {
    assert_eq!(run_int("int Fib(int n) { return n < 2 ? n : Fib(n - 1) + Fib(n - 2); } Fib(15)"), 610);
}

#[test]
fn test_top_level_return() {
    assert_eq!(run_int("return 7;"), 7);
}

#[test]
fn test_no_value_is_null() {
    assert!(run("var x = 1;").is_null());
}

// ── Exceptions ────────────────────────────────────────────────

#[test]
fn test_typed_catch_uses_hierarchy() {
    let code = r#"
var caught = "";
try {
    throw new ArgumentOutOfRangeException("i");
} catch (InvalidOperationException) {
    caught = "wrong";
} catch (ArgumentException e) {
    caught = "argument";
}
caught
"#;
    assert_eq!(run_text(code), "argument");
}

#[test]
fn test_runtime_errors_are_catchable() {
    let code = r#"
var list = new List<int>();
try {
    var x = list[3];
    return "no";
} catch (ArgumentOutOfRangeException) {
    return "caught";
}
"#;
    assert_eq!(run_text(code), "caught");
}

#[test]
fn test_finally_runs_before_rethrow() {
    let code = r#"
Console.Write("a");
try {
    try { throw new Exception("boom"); }
    catch { Console.Write("b"); throw; }
    finally { Console.Write("c"); }
} catch (Exception e) {
    Console.Write(e.Message);
}
"#;
    let (result, mut ctx) = run_with_ctx(code);
    assert!(result.is_ok());
    assert_eq!(ctx.console.take(), "abcboom");
}

#[test]
fn test_uncaught_exception_type_and_message() {
    let err = run_error("throw new Exception(\"boom\");");
    assert_eq!(err.kind(), TypeKind::Exception);
    assert_eq!(err.message(), "boom");
}

// ── Library ───────────────────────────────────────────────────

#[test]
fn test_console_output_is_captured() {
    let (result, mut ctx) = run_with_ctx("Console.WriteLine(\"hi\"); Console.Write(1 + 1); 5");
    assert!(matches!(result, Ok(Value::Int(5))));
    assert_eq!(ctx.console.take(), "hi\n2");
}

#[test]
fn test_dictionary_initializer_and_lookup() {
    assert_eq!(run_int("var d = new Dictionary<string, int> { { \"a\", 1 }, { \"b\", 2 } }; d[\"b\"]"), 2);
    let err = run_error("var d = new Dictionary<string, int>(); d[\"missing\"]");
    assert_eq!(err.kind(), TypeKind::KeyNotFoundException);
}

#[test]
fn test_sequence_helpers() {
    assert_eq!(run_int("Enumerable.Range(1, 4).Sum()"), 10);
    assert_eq!(run_int("new[] { 3, 9, 4 }.Max()"), 9);
    assert_eq!(run_int("Enumerable.Repeat(7, 3).ToList().Count"), 3);
}

#[test]
fn test_multi_dimensional_array() {
    let code = r#"
var grid = new int[2, 3];
grid[1, 2] = 5;
grid[1, 2] + grid.Rank + grid.GetLength(1)
"#;
    assert_eq!(run_int(code), 10);
}

#[test]
fn test_math_and_strings() {
    assert_eq!(run_int("Math.Max(3, 8)"), 8);
    assert_eq!(run_text("\"Hello\".ToUpper()"), "HELLO");
    assert_eq!(run_int("\"hello\".Length"), 5);
}

#[test]
fn test_reflection_names() {
    assert_eq!(run_text("typeof(int).FullName"), "System.Int32");
    assert_eq!(run_text("new List<int>().GetType().Name"), "List`1");
}
