use super::api::{ParseError, Rule, ScriptParser};
use super::ast::*;

use pest::consumes_to;
use pest::fails_with;
use pest::parses_to;
use pest::Parser;

fn parse(source: &str) -> ProgramData {
    match ScriptParser::parse_to_ast_from_str(source) {
        Ok(program) => program,
        Err(e) => panic!("failed to parse {:?}: {}", source, e),
    }
}

fn parse_error(source: &str) -> ParseError {
    match ScriptParser::parse_to_ast_from_str(source) {
        Ok(program) => panic!("expected a syntax error, got {:?}", program),
        Err(e) => e,
    }
}

fn trailing(source: &str) -> ExprKind {
    parse(source)
        .trailing_expression
        .expect("trailing expression")
        .kind
}

#[test]
fn test_integer_literal_with_suffix() {
    parses_to! {
        parser: ScriptParser,
        input: "0x1Ful",
        rule: Rule::integer_literal,
        tokens: [
            integer_literal(0, 6)
        ]
    };
}

#[test]
fn test_real_literal_with_exponent() {
    parses_to! {
        parser: ScriptParser,
        input: "1.5e3m",
        rule: Rule::real_literal,
        tokens: [
            real_literal(0, 6)
        ]
    };
}

#[test]
fn test_integer_literal_rejects_letters() {
    fails_with! {
        parser: ScriptParser,
        input: "abc",
        rule: Rule::integer_literal,
        positives: vec![Rule::integer_literal],
        negatives: vec![],
        pos: 0
    };
}

#[test]
fn test_keywords_are_not_identifiers() {
    assert!(ScriptParser::parse(Rule::identifier, "int").is_err());
    assert!(ScriptParser::parse(Rule::identifier, "integer").is_ok());
}

#[test]
fn test_literal_types_follow_magnitude() {
    assert_eq!(trailing("1"), ExprKind::Literal(Literal::Int(1)));
    assert_eq!(trailing("3000000000"), ExprKind::Literal(Literal::UInt(3_000_000_000)));
    assert_eq!(trailing("5000000000"), ExprKind::Literal(Literal::Long(5_000_000_000)));
    assert_eq!(trailing("1UL"), ExprKind::Literal(Literal::ULong(1)));
    assert_eq!(trailing("-2147483648"), ExprKind::Literal(Literal::Int(i32::MIN)));
    assert_eq!(trailing("1.5f"), ExprKind::Literal(Literal::Float(1.5)));
    assert_eq!(trailing("1.50m"), ExprKind::Literal(Literal::Decimal("1.50".to_string())));
    assert_eq!(trailing("2.0"), ExprKind::Literal(Literal::Double(2.0)));
}

#[test]
fn test_string_escapes() {
    assert_eq!(
        trailing(r#""a\tb\u0041""#),
        ExprKind::Literal(Literal::String("a\tbA".to_string()))
    );
    assert_eq!(
        trailing(r#"@"c:\dir""x""#),
        ExprKind::Literal(Literal::String("c:\\dir\"x".to_string()))
    );
    assert_eq!(trailing(r"'\n'"), ExprKind::Literal(Literal::Char('\n')));
}

#[test]
fn test_multiplication_binds_tighter_than_addition() {
    match trailing("1 + 2 * 3") {
        ExprKind::Binary {
            operator: BinaryOperator::Add,
            right,
            ..
        } => assert!(matches!(
            right.kind,
            ExprKind::Binary {
                operator: BinaryOperator::Multiply,
                ..
            }
        )),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_pointer_declaration_is_rejected() {
    let err = parse_error("unsafe { int* p = null; }");
    assert_eq!(err.message, "Pointer types are not supported");
    assert!(matches!(trailing("var a = 2; var b = 3; a * b"), ExprKind::Binary { .. }));
}

#[test]
fn test_trailing_throw_without_semicolon() {
    let program = parse("int x = 1; throw new Exception(\"boom\")");
    assert!(program.trailing_expression.is_none());
    assert_eq!(program.body.len(), 2);
    assert!(matches!(program.body[1].kind, StatementType::Throw(Some(_))));
}

#[test]
fn test_array_initializer_elements() {
    match trailing("new int[] { 1, 2 + 3 }") {
        ExprKind::NewArray {
            initializer: Some(ArrayInitializer::Nested(items, _)),
            ..
        } => {
            assert_eq!(items.len(), 2);
            match &items[1] {
                ArrayInitializer::Expr(expr) => {
                    assert!(matches!(expr.kind, ExprKind::Binary { .. }))
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_coalesce_is_right_associative() {
    match trailing("a ?? b ?? c") {
        ExprKind::Logical {
            operator: LogicalOperator::Coalesce,
            left,
            right,
        } => {
            assert_eq!(left.kind, ExprKind::Name("a".to_string()));
            assert!(matches!(
                right.kind,
                ExprKind::Logical {
                    operator: LogicalOperator::Coalesce,
                    ..
                }
            ));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_statements_then_trailing_expression() {
    let program = parse("var x = 1; x += 2; x");
    assert_eq!(program.body.len(), 2);
    assert!(matches!(program.body[0].kind, StatementType::Declaration(_)));
    match &program.body[1].kind {
        StatementType::Expression(Expr {
            kind:
                ExprKind::Assign {
                    operator: AssignmentOperator::Compound(BinaryOperator::Add),
                    ..
                },
            ..
        }) => {}
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(
        program.trailing_expression.map(|e| e.kind),
        Some(ExprKind::Name("x".to_string()))
    );
}

#[test]
fn test_postfix_chain() {
    match trailing("Console.Out.Write(1)[0]") {
        ExprKind::Index { object, arguments } => {
            assert_eq!(arguments.len(), 1);
            assert!(matches!(object.kind, ExprKind::Call { .. }));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_cast_and_type_tests() {
    assert!(matches!(trailing("(long)1"), ExprKind::Cast { .. }));
    assert!(matches!(trailing("o is string"), ExprKind::Is { .. }));
    assert!(matches!(trailing("o as string"), ExprKind::As { .. }));
    assert!(matches!(trailing("typeof(List<int>)"), ExprKind::TypeOf(_)));
}

#[test]
fn test_object_and_array_creation() {
    assert!(matches!(
        trailing("new List<int> { 1, 2 }"),
        ExprKind::New {
            initializer: Some(_),
            ..
        }
    ));
    assert!(matches!(
        trailing("new int[2, 3]"),
        ExprKind::NewArray { rank: 2, .. }
    ));
    assert!(matches!(
        trailing("new int[,] { { 1 }, { 2 } }"),
        ExprKind::NewArray { rank: 2, .. }
    ));
    assert!(matches!(trailing("new[] { 1, 2 }"), ExprKind::ImplicitArray(_)));
    match trailing("new { A = 1, B = \"x\" }") {
        ExprKind::AnonymousObject(members) => {
            let names: Vec<&str> = members.iter().map(|(n, _)| n.as_str()).collect();
            assert_eq!(names, vec!["A", "B"]);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_interpolated_string_parts() {
    match trailing("$\"a{1 + 1}b{{\"") {
        ExprKind::Interpolated(parts) => {
            assert_eq!(parts.len(), 3);
            assert_eq!(parts[0], InterpolationPart::Text("a".to_string()));
            assert_eq!(parts[2], InterpolationPart::Text("b{".to_string()));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_control_flow_statements() {
    let program = parse(
        "for (var i = 0; i < 3; i++) { if (i == 1) continue; else break; }
         foreach (var c in \"ab\") { }
         try { throw new Exception(\"x\"); } catch (Exception e) { } finally { }
         int Twice(int n) { return n * 2; }",
    );
    assert!(matches!(program.body[0].kind, StatementType::For { .. }));
    assert!(matches!(program.body[1].kind, StatementType::Foreach { .. }));
    match &program.body[2].kind {
        StatementType::Try {
            handlers,
            finalizer,
            ..
        } => {
            assert_eq!(handlers.len(), 1);
            assert_eq!(handlers[0].binding.as_deref(), Some("e"));
            assert!(finalizer.is_some());
        }
        other => panic!("unexpected {:?}", other),
    }
    match &program.body[3].kind {
        StatementType::LocalFunction(f) => {
            assert_eq!(f.name, "Twice");
            assert_eq!(f.params.len(), 1);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_method_body_has_no_trailing_expression() {
    assert!(ScriptParser::parse_method_body("return 1;").is_ok());
    assert!(ScriptParser::parse_method_body("1 + 1").is_err());
}

#[test]
fn test_syntax_error_reports_location() {
    let error = parse_error("var x = 1;\nvar y = ;");
    assert_eq!(error.meta.start_line, 2);
    assert!(!error.message.is_empty());
}

#[test]
fn test_try_requires_catch_or_finally() {
    let error = parse_error("try { }");
    assert!(error.message.contains("catch or finally"));
}

#[test]
fn test_integral_constant_too_large() {
    let error = parse_error("99999999999999999999");
    assert!(error.message.contains("too large"));
}
