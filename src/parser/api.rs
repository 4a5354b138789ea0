use std::rc::Rc;

use pest::error::{Error, ErrorVariant, InputLocation, LineColLocation};
use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error as ThisError;

use super::ast::*;

#[derive(Parser)]
#[grammar = "parser/script_grammar.pest"] // relative to src
pub struct ScriptParser;

const TAB_WIDTH: usize = 2;

/// A syntax error with the span it was reported at.
#[derive(Debug, Clone, ThisError)]
#[error("{message}")]
pub struct ParseError {
    pub id: &'static str,
    pub message: String,
    pub meta: Meta,
}

impl From<Error<Rule>> for ParseError {
    fn from(err: Error<Rule>) -> Self {
        let (start_index, end_index) = match err.location {
            InputLocation::Pos(p) => (p, p),
            InputLocation::Span((s, e)) => (s, e),
        };
        let ((start_line, start_column), (end_line, end_column)) = match err.line_col {
            LineColLocation::Pos(p) => (p, p),
            LineColLocation::Span(s, e) => (s, e),
        };
        let meta = Meta {
            start_index,
            end_index,
            start_line,
            start_column,
            end_line,
            end_column,
        };
        let (id, message) = match &err.variant {
            ErrorVariant::CustomError { message } => ("E1001", message.clone()),
            ErrorVariant::ParsingError { positives, .. } => {
                if positives.iter().any(is_expression_rule) {
                    ("E1733", "Expected expression".to_string())
                } else if positives.contains(&Rule::EOI) {
                    ("E1002", "; expected".to_string())
                } else {
                    ("E1001", format!("Syntax error, {}", err.variant.message()))
                }
            }
        };
        ParseError { id, message, meta }
    }
}

fn is_expression_rule(rule: &Rule) -> bool {
    matches!(
        rule,
        Rule::expression
            | Rule::conditional
            | Rule::unary
            | Rule::postfix
            | Rule::cast_expression
            | Rule::prefix_op
            | Rule::identifier
            | Rule::object_creation
            | Rule::parenthesized
            | Rule::typeof_expression
            | Rule::predefined_type
            | Rule::null_literal
            | Rule::boolean_literal
            | Rule::real_literal
            | Rule::integer_literal
            | Rule::char_literal
            | Rule::string_literal
            | Rule::verbatim_string
            | Rule::interpolated_string
    )
}

impl ScriptParser {
    /// Parses a script: statements optionally followed by a trailing
    /// expression whose value is the script's result.
    pub fn parse_to_ast_from_str(source: &str) -> Result<ProgramData, ParseError> {
        let pairs = ScriptParser::parse(Rule::script, source)?;
        Ok(build_ast_from_program(pairs)?)
    }

    /// Parses the body of a method; a trailing expression is not allowed.
    pub fn parse_method_body(source: &str) -> Result<ProgramData, ParseError> {
        let pairs = ScriptParser::parse(Rule::method_body, source)?;
        Ok(build_ast_from_program(pairs)?)
    }
}

/// Debugging aid: renders the raw token tree of a script.
pub fn parse_to_token_tree(script: &str) -> Result<String, String> {
    let mut tree = vec![];
    match ScriptParser::parse(Rule::script, script) {
        Ok(pairs) => {
            for pair in pairs {
                tree.push(pair_to_string(pair, 0).join("\n"));
            }
        }
        Err(rule) => {
            return Err(format!("Parse error due to {:?}", rule));
        }
    }
    Ok(tree.join("\n"))
}

fn pair_to_string(pair: Pair<Rule>, level: usize) -> Vec<String> {
    let mut tree = vec![];
    let span = pair.as_span();
    let rule_name = format!(
        "{:?} => ({},{}) #{:?}",
        pair.as_rule(),
        span.start(),
        span.end(),
        span.as_str()
    );
    tree.push(format!("{}{}", " ".repeat(level * TAB_WIDTH), rule_name));
    for child_pair in pair.into_inner() {
        tree.append(pair_to_string(child_pair, level + 1).as_mut());
    }
    tree
}

fn get_unexpected_error(id: i32, pair: &Pair<Rule>) -> Error<Rule> {
    let message = format!("Unexpected state reached [{:?}] - {}", pair.as_rule(), id);
    Error::new_from_span(ErrorVariant::CustomError { message }, pair.as_span())
}

fn custom_error(message: impl Into<String>, pair: &Pair<Rule>) -> Error<Rule> {
    Error::new_from_span(
        ErrorVariant::CustomError {
            message: message.into(),
        },
        pair.as_span(),
    )
}

fn get_meta(pair: &Pair<Rule>) -> Meta {
    let span = pair.as_span();
    let (start_line, start_column) = span.start_pos().line_col();
    let (end_line, end_column) = span.end_pos().line_col();
    Meta {
        start_index: span.start(),
        end_index: span.end(),
        start_line,
        start_column,
        end_line,
        end_column,
    }
}

fn merge_meta(first: &Meta, last: &Meta) -> Meta {
    Meta {
        start_index: first.start_index,
        start_line: first.start_line,
        start_column: first.start_column,
        end_index: last.end_index,
        end_line: last.end_line,
        end_column: last.end_column,
    }
}

fn is_keyword_token(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_var
            | Rule::kw_if
            | Rule::kw_else
            | Rule::kw_while
            | Rule::kw_do
            | Rule::kw_for
            | Rule::kw_foreach
            | Rule::kw_in
            | Rule::kw_try
            | Rule::kw_catch
            | Rule::kw_finally
            | Rule::kw_break
            | Rule::kw_continue
            | Rule::kw_return
            | Rule::kw_throw
            | Rule::kw_new
            | Rule::kw_typeof
            | Rule::kw_is
            | Rule::kw_as
            | Rule::kw_unsafe
    )
}

/// Children of `pair` without keyword tokens.
fn significant(pair: Pair<Rule>) -> Vec<Pair<Rule>> {
    pair.into_inner()
        .filter(|p| !is_keyword_token(p.as_rule()))
        .collect()
}

fn take<'i>(
    iter: &mut impl Iterator<Item = Pair<'i, Rule>>,
    id: i32,
    parent: &Pair<'i, Rule>,
) -> Result<Pair<'i, Rule>, Error<Rule>> {
    iter.next().ok_or_else(|| get_unexpected_error(id, parent))
}

// ════════════════════════════════════════════════════════════════
// Program & Statements
// ════════════════════════════════════════════════════════════════

fn build_ast_from_program(mut pairs: Pairs<Rule>) -> Result<ProgramData, Error<Rule>> {
    let root = match pairs.next() {
        Some(root) => root,
        None => {
            return Ok(ProgramData {
                body: vec![],
                trailing_expression: None,
                meta: Meta::default(),
            })
        }
    };
    let meta = get_meta(&root);
    let mut body = vec![];
    let mut trailing_expression = None;
    for pair in root.into_inner() {
        match pair.as_rule() {
            Rule::EOI => {}
            Rule::trailing_expression => {
                let inner_pair = take(&mut pair.clone().into_inner(), 1, &pair)?;
                trailing_expression = Some(build_ast_from_expression(inner_pair)?);
            }
            _ => body.push(build_ast_from_statement(pair)?),
        }
    }
    Ok(ProgramData {
        body,
        trailing_expression,
        meta,
    })
}

fn build_ast_from_block(pair: Pair<Rule>) -> Result<Vec<Statement>, Error<Rule>> {
    pair.into_inner().map(build_ast_from_statement).collect()
}

fn build_ast_from_statement(pair: Pair<Rule>) -> Result<Statement, Error<Rule>> {
    let meta = get_meta(&pair);
    let kind = match pair.as_rule() {
        Rule::block => StatementType::Block(build_ast_from_block(pair)?),
        Rule::unsafe_block => {
            let block = take(&mut significant(pair.clone()).into_iter(), 2, &pair)?;
            StatementType::Unsafe(build_ast_from_block(block)?)
        }
        Rule::if_statement => {
            let mut iter = significant(pair.clone()).into_iter();
            let test = build_ast_from_expression(take(&mut iter, 3, &pair)?)?;
            let consequent = Box::new(build_ast_from_statement(take(&mut iter, 4, &pair)?)?);
            let alternate = match iter.next() {
                Some(p) => Some(Box::new(build_ast_from_statement(p)?)),
                None => None,
            };
            StatementType::If {
                test,
                consequent,
                alternate,
            }
        }
        Rule::while_statement => {
            let mut iter = significant(pair.clone()).into_iter();
            let test = build_ast_from_expression(take(&mut iter, 5, &pair)?)?;
            let body = Box::new(build_ast_from_statement(take(&mut iter, 6, &pair)?)?);
            StatementType::While { test, body }
        }
        Rule::do_statement => {
            let mut iter = significant(pair.clone()).into_iter();
            let body = Box::new(build_ast_from_statement(take(&mut iter, 7, &pair)?)?);
            let test = build_ast_from_expression(take(&mut iter, 8, &pair)?)?;
            StatementType::DoWhile { body, test }
        }
        Rule::for_statement => build_ast_from_for_statement(pair)?,
        Rule::foreach_statement => {
            let mut iter = significant(pair.clone()).into_iter();
            let declared_type = build_ast_from_local_type(take(&mut iter, 9, &pair)?)?;
            let name = take(&mut iter, 10, &pair)?.as_str().to_string();
            let iterable = build_ast_from_expression(take(&mut iter, 11, &pair)?)?;
            let body = Box::new(build_ast_from_statement(take(&mut iter, 12, &pair)?)?);
            StatementType::Foreach {
                declared_type,
                name,
                iterable,
                body,
            }
        }
        Rule::try_statement => build_ast_from_try_statement(pair)?,
        Rule::break_statement => StatementType::Break,
        Rule::continue_statement => StatementType::Continue,
        Rule::return_statement => match significant(pair).into_iter().next() {
            Some(p) => StatementType::Return(Some(build_ast_from_expression(p)?)),
            None => StatementType::Return(None),
        },
        Rule::throw_statement | Rule::trailing_throw => match significant(pair).into_iter().next() {
            Some(p) => StatementType::Throw(Some(build_ast_from_expression(p)?)),
            None => StatementType::Throw(None),
        },
        Rule::local_function => StatementType::LocalFunction(Rc::new(
            build_ast_from_local_function(pair)?,
        )),
        Rule::declaration_statement => {
            let inner_pair = take(&mut pair.clone().into_inner(), 13, &pair)?;
            StatementType::Declaration(build_ast_from_local_declaration(inner_pair)?)
        }
        Rule::expression_statement => {
            let inner_pair = take(&mut pair.clone().into_inner(), 14, &pair)?;
            StatementType::Expression(build_ast_from_expression(inner_pair)?)
        }
        Rule::empty_statement => StatementType::Empty,
        _ => return Err(get_unexpected_error(15, &pair)),
    };
    Ok(Statement { kind, meta })
}

fn build_ast_from_for_statement(pair: Pair<Rule>) -> Result<StatementType, Error<Rule>> {
    let mut init = None;
    let mut test = None;
    let mut update = vec![];
    let mut body = None;
    for inner_pair in significant(pair.clone()) {
        match inner_pair.as_rule() {
            Rule::for_init => {
                let child = take(&mut inner_pair.clone().into_inner(), 16, &inner_pair)?;
                init = Some(match child.as_rule() {
                    Rule::local_declaration => {
                        ForInit::Declaration(build_ast_from_local_declaration(child)?)
                    }
                    _ => ForInit::Expressions(build_ast_from_expression_list(child)?),
                });
            }
            Rule::for_condition => {
                let child = take(&mut inner_pair.clone().into_inner(), 17, &inner_pair)?;
                test = Some(build_ast_from_expression(child)?);
            }
            Rule::for_update => {
                let child = take(&mut inner_pair.clone().into_inner(), 18, &inner_pair)?;
                update = build_ast_from_expression_list(child)?;
            }
            _ => body = Some(Box::new(build_ast_from_statement(inner_pair)?)),
        }
    }
    let body = body.ok_or_else(|| get_unexpected_error(19, &pair))?;
    Ok(StatementType::For {
        init,
        test,
        update,
        body,
    })
}

fn build_ast_from_try_statement(pair: Pair<Rule>) -> Result<StatementType, Error<Rule>> {
    let mut iter = significant(pair.clone()).into_iter();
    let block = build_ast_from_block(take(&mut iter, 20, &pair)?)?;
    let mut handlers = vec![];
    let mut finalizer = None;
    for inner_pair in iter {
        match inner_pair.as_rule() {
            Rule::catch_clause => {
                let meta = get_meta(&inner_pair);
                let mut exception_type = None;
                let mut binding = None;
                let mut body = vec![];
                for part in significant(inner_pair) {
                    match part.as_rule() {
                        Rule::type_ref => exception_type = Some(build_ast_from_type_ref(part)?),
                        Rule::identifier => binding = Some(part.as_str().to_string()),
                        _ => body = build_ast_from_block(part)?,
                    }
                }
                handlers.push(CatchClause {
                    exception_type,
                    binding,
                    body,
                    meta,
                });
            }
            Rule::finally_clause => {
                let child = take(&mut significant(inner_pair.clone()).into_iter(), 21, &inner_pair)?;
                finalizer = Some(build_ast_from_block(child)?);
            }
            _ => return Err(get_unexpected_error(22, &inner_pair)),
        }
    }
    if handlers.is_empty() && finalizer.is_none() {
        return Err(custom_error("Expected catch or finally", &pair));
    }
    Ok(StatementType::Try {
        block,
        handlers,
        finalizer,
    })
}

fn build_ast_from_local_function(pair: Pair<Rule>) -> Result<FunctionData, Error<Rule>> {
    let meta = get_meta(&pair);
    let mut iter = pair.clone().into_inner();
    let return_type = build_ast_from_type_ref(take(&mut iter, 23, &pair)?)?;
    let name = take(&mut iter, 24, &pair)?.as_str().to_string();
    let mut params = vec![];
    let mut body = vec![];
    for inner_pair in iter {
        match inner_pair.as_rule() {
            Rule::parameter_list => {
                for parameter in inner_pair.into_inner() {
                    let mut parts = parameter.clone().into_inner();
                    let declared_type = build_ast_from_type_ref(take(&mut parts, 25, &parameter)?)?;
                    let name = take(&mut parts, 26, &parameter)?.as_str().to_string();
                    params.push(Parameter {
                        declared_type,
                        name,
                    });
                }
            }
            _ => body = build_ast_from_block(inner_pair)?,
        }
    }
    Ok(FunctionData {
        name,
        return_type,
        params,
        body,
        meta,
    })
}

fn build_ast_from_local_type(pair: Pair<Rule>) -> Result<Option<TypeRef>, Error<Rule>> {
    match significant(pair).into_iter().next() {
        Some(pointer) if pointer.as_rule() == Rule::pointer_type => {
            Err(custom_error("Pointer types are not supported", &pointer))
        }
        Some(type_ref) => Ok(Some(build_ast_from_type_ref(type_ref)?)),
        None => Ok(None),
    }
}

fn build_ast_from_local_declaration(pair: Pair<Rule>) -> Result<LocalDeclaration, Error<Rule>> {
    let meta = get_meta(&pair);
    let mut iter = pair.clone().into_inner();
    let declared_type = build_ast_from_local_type(take(&mut iter, 27, &pair)?)?;
    let mut declarators = vec![];
    for declarator in iter {
        let meta = get_meta(&declarator);
        let mut parts = declarator.clone().into_inner();
        let name = take(&mut parts, 28, &declarator)?.as_str().to_string();
        let init = match parts.next() {
            Some(p) if p.as_rule() == Rule::array_initializer => {
                Some(Initializer::Array(build_ast_from_array_initializer(p)?))
            }
            Some(p) => Some(Initializer::Expr(build_ast_from_expression(p)?)),
            None => None,
        };
        declarators.push(Declarator { name, init, meta });
    }
    Ok(LocalDeclaration {
        declared_type,
        declarators,
        meta,
    })
}

fn build_ast_from_expression_list(pair: Pair<Rule>) -> Result<Vec<Expr>, Error<Rule>> {
    pair.into_inner().map(build_ast_from_expression).collect()
}

// ════════════════════════════════════════════════════════════════
// Types
// ════════════════════════════════════════════════════════════════

fn build_ast_from_type_ref(pair: Pair<Rule>) -> Result<TypeRef, Error<Rule>> {
    let mut base: Option<TypeRef> = None;
    for inner_pair in pair.clone().into_inner() {
        match inner_pair.as_rule() {
            Rule::predefined_type | Rule::int128_type => {
                base = Some(build_ast_from_predefined_type(&inner_pair)?);
            }
            Rule::qualified_name => {
                let path = inner_pair
                    .into_inner()
                    .map(|p| p.as_str().to_string())
                    .collect();
                base = Some(TypeRef::Named { path, args: vec![] });
            }
            Rule::generic_args => {
                let args = inner_pair
                    .into_inner()
                    .map(build_ast_from_type_ref)
                    .collect::<Result<Vec<_>, _>>()?;
                if let Some(TypeRef::Named { args: slot, .. }) = base.as_mut() {
                    *slot = args;
                }
            }
            Rule::rank_specifier => {
                let element = base.take().ok_or_else(|| get_unexpected_error(29, &pair))?;
                base = Some(TypeRef::Array {
                    element: Box::new(element),
                    rank: inner_pair.into_inner().count() + 1,
                });
            }
            _ => return Err(get_unexpected_error(30, &inner_pair)),
        }
    }
    base.ok_or_else(|| get_unexpected_error(31, &pair))
}

fn build_ast_from_predefined_type(pair: &Pair<Rule>) -> Result<TypeRef, Error<Rule>> {
    PredefinedType::from_keyword(pair.as_str().trim())
        .map(TypeRef::Predefined)
        .ok_or_else(|| get_unexpected_error(32, pair))
}

// ════════════════════════════════════════════════════════════════
// Expressions
// ════════════════════════════════════════════════════════════════

fn build_ast_from_expression(pair: Pair<Rule>) -> Result<Expr, Error<Rule>> {
    let meta = get_meta(&pair);
    let mut iter = pair.clone().into_inner();
    let target = build_ast_from_conditional(take(&mut iter, 33, &pair)?)?;
    let Some(op_pair) = iter.next() else {
        return Ok(target);
    };
    let operator = match op_pair.as_str() {
        "=" => AssignmentOperator::Assign,
        "??=" => AssignmentOperator::Coalesce,
        other => {
            let symbol = &other[..other.len() - 1];
            AssignmentOperator::Compound(
                BinaryOperator::from_token(symbol).ok_or_else(|| get_unexpected_error(34, &op_pair))?,
            )
        }
    };
    let value = build_ast_from_expression(take(&mut iter, 35, &pair)?)?;
    Ok(Expr::new(
        ExprKind::Assign {
            operator,
            target: Box::new(target),
            value: Box::new(value),
        },
        meta,
    ))
}

fn build_ast_from_conditional(pair: Pair<Rule>) -> Result<Expr, Error<Rule>> {
    let meta = get_meta(&pair);
    let mut iter = pair.clone().into_inner();
    let test = build_ast_from_coalesce(take(&mut iter, 36, &pair)?)?;
    let Some(consequent) = iter.next() else {
        return Ok(test);
    };
    let consequent = build_ast_from_expression(consequent)?;
    let alternate = build_ast_from_expression(take(&mut iter, 37, &pair)?)?;
    Ok(Expr::new(
        ExprKind::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        },
        meta,
    ))
}

/// `??` associates to the right.
fn build_ast_from_coalesce(pair: Pair<Rule>) -> Result<Expr, Error<Rule>> {
    let operands = pair
        .clone()
        .into_inner()
        .map(|p| build_ast_from_logical(p, LogicalOperator::Or))
        .collect::<Result<Vec<_>, _>>()?;
    let mut iter = operands.into_iter().rev();
    let mut result = iter.next().ok_or_else(|| get_unexpected_error(76, &pair))?;
    for left in iter {
        let meta = merge_meta(&left.meta, &result.meta);
        result = Expr::new(
            ExprKind::Logical {
                operator: LogicalOperator::Coalesce,
                left: Box::new(left),
                right: Box::new(result),
            },
            meta,
        );
    }
    Ok(result)
}

fn build_ast_from_logical(pair: Pair<Rule>, operator: LogicalOperator) -> Result<Expr, Error<Rule>> {
    let mut iter = pair.clone().into_inner();
    let first = take(&mut iter, 38, &pair)?;
    let mut left = match operator {
        LogicalOperator::Or => build_ast_from_logical(first, LogicalOperator::And)?,
        _ => build_ast_from_binary(first)?,
    };
    for operand in iter {
        let right = match operator {
            LogicalOperator::Or => build_ast_from_logical(operand, LogicalOperator::And)?,
            _ => build_ast_from_binary(operand)?,
        };
        let meta = merge_meta(&left.meta, &right.meta);
        left = Expr::new(
            ExprKind::Logical {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            },
            meta,
        );
    }
    Ok(left)
}

/// Left-associative binary levels from `|` down to `*`.
fn build_ast_from_binary(pair: Pair<Rule>) -> Result<Expr, Error<Rule>> {
    if pair.as_rule() == Rule::unary {
        return build_ast_from_unary(pair);
    }
    let mut iter = pair.clone().into_inner();
    let mut left = build_ast_from_binary(take(&mut iter, 39, &pair)?)?;
    while let Some(op_pair) = iter.next() {
        if op_pair.as_rule() == Rule::type_test {
            left = build_ast_from_type_test(left, op_pair)?;
            continue;
        }
        let operator = BinaryOperator::from_token(op_pair.as_str())
            .ok_or_else(|| get_unexpected_error(40, &op_pair))?;
        let right = build_ast_from_binary(take(&mut iter, 41, &pair)?)?;
        let meta = merge_meta(&left.meta, &right.meta);
        left = Expr::new(
            ExprKind::Binary {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            },
            meta,
        );
    }
    Ok(left)
}

fn build_ast_from_type_test(operand: Expr, pair: Pair<Rule>) -> Result<Expr, Error<Rule>> {
    let pair_meta = get_meta(&pair);
    let meta = merge_meta(&operand.meta, &pair_meta);
    let mut iter = pair.clone().into_inner();
    let keyword = take(&mut iter, 42, &pair)?;
    let target = build_ast_from_type_ref(take(&mut iter, 43, &pair)?)?;
    let kind = match keyword.as_rule() {
        Rule::kw_is => ExprKind::Is {
            operand: Box::new(operand),
            target,
        },
        _ => ExprKind::As {
            operand: Box::new(operand),
            target,
        },
    };
    Ok(Expr::new(kind, meta))
}

fn build_ast_from_unary(pair: Pair<Rule>) -> Result<Expr, Error<Rule>> {
    let meta = get_meta(&pair);
    let mut iter = pair.clone().into_inner();
    let first = take(&mut iter, 44, &pair)?;
    match first.as_rule() {
        Rule::postfix => build_ast_from_postfix(first),
        Rule::cast_expression => {
            let mut parts = first.clone().into_inner();
            let cast_type = take(&mut parts, 45, &first)?;
            let target = build_ast_from_type_ref(cast_type)?;
            let operand = build_ast_from_unary(take(&mut parts, 46, &first)?)?;
            Ok(Expr::new(
                ExprKind::Cast {
                    target,
                    operand: Box::new(operand),
                },
                meta,
            ))
        }
        Rule::prefix_op => {
            let operand = build_ast_from_unary(take(&mut iter, 47, &pair)?)?;
            let kind = match first.as_str() {
                "++" | "--" => ExprKind::Update {
                    target: Box::new(operand),
                    increment: first.as_str() == "++",
                    prefix: true,
                },
                "-" => match operand.kind {
                    ExprKind::Literal(Literal::UInt(2_147_483_648)) => {
                        ExprKind::Literal(Literal::Int(i32::MIN))
                    }
                    ExprKind::Literal(Literal::ULong(9_223_372_036_854_775_808)) => {
                        ExprKind::Literal(Literal::Long(i64::MIN))
                    }
                    _ => ExprKind::Unary {
                        operator: UnaryOperator::Negate,
                        operand: Box::new(operand),
                    },
                },
                "+" => ExprKind::Unary {
                    operator: UnaryOperator::Plus,
                    operand: Box::new(operand),
                },
                "!" => ExprKind::Unary {
                    operator: UnaryOperator::Not,
                    operand: Box::new(operand),
                },
                "~" => ExprKind::Unary {
                    operator: UnaryOperator::BitNot,
                    operand: Box::new(operand),
                },
                _ => return Err(get_unexpected_error(48, &first)),
            };
            Ok(Expr::new(kind, meta))
        }
        _ => Err(get_unexpected_error(49, &first)),
    }
}

fn build_ast_from_postfix(pair: Pair<Rule>) -> Result<Expr, Error<Rule>> {
    let mut iter = pair.clone().into_inner();
    let mut current = build_ast_from_primary(take(&mut iter, 50, &pair)?)?;
    for part in iter {
        let meta = merge_meta(&current.meta, &get_meta(&part));
        let kind = match part.as_rule() {
            Rule::member_access => {
                let name = take(&mut part.clone().into_inner(), 51, &part)?;
                ExprKind::Member {
                    object: Box::new(current),
                    name: name.as_str().to_string(),
                }
            }
            Rule::invocation => ExprKind::Call {
                callee: Box::new(current),
                arguments: build_ast_from_optional_arguments(part)?,
            },
            Rule::element_access => ExprKind::Index {
                object: Box::new(current),
                arguments: build_ast_from_optional_arguments(part)?,
            },
            Rule::post_increment | Rule::post_decrement => ExprKind::Update {
                target: Box::new(current),
                increment: part.as_rule() == Rule::post_increment,
                prefix: false,
            },
            _ => return Err(get_unexpected_error(52, &part)),
        };
        current = Expr::new(kind, meta);
    }
    Ok(current)
}

/// Arguments of a wrapper rule whose only child is an optional `argument_list`.
fn build_ast_from_optional_arguments(pair: Pair<Rule>) -> Result<Vec<Expr>, Error<Rule>> {
    match pair.into_inner().next() {
        Some(list) => list.into_inner().map(build_ast_from_expression).collect(),
        None => Ok(vec![]),
    }
}

fn build_ast_from_primary(pair: Pair<Rule>) -> Result<Expr, Error<Rule>> {
    let meta = get_meta(&pair);
    let kind = match pair.as_rule() {
        Rule::identifier => ExprKind::Name(pair.as_str().to_string()),
        Rule::predefined_type => {
            let name = pair.as_str().trim();
            ExprKind::PredefinedType(
                PredefinedType::from_keyword(name).ok_or_else(|| get_unexpected_error(53, &pair))?,
            )
        }
        Rule::parenthesized => {
            let inner_pair = take(&mut pair.clone().into_inner(), 54, &pair)?;
            return build_ast_from_expression(inner_pair);
        }
        Rule::typeof_expression => {
            let type_ref = take(&mut significant(pair.clone()).into_iter(), 55, &pair)?;
            ExprKind::TypeOf(build_ast_from_type_ref(type_ref)?)
        }
        Rule::object_creation => return build_ast_from_object_creation(pair),
        Rule::interpolated_string => build_ast_from_interpolated_string(pair)?,
        _ => ExprKind::Literal(build_ast_from_literal(&pair)?),
    };
    Ok(Expr::new(kind, meta))
}

fn build_ast_from_object_creation(pair: Pair<Rule>) -> Result<Expr, Error<Rule>> {
    let meta = get_meta(&pair);
    let body = take(&mut significant(pair.clone()).into_iter(), 56, &pair)?;
    let kind = match body.as_rule() {
        Rule::anonymous_object => {
            let mut members = vec![];
            for member in body.into_inner() {
                let mut parts = member.clone().into_inner();
                let name = take(&mut parts, 57, &member)?.as_str().to_string();
                let value = build_ast_from_expression(take(&mut parts, 58, &member)?)?;
                members.push((name, value));
            }
            ExprKind::AnonymousObject(members)
        }
        Rule::implicit_array => {
            let init = take(&mut body.clone().into_inner(), 59, &body)?;
            let mut items = vec![];
            for item in init.into_inner() {
                if item.as_rule() == Rule::array_initializer {
                    return Err(custom_error(
                        "Array initializers can only be used in a variable or field initializer",
                        &item,
                    ));
                }
                items.push(build_ast_from_expression(item)?);
            }
            ExprKind::ImplicitArray(items)
        }
        Rule::array_creation => build_ast_from_array_creation(body)?,
        Rule::object_creation_tail => {
            let mut target = None;
            let mut arguments = vec![];
            let mut has_arguments = false;
            let mut initializer = None;
            for part in body.clone().into_inner() {
                match part.as_rule() {
                    Rule::type_ref => target = Some(build_ast_from_type_ref(part)?),
                    Rule::constructor_arguments => {
                        has_arguments = true;
                        arguments = build_ast_from_optional_arguments(part)?;
                    }
                    Rule::collection_initializer => {
                        let mut elements = vec![];
                        for element in part.into_inner() {
                            if element.as_rule() == Rule::pair_initializer {
                                let mut kv = element.clone().into_inner();
                                let key = build_ast_from_expression(take(&mut kv, 60, &element)?)?;
                                let value = build_ast_from_expression(take(&mut kv, 61, &element)?)?;
                                elements.push(ElementInitializer::Pair(key, value));
                            } else {
                                elements.push(ElementInitializer::Single(build_ast_from_expression(
                                    element,
                                )?));
                            }
                        }
                        initializer = Some(elements);
                    }
                    _ => return Err(get_unexpected_error(62, &part)),
                }
            }
            if !has_arguments && initializer.is_none() {
                return Err(custom_error(
                    "A new expression requires an argument list or an initializer",
                    &body,
                ));
            }
            ExprKind::New {
                target: target.ok_or_else(|| get_unexpected_error(63, &body))?,
                arguments,
                initializer,
            }
        }
        _ => return Err(get_unexpected_error(64, &body)),
    };
    Ok(Expr::new(kind, meta))
}

fn build_ast_from_array_creation(pair: Pair<Rule>) -> Result<ExprKind, Error<Rule>> {
    let mut iter = pair.clone().into_inner();
    let element_pair = take(&mut iter, 65, &pair)?;
    let mut element = None;
    for part in element_pair.clone().into_inner() {
        match part.as_rule() {
            Rule::predefined_type => element = Some(build_ast_from_predefined_type(&part)?),
            Rule::qualified_name => {
                let path = part.into_inner().map(|p| p.as_str().to_string()).collect();
                element = Some(TypeRef::Named { path, args: vec![] });
            }
            Rule::generic_args => {
                let args = part
                    .into_inner()
                    .map(build_ast_from_type_ref)
                    .collect::<Result<Vec<_>, _>>()?;
                if let Some(TypeRef::Named { args: slot, .. }) = element.as_mut() {
                    *slot = args;
                }
            }
            _ => return Err(get_unexpected_error(66, &part)),
        }
    }
    let element = element.ok_or_else(|| get_unexpected_error(67, &element_pair))?;
    let shape = take(&mut iter, 68, &pair)?;
    match shape.as_rule() {
        Rule::sized_array => {
            let mut parts = shape.clone().into_inner();
            let sizes = take(&mut parts, 69, &shape)?
                .into_inner()
                .map(build_ast_from_expression)
                .collect::<Result<Vec<_>, _>>()?;
            let initializer = match parts.next() {
                Some(init) => Some(build_ast_from_array_initializer(init)?),
                None => None,
            };
            Ok(ExprKind::NewArray {
                element,
                rank: sizes.len(),
                sizes,
                initializer,
            })
        }
        Rule::initialized_array => {
            let mut parts = shape.clone().into_inner();
            let rank = take(&mut parts, 70, &shape)?.into_inner().count() + 1;
            let initializer = build_ast_from_array_initializer(take(&mut parts, 71, &shape)?)?;
            Ok(ExprKind::NewArray {
                element,
                sizes: vec![],
                rank,
                initializer: Some(initializer),
            })
        }
        _ => Err(get_unexpected_error(72, &shape)),
    }
}

fn build_ast_from_array_initializer(pair: Pair<Rule>) -> Result<ArrayInitializer, Error<Rule>> {
    let meta = get_meta(&pair);
    let mut items = vec![];
    for item in pair.into_inner() {
        if item.as_rule() == Rule::array_initializer {
            items.push(build_ast_from_array_initializer(item)?);
        } else {
            items.push(ArrayInitializer::Expr(Box::new(build_ast_from_expression(item)?)));
        }
    }
    Ok(ArrayInitializer::Nested(items, meta))
}

fn build_ast_from_interpolated_string(pair: Pair<Rule>) -> Result<ExprKind, Error<Rule>> {
    let mut parts = vec![];
    for part in pair.clone().into_inner() {
        match part.as_rule() {
            Rule::interpolation_text => {
                let raw = part.as_str().replace("{{", "{").replace("}}", "}");
                parts.push(InterpolationPart::Text(unescape(&raw, &part)?));
            }
            Rule::interpolation_hole => {
                let inner_pair = take(&mut part.clone().into_inner(), 73, &part)?;
                parts.push(InterpolationPart::Hole(build_ast_from_expression(inner_pair)?));
            }
            _ => return Err(get_unexpected_error(74, &part)),
        }
    }
    Ok(ExprKind::Interpolated(parts))
}

// ════════════════════════════════════════════════════════════════
// Literals
// ════════════════════════════════════════════════════════════════

fn build_ast_from_literal(pair: &Pair<Rule>) -> Result<Literal, Error<Rule>> {
    let text = pair.as_str();
    Ok(match pair.as_rule() {
        Rule::null_literal => Literal::Null,
        Rule::boolean_literal => Literal::Bool(text == "true"),
        Rule::integer_literal => build_ast_from_integer_literal(pair)?,
        Rule::real_literal => build_ast_from_real_literal(pair)?,
        Rule::char_literal => {
            let value = unescape(&text[1..text.len() - 1], pair)?;
            let mut chars = value.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Literal::Char(c),
                _ => return Err(custom_error("Too many characters in character literal", pair)),
            }
        }
        Rule::string_literal => Literal::String(unescape(&text[1..text.len() - 1], pair)?),
        Rule::verbatim_string => Literal::String(text[2..text.len() - 1].replace("\"\"", "\"")),
        _ => return Err(get_unexpected_error(75, pair)),
    })
}

fn build_ast_from_integer_literal(pair: &Pair<Rule>) -> Result<Literal, Error<Rule>> {
    let text: String = pair.as_str().chars().filter(|c| *c != '_').collect();
    let lower = text.to_ascii_lowercase();
    let digits_end = lower
        .trim_end_matches(|c| c == 'u' || c == 'l')
        .len();
    let (digits, suffix) = lower.split_at(digits_end);
    let value = match digits.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => digits.parse::<u64>(),
    }
    .map_err(|_| custom_error("Integral constant is too large", pair))?;
    Ok(match suffix {
        "" => {
            if value <= i32::MAX as u64 {
                Literal::Int(value as i32)
            } else if value <= u32::MAX as u64 {
                Literal::UInt(value as u32)
            } else if value <= i64::MAX as u64 {
                Literal::Long(value as i64)
            } else {
                Literal::ULong(value)
            }
        }
        "u" => {
            if value <= u32::MAX as u64 {
                Literal::UInt(value as u32)
            } else {
                Literal::ULong(value)
            }
        }
        "l" => {
            if value <= i64::MAX as u64 {
                Literal::Long(value as i64)
            } else {
                Literal::ULong(value)
            }
        }
        _ => Literal::ULong(value),
    })
}

fn build_ast_from_real_literal(pair: &Pair<Rule>) -> Result<Literal, Error<Rule>> {
    let text: String = pair.as_str().chars().filter(|c| *c != '_').collect();
    let last = text.chars().last().map(|c| c.to_ascii_lowercase());
    let (body, suffix) = match last {
        Some(c @ ('f' | 'd' | 'm')) => (&text[..text.len() - 1], Some(c)),
        _ => (text.as_str(), None),
    };
    let invalid = || custom_error("Invalid real literal", pair);
    Ok(match suffix {
        Some('f') => Literal::Float(body.parse::<f32>().map_err(|_| invalid())?),
        Some('m') => Literal::Decimal(body.to_string()),
        _ => Literal::Double(body.parse::<f64>().map_err(|_| invalid())?),
    })
}

/// Resolves backslash escapes of regular string and char literals.
fn unescape(raw: &str, pair: &Pair<Rule>) -> Result<String, Error<Rule>> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escaped = chars
            .next()
            .ok_or_else(|| custom_error("Unrecognized escape sequence", pair))?;
        out.push(match escaped {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            'a' => '\u{7}',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            'u' => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .map_err(|_| custom_error("Unrecognized escape sequence", pair))?;
                char::from_u32(code).unwrap_or('\u{FFFD}')
            }
            _ => return Err(custom_error("Unrecognized escape sequence", pair)),
        });
    }
    Ok(out)
}
