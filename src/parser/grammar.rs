//! Parser implementation using chumsky

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::parser::ast::*;
use crate::parser::lexer::{self, Token};

/// Parse template source into a Program
pub fn parse(input: &str) -> Result<Program, Vec<crate::ParseError>> {
    let tokens = lexer::lex(input).map_err(|e| vec![e.into()])?;
    let len = input.len();

    let token_iter = tokens.into_iter().map(|(tok, span)| (tok, span.into()));

    // Turn the token iterator into a stream that chumsky can use
    let token_stream = Stream::from_iter(token_iter)
        // Split (Token, SimpleSpan) into token and span parts
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    program_parser()
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(|e| e.into()).collect())
}

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> std::ops::Range<usize> {
    e.start()..e.end()
}

/// Postfix operator applied to a primary expression
enum Postfix {
    Call(Vec<Spanned<Expr>>, Span),
    Field(Spanned<Identifier>),
    Index(Spanned<Expr>, Span),
}

fn apply_postfix(object: Spanned<Expr>, op: Postfix) -> Spanned<Expr> {
    match op {
        Postfix::Call(args, span) => {
            let span = object.span.start..span.end;
            Spanned::new(
                Expr::Call {
                    callee: Box::new(object),
                    args,
                },
                span,
            )
        }
        Postfix::Field(field) => {
            let span = object.span.start..field.span.end;
            Spanned::new(
                Expr::Field {
                    object: Box::new(object),
                    field,
                },
                span,
            )
        }
        Postfix::Index(index, span) => {
            let span = object.span.start..span.end;
            Spanned::new(
                Expr::Index {
                    object: Box::new(object),
                    index: Box::new(index),
                },
                span,
            )
        }
    }
}

fn fold_binary(lhs: Spanned<Expr>, rhs: (BinaryOp, Spanned<Expr>)) -> Spanned<Expr> {
    let (op, rhs) = rhs;
    let span = lhs.span.start..rhs.span.end;
    Spanned::new(
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    )
}

fn program_parser<'a, I>() -> impl Parser<'a, I, Program, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    // Recursive statement parser; a statement is one top-level item
    // (raw text, an output tag, or a statement tag)
    let statement = recursive(|statement| {
        let identifier = select! {
            Token::Ident(s) => Identifier::new(s),
        }
        .map_with(|id, e| Spanned::new(id, span_range(&e.span())));

        // Expression parser with standard precedence:
        // postfix > unary > mul > add > range > comparison > && > ||
        let expr = recursive(|expr| {
            let literal = select! {
                Token::Nil => Expr::Nil,
                Token::True => Expr::Bool(true),
                Token::False => Expr::Bool(false),
                Token::Int(n) => Expr::Int(n),
                Token::Float(f) => Expr::Float(f),
                Token::Str(s) => Expr::Str(s),
            }
            .map_with(|node, e| Spanned::new(node, span_range(&e.span())));

            let ident_expr = select! {
                Token::Ident(s) => Expr::Ident(Identifier::new(s)),
            }
            .map_with(|node, e| Spanned::new(node, span_range(&e.span())));

            let array = expr
                .clone()
                .separated_by(just(Token::Comma))
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
                .map_with(|items, e| Spanned::new(Expr::Array(items), span_range(&e.span())));

            let grouped = expr
                .clone()
                .delimited_by(just(Token::ParenOpen), just(Token::ParenClose));

            let atom = choice((literal, array, grouped, ident_expr));

            // Postfix chains: `f(a, b)`, `obj.field`, `list[i]`
            let call_args = expr
                .clone()
                .separated_by(just(Token::Comma))
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::ParenOpen), just(Token::ParenClose))
                .map_with(|args, e| Postfix::Call(args, span_range(&e.span())));

            let field_access = just(Token::Dot)
                .ignore_then(identifier.clone())
                .map(Postfix::Field);

            let index = expr
                .clone()
                .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
                .map_with(|ix, e| Postfix::Index(ix, span_range(&e.span())));

            let postfix = atom.foldl(
                choice((call_args, field_access, index)).repeated(),
                apply_postfix,
            );

            let unary_op = choice((
                just(Token::Bang).to(UnaryOp::Not),
                just(Token::Minus).to(UnaryOp::Neg),
            ))
            .map_with(|op, e| (op, span_range(&e.span())));

            let unary = unary_op
                .repeated()
                .foldr(postfix, |(op, op_span): (_, Span), operand: Spanned<Expr>| {
                    let span = op_span.start..operand.span.end;
                    Spanned::new(
                        Expr::Unary {
                            op,
                            operand: Box::new(operand),
                        },
                        span,
                    )
                });

            let product = unary.clone().foldl(
                choice((
                    just(Token::Star).to(BinaryOp::Mul),
                    just(Token::Slash).to(BinaryOp::Div),
                    just(Token::Percent).to(BinaryOp::Rem),
                ))
                .then(unary)
                .repeated(),
                fold_binary,
            );

            let sum = product.clone().foldl(
                choice((
                    just(Token::Plus).to(BinaryOp::Add),
                    just(Token::Minus).to(BinaryOp::Sub),
                ))
                .then(product)
                .repeated(),
                fold_binary,
            );

            let range = sum
                .clone()
                .then(just(Token::DotDot).ignore_then(sum).or_not())
                .map(|(start, end)| match end {
                    Some(end) => {
                        let span = start.span.start..end.span.end;
                        Spanned::new(
                            Expr::Range {
                                start: Box::new(start),
                                end: Box::new(end),
                            },
                            span,
                        )
                    }
                    None => start,
                });

            let comparison = range.clone().foldl(
                choice((
                    just(Token::EqEq).to(BinaryOp::Eq),
                    just(Token::NotEq).to(BinaryOp::NotEq),
                    just(Token::LessEq).to(BinaryOp::LessEq),
                    just(Token::GreaterEq).to(BinaryOp::GreaterEq),
                    just(Token::Less).to(BinaryOp::Less),
                    just(Token::Greater).to(BinaryOp::Greater),
                ))
                .then(range)
                .repeated(),
                fold_binary,
            );

            let logical_and = comparison.clone().foldl(
                just(Token::AndAnd)
                    .to(BinaryOp::And)
                    .then(comparison)
                    .repeated(),
                fold_binary,
            );

            let logical_or = logical_and.clone().foldl(
                just(Token::OrOr)
                    .to(BinaryOp::Or)
                    .then(logical_and)
                    .repeated(),
                fold_binary,
            );

            logical_or.boxed()
        });

        // Brace-delimited body spanning tags: `{ %> ...items... <% }`
        let block = just(Token::BraceOpen)
            .ignore_then(just(Token::TagClose))
            .ignore_then(statement.clone().repeated().collect::<Vec<_>>())
            .then_ignore(just(Token::StmtOpen))
            .then_ignore(just(Token::BraceClose));

        // `if cond { %>...<% } else if ... { %>...<% } else { %>...<% }`
        // An `else if` nests as a single-statement else branch.
        let if_stmt = recursive(|if_stmt| {
            just(Token::If)
                .ignore_then(expr.clone())
                .then(block.clone())
                .then(
                    just(Token::Else)
                        .ignore_then(choice((
                            if_stmt
                                .map_with(|s, e| vec![Spanned::new(s, span_range(&e.span()))]),
                            block.clone(),
                        )))
                        .or_not(),
                )
                .map(|((condition, then_branch), else_branch)| Statement::If {
                    condition,
                    then_branch,
                    else_branch,
                })
        });

        // `for v in iterable { ... }` / `for k, v in iterable { ... }`
        let for_stmt = just(Token::For)
            .ignore_then(identifier.clone())
            .then(just(Token::Comma).ignore_then(identifier.clone()).or_not())
            .then_ignore(just(Token::In))
            .then(expr.clone())
            .then(block.clone())
            .map(|(((first, second), iterable), body)| {
                let (key, value) = match second {
                    Some(second) => (Some(first), second),
                    None => (None, first),
                };
                Statement::For {
                    key,
                    value,
                    iterable,
                    body,
                }
            });

        let let_stmt = just(Token::Let)
            .ignore_then(identifier.clone())
            .then_ignore(just(Token::Equals))
            .then(expr.clone())
            .map(|(name, value)| Statement::Let { name, value });

        let assign_stmt = identifier
            .clone()
            .then_ignore(just(Token::Equals))
            .then(expr.clone())
            .map(|(name, value)| Statement::Assign { name, value });

        let expr_stmt = expr.clone().map(Statement::Expression);

        // Note: assign_stmt must come before expr_stmt since a bare
        // identifier is also a valid expression.
        let stmt_tag = just(Token::StmtOpen)
            .ignore_then(choice((if_stmt, for_stmt, let_stmt, assign_stmt, expr_stmt)))
            .then_ignore(just(Token::TagClose));

        let output_tag = just(Token::ExprOpen)
            .ignore_then(expr.clone())
            .then_ignore(just(Token::TagClose))
            .map(Statement::Output);

        let text = select! {
            Token::Text(s) => Statement::Text(s),
        };

        choice((text, output_tag, stmt_tag))
            .map_with(|s, e| Spanned::new(s, span_range(&e.span())))
            .boxed()
    });

    // A template is a list of items
    statement
        .repeated()
        .collect()
        .then_ignore(end())
        .map(|statements| Program { statements })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_text() {
        let program = parse("just some text").expect("should parse");
        assert_eq!(program.statements.len(), 1);
        match &program.statements[0].node {
            Statement::Text(s) => assert_eq!(s, "just some text"),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_empty_input() {
        let program = parse("").expect("should parse");
        assert!(program.statements.is_empty());
    }

    #[test]
    fn test_parse_output_tag() {
        let program = parse("<%= name %>").expect("should parse");
        match &program.statements[0].node {
            Statement::Output(expr) => {
                assert_eq!(expr.node, Expr::Ident(Identifier::new("name")));
            }
            other => panic!("expected output, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_arithmetic_precedence() {
        let program = parse("<%= 1 + 2 * 3 %>").expect("should parse");
        match &program.statements[0].node {
            Statement::Output(expr) => match &expr.node {
                Expr::Binary { op, rhs, .. } => {
                    assert_eq!(*op, BinaryOp::Add);
                    assert!(matches!(
                        rhs.node,
                        Expr::Binary {
                            op: BinaryOp::Mul,
                            ..
                        }
                    ));
                }
                other => panic!("expected binary, got {:?}", other),
            },
            other => panic!("expected output, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_grouping_overrides_precedence() {
        let program = parse("<%= (1 + 2) * 3 %>").expect("should parse");
        match &program.statements[0].node {
            Statement::Output(expr) => match &expr.node {
                Expr::Binary { op, lhs, .. } => {
                    assert_eq!(*op, BinaryOp::Mul);
                    assert!(matches!(
                        lhs.node,
                        Expr::Binary {
                            op: BinaryOp::Add,
                            ..
                        }
                    ));
                }
                other => panic!("expected binary, got {:?}", other),
            },
            other => panic!("expected output, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_call() {
        let program = parse(r#"<%= upper("hi", 2) %>"#).expect("should parse");
        match &program.statements[0].node {
            Statement::Output(expr) => match &expr.node {
                Expr::Call { callee, args } => {
                    assert_eq!(callee.node, Expr::Ident(Identifier::new("upper")));
                    assert_eq!(args.len(), 2);
                }
                other => panic!("expected call, got {:?}", other),
            },
            other => panic!("expected output, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_field_and_index() {
        let program = parse("<%= user.tags[0] %>").expect("should parse");
        match &program.statements[0].node {
            Statement::Output(expr) => {
                assert!(matches!(expr.node, Expr::Index { .. }));
            }
            other => panic!("expected output, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_let() {
        let program = parse("<% let x = 1 %>").expect("should parse");
        match &program.statements[0].node {
            Statement::Let { name, value } => {
                assert_eq!(name.node.as_str(), "x");
                assert_eq!(value.node, Expr::Int(1));
            }
            other => panic!("expected let, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_assignment() {
        let program = parse("<% x = x + 1 %>").expect("should parse");
        assert!(matches!(
            program.statements[0].node,
            Statement::Assign { .. }
        ));
    }

    #[test]
    fn test_parse_if_else() {
        let program = parse("<% if x > 1 { %>big<% } else { %>small<% } %>").expect("should parse");
        match &program.statements[0].node {
            Statement::If {
                then_branch,
                else_branch,
                ..
            } => {
                assert_eq!(then_branch.len(), 1);
                assert_eq!(else_branch.as_ref().map(|b| b.len()), Some(1));
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_else_if_chain() {
        let program =
            parse("<% if a { %>1<% } else if b { %>2<% } else { %>3<% } %>").expect("should parse");
        match &program.statements[0].node {
            Statement::If { else_branch, .. } => {
                let else_branch = else_branch.as_ref().expect("should have else branch");
                assert_eq!(else_branch.len(), 1);
                assert!(matches!(else_branch[0].node, Statement::If { .. }));
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_for_value_form() {
        let program = parse("<% for v in items { %><%= v %><% } %>").expect("should parse");
        match &program.statements[0].node {
            Statement::For { key, value, .. } => {
                assert!(key.is_none());
                assert_eq!(value.node.as_str(), "v");
            }
            other => panic!("expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_for_key_value_form() {
        let program = parse("<% for i, v in 0..10 { %><%= v %><% } %>").expect("should parse");
        match &program.statements[0].node {
            Statement::For {
                key,
                value,
                iterable,
                ..
            } => {
                assert_eq!(key.as_ref().map(|k| k.node.as_str()), Some("i"));
                assert_eq!(value.node.as_str(), "v");
                assert!(matches!(iterable.node, Expr::Range { .. }));
            }
            other => panic!("expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_nested_blocks() {
        let program =
            parse("<% if a { %><% for x in a { %><%= x %><% } %><% } %>").expect("should parse");
        match &program.statements[0].node {
            Statement::If { then_branch, .. } => {
                assert!(matches!(then_branch[0].node, Statement::For { .. }));
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_array_literal() {
        let program = parse("<%= [1, 2, 3] %>").expect("should parse");
        match &program.statements[0].node {
            Statement::Output(expr) => match &expr.node {
                Expr::Array(items) => assert_eq!(items.len(), 3),
                other => panic!("expected array, got {:?}", other),
            },
            other => panic!("expected output, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_logical_operators() {
        let program = parse("<%= a && b || !c %>").expect("should parse");
        match &program.statements[0].node {
            Statement::Output(expr) => {
                assert!(matches!(
                    expr.node,
                    Expr::Binary {
                        op: BinaryOp::Or,
                        ..
                    }
                ));
            }
            other => panic!("expected output, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_on_malformed_tag() {
        let errors = parse("<%= 1 + %>").expect_err("should fail");
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_parse_error_on_unclosed_tag() {
        let errors = parse("<%= name").expect_err("should fail");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_parse_error_on_dangling_close_brace() {
        assert!(parse("<% } %>").is_err());
    }

    #[test]
    fn test_parse_is_deterministic() {
        let a = parse("a <%= b %> c").expect("should parse");
        let b = parse("a <%= b %> c").expect("should parse");
        assert_eq!(a, b);
    }
}
