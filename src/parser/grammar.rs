//! Parser implementation using chumsky

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::error::ParseError;
use crate::parser::ast::*;
use crate::parser::lexer::{lex, Token};

type Extra<'a> = extra::Err<Rich<'a, Token>>;

/// Argument of a call before positional and keyword arguments are split
#[derive(Debug, Clone)]
enum CallArg {
    Positional(Spanned<Expr>),
    Keyword(Keyword),
    /// `*args`
    Star(Spanned<Expr>),
    /// `**kwargs`
    DoubleStar(Spanned<Expr>),
}

/// Postfix operation on a primary expression
#[derive(Debug, Clone)]
enum Postfix {
    Attr(String),
    Item(Spanned<Expr>),
    Call(Args),
}

/// `| filter` or `is test` applied to an expression
#[derive(Debug, Clone)]
enum Suffix {
    Filter(String, Args),
    Test(String, Args, bool),
}

/// Parse template source into an AST
pub fn parse(input: &str) -> Result<Template, Vec<ParseError>> {
    let len = input.len();

    let tokens = lex(input).map_err(|e| vec![e])?;
    let token_iter = tokens
        .into_iter()
        .map(|(tok, span)| (tok, SimpleSpan::from(span)));

    // Turn the token iterator into a stream that chumsky can use
    let token_stream = Stream::from_iter(token_iter)
        // Split (Token, SimpleSpan) into token and span parts
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    template_parser()
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(ParseError::from).collect())
}

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> std::ops::Range<usize> {
    e.start()..e.end()
}

fn split_args(items: Vec<CallArg>) -> Args {
    let mut args = Args::default();
    for item in items {
        match item {
            CallArg::Positional(expr) => args.args.push(expr),
            CallArg::Keyword(kw) => args.kwargs.push(kw),
            CallArg::Star(expr) => args.dyn_args = Some(Box::new(expr)),
            CallArg::DoubleStar(expr) => args.dyn_kwargs = Some(Box::new(expr)),
        }
    }
    args
}

/// `{% inner %}`
fn tag<'a, I, O, P>(inner: P) -> impl Parser<'a, I, O, Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
    P: Parser<'a, I, O, Extra<'a>> + Clone,
{
    just(Token::BlockStart)
        .ignore_then(inner)
        .then_ignore(just(Token::BlockEnd))
}

/// Left-associative chain of binary operators over `operand`
fn binary_level<'a, I, P, O>(
    operand: P,
    op: O,
) -> impl Parser<'a, I, Spanned<Expr>, Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
    P: Parser<'a, I, Spanned<Expr>, Extra<'a>> + Clone + 'a,
    O: Parser<'a, I, BinOp, Extra<'a>> + Clone + 'a,
{
    operand
        .clone()
        .then(op.then(operand).repeated().collect::<Vec<_>>())
        .map(|(first, rest)| {
            rest.into_iter().fold(first, |left, (op, right)| {
                let span = left.span.start..right.span.end;
                Spanned::new(
                    Expr::BinExpr {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    span,
                )
            })
        })
        .boxed()
}

/// Expression parser
///
/// With `with_condexpr` unset the top level stops below `a if b else c`, as
/// needed for `for` iterables and `if` tests where a bare `if` belongs to the
/// enclosing statement.
fn expression<'a, I>(with_condexpr: bool) -> impl Parser<'a, I, Spanned<Expr>, Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    recursive(move |expr| {
        let name = select! { Token::Name(s) => s };

        // Keywords are fine as attribute and test names
        let attr_name = any().try_map(|tok: Token, span| match tok {
            Token::Name(s) => Ok(s),
            other => other
                .keyword()
                .map(str::to_string)
                .ok_or_else(|| Rich::custom(span, format!("expected a name, found {}", other))),
        });

        // Adjacent string literals are joined: `'a' 'b'` is `'ab'`
        let string = select! { Token::Str(s) => s }
            .repeated()
            .at_least(1)
            .collect::<Vec<_>>()
            .map(|parts| Expr::Const(Const::Str(parts.concat())));
        let number = select! {
            Token::Integer(n) => Expr::Const(Const::Int(n)),
            Token::Float(n) => Expr::Const(Const::Float(n)),
        };
        let literal = choice((string, number));

        let name_atom = name.clone().map(|s: String| match s.as_str() {
            "true" | "True" => Expr::Const(Const::Bool(true)),
            "false" | "False" => Expr::Const(Const::Bool(false)),
            "none" | "None" => Expr::Const(Const::None),
            _ => Expr::Name {
                name: s,
                ctx: Ctx::Load,
            },
        });

        let items = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>();

        // `()`, `(a)` or `(a, b, ...)`
        let paren = expr
            .clone()
            .then(just(Token::Comma).ignore_then(items.clone()).or_not())
            .or_not()
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose))
            .map(|inner: Option<(Spanned<Expr>, Option<Vec<Spanned<Expr>>>)>| match inner {
                None => Expr::Tuple {
                    items: Vec::new(),
                    ctx: Ctx::Load,
                },
                Some((first, None)) => first.node,
                Some((first, Some(rest))) => {
                    let mut items = vec![first];
                    items.extend(rest);
                    Expr::Tuple {
                        items,
                        ctx: Ctx::Load,
                    }
                }
            });

        let list = items
            .clone()
            .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
            .map(Expr::List);

        let dict = expr
            .clone()
            .then_ignore(just(Token::Colon))
            .then(expr.clone())
            .map(|(key, value)| Pair { key, value })
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::BraceOpen), just(Token::BraceClose))
            .map(Expr::Dict);

        let atom = choice((literal, name_atom, paren, list, dict))
            .map_with(|e, ex| Spanned::new(e, span_range(&ex.span())));

        // Call arguments: positional, `key=value`, `*args` and `**kwargs`
        let arg = choice((
            just(Token::Pow)
                .ignore_then(expr.clone())
                .map(CallArg::DoubleStar),
            just(Token::Star)
                .ignore_then(expr.clone())
                .map(CallArg::Star),
            name.clone()
                .then_ignore(just(Token::Assign))
                .then(expr.clone())
                .map(|(key, value)| CallArg::Keyword(Keyword { key, value })),
            expr.clone().map(CallArg::Positional),
        ));
        let args = arg
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose))
            .map(split_args);

        // `a:b:c` with every part optional
        let bound = expr.clone().or_not();
        let slice = bound
            .clone()
            .then_ignore(just(Token::Colon))
            .then(bound.clone())
            .then(just(Token::Colon).ignore_then(bound).or_not())
            .map_with(|((start, stop), step), ex| {
                let slice = Expr::Slice {
                    start: start.map(Box::new),
                    stop: stop.map(Box::new),
                    step: step.flatten().map(Box::new),
                };
                Spanned::new(slice, span_range(&ex.span()))
            });

        // `items.0` reads like `items[0]`
        let index_attr = select! { Token::Integer(n) => n }.map_with(|n, ex| {
            Spanned::new(Expr::Const(Const::Int(n)), span_range(&ex.span()))
        });

        let postfix = choice((
            just(Token::Dot)
                .ignore_then(index_attr)
                .map(Postfix::Item),
            just(Token::Dot)
                .ignore_then(attr_name.clone())
                .map(Postfix::Attr),
            choice((slice, expr.clone()))
                .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
                .map(Postfix::Item),
            args.clone().map(Postfix::Call),
        ))
        .map_with(|p, ex| (p, span_range(&ex.span())));

        let primary = atom
            .then(postfix.repeated().collect::<Vec<_>>())
            .map(|(base, ops)| {
                ops.into_iter().fold(base, |acc, (op, span)| {
                    let whole = acc.span.start..span.end;
                    let node = Box::new(acc);
                    let expr = match op {
                        Postfix::Attr(attr) => Expr::Getattr { node, attr },
                        Postfix::Item(arg) => Expr::Getitem {
                            node,
                            arg: Box::new(arg),
                        },
                        Postfix::Call(args) => Expr::Call { node, args },
                    };
                    Spanned::new(expr, whole)
                })
            })
            .boxed();

        let suffix = choice((
            just(Token::Pipe)
                .ignore_then(name.clone())
                .then(args.clone().or_not())
                .map(|(name, args)| Suffix::Filter(name, args.unwrap_or_default())),
            just(Token::Is)
                .ignore_then(just(Token::Not).or_not())
                .then(attr_name)
                .then(args.clone().or_not())
                .map(|((not, name), args)| {
                    Suffix::Test(name, args.unwrap_or_default(), not.is_some())
                }),
        ))
        .map_with(|s, ex| (s, span_range(&ex.span())));

        let filtered = primary
            .then(suffix.repeated().collect::<Vec<_>>())
            .map(|(base, suffixes)| {
                suffixes.into_iter().fold(base, |acc, (suffix, span)| {
                    let whole = acc.span.start..span.end;
                    let node = Box::new(acc);
                    let expr = match suffix {
                        Suffix::Filter(name, args) => Expr::Filter { node, name, args },
                        Suffix::Test(name, args, negated) => Expr::Test {
                            node,
                            name,
                            args,
                            negated,
                        },
                    };
                    Spanned::new(expr, whole)
                })
            });

        let unary = choice((
            just(Token::Minus).to(UnaryOp::Neg),
            just(Token::Plus).to(UnaryOp::Pos),
        ))
        .map_with(|op, ex| (op, span_range(&ex.span())))
        .repeated()
        .collect::<Vec<_>>()
        .then(filtered)
        .map(|(ops, operand)| {
            ops.into_iter().rev().fold(operand, |acc, (op, span)| {
                let whole = span.start..acc.span.end;
                Spanned::new(
                    Expr::UnaryExpr {
                        op,
                        node: Box::new(acc),
                    },
                    whole,
                )
            })
        })
        .boxed();

        let pow = binary_level(unary, just(Token::Pow).to(BinOp::Pow));
        let math2 = binary_level(
            pow,
            choice((
                just(Token::Star).to(BinOp::Mul),
                just(Token::FloorDiv).to(BinOp::FloorDiv),
                just(Token::Slash).to(BinOp::Div),
                just(Token::Percent).to(BinOp::Mod),
            )),
        );

        let concat = math2
            .clone()
            .then(
                just(Token::Tilde)
                    .ignore_then(math2)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| {
                if rest.is_empty() {
                    return first;
                }
                let end = rest.last().map_or(first.span.end, |last| last.span.end);
                let span = first.span.start..end;
                let mut items = vec![first];
                items.extend(rest);
                Spanned::new(Expr::Concat(items), span)
            })
            .boxed();

        let math1 = binary_level(
            concat,
            choice((
                just(Token::Plus).to(BinOp::Add),
                just(Token::Minus).to(BinOp::Sub),
            )),
        );

        let cmp_op = choice((
            just(Token::Eq).to(CmpOp::Eq),
            just(Token::Ne).to(CmpOp::Ne),
            just(Token::Le).to(CmpOp::Le),
            just(Token::Ge).to(CmpOp::Ge),
            just(Token::Lt).to(CmpOp::Lt),
            just(Token::Gt).to(CmpOp::Gt),
            just(Token::Not).then(just(Token::In)).to(CmpOp::NotIn),
            just(Token::In).to(CmpOp::In),
        ));

        let compare = math1
            .clone()
            .then(
                cmp_op
                    .then(math1)
                    .map(|(op, expr)| Operand { op, expr })
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, ops)| {
                if ops.is_empty() {
                    return first;
                }
                let end = ops.last().map_or(first.span.end, |last| last.expr.span.end);
                let span = first.span.start..end;
                Spanned::new(
                    Expr::Compare {
                        expr: Box::new(first),
                        ops,
                    },
                    span,
                )
            })
            .boxed();

        let not = just(Token::Not)
            .map_with(|_, ex| span_range(&ex.span()))
            .repeated()
            .collect::<Vec<_>>()
            .then(compare)
            .map(|(nots, operand)| {
                nots.into_iter().rev().fold(operand, |acc, span| {
                    let whole = span.start..acc.span.end;
                    Spanned::new(
                        Expr::UnaryExpr {
                            op: UnaryOp::Not,
                            node: Box::new(acc),
                        },
                        whole,
                    )
                })
            })
            .boxed();

        let and = binary_level(not, just(Token::And).to(BinOp::And));
        let or = binary_level(and, just(Token::Or).to(BinOp::Or));

        if !with_condexpr {
            return or.boxed();
        }

        or.clone()
            .then(
                just(Token::If)
                    .ignore_then(or)
                    .then(just(Token::Else).ignore_then(expr.clone()).or_not())
                    .or_not(),
            )
            .map(|(expr1, cond): (Spanned<Expr>, Option<(Spanned<Expr>, Option<Spanned<Expr>>)>)| {
                let Some((test, expr2)) = cond else {
                    return expr1;
                };
                let end = expr2.as_ref().map_or(test.span.end, |e| e.span.end);
                let span = expr1.span.start..end;
                Spanned::new(
                    Expr::CondExpr {
                        test: Box::new(test),
                        expr1: Box::new(expr1),
                        expr2: expr2.map(Box::new),
                    },
                    span,
                )
            })
            .boxed()
    })
}

fn template_parser<'a, I>() -> impl Parser<'a, I, Template, Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let expr = expression(true);
    let test_expr = expression(false);
    let name = select! { Token::Name(s) => s };

    // `a, b = 1, 2` style tuples on the right-hand side of `set`
    let tuple_expr = expr
        .clone()
        .separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>()
        .map_with(|mut items: Vec<Spanned<Expr>>, ex| {
            if items.len() == 1 {
                items.remove(0)
            } else {
                Spanned::new(
                    Expr::Tuple {
                        items,
                        ctx: Ctx::Load,
                    },
                    span_range(&ex.span()),
                )
            }
        });

    let store_name = name.clone().map_with(|name, ex| {
        Spanned::new(
            Expr::Name {
                name,
                ctx: Ctx::Store,
            },
            span_range(&ex.span()),
        )
    });

    let target_list = store_name
        .separated_by(just(Token::Comma))
        .at_least(1)
        .allow_trailing()
        .collect::<Vec<_>>()
        .map_with(|mut names: Vec<Spanned<Expr>>, ex| {
            if names.len() == 1 {
                names.remove(0)
            } else {
                Spanned::new(
                    Expr::Tuple {
                        items: names,
                        ctx: Ctx::Store,
                    },
                    span_range(&ex.span()),
                )
            }
        });

    // Loop targets: `x`, `k, v` or `(k, v)`
    let target = choice((
        target_list
            .clone()
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
        target_list.clone(),
    ));

    let set_target = choice((
        name.clone()
            .then_ignore(just(Token::Dot))
            .then(name.clone())
            .map_with(|(name, attr), ex| {
                Spanned::new(Expr::NsRef { name, attr }, span_range(&ex.span()))
            }),
        target.clone(),
    ));

    let context_kw = select! { Token::Name(s) if s == "context" => () };
    let context_mod = choice((just(Token::With).to(true), just(Token::Without).to(false)))
        .then_ignore(context_kw)
        .or_not();

    let ignore_missing = select! { Token::Name(s) if s == "ignore" => () }
        .then(select! { Token::Name(s) if s == "missing" => () })
        .or_not();

    let param = name
        .clone()
        .then(just(Token::Assign).ignore_then(expr.clone()).or_not())
        .map(|(name, default)| MacroParam { name, default });
    let params = param
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::ParenOpen), just(Token::ParenClose));

    let statement = recursive(|stmt| {
        let body = stmt.repeated().collect::<Vec<_>>();

        // Template data and `{{ ... }}` runs
        let data = select! { Token::Data(s) => Expr::TemplateData(s) }
            .map_with(|e, ex| Spanned::new(e, span_range(&ex.span())));
        let print = expr
            .clone()
            .delimited_by(just(Token::VariableStart), just(Token::VariableEnd));
        let output = choice((data, print))
            .repeated()
            .at_least(1)
            .collect::<Vec<_>>()
            .map(Stmt::Output);

        let for_stmt = tag(
            just(Token::For)
                .ignore_then(target.clone())
                .then_ignore(just(Token::In))
                .then(test_expr.clone())
                .then(just(Token::If).ignore_then(test_expr.clone()).or_not())
                .then(just(Token::Recursive).or_not()),
        )
        .then(body.clone())
        .then(tag(just(Token::Else)).ignore_then(body.clone()).or_not())
        .then_ignore(tag(just(Token::EndFor)))
        .map(|(((((target, iter), filter), recursive), body), else_)| Stmt::For {
            target,
            iter,
            filter,
            recursive: recursive.is_some(),
            body,
            else_: else_.unwrap_or_default(),
        });

        let elif = tag(just(Token::Elif).ignore_then(test_expr.clone()))
            .then(body.clone())
            .map(|(test, body)| IfBranch { test, body });

        let if_stmt = tag(just(Token::If).ignore_then(test_expr.clone()))
            .then(body.clone())
            .then(elif.repeated().collect::<Vec<_>>())
            .then(tag(just(Token::Else)).ignore_then(body.clone()).or_not())
            .then_ignore(tag(just(Token::EndIf)))
            .map(|(((test, body), elif_), else_)| Stmt::If {
                test,
                body,
                elif_,
                else_: else_.unwrap_or_default(),
            });

        let set_stmt = tag(
            just(Token::Set)
                .ignore_then(set_target.clone())
                .then_ignore(just(Token::Assign))
                .then(tuple_expr.clone()),
        )
        .map(|(target, node)| Stmt::Assign { target, node });

        let set_block = tag(just(Token::Set).ignore_then(set_target.clone()))
            .then(body.clone())
            .then_ignore(tag(just(Token::EndSet)))
            .map(|(target, body)| Stmt::AssignBlock { target, body });

        let include_stmt = tag(
            just(Token::Include)
                .ignore_then(expr.clone())
                .then(ignore_missing.clone())
                .then(context_mod.clone()),
        )
        .map(|((template, missing), context)| Stmt::Include {
            template,
            ignore_missing: missing.is_some(),
            with_context: context.unwrap_or(true),
        });

        let extends_stmt = tag(just(Token::Extends).ignore_then(expr.clone()))
            .map(|template| Stmt::Extends { template });

        let import_stmt = tag(
            just(Token::Import)
                .ignore_then(expr.clone())
                .then_ignore(just(Token::As))
                .then(name.clone())
                .then(context_mod.clone()),
        )
        .map(|((template, target), context)| Stmt::Import {
            template,
            target,
            with_context: context.unwrap_or(false),
        });

        let import_name = name
            .clone()
            .then(just(Token::As).ignore_then(name.clone()).or_not())
            .map(|(name, alias)| ImportName { name, alias });

        let from_stmt = tag(
            just(Token::From)
                .ignore_then(expr.clone())
                .then_ignore(just(Token::Import))
                .then(
                    import_name
                        .separated_by(just(Token::Comma))
                        .at_least(1)
                        .allow_trailing()
                        .collect::<Vec<_>>(),
                )
                .then(context_mod.clone()),
        )
        .map(|((template, names), context)| Stmt::FromImport {
            template,
            names,
            with_context: context.unwrap_or(false),
        });

        let macro_stmt = tag(just(Token::Macro).ignore_then(name.clone()).then(params.clone()))
            .then(body.clone())
            .then_ignore(tag(just(Token::EndMacro)))
            .map(|((name, params), body)| Stmt::Macro { name, params, body });

        let call_stmt = tag(
            just(Token::Call)
                .ignore_then(params.clone().or_not())
                .then(expr.clone()),
        )
        .then(body.clone())
        .then_ignore(tag(just(Token::EndCall)))
        .map(|((params, call), body)| Stmt::CallBlock {
            call,
            params: params.unwrap_or_default(),
            body,
        });

        // `{% filter upper %}` or `{% filter center(40) %}`
        let filter_head = expr.clone().try_map(|filter: Spanned<Expr>, span| match filter.node {
            Expr::Name { name, .. } => Ok((name, Args::default())),
            Expr::Call { node, args } => match (*node).node {
                Expr::Name { name, .. } => Ok((name, args)),
                _ => Err(Rich::custom(span, "expected a filter name")),
            },
            _ => Err(Rich::custom(span, "expected a filter name")),
        });
        let filter_stmt = tag(just(Token::Filter).ignore_then(filter_head))
            .then(body.clone())
            .then_ignore(tag(just(Token::EndFilter)))
            .map(|((name, args), body)| Stmt::FilterBlock { name, args, body });

        let with_stmt = tag(
            just(Token::With).ignore_then(
                name.clone()
                    .then_ignore(just(Token::Assign))
                    .then(expr.clone())
                    .separated_by(just(Token::Comma))
                    .allow_trailing()
                    .collect::<Vec<_>>(),
            ),
        )
        .then(body.clone())
        .then_ignore(tag(just(Token::EndWith)))
        .map(|(assignments, body)| Stmt::With { assignments, body });

        let autoescape_stmt = tag(
            select! { Token::Name(s) if s == "autoescape" => () }.ignore_then(expr.clone()),
        )
        .then(body.clone())
        .then_ignore(tag(select! { Token::Name(s) if s == "endautoescape" => () }))
        .map(|(enabled, body)| Stmt::Autoescape { enabled, body });

        let block_modifier = select! {
            Token::Name(s) if s == "scoped" => true,
            Token::Name(s) if s == "required" => false,
        };
        let block_stmt = tag(
            just(Token::Block)
                .ignore_then(name.clone())
                .then(block_modifier.repeated().collect::<Vec<_>>()),
        )
        .then(body)
        .then_ignore(tag(just(Token::EndBlock).then(name.clone().or_not())))
        .map(|((name, modifiers), body)| Stmt::Block {
            name,
            scoped: modifiers.contains(&true),
            body,
        });

        choice((
            output,
            for_stmt,
            if_stmt,
            set_stmt,
            set_block,
            include_stmt,
            extends_stmt,
            import_stmt,
            from_stmt,
            macro_stmt,
            call_stmt,
            filter_stmt,
            with_stmt,
            autoescape_stmt,
            block_stmt,
        ))
        .map_with(|s, ex| Spanned::new(s, span_range(&ex.span())))
        .boxed()
    });

    // Template is a list of statements
    statement
        .repeated()
        .collect()
        .then_ignore(end())
        .map(|body| Template { body })
}
