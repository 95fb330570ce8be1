//! Expression and statement-head parsers using chumsky

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use super::ast::*;
use super::lexer::{lex, Token};
use super::ExprError;
use crate::value::Value;

type Extra<'a> = extra::Err<Rich<'a, Token>>;

/// Operations chained after an atom: `.name`, `[index]`, `(args)`
#[derive(Debug, Clone)]
enum Postfix {
    Attr(String),
    Index(Expr),
    Call(Vec<Expr>),
}

/// Lex `$input`, run `$parser` over the whole token stream
macro_rules! run_parser {
    ($input:expr, $parser:expr) => {{
        let input: &str = $input;
        let len = input.len();
        let tokens: Vec<(Token, SimpleSpan)> = lex(input)
            .map_err(|(message, span)| ExprError::new(message, span))?
            .into_iter()
            .map(|(tok, span)| (tok, SimpleSpan::from(span)))
            .collect();

        let token_stream = Stream::from_iter(tokens)
            .map(SimpleSpan::from(len..len), |(t, s): (Token, SimpleSpan)| (t, s));

        typed_parse($parser.then_ignore(end()), token_stream)
            .into_result()
            .map_err(ExprError::from_rich)
    }};
}

/// Pins the parser's error type to `Extra` so inline parsers type-check
fn typed_parse<'a, I, O, P>(parser: P, input: I) -> chumsky::ParseResult<O, Rich<'a, Token>>
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
    P: Parser<'a, I, O, Extra<'a>>,
{
    parser.parse(input)
}

fn expr_parser<'a, I>() -> impl Parser<'a, I, Expr, Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    recursive(|expr| {
        let ident = select! { Token::Ident(s) => s }.labelled("name");

        let literal = select! {
            Token::Int(n) => Value::Int(n),
            Token::Float(x) => Value::Float(x),
            Token::Str(s) => Value::Str(s),
            Token::True => Value::Bool(true),
            Token::False => Value::Bool(false),
            Token::None => Value::None,
        }
        .map(Expr::Literal);

        let items = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>();

        let list = items
            .clone()
            .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
            .map(Expr::List);

        let map = expr
            .clone()
            .then_ignore(just(Token::Colon))
            .then(expr.clone())
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::BraceOpen), just(Token::BraceClose))
            .map(Expr::Map);

        let atom = choice((
            literal,
            ident.clone().map(Expr::Name),
            expr.clone()
                .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
            list,
            map,
        ))
        .boxed();

        let postfix = choice((
            just(Token::Dot).ignore_then(ident).map(Postfix::Attr),
            expr.clone()
                .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
                .map(Postfix::Index),
            items
                .delimited_by(just(Token::ParenOpen), just(Token::ParenClose))
                .map(Postfix::Call),
        ));

        let call = atom
            .foldl(postfix.repeated(), |lhs, op| match op {
                Postfix::Attr(name) => Expr::Attr(Box::new(lhs), name),
                Postfix::Index(index) => Expr::Index(Box::new(lhs), Box::new(index)),
                Postfix::Call(args) => Expr::Call(Box::new(lhs), args),
            })
            .boxed();

        let unary = just(Token::Minus)
            .repeated()
            .foldr(call, |_, rhs| Expr::Neg(Box::new(rhs)))
            .boxed();

        let product_op = choice((
            just(Token::Star).to(BinaryOp::Mul),
            just(Token::SlashSlash).to(BinaryOp::FloorDiv),
            just(Token::Slash).to(BinaryOp::Div),
            just(Token::Percent).to(BinaryOp::Mod),
        ));
        let product = unary
            .clone()
            .foldl(product_op.then(unary).repeated(), |lhs, (op, rhs)| {
                Expr::binary(op, lhs, rhs)
            })
            .boxed();

        let sum_op = choice((
            just(Token::Plus).to(BinaryOp::Add),
            just(Token::Minus).to(BinaryOp::Sub),
        ));
        let sum = product
            .clone()
            .foldl(sum_op.then(product).repeated(), |lhs, (op, rhs)| {
                Expr::binary(op, lhs, rhs)
            })
            .boxed();

        // `not in` and `is not` before their one-token prefixes
        let compare_op = choice((
            just(Token::EqEq).to(BinaryOp::Eq),
            just(Token::NotEq).to(BinaryOp::NotEq),
            just(Token::LessEq).to(BinaryOp::LessEq),
            just(Token::GreaterEq).to(BinaryOp::GreaterEq),
            just(Token::Less).to(BinaryOp::Less),
            just(Token::Greater).to(BinaryOp::Greater),
            just(Token::Not).then(just(Token::In)).to(BinaryOp::NotIn),
            just(Token::In).to(BinaryOp::In),
            just(Token::Is).then(just(Token::Not)).to(BinaryOp::IsNot),
            just(Token::Is).to(BinaryOp::Is),
        ));
        let comparison = sum
            .clone()
            .foldl(compare_op.then(sum).repeated(), |lhs, (op, rhs)| {
                Expr::binary(op, lhs, rhs)
            })
            .boxed();

        let negation = just(Token::Not)
            .repeated()
            .foldr(comparison, |_, rhs| Expr::Not(Box::new(rhs)))
            .boxed();

        let conjunction = negation
            .clone()
            .foldl(
                just(Token::And).ignore_then(negation).repeated(),
                |lhs, rhs| Expr::And(Box::new(lhs), Box::new(rhs)),
            )
            .boxed();

        let disjunction = conjunction
            .clone()
            .foldl(
                just(Token::Or).ignore_then(conjunction).repeated(),
                |lhs, rhs| Expr::Or(Box::new(lhs), Box::new(rhs)),
            )
            .boxed();

        disjunction
            .clone()
            .then(
                just(Token::If)
                    .ignore_then(disjunction)
                    .then_ignore(just(Token::Else))
                    .then(expr)
                    .or_not(),
            )
            .map(|(then, branch)| match branch {
                Some((cond, otherwise)) => Expr::Cond {
                    cond: Box::new(cond),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                },
                None => then,
            })
    })
}

/// `a`, `a, b` or `(a, b)`
fn targets_parser<'a, I>() -> impl Parser<'a, I, Vec<String>, Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let names = select! { Token::Ident(s) => s }
        .labelled("name")
        .separated_by(just(Token::Comma))
        .at_least(1)
        .allow_trailing()
        .collect::<Vec<_>>();

    choice((
        names
            .clone()
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
        names,
    ))
}

fn alias_parser<'a, I>() -> impl Parser<'a, I, Option<String>, Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    just(Token::As)
        .ignore_then(select! { Token::Ident(s) => s }.labelled("name"))
        .or_not()
}

pub fn parse_expr(input: &str) -> Result<Expr, ExprError> {
    run_parser!(input, expr_parser())
}

/// Targets of a `let` statement
pub fn parse_targets(input: &str) -> Result<Vec<String>, ExprError> {
    run_parser!(input, targets_parser())
}

/// Names of a `global` or `nonlocal` statement
pub fn parse_names(input: &str) -> Result<Vec<String>, ExprError> {
    run_parser!(
        input,
        select! { Token::Ident(s) => s }
            .labelled("name")
            .separated_by(just(Token::Comma))
            .at_least(1)
            .collect::<Vec<_>>()
    )
}

pub fn parse_for_head(input: &str) -> Result<ForHead, ExprError> {
    run_parser!(
        input,
        targets_parser()
            .then_ignore(just(Token::In))
            .then(expr_parser())
            .map(|(targets, iter)| ForHead { targets, iter })
    )
}

pub fn parse_with_head(input: &str) -> Result<WithHead, ExprError> {
    run_parser!(
        input,
        expr_parser()
            .then(alias_parser())
            .map(|(expr, alias)| WithHead { expr, alias })
    )
}

pub fn parse_except_head(input: &str) -> Result<ExceptHead, ExprError> {
    run_parser!(
        input,
        select! { Token::Ident(s) => s }
            .labelled("exception name")
            .then(alias_parser())
            .or_not()
            .map(|head| match head {
                Some((kind, alias)) => ExceptHead {
                    kind: Some(kind),
                    alias,
                },
                None => ExceptHead::default(),
            })
    )
}

pub fn parse_import_head(input: &str) -> Result<ImportHead, ExprError> {
    run_parser!(
        input,
        select! { Token::Ident(s) => s }
            .labelled("module name")
            .then(alias_parser())
            .map(|(module, alias)| ImportHead { module, alias })
    )
}

pub fn parse_from_head(input: &str) -> Result<FromHead, ExprError> {
    let ident = select! { Token::Ident(s) => s }.labelled("name");
    run_parser!(
        input,
        ident
            .clone()
            .then_ignore(just(Token::Import))
            .then(
                ident
                    .then(alias_parser())
                    .separated_by(just(Token::Comma))
                    .at_least(1)
                    .collect::<Vec<_>>(),
            )
            .map(|(module, names)| FromHead { module, names })
    )
}

pub fn parse_raise_head(input: &str) -> Result<RaiseHead, ExprError> {
    run_parser!(
        input,
        select! { Token::Ident(s) => s }
            .labelled("exception name")
            .then(
                expr_parser()
                    .or_not()
                    .delimited_by(just(Token::ParenOpen), just(Token::ParenClose))
                    .or_not(),
            )
            .map(|(kind, message)| RaiseHead {
                kind,
                message: message.flatten(),
            })
    )
}

pub fn parse_assert_head(input: &str) -> Result<AssertHead, ExprError> {
    run_parser!(
        input,
        expr_parser()
            .then(just(Token::Comma).ignore_then(expr_parser()).or_not())
            .map(|(test, message)| AssertHead { test, message })
    )
}
