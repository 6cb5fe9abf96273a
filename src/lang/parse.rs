//! Parser for the scripting language.
//!
//! The grammar is a PEG (https://en.wikipedia.org/wiki/Parsing_expression_grammar) over the
//! tokens produced by `lexer.rs`, built with `pom` combinators. Layout has already been turned
//! into `Newline`/`Indent`/`Dedent` tokens, so blocks look like:
//!
//! ```text
//! suite <- NEWLINE INDENT stmt+ DEDENT
//!        / simple_stmt (';' simple_stmt)* ';'? NEWLINE
//! ```
//!
//! Developer notes:
//!
//! * A PEG is order sensitive. Assignment is tried before the expression statement, otherwise
//!   `x = 1` would parse `x` as an expression and then choke on the `=`.
//!
//! * Operator precedence uses a "precedence ladder": lower precedence rules sit higher up and
//!   call into the higher precedence ones, so `*` gets a chance to bind its operands before `+`
//!   sees them. From lowest to highest: comparison, additive, multiplicative, unary, power,
//!   postfix (calls and indexing), primary.
//!
//! * `pom` backtracks on every failure except `Error::Expect`. Once a rule has seen enough
//!   input to know what it is looking at (a `for` keyword, an opening bracket, a binary
//!   operator) the rest is wrapped in `expect()` so the user gets "expected ')', got end of
//!   line" instead of whatever the last alternative happened to report. The stock `repeat` and
//!   `opt` swallow those errors, hence `many()` and `optional()` below.

use std::collections::HashSet;
use std::rc::Rc;

use log::debug;
use pom::parser::{call, Parser};

use crate::lang::ast::*;
use crate::lang::error::{Error, Pos, Result};
use crate::lang::lexer::{tokenize, FStringPart, Keyword, Lexer, Op, Token, TokenKind};
use crate::lang::stack::ensure_sufficient_stack;

/// Default limit on bracket plus block nesting
pub const DEFAULT_MAX_NESTING: usize = 64;

type P<'a, O> = Parser<'a, Token, O>;

/// Turn any failure into a committed one
fn commit(err: pom::Error, start: usize) -> pom::Error {
    if let pom::Error::Expect { .. } = err {
        return err;
    }

    let (message, position) = match &err {
        pom::Error::Mismatch { message, position }
        | pom::Error::Conversion { message, position }
        | pom::Error::Custom {
            message, position, ..
        } => (message.clone(), *position),
        _ => ("unexpected end of input".to_string(), start),
    };

    pom::Error::Expect {
        message,
        position,
        inner: Box::new(err),
    }
}

/// Committed failure with a message of our own
fn fatal(message: String, position: usize) -> pom::Error {
    pom::Error::Expect {
        message: message.clone(),
        position,
        inner: Box::new(pom::Error::Custom {
            message,
            position,
            inner: None,
        }),
    }
}

fn expect<'a, O: 'a>(parser: P<'a, O>) -> P<'a, O> {
    Parser::new(move |input: &'a [Token], start: usize| {
        parser
            .parse_at(input, start)
            .map_err(|e| commit(e, start))
    })
}

fn many<'a, O: 'a>(parser: P<'a, O>) -> P<'a, Vec<O>> {
    Parser::new(move |input: &'a [Token], start: usize| {
        let mut items = Vec::new();
        let mut pos = start;
        loop {
            match parser.parse_at(input, pos) {
                Ok((item, next)) => {
                    items.push(item);
                    pos = next;
                }
                Err(e @ pom::Error::Expect { .. }) => return Err(e),
                Err(_) => return Ok((items, pos)),
            }
        }
    })
}

fn optional<'a, O: 'a>(parser: P<'a, O>) -> P<'a, Option<O>> {
    Parser::new(
        move |input: &'a [Token], start: usize| match parser.parse_at(input, start) {
            Ok((item, next)) => Ok((Some(item), next)),
            Err(e @ pom::Error::Expect { .. }) => Err(e),
            Err(_) => Ok((None, start)),
        },
    )
}

/// Zero or more `item`s separated by commas, trailing comma allowed
fn comma_list<'a, O: 'a>(item: P<'a, O>) -> P<'a, Vec<O>> {
    Parser::new(move |input: &'a [Token], start: usize| {
        let mut items = Vec::new();
        let mut pos = start;
        loop {
            match item.parse_at(input, pos) {
                Ok((out, next)) => {
                    items.push(out);
                    pos = next;
                }
                Err(e @ pom::Error::Expect { .. }) => return Err(e),
                Err(_) => break,
            }

            match input.get(pos).map(|t| &t.kind) {
                Some(TokenKind::Op(Op::Comma)) => pos += 1,
                _ => break,
            }
        }

        Ok((items, pos))
    })
}

/// Match one token for which `f` returns `Some`
///
/// `what` names the expected token in the mismatch message.
fn token<'a, O, F>(what: String, f: F) -> P<'a, O>
where
    O: 'a,
    F: Fn(&Token) -> Option<O> + 'a,
{
    Parser::new(
        move |input: &'a [Token], start: usize| match input.get(start) {
            Some(tok) => match f(tok) {
                Some(out) => Ok((out, start + 1)),
                None => Err(pom::Error::Mismatch {
                    message: format!("expected {}, got {}", what, tok),
                    position: start,
                }),
            },
            None => Err(pom::Error::Incomplete),
        },
    )
}

/// Always fails, reporting `what` as the expected thing
fn unexpected<'a, O: 'a>(what: &str) -> P<'a, O> {
    token(what.to_string(), |_| None)
}

fn op<'a>(o: Op) -> P<'a, Pos> {
    token(format!("'{}'", o.as_str()), move |t| match t.kind {
        TokenKind::Op(x) if x == o => Some(t.pos),
        _ => None,
    })
}

fn keyword<'a>(k: Keyword) -> P<'a, Pos> {
    token(format!("'{}'", k.as_str()), move |t| match t.kind {
        TokenKind::Keyword(x) if x == k => Some(t.pos),
        _ => None,
    })
}

fn ident<'a>() -> P<'a, (Identifier, Pos)> {
    token("identifier".to_string(), |t| match &t.kind {
        TokenKind::Ident(name) => Some((Identifier(name.clone()), t.pos)),
        _ => None,
    })
}

fn newline<'a>() -> P<'a, ()> {
    token("end of line".to_string(), |t| match t.kind {
        TokenKind::Newline => Some(()),
        _ => None,
    })
}

fn indent<'a>() -> P<'a, ()> {
    token("an indented block".to_string(), |t| match t.kind {
        TokenKind::Indent => Some(()),
        _ => None,
    })
}

fn literal<'a>() -> P<'a, Expression> {
    token("expression".to_string(), |t| {
        let expr = match &t.kind {
            TokenKind::Integer(i) => Expression::Constant(Constant::Integer(*i)),
            TokenKind::Float(n) => Expression::Constant(Constant::Float(*n)),
            TokenKind::Str(s) => Expression::Str(s.clone()),
            TokenKind::Keyword(Keyword::True) => Expression::Constant(Constant::Boolean(true)),
            TokenKind::Keyword(Keyword::False) => Expression::Constant(Constant::Boolean(false)),
            TokenKind::Keyword(Keyword::None) => Expression::Constant(Constant::None),
            _ => return None,
        };

        Some(expr)
    })
}

/// Parse the source of one `{...}` span of an interpolated string
fn parse_fragment(source: &str, pos: Pos) -> Result<Expression> {
    let tokens = Lexer::fragment(source, pos).collect::<Result<Vec<Token>>>()?;
    check_nesting(&tokens, DEFAULT_MAX_NESTING)?;

    let fragment = expr() - end_of_input();
    fragment.parse(&tokens).map_err(|e| translate(e, &tokens))
}

fn interpolated<'a>() -> P<'a, Expression> {
    Parser::new(move |input: &'a [Token], start: usize| {
        let parts = match input.get(start) {
            Some(Token {
                kind: TokenKind::FString(parts),
                ..
            }) => parts,
            Some(tok) => {
                return Err(pom::Error::Mismatch {
                    message: format!("expected interpolated string, got {}", tok),
                    position: start,
                })
            }
            None => return Err(pom::Error::Incomplete),
        };

        let mut fragments = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                FStringPart::Text(text) => fragments.push(Fragment::Text(text.clone())),
                FStringPart::Expr(source, pos) => {
                    let e = parse_fragment(source, *pos).map_err(|e| {
                        fatal(
                            format!("in interpolated expression '{}': {}", source.trim(), e.message),
                            start,
                        )
                    })?;
                    fragments.push(Fragment::Expr(e));
                }
            }
        }

        Ok((Expression::Interpolated(fragments), start + 1))
    })
}

fn end_of_input<'a>() -> P<'a, ()> {
    token("end of input".to_string(), |t| match t.kind {
        TokenKind::Eof => Some(()),
        _ => None,
    })
}

fn primary_expr<'a>() -> P<'a, Expression> {
    let identifier = ident().map(|(i, pos)| Expression::Identifier(i, pos));
    let paren = op(Op::LParen) * expect(call(expr)) - expect(op(Op::RParen));
    let list = (op(Op::LBracket) + comma_list(call(expr)) - expect(op(Op::RBracket)))
        .map(|(pos, items)| Expression::List(items, pos));
    let entry = call(expr) - expect(op(Op::Colon)) + expect(call(expr));
    let map = (op(Op::LBrace) + comma_list(entry) - expect(op(Op::RBrace)))
        .map(|(pos, entries)| Expression::Map(entries, pos));

    literal() | interpolated() | identifier | paren | list | map | unexpected("expression")
}

fn postfix_expr<'a>() -> P<'a, Expression> {
    enum PostfixOp {
        FunctionCall(Vec<Expression>, Pos),
        Index(Expression, Pos),
    }

    let function_call = (op(Op::LParen) + comma_list(call(expr)) - expect(op(Op::RParen)))
        .map(|(pos, args)| PostfixOp::FunctionCall(args, pos));
    let index = (op(Op::LBracket) + expect(call(expr)) - expect(op(Op::RBracket)))
        .map(|(pos, index)| PostfixOp::Index(index, pos));
    let parser = call(primary_expr) + many(function_call | index);

    // NB: postfix operators are left-to-right associative, so fold-left
    parser.map(|(primary, rest)| {
        rest.into_iter().fold(primary, |expr, op| match op {
            PostfixOp::FunctionCall(args, pos) => Expression::Call(Box::new(expr), args, pos),
            PostfixOp::Index(index, pos) => {
                Expression::Index(Box::new(expr), Box::new(index), pos)
            }
        })
    })
}

/// `**` takes a unary expression on its right, which makes it right associative and lets
/// `2 ** -1` through, while `-2 ** 2` still negates the power
fn power_expr<'a>() -> P<'a, Expression> {
    let parser = call(postfix_expr) + optional(op(Op::DoubleStar) + expect(call(unary_expr)));

    parser.map(|(base, exponent)| match exponent {
        Some((pos, exponent)) => {
            Expression::Binary(BinaryOperator::Power, Box::new(base), Box::new(exponent), pos)
        }
        None => base,
    })
}

fn unary_expr<'a>() -> P<'a, Expression> {
    let ops = op(Op::Minus).map(|pos| (UnaryOperator::Minus, pos))
        | op(Op::Plus).map(|pos| (UnaryOperator::Plus, pos));
    let parser = many(ops) + call(power_expr);

    // NB: unary expressions are right-to-left associative, so fold-right
    let parser = parser.map(|(mut ops, expr)| {
        let mut expr = expr;
        while let Some((op, pos)) = ops.pop() {
            expr = Expression::Unary(op, Box::new(expr), pos);
        }

        expr
    });

    // The right operand of `**` comes back here without passing through `expr()`
    Parser::new(move |input: &'a [Token], start: usize| {
        ensure_sufficient_stack(|| parser.parse_at(input, start))
    })
}

fn binop<'a>(o: Op, b: BinaryOperator) -> P<'a, (BinaryOperator, Pos)> {
    op(o).map(move |pos| (b, pos))
}

/// Left fold creates left-to-right associativity, ie:
///     1 - 2 - 3 - 4 => ((1 - 2) - 3) - 4
fn left_fold(lhs: Expression, rest: Vec<((BinaryOperator, Pos), Expression)>) -> Expression {
    rest.into_iter().fold(lhs, |lhs, ((op, pos), rhs)| {
        Expression::Binary(op, Box::new(lhs), Box::new(rhs), pos)
    })
}

fn mult_expr<'a>() -> P<'a, Expression> {
    // NB: `//` is its own token, so there is no ordering hazard with `/`
    let ops = binop(Op::Star, BinaryOperator::Multiply)
        | binop(Op::DoubleSlash, BinaryOperator::FloorDivide)
        | binop(Op::Slash, BinaryOperator::Divide)
        | binop(Op::Percent, BinaryOperator::Modulo);
    let parser = call(unary_expr) + many(ops + expect(call(unary_expr)));

    parser.map(|(lhs, rest)| left_fold(lhs, rest))
}

fn add_expr<'a>() -> P<'a, Expression> {
    let ops = binop(Op::Plus, BinaryOperator::Plus) | binop(Op::Minus, BinaryOperator::Minus);
    let parser = call(mult_expr) + many(ops + expect(call(mult_expr)));

    parser.map(|(lhs, rest)| left_fold(lhs, rest))
}

fn comparison_op<'a>() -> P<'a, (BinaryOperator, Pos)> {
    binop(Op::EqEq, BinaryOperator::Equals)
        | binop(Op::NotEq, BinaryOperator::NotEquals)
        | binop(Op::LtEq, BinaryOperator::LessThanEquals)
        | binop(Op::Lt, BinaryOperator::LessThan)
        | binop(Op::GtEq, BinaryOperator::GreaterThanEquals)
        | binop(Op::Gt, BinaryOperator::GreaterThan)
}

/// NB: comparisons cannot be chained (eg `1 < 2 < 3`)
fn comparison_expr<'a>() -> P<'a, Expression> {
    let parser = call(add_expr) + optional(comparison_op() + expect(call(add_expr)));
    let chained = comparison_op();
    let no_chain = Parser::new(move |input: &'a [Token], start: usize| {
        match chained.parse_at(input, start) {
            Ok(_) => Err(fatal(
                "comparison operators cannot be chained".to_string(),
                start,
            )),
            Err(_) => Ok(((), start)),
        }
    });

    let parser = parser.map(|(lhs, rhs)| match rhs {
        Some(((op, pos), rhs)) => Expression::Binary(op, Box::new(lhs), Box::new(rhs), pos),
        None => lhs,
    });

    parser - no_chain
}

/// Parse an expression
///
/// Nested expressions re-enter here, so this is where the native stack gets topped up.
fn expr<'a>() -> P<'a, Expression> {
    let parser = comparison_expr();
    Parser::new(move |input: &'a [Token], start: usize| {
        ensure_sufficient_stack(|| parser.parse_at(input, start))
    })
}

fn assign_stmt<'a>() -> P<'a, Statement> {
    let assignment = ident() - op(Op::Assign) + expect(call(expr));
    assignment.map(|((name, _), value)| Statement::Assign(name, value))
}

fn index_assign_stmt<'a>() -> P<'a, Statement> {
    let target = call(postfix_expr).convert(|e| match e {
        Expression::Index(container, index, pos) => Ok((*container, *index, pos)),
        _ => Err("not an index expression"),
    });
    let assignment = target - op(Op::Assign) + expect(call(expr));

    assignment.map(|((container, index, pos), value)| {
        Statement::AssignIndex(container, index, value, pos)
    })
}

fn return_stmt<'a>() -> P<'a, Statement> {
    (keyword(Keyword::Return) + optional(call(expr))).map(|(pos, e)| Statement::Return(e, pos))
}

fn expr_stmt<'a>() -> P<'a, Statement> {
    call(expr).map(Statement::ExpressionStatement)
}

fn simple_stmt<'a>() -> P<'a, Statement> {
    assign_stmt() | index_assign_stmt() | return_stmt() | expr_stmt()
}

/// One line of `;` separated simple statements, including the end of line
fn simple_stmts<'a>() -> P<'a, Block> {
    let more = op(Op::Semicolon) * call(simple_stmt);
    let line = call(simple_stmt) + many(more) - optional(op(Op::Semicolon)) - expect(newline());

    line.map(|(first, rest)| {
        let mut stmts = vec![first];
        stmts.extend(rest);
        stmts
    })
}

/// Statements up to and including the `Dedent` that closes the block
fn block_body<'a>() -> P<'a, Block> {
    let stmt = stmt();
    Parser::new(move |input: &'a [Token], start: usize| {
        let mut body = Vec::new();
        let mut pos = start;
        loop {
            match input.get(pos).map(|t| &t.kind) {
                Some(TokenKind::Dedent) => return Ok((body, pos + 1)),
                Some(TokenKind::Indent) => return Err(fatal("unexpected indent".to_string(), pos)),
                Some(TokenKind::Eof) | None => {
                    return Err(fatal("unexpected end of input".to_string(), pos))
                }
                _ => (),
            }

            let (stmts, next) = stmt.parse_at(input, pos).map_err(|e| commit(e, pos))?;
            body.extend(stmts);
            pos = next;
        }
    })
}

fn suite<'a>() -> P<'a, Block> {
    let block = newline() * expect(indent()) * call(block_body);
    block | call(simple_stmts)
}

fn block_stmt<'a>() -> P<'a, Statement> {
    let for_stmt = (keyword(Keyword::For) + expect(ident()) - expect(keyword(Keyword::In))
        + expect(call(expr))
        - expect(op(Op::Colon))
        + expect(call(suite)))
    .map(|(((pos, (var, _)), iterable), body)| BlockStatement::For(var, iterable, body, pos));

    let params = comma_list(ident().map(|(param, _)| param));
    let def_stmt = (keyword(Keyword::Def) + expect(ident()) - expect(op(Op::LParen))
        + params
        - expect(op(Op::RParen))
        - expect(op(Op::Colon))
        + expect(call(suite)))
    .map(|(((pos, (name, _)), params), body)| {
        BlockStatement::FunctionDef(Rc::new(FunctionDef {
            name,
            params,
            body,
            pos,
        }))
    });

    let else_clause =
        keyword(Keyword::Else) * expect(op(Op::Colon)) * expect(call(suite));
    let if_stmt = (keyword(Keyword::If) * expect(call(expr)) - expect(op(Op::Colon))
        + expect(call(suite))
        + optional(else_clause))
    .map(|((cond, true_body), false_body)| {
        BlockStatement::If(cond, true_body, false_body.unwrap_or_default())
    });

    (for_stmt | def_stmt | if_stmt).map(Statement::BlockStatement)
}

/// Parse one statement line: a compound statement or a run of simple statements
fn stmt<'a>() -> P<'a, Block> {
    // NB: keywords must come first otherwise they may be parsed as identifiers
    block_stmt().map(|s| vec![s]) | simple_stmts()
}

fn program<'a>() -> P<'a, Block> {
    let stmt = stmt();
    Parser::new(move |input: &'a [Token], start: usize| {
        let mut program = Vec::new();
        let mut pos = start;
        loop {
            match input.get(pos).map(|t| &t.kind) {
                Some(TokenKind::Eof) | None => return Ok((program, pos + 1)),
                Some(TokenKind::Indent) => return Err(fatal("unexpected indent".to_string(), pos)),
                _ => (),
            }

            let (stmts, next) = stmt.parse_at(input, pos).map_err(|e| commit(e, pos))?;
            program.extend(stmts);
            pos = next;
        }
    })
}

/// Reject inputs nested deeper than `max` before handing them to the recursive parser
/// How many operators may chain inside one bracket level, per unit of nesting depth
const OPERATORS_PER_LEVEL: usize = 16;

/// Whether `kind` can end an operand, making a following `(` or `[` a call or an index
fn ends_operand(kind: &TokenKind) -> bool {
    match kind {
        TokenKind::Integer(_)
        | TokenKind::Float(_)
        | TokenKind::Str(_)
        | TokenKind::FString(_)
        | TokenKind::Ident(_)
        | TokenKind::Keyword(Keyword::True)
        | TokenKind::Keyword(Keyword::False)
        | TokenKind::Keyword(Keyword::None)
        | TokenKind::Op(Op::RParen)
        | TokenKind::Op(Op::RBracket)
        | TokenKind::Op(Op::RBrace) => true,
        _ => false,
    }
}

/// Reject programs whose syntax tree would nest deeper than `max` allows
///
/// Brackets and blocks count one level each and are limited to `max`. Operators are counted
/// separately: every operator, and every call or index, can add a level to the expression
/// tree, so the operators of one expression plus those of every enclosing bracket are
/// limited to `max * OPERATORS_PER_LEVEL`. Both limits are checked on the token stream so a
/// tree that is too deep is never built.
fn check_nesting(tokens: &[Token], max: usize) -> Result<()> {
    let max_operators = max.saturating_mul(OPERATORS_PER_LEVEL);
    let mut blocks = 0usize;
    // Operator count of each enclosing bracket level, innermost last
    let mut enclosing: Vec<usize> = Vec::new();
    let mut enclosing_operators = 0usize;
    let mut operators = 0usize;
    let mut prev: Option<&TokenKind> = None;

    for tok in tokens {
        match &tok.kind {
            TokenKind::Op(Op::LParen) | TokenKind::Op(Op::LBracket) | TokenKind::Op(Op::LBrace) => {
                if prev.map_or(false, ends_operand) {
                    operators += 1;
                }
                enclosing.push(operators);
                enclosing_operators += operators;
                operators = 0;
            }
            TokenKind::Op(Op::RParen) | TokenKind::Op(Op::RBracket) | TokenKind::Op(Op::RBrace) => {
                operators = enclosing.pop().unwrap_or(0);
                enclosing_operators = enclosing_operators.saturating_sub(operators);
            }
            TokenKind::Op(Op::Plus)
            | TokenKind::Op(Op::Minus)
            | TokenKind::Op(Op::Star)
            | TokenKind::Op(Op::Slash)
            | TokenKind::Op(Op::DoubleSlash)
            | TokenKind::Op(Op::Percent)
            | TokenKind::Op(Op::DoubleStar)
            | TokenKind::Op(Op::EqEq)
            | TokenKind::Op(Op::NotEq)
            | TokenKind::Op(Op::Lt)
            | TokenKind::Op(Op::Gt)
            | TokenKind::Op(Op::LtEq)
            | TokenKind::Op(Op::GtEq) => operators += 1,
            TokenKind::Indent => blocks += 1,
            TokenKind::Dedent => blocks = blocks.saturating_sub(1),
            // Anything that separates one expression from the next
            TokenKind::Op(_) | TokenKind::Newline | TokenKind::Keyword(_) => {
                if !ends_operand(&tok.kind) {
                    operators = 0;
                }
            }
            _ => (),
        }
        prev = Some(&tok.kind);

        if enclosing.len() + blocks > max {
            return Err(Error::parse(
                format!("too many nested brackets and blocks (limit is {})", max),
                tok.pos,
            ));
        }

        if enclosing_operators + operators > max_operators {
            return Err(Error::parse(
                format!(
                    "expression is too deeply nested (limit is {} operators)",
                    max_operators
                ),
                tok.pos,
            ));
        }
    }

    Ok(())
}

/// Checks the grammar alone cannot express
fn validate(block: &[Statement], in_function: bool) -> Result<()> {
    for stmt in block {
        match stmt {
            Statement::Return(_, pos) if !in_function => {
                return Err(Error::parse("'return' outside function", *pos));
            }
            Statement::BlockStatement(BlockStatement::For(_, _, body, _)) => {
                validate(body, in_function)?
            }
            Statement::BlockStatement(BlockStatement::If(_, true_body, false_body)) => {
                validate(true_body, in_function)?;
                validate(false_body, in_function)?;
            }
            Statement::BlockStatement(BlockStatement::FunctionDef(def)) => {
                let mut seen = HashSet::new();
                for param in &def.params {
                    if !seen.insert(param) {
                        return Err(Error::parse(
                            format!("duplicate argument '{}' in function definition", param),
                            def.pos,
                        ));
                    }
                }

                validate(&def.body, true)?;
            }
            _ => (),
        }
    }

    Ok(())
}

/// Convert a `pom` failure into a `ParseError` at the offending token
fn translate(err: pom::Error, tokens: &[Token]) -> Error {
    let (message, position) = match err {
        pom::Error::Expect {
            message, position, ..
        }
        | pom::Error::Mismatch { message, position }
        | pom::Error::Conversion { message, position }
        | pom::Error::Custom {
            message, position, ..
        } => (message, position),
        _ => (
            "unexpected end of input".to_string(),
            tokens.len().saturating_sub(1),
        ),
    };

    let pos = tokens
        .get(position)
        .or_else(|| tokens.last())
        .map(|t| t.pos)
        .unwrap_or_default();

    Error::parse(message, pos)
}

pub fn parse(input: &str) -> Result<Block> {
    parse_with_depth(input, DEFAULT_MAX_NESTING)
}

/// Parse a whole program, failing if brackets and blocks nest deeper than `max_nesting`
pub fn parse_with_depth(input: &str, max_nesting: usize) -> Result<Block> {
    let tokens = tokenize(input)?;
    check_nesting(&tokens, max_nesting)?;

    let program = program();
    let block = program.parse(&tokens).map_err(|e| translate(e, &tokens))?;
    validate(&block, false)?;

    debug!(
        "parsed {} tokens into {} top-level statements",
        tokens.len(),
        block.len()
    );

    Ok(block)
}

#[cfg(test)]
fn parse_expr(input: &str) -> Result<String> {
    let tokens = tokenize(input)?;
    let parser = expr() - newline() - end_of_input();
    parser
        .parse(&tokens)
        .map(|e| e.to_string())
        .map_err(|e| translate(e, &tokens))
}

#[cfg(test)]
use crate::lang::error::ErrorKind;

#[test]
fn test_primary_expr() {
    let data = vec![
        ("asdf", "asdf"),
        ("_var1", "_var1"),
        ("42", "42"),
        ("4.5", "4.5"),
        ("True", "True"),
        ("None", "None"),
        ("(False)", "False"),
        (r#"("var3")"#, r#""var3""#),
        ("[1, 'a', [],]", r#"[1, "a", []]"#),
        ("{'k': 1, 2: [3]}", r#"{"k": 1, 2: [3]}"#),
        ("{}", "{}"),
        ("f'{x} squared = {x * x}'", "f\"{x} squared = {(x * x)}\""),
    ];

    for (input, expected) in data {
        assert_eq!(parse_expr(input), Ok(expected.to_string()), "input: {}", input);
    }

    for input in vec!["$var1", "?", "=", "(1", "[1 2]", "{1 2}", "{1: }"] {
        assert!(parse_expr(input).is_err(), "input: {}", input);
    }
}

#[test]
fn test_postfix_expr() {
    let data = vec![
        ("f()", "f()"),
        ("f(1, 2,)", "f(1, 2)"),
        ("xs[0]", "xs[0]"),
        ("xs[-1]", "xs[(-1)]"),
        ("f(1)(2)[3]", "f(1)(2)[3]"),
        ("m['a']['b']", r#"m["a"]["b"]"#),
        ("print(xs[i + 1])", "print(xs[(i + 1)])"),
    ];

    for (input, expected) in data {
        assert_eq!(parse_expr(input), Ok(expected.to_string()), "input: {}", input);
    }
}

#[test]
fn test_arith_expr() {
    let data = vec![
        ("1 + 2 * 3", "(1 + (2 * 3))"),
        ("1 - 2 - 3", "((1 - 2) - 3)"),
        ("(1 + 2) * 3", "((1 + 2) * 3)"),
        ("a // b % c / d", "(((a // b) % c) / d)"),
        ("2 ** 3 ** 2", "(2 ** (3 ** 2))"),
        ("-2 ** 2", "(-(2 ** 2))"),
        ("2 ** -1", "(2 ** (-1))"),
        ("- -x", "(-(-x))"),
        ("+x * -y", "((+x) * (-y))"),
        ("a + b == c * d", "((a + b) == (c * d))"),
        ("x != 'y'", r#"(x != "y")"#),
        ("a <= b", "(a <= b)"),
    ];

    for (input, expected) in data {
        assert_eq!(parse_expr(input), Ok(expected.to_string()), "input: {}", input);
    }
}

#[test]
fn test_expr_errors() {
    let data = vec![
        ("1 +", "expected expression, got end of line", 1, 4),
        ("f(1 2)", "expected ')', got number 2", 1, 5),
        ("1 < 2 < 3", "comparison operators cannot be chained", 1, 7),
        ("[1, 2", "expected ']', got end of line", 1, 6),
    ];

    for (input, message, line, column) in data {
        let err = parse_expr(input).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ParseError, "input: {}", input);
        assert_eq!(err.message, message, "input: {}", input);
        assert_eq!(err.pos, Some(Pos::new(line, column)), "input: {}", input);
    }
}

#[test]
fn test_assign_stmt() {
    let program = parse("x = 1\nxs[0] = x + 1\nm['k'] = [x]\n").expect("parse failed");
    assert_eq!(program.len(), 3);

    match &program[0] {
        Statement::Assign(name, value) => {
            assert_eq!(name, &Identifier("x".to_string()));
            assert_eq!(value.to_string(), "1");
        }
        s => panic!("unexpected statement: {:?}", s),
    }

    match &program[1] {
        Statement::AssignIndex(container, index, value, pos) => {
            assert_eq!(container.to_string(), "xs");
            assert_eq!(index.to_string(), "0");
            assert_eq!(value.to_string(), "(x + 1)");
            assert_eq!(*pos, Pos::new(2, 3));
        }
        s => panic!("unexpected statement: {:?}", s),
    }

    assert!(matches!(program[2], Statement::AssignIndex(..)));

    for input in vec!["x = ", "f(x) = 3", "1 = 2", "x = = 1"] {
        let err = parse(input).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ParseError, "input: {}", input);
    }
}

#[test]
fn test_block_stmt() {
    let input = r#"
def calculate_square(n):
    """Docstring"""
    result = n * n
    return result

for i in range(1, 6):
    print(calculate_square(i))

if x: y = 1
else:
    y = 2
    z = 3
"#;
    let program = parse(input).expect("parse failed");
    assert_eq!(program.len(), 3);

    match &program[0] {
        Statement::BlockStatement(BlockStatement::FunctionDef(def)) => {
            assert_eq!(def.name, Identifier("calculate_square".to_string()));
            assert_eq!(def.params, vec![Identifier("n".to_string())]);
            assert_eq!(def.body.len(), 3);
            assert_eq!(def.pos, Pos::new(2, 1));
            assert!(matches!(def.body[2], Statement::Return(Some(_), _)));
        }
        s => panic!("unexpected statement: {:?}", s),
    }

    match &program[1] {
        Statement::BlockStatement(BlockStatement::For(var, iterable, body, _)) => {
            assert_eq!(var, &Identifier("i".to_string()));
            assert_eq!(iterable.to_string(), "range(1, 6)");
            assert_eq!(body.len(), 1);
        }
        s => panic!("unexpected statement: {:?}", s),
    }

    match &program[2] {
        Statement::BlockStatement(BlockStatement::If(cond, true_body, false_body)) => {
            assert_eq!(cond.to_string(), "x");
            assert_eq!(true_body.len(), 1);
            assert_eq!(false_body.len(), 2);
        }
        s => panic!("unexpected statement: {:?}", s),
    }
}

#[test]
fn test_one_line_suites() {
    let program = parse("for i in xs: a = i; print(a);\nprint('done')").expect("parse failed");
    assert_eq!(program.len(), 2);

    match &program[0] {
        Statement::BlockStatement(BlockStatement::For(_, _, body, _)) => {
            assert_eq!(body.len(), 2)
        }
        s => panic!("unexpected statement: {:?}", s),
    }

    let program = parse("def f(a, b,): return a + b\n").expect("parse failed");
    match &program[0] {
        Statement::BlockStatement(BlockStatement::FunctionDef(def)) => {
            assert_eq!(def.params.len(), 2);
            assert!(matches!(def.body[0], Statement::Return(Some(_), _)));
        }
        s => panic!("unexpected statement: {:?}", s),
    }
}

#[test]
fn test_stmt_errors() {
    let data = vec![
        ("return 1", "'return' outside function", 1, 1),
        ("for i in xs:\n    return\n", "'return' outside function", 2, 5),
        ("for i in xs:\nprint(i)\n", "expected an indented block, got identifier 'print'", 2, 1),
        ("for in xs: pass", "expected identifier, got 'in'", 1, 5),
        ("def f(x, x): return x", "duplicate argument 'x' in function definition", 1, 1),
        ("x = 1\n    y = 2\n", "unexpected indent", 2, 5),
        ("x = 1 2", "expected end of line, got number 2", 1, 7),
        ("if x:\n    y\nelse y", "expected ':', got identifier 'y'", 3, 6),
    ];

    for (input, message, line, column) in data {
        let err = parse(input).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ParseError, "input: {:?}", input);
        assert_eq!(err.message, message, "input: {:?}", input);
        assert_eq!(err.pos, Some(Pos::new(line, column)), "input: {:?}", input);
    }
}

#[test]
fn test_nesting_limit() {
    let deep = format!("x = {}1{}", "(".repeat(10), ")".repeat(10));
    assert!(parse_with_depth(&deep, 10).is_ok());

    let err = parse_with_depth(&deep, 9).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ParseError);
    assert_eq!(err.pos, Some(Pos::new(1, 14)));

    let very_deep = format!("x = {}1{}", "[".repeat(5000), "]".repeat(5000));
    assert_eq!(parse(&very_deep).unwrap_err().kind, ErrorKind::ParseError);
}

#[test]
fn test_operator_chain_limit() {
    let limit = DEFAULT_MAX_NESTING * OPERATORS_PER_LEVEL;
    let data = vec![
        format!("x = {}1", "1 ** ".repeat(5_000)),
        format!("x = {}1", "-".repeat(50_000)),
        format!("x = 1{}", " + 1".repeat(50_000)),
        format!("x = 2{}", " * 2 // 1".repeat(5_000)),
        format!("x = f{}", "(1)".repeat(5_000)),
        format!("x = xs{}", "[0]".repeat(5_000)),
        // Operators outside a bracket still count inside it
        format!("x = {}({}1)", "1 + ".repeat(limit / 2), "1 + ".repeat(limit / 2 + 1)),
    ];

    for input in data {
        let err = parse(&input).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ParseError);
        assert!(
            err.message.starts_with("expression is too deeply nested"),
            "{}",
            err.message
        );
    }

    // Long but bounded chains are fine, and separate expressions do not add up
    let data = vec![
        format!("x = {}1", "2 ** ".repeat(limit / 2)),
        format!("x = {}1", "-".repeat(limit)),
        format!("x = 1{}", " + 1".repeat(limit - 1)),
        format!("xs = [{}]", vec!["1 + 1"; limit].join(", ")),
        format!("x = 1{}\ny = 1{}", " + 1".repeat(limit - 1), " + 1".repeat(limit - 1)),
    ];

    for input in data {
        if let Err(e) = parse(&input) {
            panic!("failed to parse {} bytes: {}", input.len(), e);
        }
    }
}

#[test]
fn test_interpolation_errors() {
    let err = parse("print(f'{1 +}')").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ParseError);
    assert_eq!(err.pos, Some(Pos::new(1, 7)));

    let err = parse("print(f'{x $}')").unwrap_err();
    assert_eq!(err.kind, ErrorKind::LexError);
    assert_eq!(err.pos, Some(Pos::new(1, 12)));
}

#[test]
fn test_whitespace_ignored() {
    let data = vec![
        "x=[1,2]",
        "x = [ 1 , 2 ]",
        "x = [1,\n     2]",
        "x = [1, \\\n 2]",
        "x = [  # first\n  1,\n  2,  # second\n]",
    ];

    for input in data {
        let program = parse(input).expect("parse failed");
        match &program[0] {
            Statement::Assign(_, value) => assert_eq!(value.to_string(), "[1, 2]"),
            s => panic!("unexpected statement: {:?}", s),
        }
    }
}
