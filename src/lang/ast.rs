use std::fmt;
use std::rc::Rc;

use crate::lang::error::Pos;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// `-`
    Minus,
    /// `+`
    Plus,
}

impl UnaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOperator::Minus => "-",
            UnaryOperator::Plus => "+",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `//`
    FloorDivide,
    /// `%`
    Modulo,
    /// `**`
    Power,
    /// `==`
    Equals,
    /// `!=`
    NotEquals,
    /// `<`
    LessThan,
    /// `<=`
    LessThanEquals,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanEquals,
}

impl BinaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::FloorDivide => "//",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Power => "**",
            BinaryOperator::Equals => "==",
            BinaryOperator::NotEquals => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanEquals => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanEquals => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    None,
}

#[derive(Debug, PartialEq, Hash, PartialOrd, Ord, Eq, Clone)]
pub struct Identifier(pub String);

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Piece of an interpolated string
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Text(String),
    Expr(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Constant(Constant),
    Str(String),
    Interpolated(Vec<Fragment>),
    Identifier(Identifier, Pos),
    /// (items, position of the opening bracket)
    List(Vec<Expression>, Pos),
    /// ((key, value) pairs in source order, position of the opening brace)
    Map(Vec<(Expression, Expression)>, Pos),
    Unary(UnaryOperator, Box<Expression>, Pos),
    Binary(BinaryOperator, Box<Expression>, Box<Expression>, Pos),
    /// (function, arguments, position of the opening paren)
    Call(Box<Expression>, Vec<Expression>, Pos),
    /// (container, index, position of the opening bracket)
    Index(Box<Expression>, Box<Expression>, Pos),
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expression]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }

    Ok(())
}

/// Fully parenthesized rendering, mostly useful to check how an expression was grouped
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Constant(Constant::Integer(i)) => write!(f, "{}", i),
            Expression::Constant(Constant::Float(n)) => write!(f, "{:?}", n),
            Expression::Constant(Constant::Boolean(true)) => write!(f, "True"),
            Expression::Constant(Constant::Boolean(false)) => write!(f, "False"),
            Expression::Constant(Constant::None) => write!(f, "None"),
            Expression::Str(s) => write!(f, "{:?}", s),
            Expression::Interpolated(fragments) => {
                write!(f, "f\"")?;
                for fragment in fragments {
                    match fragment {
                        Fragment::Text(t) => write!(f, "{}", t)?,
                        Fragment::Expr(e) => write!(f, "{{{}}}", e)?,
                    }
                }
                write!(f, "\"")
            }
            Expression::Identifier(ident, _) => write!(f, "{}", ident),
            Expression::List(items, _) => {
                write!(f, "[")?;
                write_list(f, items)?;
                write!(f, "]")
            }
            Expression::Map(entries, _) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Expression::Unary(op, e, _) => write!(f, "({}{})", op.as_str(), e),
            Expression::Binary(op, lhs, rhs, _) => {
                write!(f, "({} {} {})", lhs, op.as_str(), rhs)
            }
            Expression::Call(func, args, _) => {
                write!(f, "{}(", func)?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expression::Index(e, index, _) => write!(f, "{}[{}]", e, index),
        }
    }
}

pub type Block = Vec<Statement>;

/// Body and signature of a `def`
///
/// Shared between the AST and every closure created from it.
#[derive(Debug, PartialEq)]
pub struct FunctionDef {
    pub name: Identifier,
    pub params: Vec<Identifier>,
    pub body: Block,
    /// Position of the `def` keyword
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockStatement {
    /// (loop variable, iterable, body, position of `for`)
    For(Identifier, Expression, Block, Pos),
    /// (condition, true_body, false_body)
    If(Expression, Block, Block),
    FunctionDef(Rc<FunctionDef>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assign(Identifier, Expression),
    /// (container, index, value, position of the opening bracket)
    AssignIndex(Expression, Expression, Expression, Pos),
    BlockStatement(BlockStatement),
    Return(Option<Expression>, Pos),
    ExpressionStatement(Expression),
}

#[test]
fn test_display() {
    let p = Pos::default();
    let ident = |s: &str| Expression::Identifier(Identifier(s.to_string()), p);

    let data = vec![
        (
            Expression::Binary(
                BinaryOperator::Plus,
                Box::new(Expression::Constant(Constant::Integer(1))),
                Box::new(Expression::Binary(
                    BinaryOperator::Power,
                    Box::new(ident("x")),
                    Box::new(Expression::Constant(Constant::Float(2.0))),
                    p,
                )),
                p,
            ),
            "(1 + (x ** 2.0))",
        ),
        (
            Expression::Call(
                Box::new(ident("print")),
                vec![
                    Expression::Str("hi".to_string()),
                    Expression::Unary(UnaryOperator::Minus, Box::new(ident("y")), p),
                ],
                p,
            ),
            "print(\"hi\", (-y))",
        ),
        (
            Expression::Interpolated(vec![
                Fragment::Expr(ident("x")),
                Fragment::Text(" is ".to_string()),
                Fragment::Expr(Expression::Index(
                    Box::new(ident("xs")),
                    Box::new(Expression::Constant(Constant::None)),
                    p,
                )),
            ]),
            "f\"{x} is {xs[None]}\"",
        ),
    ];

    for (expr, expected) in data {
        assert_eq!(expr.to_string(), expected);
    }
}
