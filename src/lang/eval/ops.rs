//! Operator semantics for runtime values.
//!
//! Every operator explicitly lists the operand kinds it accepts. Anything else is a TypeError,
//! there is no implicit conversion beyond int to float promotion.

use std::cmp::Ordering;
use std::convert::TryFrom;

use super::value::{Value, MAX_COMPARE_DEPTH};
use crate::lang::ast::{BinaryOperator, UnaryOperator};
use crate::lang::error::{Error, Result};

enum Numbers {
    Ints(i64, i64),
    Floats(f64, f64),
}

/// Promote a pair of numeric operands to a common representation
fn numbers(lhs: &Value, rhs: &Value) -> Option<Numbers> {
    match (lhs, rhs) {
        (Value::Integer(a), Value::Integer(b)) => Some(Numbers::Ints(*a, *b)),
        (Value::Integer(a), Value::Float(b)) => Some(Numbers::Floats(*a as f64, *b)),
        (Value::Float(a), Value::Integer(b)) => Some(Numbers::Floats(*a, *b as f64)),
        (Value::Float(a), Value::Float(b)) => Some(Numbers::Floats(*a, *b)),
        _ => None,
    }
}

fn unsupported(op: BinaryOperator, lhs: &Value, rhs: &Value) -> Error {
    Error::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.as_str(),
        lhs.type_name(),
        rhs.type_name()
    ))
}

fn overflow(op: &str) -> Error {
    Error::overflow(format!("integer result of '{}' does not fit in 64 bits", op))
}

pub fn binary(op: BinaryOperator, lhs: &Value, rhs: &Value) -> Result<Value> {
    match op {
        BinaryOperator::Equals => Ok(Value::Boolean(lhs.equals(rhs)?)),
        BinaryOperator::NotEquals => Ok(Value::Boolean(!lhs.equals(rhs)?)),
        BinaryOperator::LessThan
        | BinaryOperator::LessThanEquals
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterThanEquals => compare(op, lhs, rhs),
        _ => arith(op, lhs, rhs),
    }
}

fn arith(op: BinaryOperator, lhs: &Value, rhs: &Value) -> Result<Value> {
    if let (BinaryOperator::Plus, Value::String(a), Value::String(b)) = (op, lhs, rhs) {
        let mut s = String::with_capacity(a.len() + b.len());
        s.push_str(a);
        s.push_str(b);
        return Ok(Value::String(s));
    }

    match numbers(lhs, rhs) {
        Some(Numbers::Ints(a, b)) => int_arith(op, a, b),
        Some(Numbers::Floats(a, b)) => float_arith(op, a, b),
        None => Err(unsupported(op, lhs, rhs)),
    }
}

fn int_arith(op: BinaryOperator, a: i64, b: i64) -> Result<Value> {
    let result = match op {
        BinaryOperator::Plus => a.checked_add(b),
        BinaryOperator::Minus => a.checked_sub(b),
        BinaryOperator::Multiply => a.checked_mul(b),
        BinaryOperator::Divide => {
            if b == 0 {
                return Err(Error::zero_division("division by zero"));
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinaryOperator::FloorDivide => {
            if b == 0 {
                return Err(Error::zero_division("integer division or modulo by zero"));
            }
            floor_div(a, b)
        }
        BinaryOperator::Modulo => {
            if b == 0 {
                return Err(Error::zero_division("integer modulo by zero"));
            }
            Some(floor_mod(a, b))
        }
        BinaryOperator::Power => return int_pow(a, b),
        _ => {
            return Err(Error::type_error(format!(
                "'{}' is not an arithmetic operator",
                op.as_str()
            )))
        }
    };

    result
        .map(Value::Integer)
        .ok_or_else(|| overflow(op.as_str()))
}

/// Quotient rounded towards negative infinity. `None` on overflow.
pub fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

/// Remainder whose sign follows the divisor, so `a == b * floor_div(a, b) + floor_mod(a, b)`
pub fn floor_mod(a: i64, b: i64) -> i64 {
    // i64::MIN % -1 overflows, but anything modulo -1 is zero
    if b == -1 {
        return 0;
    }

    let r = a % b;
    if r != 0 && ((r < 0) != (b < 0)) {
        r + b
    } else {
        r
    }
}

fn int_pow(base: i64, exp: i64) -> Result<Value> {
    if exp < 0 {
        if base == 0 {
            return Err(Error::zero_division(
                "0.0 cannot be raised to a negative power",
            ));
        }
        return Ok(Value::Float((base as f64).powf(exp as f64)));
    }

    let result = match u32::try_from(exp) {
        Ok(e) => base.checked_pow(e),
        Err(_) => match base {
            0 | 1 => Some(base),
            -1 => Some(if exp % 2 == 0 { 1 } else { -1 }),
            _ => None,
        },
    };

    result.map(Value::Integer).ok_or_else(|| overflow("**"))
}

/// Floor division and modulo of floats, following the sign rules of the integer versions
fn float_divmod(a: f64, b: f64) -> (f64, f64) {
    let mut m = a % b;
    let mut div = (a - m) / b;
    if m != 0.0 {
        if (b < 0.0) != (m < 0.0) {
            m += b;
            div -= 1.0;
        }
    } else {
        m = 0.0f64.copysign(b);
    }

    let floordiv = if div != 0.0 {
        let mut floordiv = div.floor();
        if div - floordiv > 0.5 {
            floordiv += 1.0;
        }
        floordiv
    } else {
        0.0f64.copysign(a / b)
    };

    (floordiv, m)
}

fn float_arith(op: BinaryOperator, a: f64, b: f64) -> Result<Value> {
    let n = match op {
        BinaryOperator::Plus => a + b,
        BinaryOperator::Minus => a - b,
        BinaryOperator::Multiply => a * b,
        BinaryOperator::Divide => {
            if b == 0.0 {
                return Err(Error::zero_division("float division by zero"));
            }
            a / b
        }
        BinaryOperator::FloorDivide => {
            if b == 0.0 {
                return Err(Error::zero_division("float floor division by zero"));
            }
            float_divmod(a, b).0
        }
        BinaryOperator::Modulo => {
            if b == 0.0 {
                return Err(Error::zero_division("float modulo by zero"));
            }
            float_divmod(a, b).1
        }
        BinaryOperator::Power => {
            if a == 0.0 && b < 0.0 {
                return Err(Error::zero_division(
                    "0.0 cannot be raised to a negative power",
                ));
            }
            if a < 0.0 && b.is_finite() && b.fract() != 0.0 {
                return Err(Error::type_error(
                    "negative number cannot be raised to a fractional power",
                ));
            }

            let n = a.powf(b);
            if n.is_infinite() && a.is_finite() && b.is_finite() {
                return Err(Error::overflow("float result of '**' is out of range"));
            }
            n
        }
        _ => {
            return Err(Error::type_error(format!(
                "'{}' is not an arithmetic operator",
                op.as_str()
            )))
        }
    };

    Ok(Value::Float(n))
}

fn compare(op: BinaryOperator, lhs: &Value, rhs: &Value) -> Result<Value> {
    let result = match ordering(op, lhs, rhs, 0)? {
        // NaN is neither smaller, larger nor equal
        None => false,
        Some(o) => match op {
            BinaryOperator::LessThan => o == Ordering::Less,
            BinaryOperator::LessThanEquals => o != Ordering::Greater,
            BinaryOperator::GreaterThan => o == Ordering::Greater,
            BinaryOperator::GreaterThanEquals => o != Ordering::Less,
            _ => false,
        },
    };

    Ok(Value::Boolean(result))
}

/// Order numbers numerically, strings by code point and lists lexicographically
fn ordering(
    op: BinaryOperator,
    lhs: &Value,
    rhs: &Value,
    depth: usize,
) -> Result<Option<Ordering>> {
    if depth > MAX_COMPARE_DEPTH {
        return Err(Error::recursion(
            "maximum recursion depth exceeded in comparison",
        ));
    }

    match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => Ok(Some(a.cmp(b))),
        (Value::List(a), Value::List(b)) => {
            let a = a.borrow();
            let b = b.borrow();
            for (x, y) in a.iter().zip(b.iter()) {
                if !x.equals(y)? {
                    return ordering(op, x, y, depth + 1);
                }
            }

            Ok(Some(a.len().cmp(&b.len())))
        }
        _ => match numbers(lhs, rhs) {
            Some(Numbers::Ints(a, b)) => Ok(Some(a.cmp(&b))),
            Some(Numbers::Floats(a, b)) => Ok(a.partial_cmp(&b)),
            None => Err(Error::type_error(format!(
                "'{}' not supported between instances of '{}' and '{}'",
                op.as_str(),
                lhs.type_name(),
                rhs.type_name()
            ))),
        },
    }
}

pub fn unary(op: UnaryOperator, v: &Value) -> Result<Value> {
    match (op, v) {
        (UnaryOperator::Minus, Value::Integer(i)) => i
            .checked_neg()
            .map(Value::Integer)
            .ok_or_else(|| overflow("-")),
        (UnaryOperator::Minus, Value::Float(n)) => Ok(Value::Float(-n)),
        (UnaryOperator::Plus, Value::Integer(_)) | (UnaryOperator::Plus, Value::Float(_)) => {
            Ok(v.clone())
        }
        _ => Err(Error::type_error(format!(
            "bad operand type for unary {}: '{}'",
            op.as_str(),
            v.type_name()
        ))),
    }
}

#[cfg(test)]
use crate::lang::error::ErrorKind;

#[cfg(test)]
fn int(i: i64) -> Value {
    Value::Integer(i)
}

#[cfg(test)]
fn float(n: f64) -> Value {
    Value::Float(n)
}

#[cfg(test)]
fn string(s: &str) -> Value {
    Value::String(s.to_string())
}

#[test]
fn test_arith() {
    use BinaryOperator::*;

    let data = vec![
        (Plus, int(5), int(3), "8"),
        (Plus, int(1), float(0.5), "1.5"),
        (Plus, string("foo"), string("bar"), "foobar"),
        (Minus, float(2.5), int(3), "-0.5"),
        (Multiply, int(5), int(3), "15"),
        (Divide, int(10), int(2), "5.0"),
        (Divide, int(7), int(2), "3.5"),
        (FloorDivide, int(7), int(2), "3"),
        (FloorDivide, int(-7), int(2), "-4"),
        (FloorDivide, int(7), int(-2), "-4"),
        (FloorDivide, float(7.5), int(2), "3.0"),
        (FloorDivide, float(-7.5), int(2), "-4.0"),
        (Modulo, int(-7), int(2), "1"),
        (Modulo, int(7), int(-2), "-1"),
        (Modulo, float(-7.5), int(2), "0.5"),
        (Modulo, int(i64::MIN), int(-1), "0"),
        (Power, int(2), int(10), "1024"),
        (Power, int(2), int(-1), "0.5"),
        (Power, float(2.0), float(0.5), "1.4142135623730951"),
        (Power, int(1), int(i64::MAX), "1"),
        (Power, int(-1), int(i64::MAX), "-1"),
    ];

    for (op, lhs, rhs, expected) in data {
        let result = binary(op, &lhs, &rhs).expect("operation failed");
        assert_eq!(
            result.to_string(),
            expected,
            "{:?} {} {:?}",
            lhs,
            op.as_str(),
            rhs
        );
    }
}

#[test]
fn test_arith_errors() {
    use BinaryOperator::*;

    let data = vec![
        (Plus, string("a"), int(1), ErrorKind::TypeError),
        (Multiply, string("a"), int(3), ErrorKind::TypeError),
        (Minus, string("a"), string("b"), ErrorKind::TypeError),
        (Plus, Value::Boolean(true), int(1), ErrorKind::TypeError),
        (Plus, Value::None, Value::None, ErrorKind::TypeError),
        (Plus, Value::new_list(vec![]), Value::new_list(vec![]), ErrorKind::TypeError),
        (Divide, int(1), int(0), ErrorKind::ZeroDivisionError),
        (FloorDivide, int(1), int(0), ErrorKind::ZeroDivisionError),
        (Modulo, int(1), int(0), ErrorKind::ZeroDivisionError),
        (Divide, float(1.0), float(0.0), ErrorKind::ZeroDivisionError),
        (Modulo, float(1.0), int(0), ErrorKind::ZeroDivisionError),
        (Power, int(0), int(-1), ErrorKind::ZeroDivisionError),
        (Plus, int(i64::MAX), int(1), ErrorKind::OverflowError),
        (Multiply, int(i64::MIN), int(-1), ErrorKind::OverflowError),
        (FloorDivide, int(i64::MIN), int(-1), ErrorKind::OverflowError),
        (Power, int(10), int(100), ErrorKind::OverflowError),
        (LessThan, int(1), string("a"), ErrorKind::TypeError),
        (LessThan, Value::None, Value::None, ErrorKind::TypeError),
    ];

    for (op, lhs, rhs, kind) in data {
        let err = binary(op, &lhs, &rhs).unwrap_err();
        assert_eq!(err.kind, kind, "{:?} {} {:?}", lhs, op.as_str(), rhs);
    }
}

#[test]
fn test_compare() {
    use BinaryOperator::*;

    let list = |items: Vec<i64>| Value::new_list(items.into_iter().map(int).collect());
    let data = vec![
        (LessThan, int(1), int(2), true),
        (LessThan, int(1), float(1.5), true),
        (GreaterThanEquals, float(2.0), int(2), true),
        (LessThan, float(f64::NAN), int(2), false),
        (GreaterThanEquals, float(f64::NAN), int(2), false),
        (LessThan, string("apple"), string("banana"), true),
        (GreaterThan, string("b"), string("abc"), true),
        (LessThan, list(vec![1, 2]), list(vec![1, 3]), true),
        (LessThan, list(vec![1, 2]), list(vec![1, 2, 0]), true),
        (LessThanEquals, list(vec![1, 2]), list(vec![1, 2]), true),
        (Equals, int(1), float(1.0), true),
        (Equals, string("1"), int(1), false),
        (NotEquals, Value::None, Value::Boolean(false), true),
    ];

    for (op, lhs, rhs, expected) in data {
        let result = binary(op, &lhs, &rhs).expect("comparison failed");
        assert!(
            matches!(result, Value::Boolean(b) if b == expected),
            "{:?} {} {:?}",
            lhs,
            op.as_str(),
            rhs
        );
    }
}

#[test]
fn test_unary() {
    assert_eq!(
        unary(UnaryOperator::Minus, &int(5)).map(|v| v.to_string()),
        Ok("-5".to_string())
    );
    assert_eq!(
        unary(UnaryOperator::Plus, &float(1.5)).map(|v| v.to_string()),
        Ok("1.5".to_string())
    );
    assert_eq!(
        unary(UnaryOperator::Minus, &int(i64::MIN)).unwrap_err().kind,
        ErrorKind::OverflowError
    );
    assert_eq!(
        unary(UnaryOperator::Minus, &string("x")).unwrap_err().kind,
        ErrorKind::TypeError
    );
}

#[cfg(test)]
mod proptests {
    use super::{floor_div, floor_mod};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn floor_division_identity(a in any::<i64>(), b in any::<i64>()) {
            prop_assume!(b != 0);
            prop_assume!(!(a == i64::MIN && b == -1));

            let q = floor_div(a, b).expect("quotient overflowed");
            let r = floor_mod(a, b);
            prop_assert_eq!(a as i128, b as i128 * q as i128 + r as i128);
            prop_assert!(r == 0 || (r < 0) == (b < 0));
            prop_assert!((r as i128).abs() < (b as i128).abs());
        }

        #[test]
        fn floor_division_small_operands(a in -1000i64..1000, b in -50i64..50) {
            prop_assume!(b != 0);

            let q = floor_div(a, b).expect("quotient overflowed");
            prop_assert_eq!(q as f64, (a as f64 / b as f64).floor());
        }
    }
}
