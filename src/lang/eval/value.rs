use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::convert::TryFrom;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use crate::lang::ast::FunctionDef;
use crate::lang::error::{Error, Result};
use crate::lang::functions::Function;
use crate::lang::scope::Scope;
use crate::lang::stack::ensure_sufficient_stack;

/// Collections nested deeper than this cannot be compared
pub const MAX_COMPARE_DEPTH: usize = 1000;

pub type List = Rc<RefCell<ListItems>>;

/// Elements of a list value
#[derive(Default)]
pub struct ListItems(Vec<Value>);

impl Deref for ListItems {
    type Target = Vec<Value>;

    fn deref(&self) -> &Vec<Value> {
        &self.0
    }
}

impl DerefMut for ListItems {
    fn deref_mut(&mut self) -> &mut Vec<Value> {
        &mut self.0
    }
}

impl Drop for ListItems {
    fn drop(&mut self) {
        release(std::mem::take(&mut self.0));
    }
}

/// Drop `pending` along with every list and map only it keeps alive
///
/// Works through a queue instead of recursing, so a list nested a hundred thousand levels
/// deep is freed without touching the native stack.
fn release(mut pending: Vec<Value>) {
    while let Some(val) = pending.pop() {
        match val {
            Value::List(list) => {
                if let Ok(cell) = Rc::try_unwrap(list) {
                    pending.append(&mut cell.into_inner().0);
                }
            }
            Value::Map(map) => {
                if let Ok(cell) = Rc::try_unwrap(map) {
                    pending.extend(cell.into_inner().entries.drain(..).map(|(_, v)| v));
                }
            }
            _ => (),
        }
    }
}

#[derive(Clone)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    /// Shared and mutable: every alias sees updates
    List(List),
    Map(Rc<RefCell<Map>>),
    Function(Rc<Closure>),
    Builtin(Function),
    Range(Range),
    None,
}

/// A user function together with the scope it was defined in
pub struct Closure {
    pub def: Rc<FunctionDef>,
    pub scope: Scope,
}

/// Half-open run of integers with a step of one
///
/// Iterating does not consume the range, every traversal starts again from `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub stop: i64,
}

impl Range {
    pub fn len(&self) -> usize {
        if self.stop > self.start {
            (self.stop as i128 - self.start as i128) as usize
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> std::ops::Range<i64> {
        self.start..self.stop
    }

    /// Element at `index`, counting from the end if negative
    pub fn get(&self, index: i64) -> Option<i64> {
        let index = normalize_index(index, self.len())?;
        Some(self.start + index as i64)
    }
}

/// Resolve a possibly negative index against a sequence of length `len`
pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i128;
    let index = if index < 0 {
        len + index as i128
    } else {
        index as i128
    };

    if index >= 0 && index < len {
        Some(index as usize)
    } else {
        None
    }
}

/// Hashable subset of values usable as map keys
///
/// Floats with an integral value are stored as integers so `m[1]` and `m[1.0]` find the same
/// entry, matching `1 == 1.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Integer(i64),
    /// Bit pattern of a non-integral float
    Float(u64),
    String(String),
    Boolean(bool),
    None,
}

impl TryFrom<&Value> for Key {
    type Error = Error;

    fn try_from(v: &Value) -> Result<Self> {
        Ok(match v {
            Value::Integer(i) => Key::Integer(*i),
            Value::Float(n) => match float_to_int(*n) {
                Some(i) => Key::Integer(i),
                None => Key::Float(n.to_bits()),
            },
            Value::String(s) => Key::String(s.clone()),
            Value::Boolean(b) => Key::Boolean(*b),
            Value::None => Key::None,
            v => {
                return Err(Error::type_error(format!(
                    "unhashable type: '{}'",
                    v.type_name()
                )))
            }
        })
    }
}

impl From<&Key> for Value {
    fn from(k: &Key) -> Self {
        match k {
            Key::Integer(i) => Value::Integer(*i),
            Key::Float(bits) => Value::Float(f64::from_bits(*bits)),
            Key::String(s) => Value::String(s.clone()),
            Key::Boolean(b) => Value::Boolean(*b),
            Key::None => Value::None,
        }
    }
}

/// Exact integer value of `n`, if it has one that fits an i64
pub fn float_to_int(n: f64) -> Option<i64> {
    // i64::MAX is not representable as f64, the bound below is 2^63
    if n.fract() == 0.0 && n >= -9_223_372_036_854_775_808.0 && n < 9_223_372_036_854_775_808.0 {
        Some(n as i64)
    } else {
        None
    }
}

/// Insertion ordered map
///
/// There is no way to delete entries, so the position of a key never changes once inserted.
#[derive(Default)]
pub struct Map {
    entries: Vec<(Key, Value)>,
    index: HashMap<Key, usize>,
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.index.get(key).map(|i| &self.entries[*i].1)
    }

    /// Insert or update. An update keeps the key's original position.
    pub fn insert(&mut self, key: Key, value: Value) {
        match self.index.get(&key) {
            Some(i) => self.entries[*i].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.iter().map(|(k, _)| k)
    }
}

impl Drop for Map {
    fn drop(&mut self) {
        release(self.entries.drain(..).map(|(_, v)| v).collect());
    }
}

impl Value {
    pub fn new_list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(ListItems(items))))
    }

    pub fn new_map(map: Map) -> Self {
        Value::Map(Rc::new(RefCell::new(map)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "str",
            Value::Boolean(_) => "bool",
            Value::List(_) => "list",
            Value::Map(_) => "dict",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function_or_method",
            Value::Range(_) => "range",
            Value::None => "NoneType",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Integer(i) => *i != 0,
            Value::Float(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Boolean(b) => *b,
            Value::List(list) => !list.borrow().is_empty(),
            Value::Map(map) => !map.borrow().is_empty(),
            Value::Range(r) => !r.is_empty(),
            Value::Function(_) | Value::Builtin(_) => true,
            Value::None => false,
        }
    }

    /// Quoted rendering used for collection elements and interactive echo
    pub fn repr(&self) -> Repr<'_> {
        Repr(self)
    }

    /// Structural equality. Ints and floats compare numerically, other kinds only equal
    /// themselves.
    pub fn equals(&self, other: &Value) -> Result<bool> {
        equals(self, other, 0)
    }

    fn write(
        &self,
        f: &mut fmt::Formatter<'_>,
        repr: bool,
        seen: &mut HashSet<usize>,
    ) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(n) => write!(f, "{}", format_float(*n)),
            Value::String(s) if repr => write!(f, "{}", quote(s)),
            Value::String(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::List(list) => {
                let id = Rc::as_ptr(list) as *const () as usize;
                if !seen.insert(id) {
                    return write!(f, "[...]");
                }

                write!(f, "[")?;
                for (i, item) in list.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    ensure_sufficient_stack(|| item.write(f, true, seen))?;
                }
                seen.remove(&id);

                write!(f, "]")
            }
            Value::Map(map) => {
                let id = Rc::as_ptr(map) as *const () as usize;
                if !seen.insert(id) {
                    return write!(f, "{{...}}");
                }

                write!(f, "{{")?;
                for (i, (k, v)) in map.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: ", Value::from(k).repr())?;
                    ensure_sufficient_stack(|| v.write(f, true, seen))?;
                }
                seen.remove(&id);

                write!(f, "}}")
            }
            Value::Function(closure) => write!(f, "<function {}>", closure.def.name),
            Value::Builtin(func) => write!(f, "<built-in function {}>", func),
            Value::Range(r) => write!(f, "range({}, {})", r.start, r.stop),
            Value::None => write!(f, "None"),
        }
    }
}

/// Display string: what `print` and `str()` produce
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f, false, &mut HashSet::new())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f, true, &mut HashSet::new())
    }
}

pub struct Repr<'a>(&'a Value);

impl<'a> fmt::Display for Repr<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.write(f, true, &mut HashSet::new())
    }
}

fn equals(lhs: &Value, rhs: &Value, depth: usize) -> Result<bool> {
    if depth > MAX_COMPARE_DEPTH {
        return Err(Error::recursion(
            "maximum recursion depth exceeded in comparison",
        ));
    }

    let eq = match (lhs, rhs) {
        (Value::Integer(l), Value::Integer(r)) => l == r,
        (Value::Float(l), Value::Float(r)) => l == r,
        (Value::Integer(i), Value::Float(n)) | (Value::Float(n), Value::Integer(i)) => {
            float_to_int(*n) == Some(*i)
        }
        (Value::String(l), Value::String(r)) => l == r,
        (Value::Boolean(l), Value::Boolean(r)) => l == r,
        (Value::None, Value::None) => true,
        (Value::List(l), Value::List(r)) => {
            if Rc::ptr_eq(l, r) {
                return Ok(true);
            }

            let l = l.borrow();
            let r = r.borrow();
            if l.len() != r.len() {
                return Ok(false);
            }

            for (a, b) in l.iter().zip(r.iter()) {
                if !ensure_sufficient_stack(|| equals(a, b, depth + 1))? {
                    return Ok(false);
                }
            }

            true
        }
        (Value::Map(l), Value::Map(r)) => {
            if Rc::ptr_eq(l, r) {
                return Ok(true);
            }

            let l = l.borrow();
            let r = r.borrow();
            if l.len() != r.len() {
                return Ok(false);
            }

            for (k, a) in l.iter() {
                let b = match r.get(k) {
                    Some(b) => b,
                    None => return Ok(false),
                };
                if !ensure_sufficient_stack(|| equals(a, b, depth + 1))? {
                    return Ok(false);
                }
            }

            true
        }
        (Value::Function(l), Value::Function(r)) => Rc::ptr_eq(l, r),
        (Value::Builtin(l), Value::Builtin(r)) => l == r,
        (Value::Range(l), Value::Range(r)) => {
            (l.is_empty() && r.is_empty()) || l == r
        }
        _ => false,
    };

    Ok(eq)
}

/// Render a float the way Python's `repr` does: shortest round-trip digits, fixed notation for
/// exponents in `-4..16`, scientific otherwise, and always a `.0` on integral values
pub fn format_float(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n == 0.0 {
        return if n.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    // `{:e}` yields the shortest round-trip digits, eg. `-1.2345e-7`
    let sci = format!("{:e}", n.abs());
    let (mantissa, exp) = match sci.split_once('e') {
        Some(parts) => parts,
        None => (sci.as_str(), "0"),
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let sign = if n < 0.0 { "-" } else { "" };

    if (-4..16).contains(&exp) {
        let point = exp + 1;
        if point <= 0 {
            format!("{}0.{}{}", sign, "0".repeat((-point) as usize), digits)
        } else if point as usize >= digits.len() {
            format!(
                "{}{}{}.0",
                sign,
                digits,
                "0".repeat(point as usize - digits.len())
            )
        } else {
            let (int, frac) = digits.split_at(point as usize);
            format!("{}{}.{}", sign, int, frac)
        }
    } else {
        let (first, rest) = digits.split_at(1);
        let rest = if rest.is_empty() {
            String::new()
        } else {
            format!(".{}", rest)
        };
        let exp_sign = if exp < 0 { '-' } else { '+' };

        format!("{}{}{}e{}{:02}", sign, first, rest, exp_sign, exp.abs())
    }
}

/// Quote a string with single quotes, switching to double quotes when that avoids escaping
pub fn quote(s: &str) -> String {
    let delim = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(s.len() + 2);
    out.push(delim);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == delim => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32))
            }
            c => out.push(c),
        }
    }
    out.push(delim);

    out
}

#[test]
fn test_format_float() {
    let data = vec![
        (3.0, "3.0"),
        (2.5, "2.5"),
        (-0.5, "-0.5"),
        (0.1 + 0.2, "0.30000000000000004"),
        (0.0001, "0.0001"),
        (0.00001, "1e-05"),
        (1e15, "1000000000000000.0"),
        (1e16, "1e+16"),
        (1.5e300, "1.5e+300"),
        (123456.789, "123456.789"),
        (-0.0, "-0.0"),
        (f64::INFINITY, "inf"),
        (f64::NAN, "nan"),
    ];

    for (input, expected) in data {
        assert_eq!(format_float(input), expected);
    }
}

#[test]
fn test_display_and_repr() {
    let mut map = Map::new();
    map.insert(Key::String("name".to_string()), Value::String("Alice".to_string()));
    map.insert(Key::String("age".to_string()), Value::Integer(30));
    let person = Value::new_map(map);

    let list = Value::new_list(vec![
        Value::Integer(1),
        Value::Float(2.0),
        Value::String("it's".to_string()),
        Value::Boolean(true),
        Value::None,
    ]);

    let data = vec![
        (Value::String("hi\n".to_string()), "hi\n", "'hi\\n'"),
        (Value::Integer(-7), "-7", "-7"),
        (list, "[1, 2.0, \"it's\", True, None]", "[1, 2.0, \"it's\", True, None]"),
        (
            person,
            "{'name': 'Alice', 'age': 30}",
            "{'name': 'Alice', 'age': 30}",
        ),
        (Value::Range(Range { start: 1, stop: 6 }), "range(1, 6)", "range(1, 6)"),
        (Value::Builtin(Function::Print), "<built-in function print>", "<built-in function print>"),
    ];

    for (value, display, repr) in data {
        assert_eq!(value.to_string(), display);
        assert_eq!(value.repr().to_string(), repr);
    }
}

#[test]
fn test_self_reference() {
    let list = Value::new_list(vec![Value::Integer(1)]);
    if let Value::List(inner) = &list {
        inner.borrow_mut().push(list.clone());
    }
    assert_eq!(list.to_string(), "[1, [...]]");

    let map = Value::new_map(Map::new());
    if let Value::Map(inner) = &map {
        inner.borrow_mut().insert(Key::Integer(0), map.clone());
    }
    assert_eq!(map.to_string(), "{0: {...}}");

    // Break the cycles so the test does not leak
    if let Value::List(inner) = &list {
        inner.borrow_mut().clear();
    }
    if let Value::Map(inner) = &map {
        *inner.borrow_mut() = Map::new();
    }
}

#[test]
fn test_equals() {
    let data = vec![
        (Value::Integer(1), Value::Float(1.0), true),
        (Value::Integer(1), Value::Boolean(true), false),
        (Value::Float(0.5), Value::Integer(0), false),
        (Value::String("a".to_string()), Value::String("a".to_string()), true),
        (
            Value::new_list(vec![Value::Integer(1), Value::String("x".to_string())]),
            Value::new_list(vec![Value::Float(1.0), Value::String("x".to_string())]),
            true,
        ),
        (
            Value::new_list(vec![Value::Integer(1)]),
            Value::new_list(vec![Value::Integer(1), Value::Integer(2)]),
            false,
        ),
        (Value::None, Value::Integer(0), false),
        (
            Value::Range(Range { start: 3, stop: 1 }),
            Value::Range(Range { start: 0, stop: 0 }),
            true,
        ),
    ];

    for (lhs, rhs, expected) in data {
        assert_eq!(lhs.equals(&rhs), Ok(expected), "{:?} == {:?}", lhs, rhs);
    }
}

#[test]
fn test_map_keeps_insertion_order() {
    let mut map = Map::new();
    for (k, v) in vec![("b", 1), ("a", 2), ("c", 3)] {
        map.insert(Key::String(k.to_string()), Value::Integer(v));
    }
    map.insert(Key::String("a".to_string()), Value::Integer(20));

    let keys: Vec<String> = map
        .keys()
        .map(|k| Value::from(k).to_string())
        .collect();
    assert_eq!(keys, vec!["b", "a", "c"]);
    assert_eq!(map.len(), 3);
    assert!(matches!(
        map.get(&Key::String("a".to_string())),
        Some(Value::Integer(20))
    ));

    assert_eq!(Key::try_from(&Value::Float(2.0)), Ok(Key::Integer(2)));
    assert!(Key::try_from(&Value::new_list(vec![])).is_err());
}

#[test]
fn test_normalize_index() {
    let data = vec![
        (0, 5, Some(0)),
        (4, 5, Some(4)),
        (5, 5, None),
        (-1, 5, Some(4)),
        (-5, 5, Some(0)),
        (-6, 5, None),
        (i64::MIN, 5, None),
        (0, 0, None),
    ];

    for (index, len, expected) in data {
        assert_eq!(normalize_index(index, len), expected);
    }
}

#[test]
fn test_drop_deep_nesting() {
    let mut list = Value::new_list(vec![]);
    for _ in 0..100_000 {
        list = Value::new_list(vec![list]);
    }
    drop(list);

    let mut map = Value::new_map(Map::new());
    for i in 0..100_000 {
        let mut outer = Map::new();
        outer.insert(Key::Integer(i), map);
        map = Value::new_list(vec![Value::new_map(outer)]);
    }
    drop(map);
}

#[test]
fn test_drop_keeps_shared_items() {
    let shared = Value::new_list(vec![Value::Integer(1), Value::Integer(2)]);
    let outer = Value::new_list(vec![shared.clone(), Value::new_list(vec![shared.clone()])]);
    drop(outer);

    assert_eq!(shared.to_string(), "[1, 2]");
}

#[test]
fn test_display_wide_repeats() {
    // The same list appearing twice side by side is not a cycle
    let inner = Value::new_list(vec![Value::Integer(1)]);
    let outer = Value::new_list(vec![inner.clone(), inner.clone(), inner]);
    assert_eq!(outer.to_string(), "[[1], [1], [1]]");
}
