use std::io::Write;

use log::debug;

use crate::lang::error::Result;
use crate::lang::eval::value::Value;
use crate::lang::eval::{Eval, DEFAULT_MAX_CALL_DEPTH};
use crate::lang::parse::{parse_with_depth, DEFAULT_MAX_NESTING};

/// Knobs for a `Runtime`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Echo the repr of every top-level expression statement that is not `None`
    pub interactive: bool,
    /// Limit on bracket plus block nesting, enforced while parsing
    pub max_nesting_depth: usize,
    /// Limit on nested user function calls
    pub max_call_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interactive: false,
            max_nesting_depth: DEFAULT_MAX_NESTING,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

/// One engine instance
///
/// Owns a single global scope; bindings made by one call to `eval` are visible to the next.
pub struct Runtime<'a> {
    config: Config,
    eval: Eval<'a>,
}

impl<'a> Runtime<'a> {
    /// Create a new `Runtime` instance
    ///
    /// `sink` is where output should be written. eg. result of `print` calls
    pub fn new(sink: &'a mut dyn Write, config: Config) -> Self {
        let eval = Eval::new(sink, config.interactive, config.max_call_depth);

        Self { config, eval }
    }

    /// Run `source` to completion
    ///
    /// Returns the value of the last top-level expression statement. Nothing runs if the
    /// source fails to lex or parse.
    pub fn eval(&mut self, source: &str) -> Result<Value> {
        debug!("run started ({} bytes)", source.len());

        let res = parse_with_depth(source, self.config.max_nesting_depth)
            .and_then(|program| self.eval.eval(&program));

        match &res {
            Ok(val) => debug!("run finished: {}", val.repr()),
            Err(e) => debug!("run failed: {}", e),
        }

        res
    }
}

#[cfg(test)]
use crate::lang::error::ErrorKind;

#[test]
fn test_state_persists() {
    let mut output = Vec::new();
    {
        let mut rt = Runtime::new(&mut output, Config::default());
        rt.eval("def greet(name):\n    return f'Hello, {name}!'\n")
            .expect("Eval failed");
        rt.eval("print(greet('World'))").expect("Eval failed");

        let val = rt.eval("greet('x')").expect("Eval failed");
        assert_eq!(val.to_string(), "Hello, x!");
    }

    assert_eq!(
        String::from_utf8(output).expect("Output not utf-8"),
        "Hello, World!\n"
    );
}

#[test]
fn test_errors() {
    let tests = vec![
        ("x = 'abc", ErrorKind::LexError, (1, 5)),
        ("x = (1 +", ErrorKind::ParseError, (1, 9)),
        ("print(1)\nprint(y)", ErrorKind::NameError, (2, 7)),
        ("[1, 2][5]", ErrorKind::IndexError, (1, 7)),
        ("1 // 0", ErrorKind::ZeroDivisionError, (1, 3)),
    ];

    for (input, kind, (line, column)) in tests {
        let mut output = Vec::new();
        let mut rt = Runtime::new(&mut output, Config::default());
        let err = rt.eval(input).expect_err("Eval succeeded when should have failed");
        assert_eq!(err.kind, kind, "input: {}", input);
        assert_eq!(
            (err.line(), err.column()),
            (Some(line), Some(column)),
            "input: {}",
            input
        );
    }
}

#[test]
fn test_parse_error_runs_nothing() {
    let mut output = Vec::new();
    {
        let mut rt = Runtime::new(&mut output, Config::default());
        assert!(rt.eval("print('before')\nx = = 1\n").is_err());
    }

    assert!(output.is_empty());
}

#[test]
fn test_config_limits() {
    let mut output = Vec::new();
    let config = Config {
        max_nesting_depth: 3,
        max_call_depth: 5,
        ..Config::default()
    };
    let mut rt = Runtime::new(&mut output, config);

    let err = rt.eval("[[[[1]]]]").expect_err("should fail");
    assert_eq!(err.kind, ErrorKind::ParseError);
    rt.eval("[[[1]]]").expect("Eval failed");

    let err = rt
        .eval("def f(n):\n    return f(n)\nf(1)\n")
        .expect_err("should fail");
    assert_eq!(err.kind, ErrorKind::RecursionError);
}

#[test]
fn test_long_operator_chains() {
    let mut output = Vec::new();
    let mut rt = Runtime::new(&mut output, Config::default());

    let tests = vec![
        format!("x = {}1", "1 ** ".repeat(5_000)),
        format!("x = {}1", "-".repeat(50_000)),
        format!("x = 1{}", " + 1".repeat(50_000)),
    ];
    for input in tests {
        let err = rt.eval(&input).expect_err("should fail");
        assert_eq!(err.kind, ErrorKind::ParseError);
    }

    let val = rt.eval(&format!("{}1", "1 ** ".repeat(500))).expect("Eval failed");
    assert!(matches!(val, Value::Integer(1)));

    let val = rt.eval(&format!("0{}", " + 1".repeat(1000))).expect("Eval failed");
    assert!(matches!(val, Value::Integer(1000)));

    let val = rt.eval(&format!("{}7", "-".repeat(1000))).expect("Eval failed");
    assert!(matches!(val, Value::Integer(7)));
}
