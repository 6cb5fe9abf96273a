use std::fs;
use std::path::PathBuf;

use minipy::lang::error::{Error, ErrorKind};
use minipy::lang::runtime::{Config, Runtime};

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("demos")
        .join(name)
}

/// Run a demo script, returning what it printed and how it ended
fn run_demo(name: &str) -> (String, Result<(), Error>) {
    let source = fs::read_to_string(demo(&format!("{}.py", name))).expect("Failed to read script");
    let mut output = Vec::new();
    let res = {
        let mut runtime = Runtime::new(&mut output, Config::default());
        runtime.eval(&source).map(|_| ())
    };

    (String::from_utf8(output).expect("Output not utf-8"), res)
}

fn expected(name: &str) -> String {
    fs::read_to_string(demo(&format!("{}.out", name))).expect("Failed to read expected output")
}

#[test]
fn test_demo_scripts() {
    for name in vec!["test_script", "showcase"] {
        let (output, res) = run_demo(name);
        if let Err(e) = res {
            panic!("{} failed: {}", name, e);
        }
        assert_eq!(output, expected(name), "script: {}", name);
    }
}

#[test]
fn test_demo_error() {
    let (output, res) = run_demo("errors");
    assert_eq!(output, expected("errors"));

    let err = res.expect_err("script should fail");
    assert_eq!(err.kind, ErrorKind::IndexError);
    assert_eq!(err.message, "list index out of range");
    assert_eq!((err.line(), err.column()), (Some(2), Some(14)));
    assert_eq!(
        err.to_string(),
        "IndexError at line 2, column 14: list index out of range"
    );
}
