use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::Result;
use rustyline::{Completer, Helper, Highlighter, Hinter};

use minipy::lang::lexer::{Lexer, Op, TokenKind, UNTERMINATED_TRIPLE_QUOTE};

/// Helper that extends editor
///
/// Currently only implements `Validator` trait to trigger multiline editing while a statement
/// is obviously unfinished. See `needs_more_input`.
#[derive(Completer, Helper, Highlighter, Hinter)]
pub struct ReplHelper {}

impl ReplHelper {
    pub fn new() -> Self {
        ReplHelper {}
    }
}

impl Validator for ReplHelper {
    fn validate(&self, ctx: &mut ValidationContext) -> Result<ValidationResult> {
        if needs_more_input(ctx.input()) {
            Ok(ValidationResult::Incomplete)
        } else {
            Ok(ValidationResult::Valid(None))
        }
    }
}

/// Whether the editor should keep reading lines before handing `input` to the runtime
///
/// True when the input ends with a `\`, leaves a bracket or a triple-quoted string open, or
/// has opened a block (`for x in xs:` and friends) that has not been closed by an empty line.
/// Anything else, including input that fails to lex, is handed over as is so the runtime can
/// report the error.
pub fn needs_more_input(input: &str) -> bool {
    if input.ends_with('\\') {
        return true;
    }

    let mut depth = 0usize;
    let mut opens_block = false;
    let mut prev_colon = false;

    for tok in Lexer::new(input) {
        let tok = match tok {
            Ok(t) => t,
            Err(e) => return e.message == UNTERMINATED_TRIPLE_QUOTE,
        };

        match tok.kind {
            TokenKind::Op(Op::LParen) | TokenKind::Op(Op::LBracket) | TokenKind::Op(Op::LBrace) => {
                depth += 1
            }
            TokenKind::Op(Op::RParen) | TokenKind::Op(Op::RBracket) | TokenKind::Op(Op::RBrace) => {
                depth = depth.saturating_sub(1)
            }
            TokenKind::Newline if prev_colon => opens_block = true,
            _ => (),
        }

        prev_colon = tok.kind == TokenKind::Op(Op::Colon);
    }

    if depth > 0 {
        return true;
    }

    // A block is finished by entering an empty line
    let last_line = input.rsplit('\n').next().unwrap_or("");
    opens_block && !last_line.trim().is_empty()
}

#[test]
fn test_needs_more_input() {
    let tests = vec![
        ("print(1)", false),
        ("x = 1 + \\", true),
        ("xs = [1,", true),
        ("m = {'a': (1,", true),
        ("print(1))", false),
        ("s = '''doc", true),
        ("s = '''doc\nmore'''", false),
        ("for i in range(3):", true),
        ("for i in range(3):\n    print(i)", true),
        ("for i in range(3):\n    print(i)\n", false),
        ("for i in range(3): print(i)", false),
        ("def f():\n    return {'a': 1}\n   ", false),
        ("x = 'oops", false),
        ("", false),
    ];

    for (input, expected) in tests {
        assert_eq!(needs_more_input(input), expected, "input: {:?}", input);
    }
}
