//! Tokenizer for the scripting language.
//!
//! The lexer is a lazy iterator over `Result<Token>`. It produces layout tokens the same way
//! Python does: a `Newline` at the end of every logical line, an `Indent` when a line is
//! indented deeper than the enclosing block and one `Dedent` per block closed. Layout is
//! suspended inside `()`, `[]` and `{}`, and blank or comment-only lines never take part in it.
//!
//! Once the stream has produced `Eof` (or an error) it is exhausted. To scan the same text
//! again, clone the lexer before consuming it or build a new one.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use lazy_static::lazy_static;

use crate::lang::error::{Error, Pos, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    For,
    In,
    Def,
    Return,
    If,
    Else,
    True,
    False,
    None,
}

impl Keyword {
    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::For => "for",
            Keyword::In => "in",
            Keyword::Def => "def",
            Keyword::Return => "return",
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::True => "True",
            Keyword::False => "False",
            Keyword::None => "None",
        }
    }
}

lazy_static! {
    static ref KEYWORDS: HashMap<&'static str, Keyword> = {
        let all = [
            Keyword::For,
            Keyword::In,
            Keyword::Def,
            Keyword::Return,
            Keyword::If,
            Keyword::Else,
            Keyword::True,
            Keyword::False,
            Keyword::None,
        ];

        all.iter().map(|k| (k.as_str(), *k)).collect()
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    DoubleStar,
    EqEq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Assign,
    Comma,
    Colon,
    Semicolon,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Plus => "+",
            Op::Minus => "-",
            Op::Star => "*",
            Op::Slash => "/",
            Op::DoubleSlash => "//",
            Op::Percent => "%",
            Op::DoubleStar => "**",
            Op::EqEq => "==",
            Op::NotEq => "!=",
            Op::Lt => "<",
            Op::Gt => ">",
            Op::LtEq => "<=",
            Op::GtEq => ">=",
            Op::Assign => "=",
            Op::Comma => ",",
            Op::Colon => ":",
            Op::Semicolon => ";",
            Op::Dot => ".",
            Op::LParen => "(",
            Op::RParen => ")",
            Op::LBracket => "[",
            Op::RBracket => "]",
            Op::LBrace => "{",
            Op::RBrace => "}",
        }
    }
}

/// Piece of an interpolated string literal
#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Text(String),
    /// Raw source of a `{...}` span and the position of its first character. The parser
    /// re-lexes and parses it as an expression.
    Expr(String, Pos),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Integer(i64),
    Float(f64),
    Str(String),
    FString(Vec<FStringPart>),
    Ident(String),
    Keyword(Keyword),
    Op(Op),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TokenKind::Integer(i) => write!(f, "number {}", i),
            TokenKind::Float(n) => write!(f, "number {}", n),
            TokenKind::Str(s) => write!(f, "string {:?}", s),
            TokenKind::FString(_) => write!(f, "interpolated string"),
            TokenKind::Ident(name) => write!(f, "identifier '{}'", name),
            TokenKind::Keyword(k) => write!(f, "'{}'", k.as_str()),
            TokenKind::Op(op) => write!(f, "'{}'", op.as_str()),
            TokenKind::Newline => write!(f, "end of line"),
            TokenKind::Indent => write!(f, "indent"),
            TokenKind::Dedent => write!(f, "dedent"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

pub const UNTERMINATED_TRIPLE_QUOTE: &str = "unterminated triple-quoted string";

#[derive(Clone)]
pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    column: usize,
    /// Widths of the open indentation levels, outermost (always 0) first
    indents: Vec<usize>,
    /// Number of unclosed `(`, `[` and `{`
    brackets: usize,
    /// Emit `Newline`/`Indent`/`Dedent`. Off for interpolation fragments.
    layout: bool,
    at_line_start: bool,
    line_has_tokens: bool,
    pending: VecDeque<Token>,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            column: 1,
            indents: vec![0],
            brackets: 0,
            layout: true,
            at_line_start: true,
            line_has_tokens: false,
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Lexer for the expression inside an interpolation span
    ///
    /// Positions continue from `start` so errors point into the enclosing literal.
    pub fn fragment(input: &'a str, start: Pos) -> Self {
        let mut lexer = Self::new(input);
        lexer.line = start.line;
        lexer.column = start.column;
        lexer.layout = false;
        lexer.at_line_start = false;

        lexer
    }

    fn pos(&self) -> Pos {
        Pos::new(self.line, self.column)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    /// Character after the next one
    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }

        Some(c)
    }

    fn push(&mut self, kind: TokenKind, pos: Pos) {
        self.pending.push_back(Token { kind, pos });
    }

    /// Consume leading blanks of a line and return their width
    ///
    /// Tabs advance to the next multiple of 8.
    fn indentation(&mut self) -> usize {
        let mut width = 0;
        loop {
            match self.peek() {
                Some(' ') => width += 1,
                Some('\t') => width = (width / 8 + 1) * 8,
                Some('\x0c') => (),
                _ => return width,
            }
            self.bump();
        }
    }

    fn indent_to(&mut self, width: usize, pos: Pos) -> Result<()> {
        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.push(TokenKind::Indent, pos);
        } else if width < current {
            while width < self.indents.last().copied().unwrap_or(0) {
                self.indents.pop();
                self.push(TokenKind::Dedent, pos);
            }

            if self.indents.last().copied().unwrap_or(0) != width {
                return Err(Error::lex(
                    "unindent does not match any outer indentation level",
                    pos,
                ));
            }
        }

        Ok(())
    }

    /// Skip blanks, comments and `\` line continuations
    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') | Some('\x0c') => {
                    self.bump();
                }
                Some('#') => {
                    while !matches!(self.peek(), Some('\n') | None) {
                        self.bump();
                    }
                }
                Some('\\') => {
                    let pos = self.pos();
                    let next = self.peek_second();
                    if next == Some('\n') || next == Some('\r') {
                        self.bump();
                        if self.peek() == Some('\r') {
                            self.bump();
                        }
                        self.bump();
                    } else {
                        return Err(Error::lex(
                            "unexpected character after line continuation",
                            pos,
                        ));
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn finish(&mut self, pos: Pos) {
        if self.layout && self.line_has_tokens {
            self.line_has_tokens = false;
            self.push(TokenKind::Newline, pos);
        }

        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent, pos);
        }

        self.push(TokenKind::Eof, pos);
    }

    /// Scan until at least one token is pending
    fn advance(&mut self) -> Result<()> {
        loop {
            if self.at_line_start {
                self.at_line_start = false;

                if self.layout && self.brackets == 0 {
                    let width = self.indentation();
                    let pos = self.pos();
                    let blank = matches!(self.peek(), Some('\n') | Some('\r') | Some('#') | None);
                    if !blank {
                        self.indent_to(width, pos)?;
                        if !self.pending.is_empty() {
                            return Ok(());
                        }
                    }
                }
            }

            self.skip_trivia()?;

            let pos = self.pos();
            let c = match self.peek() {
                Some(c) => c,
                None => {
                    self.finish(pos);
                    return Ok(());
                }
            };

            if c == '\n' {
                self.bump();
                self.at_line_start = true;

                if self.layout && self.brackets == 0 && self.line_has_tokens {
                    self.line_has_tokens = false;
                    self.push(TokenKind::Newline, pos);
                    return Ok(());
                }

                continue;
            }

            let kind = self.token(c, pos)?;
            self.line_has_tokens = true;
            self.push(kind, pos);

            return Ok(());
        }
    }

    fn token(&mut self, c: char, pos: Pos) -> Result<TokenKind> {
        if c.is_ascii_digit() || (c == '.' && self.peek_second().map_or(false, |n| n.is_ascii_digit())) {
            return self.number(pos);
        }

        if c.is_alphabetic() || c == '_' {
            let word = self.word();
            if (word == "f" || word == "F") && matches!(self.peek(), Some('"') | Some('\'')) {
                return self.string(pos, true);
            }

            return Ok(match KEYWORDS.get(word.as_str()) {
                Some(k) => TokenKind::Keyword(*k),
                None => TokenKind::Ident(word),
            });
        }

        if c == '"' || c == '\'' {
            return self.string(pos, false);
        }

        self.operator(c, pos).map(TokenKind::Op)
    }

    fn word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }

        word
    }

    fn digits(&mut self, text: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
    }

    fn number(&mut self, pos: Pos) -> Result<TokenKind> {
        let mut text = String::new();
        let mut is_float = false;

        self.digits(&mut text);
        if self.peek() == Some('.') {
            is_float = true;
            text.push('.');
            self.bump();
            self.digits(&mut text);
        }

        if matches!(self.peek(), Some('e') | Some('E')) {
            let mut ahead = self.chars.clone();
            ahead.next();
            let sign = match ahead.peek().copied() {
                Some('+') | Some('-') => ahead.next(),
                _ => None,
            };

            if ahead.peek().map_or(false, |c| c.is_ascii_digit()) {
                is_float = true;
                text.push('e');
                self.bump();
                if let Some(s) = sign {
                    text.push(s);
                    self.bump();
                }
                self.digits(&mut text);
            }
        }

        if is_float {
            if text.starts_with('.') {
                text.insert(0, '0');
            }
            if text.ends_with('.') {
                text.push('0');
            }

            text.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| Error::lex(format!("invalid number literal '{}'", text), pos))
        } else {
            text.parse::<i64>()
                .map(TokenKind::Integer)
                .map_err(|_| Error::lex(format!("integer literal '{}' is too large", text), pos))
        }
    }

    /// Scan a string literal starting at its opening quote
    fn string(&mut self, pos: Pos, interpolated: bool) -> Result<TokenKind> {
        let quote = match self.bump() {
            Some(q) => q,
            None => return Err(Error::lex("unterminated string literal", pos)),
        };

        let mut triple = false;
        if self.peek() == Some(quote) {
            if self.peek_second() == Some(quote) {
                self.bump();
                self.bump();
                triple = true;
            } else {
                self.bump();
                return Ok(if interpolated {
                    TokenKind::FString(Vec::new())
                } else {
                    TokenKind::Str(String::new())
                });
            }
        }

        let unterminated = if triple {
            UNTERMINATED_TRIPLE_QUOTE
        } else {
            "unterminated string literal"
        };

        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            let c = match self.peek() {
                Some(c) => c,
                None => return Err(Error::lex(unterminated, pos)),
            };

            if c == quote {
                self.bump();
                if !triple {
                    break;
                }

                if self.peek() == Some(quote) && self.peek_second() == Some(quote) {
                    self.bump();
                    self.bump();
                    break;
                }

                text.push(c);
                continue;
            }

            if c == '\n' && !triple {
                return Err(Error::lex(unterminated, pos));
            }

            if c == '\\' {
                self.bump();
                match self.bump() {
                    None => return Err(Error::lex(unterminated, pos)),
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('0') => text.push('\0'),
                    Some('\\') => text.push('\\'),
                    Some('\'') => text.push('\''),
                    Some('"') => text.push('"'),
                    Some('\n') => (),
                    Some(other) => {
                        text.push('\\');
                        text.push(other);
                    }
                }
                continue;
            }

            if interpolated && c == '{' {
                self.bump();
                if self.peek() == Some('{') {
                    self.bump();
                    text.push('{');
                } else {
                    if !text.is_empty() {
                        parts.push(FStringPart::Text(std::mem::take(&mut text)));
                    }
                    let (source, start) = self.fragment_source(quote, triple)?;
                    // Surface bad characters now, the parser only re-lexes valid spans
                    Lexer::fragment(&source, start).collect::<Result<Vec<Token>>>()?;
                    parts.push(FStringPart::Expr(source, start));
                }
                continue;
            }

            if interpolated && c == '}' {
                let brace = self.pos();
                self.bump();
                if self.peek() == Some('}') {
                    self.bump();
                    text.push('}');
                    continue;
                }

                return Err(Error::lex(
                    "single '}' is not allowed in an interpolated string",
                    brace,
                ));
            }

            self.bump();
            text.push(c);
        }

        if interpolated {
            if !text.is_empty() {
                parts.push(FStringPart::Text(text));
            }
            Ok(TokenKind::FString(parts))
        } else {
            Ok(TokenKind::Str(text))
        }
    }

    /// Collect the raw source of a `{...}` span, consuming the closing brace
    fn fragment_source(&mut self, quote: char, triple: bool) -> Result<(String, Pos)> {
        let start = self.pos();
        let unterminated = || Error::lex("unterminated '{' in interpolated string", start);

        let mut source = String::new();
        let mut depth = 0usize;
        let mut inner_quote: Option<char> = None;
        loop {
            let c = self.peek().ok_or_else(unterminated)?;

            match inner_quote {
                Some(q) => {
                    if c == q {
                        inner_quote = None;
                    }
                }
                None => match c {
                    '}' if depth == 0 => {
                        self.bump();
                        break;
                    }
                    '(' | '[' | '{' => depth += 1,
                    ')' | ']' | '}' => depth = depth.saturating_sub(1),
                    q if q == quote => return Err(unterminated()),
                    '"' | '\'' => inner_quote = Some(c),
                    _ => (),
                },
            }

            if c == '\n' && !triple {
                return Err(unterminated());
            }

            self.bump();
            source.push(c);
        }

        if source.trim().is_empty() {
            return Err(Error::lex("empty expression in interpolated string", start));
        }

        Ok((source, start))
    }

    fn operator(&mut self, c: char, pos: Pos) -> Result<Op> {
        self.bump();

        let followed_by = |lexer: &mut Self, next: char| {
            if lexer.peek() == Some(next) {
                lexer.bump();
                true
            } else {
                false
            }
        };

        let op = match c {
            '+' => Op::Plus,
            '-' => Op::Minus,
            '*' if followed_by(self, '*') => Op::DoubleStar,
            '*' => Op::Star,
            '/' if followed_by(self, '/') => Op::DoubleSlash,
            '/' => Op::Slash,
            '%' => Op::Percent,
            '=' if followed_by(self, '=') => Op::EqEq,
            '=' => Op::Assign,
            '!' if followed_by(self, '=') => Op::NotEq,
            '<' if followed_by(self, '=') => Op::LtEq,
            '<' => Op::Lt,
            '>' if followed_by(self, '=') => Op::GtEq,
            '>' => Op::Gt,
            ',' => Op::Comma,
            ':' => Op::Colon,
            ';' => Op::Semicolon,
            '.' => Op::Dot,
            '(' => Op::LParen,
            ')' => Op::RParen,
            '[' => Op::LBracket,
            ']' => Op::RBracket,
            '{' => Op::LBrace,
            '}' => Op::RBrace,
            _ => return Err(Error::lex(format!("unrecognized character '{}'", c), pos)),
        };

        match op {
            Op::LParen | Op::LBracket | Op::LBrace => self.brackets += 1,
            Op::RParen | Op::RBracket | Op::RBrace => {
                self.brackets = self.brackets.saturating_sub(1)
            }
            _ => (),
        }

        Ok(op)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(tok) = self.pending.pop_front() {
                if tok.kind == TokenKind::Eof {
                    self.finished = true;
                    self.pending.clear();
                }
                return Some(Ok(tok));
            }

            if self.finished {
                return None;
            }

            if let Err(e) = self.advance() {
                self.finished = true;
                self.pending.clear();
                return Some(Err(e));
            }
        }
    }
}

/// Tokenize all of `input`, stopping at the first error
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    Lexer::new(input).collect()
}

#[cfg(test)]
fn kinds(input: &str) -> Vec<TokenKind> {
    tokenize(input)
        .expect("lex failed")
        .into_iter()
        .map(|t| t.kind)
        .collect()
}

#[test]
fn test_simple_tokens() {
    use TokenKind::*;

    let data = vec![
        (
            "x = 1 + 2.5",
            vec![
                Ident("x".to_string()),
                Op(self::Op::Assign),
                Integer(1),
                Op(self::Op::Plus),
                Float(2.5),
                Newline,
                Eof,
            ],
        ),
        (
            "a // b ** c != d <= e",
            vec![
                Ident("a".to_string()),
                Op(self::Op::DoubleSlash),
                Ident("b".to_string()),
                Op(self::Op::DoubleStar),
                Ident("c".to_string()),
                Op(self::Op::NotEq),
                Ident("d".to_string()),
                Op(self::Op::LtEq),
                Ident("e".to_string()),
                Newline,
                Eof,
            ],
        ),
        (
            "for _i2 in None",
            vec![
                Keyword(self::Keyword::For),
                Ident("_i2".to_string()),
                Keyword(self::Keyword::In),
                Keyword(self::Keyword::None),
                Newline,
                Eof,
            ],
        ),
        ("", vec![Eof]),
        ("# only a comment\n\n   \n", vec![Eof]),
    ];

    for (input, expected) in data {
        assert_eq!(kinds(input), expected, "input: {:?}", input);
    }
}

#[test]
fn test_numbers() {
    let data = vec![
        ("0", TokenKind::Integer(0)),
        ("1234", TokenKind::Integer(1234)),
        ("1.5", TokenKind::Float(1.5)),
        (".5", TokenKind::Float(0.5)),
        ("3.", TokenKind::Float(3.0)),
        ("1e3", TokenKind::Float(1000.0)),
        ("2.5e-3", TokenKind::Float(0.0025)),
    ];

    for (input, expected) in data {
        assert_eq!(kinds(input)[0], expected, "input: {:?}", input);
    }

    let err = tokenize("99999999999999999999").unwrap_err();
    assert_eq!(err.kind, crate::lang::error::ErrorKind::LexError);
}

#[test]
fn test_strings() {
    let data = vec![
        (r#""hello world""#, "hello world"),
        (r#"'single'"#, "single"),
        (r#""tab\tnew\nline""#, "tab\tnew\nline"),
        (r#""quote \" and \\""#, "quote \" and \\"),
        (r#"'it\'s'"#, "it's"),
        (r#""""say "hi" now""""#, "say \"hi\" now"),
        ("'''multi\nline'''", "multi\nline"),
        (r#""""#, ""),
        (r#""❤""#, "❤"),
        (r#""keep \q""#, "keep \\q"),
    ];

    for (input, expected) in data {
        assert_eq!(
            kinds(input)[0],
            TokenKind::Str(expected.to_string()),
            "input: {:?}",
            input
        );
    }
}

#[test]
fn test_interpolated_string() {
    let toks = tokenize(r#"f"{x} squared = {x * x}!""#).expect("lex failed");
    assert_eq!(
        toks[0].kind,
        TokenKind::FString(vec![
            FStringPart::Expr("x".to_string(), Pos::new(1, 4)),
            FStringPart::Text(" squared = ".to_string()),
            FStringPart::Expr("x * x".to_string(), Pos::new(1, 18)),
            FStringPart::Text("!".to_string()),
        ])
    );

    let toks = tokenize("f'{{literal}} {d[\"k\"]}'").expect("lex failed");
    assert_eq!(
        toks[0].kind,
        TokenKind::FString(vec![
            FStringPart::Text("{literal} ".to_string()),
            FStringPart::Expr("d[\"k\"]".to_string(), Pos::new(1, 16)),
        ])
    );

    for input in vec!["f'{x'", "f'x}'", "f'{}'", "f'{x\n}'"] {
        let err = tokenize(input).unwrap_err();
        assert_eq!(err.kind, crate::lang::error::ErrorKind::LexError, "input: {:?}", input);
    }
}

#[test]
fn test_layout() {
    use TokenKind::*;

    let input = "for i in xs:\n    # comment\n\n    print(i)\nx\n";
    assert_eq!(
        kinds(input),
        vec![
            Keyword(self::Keyword::For),
            Ident("i".to_string()),
            Keyword(self::Keyword::In),
            Ident("xs".to_string()),
            Op(self::Op::Colon),
            Newline,
            Indent,
            Ident("print".to_string()),
            Op(self::Op::LParen),
            Ident("i".to_string()),
            Op(self::Op::RParen),
            Newline,
            Dedent,
            Ident("x".to_string()),
            Newline,
            Eof,
        ]
    );

    // Dedents are flushed at the end of input even without a trailing newline
    let input = "def f():\n  if x:\n    y";
    let toks = kinds(input);
    assert_eq!(&toks[toks.len() - 4..], &[Newline, Dedent, Dedent, Eof]);
}

#[test]
fn test_brackets_suspend_layout() {
    use TokenKind::*;

    let input = "xs = [1,\n        2,\n  3]\n";
    assert_eq!(
        kinds(input),
        vec![
            Ident("xs".to_string()),
            Op(self::Op::Assign),
            Op(self::Op::LBracket),
            Integer(1),
            Op(self::Op::Comma),
            Integer(2),
            Op(self::Op::Comma),
            Integer(3),
            Op(self::Op::RBracket),
            Newline,
            Eof,
        ]
    );

    assert_eq!(
        kinds("x = 1 + \\\n    2"),
        vec![
            Ident("x".to_string()),
            Op(self::Op::Assign),
            Integer(1),
            Op(self::Op::Plus),
            Integer(2),
            Newline,
            Eof,
        ]
    );
}

#[test]
fn test_errors() {
    let data = vec![
        ("x = $", Pos::new(1, 5)),
        ("a = 1\nb = 'open", Pos::new(2, 5)),
        ("a = !x", Pos::new(1, 5)),
        ("if x:\n    a\n  b\n", Pos::new(3, 3)),
    ];

    for (input, pos) in data {
        let err = tokenize(input).unwrap_err();
        assert_eq!(err.kind, crate::lang::error::ErrorKind::LexError, "input: {:?}", input);
        assert_eq!(err.pos, Some(pos), "input: {:?}", input);
    }
}

#[test]
fn test_lazy_and_restartable() {
    let mut lexer = Lexer::new("name $");
    let restart = lexer.clone();

    // The bad character is only reached when the stream gets that far
    assert_eq!(
        lexer.next().map(|t| t.map(|t| t.kind)),
        Some(Ok(TokenKind::Ident("name".to_string())))
    );
    assert!(matches!(lexer.next(), Some(Err(_))));
    assert!(lexer.next().is_none());

    let first = restart.map(|t| t.map(|t| t.kind)).next();
    assert_eq!(first, Some(Ok(TokenKind::Ident("name".to_string()))));
}

#[test]
fn test_fragment_positions() {
    let toks: Vec<Token> = Lexer::fragment("a +\n b", Pos::new(4, 10))
        .collect::<Result<_>>()
        .expect("lex failed");

    assert_eq!(toks[0].pos, Pos::new(4, 10));
    assert_eq!(toks[2].pos, Pos::new(5, 2));
    assert_eq!(toks.last().map(|t| &t.kind), Some(&TokenKind::Eof));
    assert!(!toks.iter().any(|t| t.kind == TokenKind::Newline));
}
