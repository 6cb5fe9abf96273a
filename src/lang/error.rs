use std::fmt;

/// Location in source text. Both fields are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

impl Pos {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Default for Pos {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed token
    LexError,
    /// Grammar violation
    ParseError,
    /// Unresolved identifier
    NameError,
    /// Invalid operand or argument types, wrong arity, calling a non-function
    TypeError,
    /// Out of range list access or missing map key
    IndexError,
    /// Division or modulo by zero
    ZeroDivisionError,
    /// Integer arithmetic left the i64 range
    OverflowError,
    /// Call depth limit hit
    RecursionError,
    /// The output sink failed
    IoError,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::LexError => "LexError",
            ErrorKind::ParseError => "ParseError",
            ErrorKind::NameError => "NameError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::IndexError => "IndexError",
            ErrorKind::ZeroDivisionError => "ZeroDivisionError",
            ErrorKind::OverflowError => "OverflowError",
            ErrorKind::RecursionError => "RecursionError",
            ErrorKind::IoError => "IOError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Every failure the engine can surface to its host
///
/// Errors raised deep in the value layer start out without a position. The evaluator stamps
/// the position of the innermost enclosing expression onto them as they unwind (see
/// [`Error::at`]), so by the time the host sees one it points at the offending code.
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub pos: Option<Pos>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
            pos: None,
        }
    }

    pub fn lex<S: Into<String>>(message: S, pos: Pos) -> Self {
        Self::new(ErrorKind::LexError, message).at(pos)
    }

    pub fn parse<S: Into<String>>(message: S, pos: Pos) -> Self {
        Self::new(ErrorKind::ParseError, message).at(pos)
    }

    pub fn name_error<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::NameError, message)
    }

    pub fn type_error<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    pub fn index<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::IndexError, message)
    }

    pub fn zero_division<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::ZeroDivisionError, message)
    }

    pub fn overflow<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::OverflowError, message)
    }

    pub fn recursion<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::RecursionError, message)
    }

    /// Attach `pos` unless a more precise position is already recorded
    pub fn at(mut self, pos: Pos) -> Self {
        if self.pos.is_none() {
            self.pos = Some(pos);
        }

        self
    }

    pub fn line(&self) -> Option<usize> {
        self.pos.map(|p| p.line)
    }

    pub fn column(&self) -> Option<usize> {
        self.pos.map(|p| p.column)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pos {
            Some(pos) => write!(f, "{} at {}: {}", self.kind, pos, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::new(ErrorKind::IoError, e.to_string())
    }
}

#[test]
fn test_first_position_wins() {
    let err = Error::type_error("bad operand")
        .at(Pos::new(3, 7))
        .at(Pos::new(1, 1));

    assert_eq!(err.pos, Some(Pos::new(3, 7)));
    assert_eq!(err.line(), Some(3));
    assert_eq!(err.column(), Some(7));
}

#[test]
fn test_display() {
    let data = vec![
        (
            Error::name_error("name 'x' is not defined").at(Pos::new(2, 5)),
            "NameError at line 2, column 5: name 'x' is not defined",
        ),
        (
            Error::zero_division("division by zero"),
            "ZeroDivisionError: division by zero",
        ),
    ];

    for (err, expected) in data {
        assert_eq!(err.to_string(), expected);
    }
}
