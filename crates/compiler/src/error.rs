//! Transpiler error types.
//!
//! A parse aborts on its first error. Every [`ParseError`] carries the
//! 1-based line and column of the offending input so the caller can point
//! at it.

use relic_runtime::ScriptError;

/// What went wrong while reading dialect source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnterminatedComment,
    ParenUnderflow,
    LineEndingError,
    NumberSyntaxError,
    EscapeSignError,
    StringNotTerminated,
    UnexpectedCharacter,
    UnexpectedToken,
    KeywordNotAllowedHere,
    StructuralImbalance,
    SyntaxError,
}

impl ErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::UnterminatedComment => "unterminated comment",
            ErrorKind::ParenUnderflow => "unbalanced ')'",
            ErrorKind::LineEndingError => "bad line ending",
            ErrorKind::NumberSyntaxError => "malformed number",
            ErrorKind::EscapeSignError => "bad escape sequence",
            ErrorKind::StringNotTerminated => "unterminated string",
            ErrorKind::UnexpectedCharacter => "unexpected character",
            ErrorKind::UnexpectedToken => "unexpected token",
            ErrorKind::KeywordNotAllowedHere => "keyword not allowed here",
            ErrorKind::StructuralImbalance => "unbalanced block structure",
            ErrorKind::SyntaxError => "syntax error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ErrorKind,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(kind: ErrorKind, line: usize, column: usize, message: impl Into<String>) -> Self {
        ParseError {
            kind,
            line,
            column,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at line {}, column {}: {}",
            self.kind.label(),
            self.line,
            self.column,
            self.message
        )
    }
}

impl std::error::Error for ParseError {}

/// Any failure between reading a source file and finishing its execution.
#[derive(Debug)]
pub enum RelicError {
    /// The dialect source did not parse.
    Parse(ParseError),
    /// The generated host script failed to compile or run.
    Script(ScriptError),
    /// Reading or writing a file failed.
    Io(String),
    /// The cached artifact could not be encoded or decoded.
    Artifact(String),
}

impl std::fmt::Display for RelicError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelicError::Parse(e) => write!(f, "{}", e),
            RelicError::Script(e) => write!(f, "{}", e),
            RelicError::Io(msg) => write!(f, "I/O error: {}", msg),
            RelicError::Artifact(msg) => write!(f, "artifact error: {}", msg),
        }
    }
}

impl std::error::Error for RelicError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RelicError::Parse(e) => Some(e),
            RelicError::Script(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ParseError> for RelicError {
    fn from(e: ParseError) -> Self {
        RelicError::Parse(e)
    }
}

impl From<ScriptError> for RelicError {
    fn from(e: ScriptError) -> Self {
        RelicError::Script(e)
    }
}

impl From<bincode::Error> for RelicError {
    fn from(e: bincode::Error) -> Self {
        RelicError::Artifact(e.to_string())
    }
}

pub type Result<T, E = ParseError> = std::result::Result<T, E>;
