//! Error types for all phases.

use std::fmt;

use crate::span::Span;
use thiserror::Error;

/// Lexer errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexerError {
    #[error("Unexpected character '{0}' at {1}")]
    UnexpectedChar(char, Span),

    #[error("Unterminated string at {0}")]
    UnterminatedString(Span),

    #[error("Invalid escape sequence '\\{0}' at {1}")]
    InvalidEscape(char, Span),

    #[error("could not parse {0} as integer at {1}")]
    InvalidNumber(String, Span),
}

impl LexerError {
    pub fn unexpected_char(c: char, span: Span) -> Self {
        Self::UnexpectedChar(c, span)
    }

    pub fn unterminated_string(span: Span) -> Self {
        Self::UnterminatedString(span)
    }

    pub fn invalid_escape(c: char, span: Span) -> Self {
        Self::InvalidEscape(c, span)
    }

    pub fn invalid_number(s: String, span: Span) -> Self {
        Self::InvalidNumber(s, span)
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedChar(_, span) => *span,
            Self::UnterminatedString(span) => *span,
            Self::InvalidEscape(_, span) => *span,
            Self::InvalidNumber(_, span) => *span,
        }
    }
}

/// Parser errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParserError {
    #[error("expected next token to be {expected}, got {found} instead at {span}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("no prefix parse function for {found} found at {span}")]
    NoPrefixParse { found: String, span: Span },

    #[error("{0}")]
    Lexer(#[from] LexerError),
}

impl ParserError {
    pub fn unexpected_token(
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn no_prefix_parse(found: impl Into<String>, span: Span) -> Self {
        Self::NoPrefixParse {
            found: found.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedToken { span, .. } => *span,
            Self::NoPrefixParse { span, .. } => *span,
            Self::Lexer(err) => err.span(),
        }
    }
}

/// Every error collected while parsing one program.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseErrors(pub Vec<ParserError>);

impl ParseErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ParserError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseErrors {}

impl From<LexerError> for ParseErrors {
    fn from(err: LexerError) -> Self {
        Self(vec![err.into()])
    }
}

/// Bytecode compilation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("undefined variable {name} at {span}")]
    UndefinedVariable { name: String, span: Span },

    #[error("too many {what} (limit {limit}) at {span}")]
    LimitExceeded {
        what: &'static str,
        limit: usize,
        span: Span,
    },
}

impl CompileError {
    pub fn undefined_variable(name: impl Into<String>, span: Span) -> Self {
        Self::UndefinedVariable {
            name: name.into(),
            span,
        }
    }

    pub fn limit_exceeded(what: &'static str, limit: usize, span: Span) -> Self {
        Self::LimitExceeded { what, limit, span }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UndefinedVariable { span, .. } => *span,
            Self::LimitExceeded { span, .. } => *span,
        }
    }
}

/// Failure to decode raw instruction bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("opcode {byte} undefined at offset {offset}")]
    UnknownOpcode { byte: u8, offset: usize },

    #[error("{name} truncated at offset {offset}")]
    Truncated { name: &'static str, offset: usize },

    #[error("offset {offset} past end of {len} instruction bytes")]
    OutOfBounds { offset: usize, len: usize },
}

/// Runtime errors raised by the virtual machine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("unsupported types for binary operation: {left} {right}")]
    UnsupportedBinaryTypes {
        left: &'static str,
        right: &'static str,
    },

    #[error("unknown operator: {op} ({left} {right})")]
    UnknownOperator {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("unsupported type for negation: {0}")]
    UnsupportedNegation(&'static str),

    #[error("division by zero")]
    DivisionByZero,

    #[error("index operator not supported: {0}")]
    IndexNotSupported(&'static str),

    #[error("unusable as hash key: {0}")]
    UnusableHashKey(&'static str),

    #[error("calling non-closure and non-builtin: {0}")]
    NotCallable(&'static str),

    #[error("wrong number of arguments: want={want}, got={got}")]
    WrongArity { want: usize, got: usize },

    #[error("not a function: {0}")]
    NotAFunction(&'static str),

    #[error("constant {0} out of range")]
    InvalidConstant(usize),

    #[error("free variable {0} out of range")]
    InvalidFreeIndex(usize),

    #[error("builtin {0} out of range")]
    UnknownBuiltin(usize),

    #[error("stack overflow")]
    StackOverflow,

    #[error("stack underflow")]
    StackUnderflow,

    #[error("frame overflow: call depth exceeds {0}")]
    FrameOverflow(usize),

    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    #[error("{name} truncated at offset {offset}")]
    TruncatedInstruction { name: &'static str, offset: usize },
}

impl RuntimeError {
    pub fn wrong_arity(want: usize, got: usize) -> Self {
        Self::WrongArity { want, got }
    }

    /// Faults caused by corrupt bytecode or exhausted machine limits rather
    /// than by the program's values.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::StackOverflow
                | Self::StackUnderflow
                | Self::FrameOverflow(_)
                | Self::UnknownOpcode(_)
                | Self::TruncatedInstruction { .. }
        )
    }
}

/// A unified error type for all phases.
#[derive(Debug, Error)]
pub enum GotienError {
    #[error("{0}")]
    Parse(#[from] ParseErrors),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LexerError> for GotienError {
    fn from(err: LexerError) -> Self {
        Self::Parse(err.into())
    }
}
