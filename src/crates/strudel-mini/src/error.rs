use crate::span::Span;

pub type Result<T> = std::result::Result<T, ParseError>;

/// Reasons a pattern text can be rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("expected {expected}, found '{found}' at {span}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("unexpected end of pattern, expected {expected}")]
    UnexpectedEof { expected: String },

    #[error("unclosed '{delimiter}' opened at {open_span}")]
    UnclosedDelimiter { delimiter: char, open_span: Span },

    #[error("unrecognised input '{text}' at {span}")]
    InvalidToken { text: String, span: Span },

    #[error("invalid number '{value}' at {span}")]
    InvalidNumber { value: String, span: Span },

    #[error("empty {what} at {span}")]
    Empty { what: &'static str, span: Span },
}

impl ParseError {
    pub fn unexpected_token(expected: impl Into<String>, found: impl Into<String>, span: Span) -> Self {
        ParseError::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn unexpected_eof(expected: impl Into<String>) -> Self {
        ParseError::UnexpectedEof {
            expected: expected.into(),
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            ParseError::UnexpectedToken { span, .. } => Some(*span),
            ParseError::UnexpectedEof { .. } => None,
            ParseError::UnclosedDelimiter { open_span, .. } => Some(*open_span),
            ParseError::InvalidToken { span, .. } => Some(*span),
            ParseError::InvalidNumber { span, .. } => Some(*span),
            ParseError::Empty { span, .. } => Some(*span),
        }
    }
}
