use miette::Diagnostic;
use ooze_ast::{Span, SrcId};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("parse error: {message}")]
#[diagnostic(code(ooze::parse))]
pub struct ParseError {
    pub message: String,
    pub src: SrcId,
    #[label]
    pub span: Span,
    pub notes: Vec<String>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, src: SrcId, span: Span) -> Self {
        Self {
            message: message.into(),
            src,
            span,
            notes: Vec::new(),
        }
    }
}
