use miette::Diagnostic;
use ooze_ast::{Span, SrcId, SrcRef};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("semantic error: {message}")]
#[diagnostic(code(ooze::sema))]
pub struct SemanticError {
    pub message: String,
    pub src: SrcId,
    #[label]
    pub span: Span,
    pub notes: Vec<String>,
}

impl SemanticError {
    pub fn new(message: impl Into<String>, at: SrcRef) -> Self {
        Self {
            message: message.into(),
            src: at.src,
            span: at.span,
            notes: Vec::new(),
        }
    }

    pub fn with_notes(message: impl Into<String>, at: SrcRef, notes: Vec<String>) -> Self {
        Self {
            message: message.into(),
            src: at.src,
            span: at.span,
            notes,
        }
    }
}
