use miette::Diagnostic;
use ooze_ast::{Span, SrcId};
use thiserror::Error;

/// Rendered, user-facing errors: one `L:C error: msg` entry per problem,
/// with source excerpt and notes attached.
#[derive(Debug, Error, Diagnostic)]
#[error("{}", .lines.join("\n"))]
#[diagnostic(code(ooze::run))]
pub struct Errors {
    pub lines: Vec<String>,
}

pub(crate) struct Contextual {
    pub message: String,
    pub src: SrcId,
    pub span: Span,
    pub notes: Vec<String>,
}

impl From<ooze_parse::ParseError> for Contextual {
    fn from(e: ooze_parse::ParseError) -> Self {
        Self {
            message: e.message,
            src: e.src,
            span: e.span,
            notes: e.notes,
        }
    }
}

impl From<ooze_core::SemanticError> for Contextual {
    fn from(e: ooze_core::SemanticError) -> Self {
        Self {
            message: e.message,
            src: e.src,
            span: e.span,
            notes: e.notes,
        }
    }
}

/// Render structured errors against their sources: the position line, the
/// offending source line, a caret marker, then any notes.
pub(crate) fn contextualize(srcs: &[&str], errors: Vec<Contextual>) -> Errors {
    let mut lines = Vec::new();
    for err in errors {
        let text = srcs.get(err.src.0 as usize).copied().unwrap_or("");
        let offset = err.span.offset().min(text.len());
        let line_start = text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_no = text[..offset].matches('\n').count() + 1;
        let col = offset - line_start;
        let line_text = text[line_start..]
            .split('\n')
            .next()
            .unwrap_or("")
            .trim_end_matches('\r');

        lines.push(format!("{line_no}:{col} error: {}", err.message));
        lines.push(format!(" | {line_text}"));

        let len = err.span.len().max(1);
        let avail = line_text.len().saturating_sub(col).max(1);
        let marker: String = std::iter::once('^')
            .chain(std::iter::repeat('~').take(len.min(avail) - 1))
            .collect();
        lines.push(format!(" | {}{marker}", " ".repeat(col)));

        lines.extend(err.notes);
    }
    Errors { lines }
}

pub(crate) fn simple_error(message: impl Into<String>) -> Errors {
    Errors {
        lines: vec![message.into()],
    }
}
