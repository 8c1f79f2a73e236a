#![forbid(unsafe_code)]

mod error;
mod fmt;
mod parser;

use ooze_ast::{Ast, AstId, SrcId, SrcRef, TypeGraph, TypeRef};
use ooze_lex::Lexer;

pub use error::ParseError;
pub use fmt::{format_node, format_type};
pub use parser::Parser;

/// Pending type-name resolution requests produced by a parse.
pub type TypeRequests = Vec<(TypeRef, SrcRef)>;

fn with_parser(
    ast: &mut Ast,
    tg: &mut TypeGraph,
    src: SrcId,
    text: &str,
    f: impl FnOnce(&mut Parser) -> Result<AstId, ParseError>,
) -> Result<TypeRequests, Vec<ParseError>> {
    let tokens = Lexer::new(text).lex().map_err(|err| {
        vec![ParseError::new(err.message, src, err.span)]
    })?;

    let mut parser = Parser::new(&tokens, src, ast, tg);
    match f(&mut parser) {
        Ok(_) if parser.errors.is_empty() => Ok(parser.type_reqs),
        Ok(_) => Err(parser.errors),
        Err(err) => {
            parser.errors.push(err);
            Err(parser.errors)
        }
    }
}

/// script := { fn }, appended as a `Module` root.
pub fn parse(
    ast: &mut Ast,
    tg: &mut TypeGraph,
    src: SrcId,
    text: &str,
) -> Result<TypeRequests, Vec<ParseError>> {
    with_parser(ast, tg, src, text, |p| Ok(p.module()))
}

/// A single expression, appended as a root.
pub fn parse_expr(
    ast: &mut Ast,
    tg: &mut TypeGraph,
    src: SrcId,
    text: &str,
) -> Result<TypeRequests, Vec<ParseError>> {
    with_parser(ast, tg, src, text, |p| {
        let id = p.expr()?;
        p.expect_eof()?;
        Ok(id)
    })
}

/// A single `fn`, appended as a `RootFn` root.
pub fn parse_function(
    ast: &mut Ast,
    tg: &mut TypeGraph,
    src: SrcId,
    text: &str,
) -> Result<TypeRequests, Vec<ParseError>> {
    with_parser(ast, tg, src, text, |p| {
        let id = p.function()?;
        p.expect_eof()?;
        Ok(id)
    })
}

/// Either an expression or a top-level assignment.
pub fn parse_repl(
    ast: &mut Ast,
    tg: &mut TypeGraph,
    src: SrcId,
    text: &str,
) -> Result<TypeRequests, Vec<ParseError>> {
    with_parser(ast, tg, src, text, |p| p.repl())
}

/// pattern [":" type], appended as a root.
pub fn parse_binding(
    ast: &mut Ast,
    tg: &mut TypeGraph,
    src: SrcId,
    text: &str,
) -> Result<TypeRequests, Vec<ParseError>> {
    with_parser(ast, tg, src, text, |p| p.binding())
}

/// A bare pattern, appended as a root.
pub fn parse_pattern(
    ast: &mut Ast,
    tg: &mut TypeGraph,
    src: SrcId,
    text: &str,
) -> Result<TypeRequests, Vec<ParseError>> {
    with_parser(ast, tg, src, text, |p| {
        let id = p.pattern()?;
        p.expect_eof()?;
        Ok(id)
    })
}

/// A bare type. Returns the type graph node alongside the pending requests.
pub fn parse_type(
    tg: &mut TypeGraph,
    src: SrcId,
    text: &str,
) -> Result<(TypeRef, TypeRequests), Vec<ParseError>> {
    let tokens = Lexer::new(text).lex().map_err(|err| {
        vec![ParseError::new(err.message, src, err.span)]
    })?;

    let mut ast = Ast::default();
    let mut parser = Parser::new(&tokens, src, &mut ast, tg);
    match parser.type_ref().and_then(|t| {
        parser.expect_eof()?;
        Ok(t)
    }) {
        Ok(t) => Ok((t, parser.type_reqs)),
        Err(err) => Err(vec![err]),
    }
}
