use logos::Logos;
use miette::Diagnostic;
use ooze_ast::{span_between, Literal, Span};
use thiserror::Error;

use crate::token::{Token, TokenKind};

#[derive(Debug, Error, Diagnostic)]
#[error("lex error: {message}")]
#[diagnostic(code(ooze::lex))]
pub struct LexError {
    pub message: String,
    #[label]
    pub span: Span,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
enum RawToken {
    #[token("fn")]
    KwFn,
    #[token("let")]
    KwLet,
    #[token("select")]
    KwSelect,
    #[token("else")]
    KwElse,
    #[token("true")]
    KwTrue,
    #[token("false")]
    KwFalse,

    #[token("->")]
    Arrow,
    #[token(":")]
    Colon,
    #[token("=")]
    Eq,
    #[token("&")]
    Amp,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token("_", priority = 10)]
    Underscore,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    #[regex(r"[0-9]+\.[0-9]+(f32|f64)?", |lex| parse_float(lex.slice()))]
    Float(Option<Literal>),

    #[regex(r"[0-9]+(i8|i16|i32|i64|u8|u16|u32|u64|f32|f64)?", |lex| parse_int(lex.slice()))]
    Int(Option<Literal>),

    // String literals use single quotes with a strict escape set:
    // \n, \t, \r, \', \\
    #[regex(r"'([^'\\]|\\.)*'", parse_string)]
    String(Option<String>),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

fn split_suffix<'a>(s: &'a str, suffixes: &[&'static str]) -> (&'a str, Option<&'static str>) {
    for suffix in suffixes {
        if let Some(digits) = s.strip_suffix(suffix) {
            return (digits, Some(suffix));
        }
    }
    (s, None)
}

fn parse_int(s: &str) -> Option<Literal> {
    let (digits, suffix) = split_suffix(
        s,
        &["i8", "i16", "i32", "i64", "u8", "u16", "u32", "u64", "f32", "f64"],
    );
    Some(match suffix {
        Some("i8") => Literal::I8(digits.parse().ok()?),
        Some("i16") => Literal::I16(digits.parse().ok()?),
        Some("i64") => Literal::I64(digits.parse().ok()?),
        Some("u8") => Literal::U8(digits.parse().ok()?),
        Some("u16") => Literal::U16(digits.parse().ok()?),
        Some("u32") => Literal::U32(digits.parse().ok()?),
        Some("u64") => Literal::U64(digits.parse().ok()?),
        Some("f32") => Literal::F32(digits.parse().ok()?),
        Some("f64") => Literal::F64(digits.parse().ok()?),
        // Unsuffixed integer literals default to i32.
        Some("i32") | None => Literal::I32(digits.parse().ok()?),
        Some(_) => return None,
    })
}

fn parse_float(s: &str) -> Option<Literal> {
    let (digits, suffix) = split_suffix(s, &["f32", "f64"]);
    Some(match suffix {
        Some("f32") => Literal::F32(digits.parse().ok()?),
        // Unsuffixed float literals default to f64.
        Some("f64") | None => Literal::F64(digits.parse().ok()?),
        Some(_) => return None,
    })
}

fn parse_string(lex: &mut logos::Lexer<RawToken>) -> Option<String> {
    let s = lex.slice();
    let inner = &s[1..s.len().saturating_sub(1)];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '\'' => out.push('\''),
            '\\' => out.push('\\'),
            _ => return None,
        }
    }

    Some(out)
}

pub struct Lexer<'a> {
    src: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src }
    }

    pub fn lex(&self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        let mut lex = RawToken::lexer(self.src);

        while let Some(raw) = lex.next() {
            let span = span_between(lex.span().start, lex.span().end);
            let kind = match raw {
                Ok(RawToken::KwFn) => TokenKind::KwFn,
                Ok(RawToken::KwLet) => TokenKind::KwLet,
                Ok(RawToken::KwSelect) => TokenKind::KwSelect,
                Ok(RawToken::KwElse) => TokenKind::KwElse,
                Ok(RawToken::KwTrue) => TokenKind::Literal(Literal::Bool(true)),
                Ok(RawToken::KwFalse) => TokenKind::Literal(Literal::Bool(false)),

                Ok(RawToken::Arrow) => TokenKind::Arrow,
                Ok(RawToken::Colon) => TokenKind::Colon,
                Ok(RawToken::Eq) => TokenKind::Eq,
                Ok(RawToken::Amp) => TokenKind::Amp,
                Ok(RawToken::Comma) => TokenKind::Comma,
                Ok(RawToken::Semi) => TokenKind::Semi,
                Ok(RawToken::Underscore) => TokenKind::Underscore,

                Ok(RawToken::LParen) => TokenKind::LParen,
                Ok(RawToken::RParen) => TokenKind::RParen,
                Ok(RawToken::LBrace) => TokenKind::LBrace,
                Ok(RawToken::RBrace) => TokenKind::RBrace,

                Ok(RawToken::Ident(s)) => TokenKind::Ident(s),
                Ok(RawToken::Int(Some(lit))) | Ok(RawToken::Float(Some(lit))) => {
                    TokenKind::Literal(lit)
                }
                Ok(RawToken::Int(None)) | Ok(RawToken::Float(None)) => {
                    return Err(LexError {
                        message: "invalid numeric literal".to_string(),
                        span,
                    });
                }
                Ok(RawToken::String(Some(s))) => TokenKind::Literal(Literal::Str(s)),
                Ok(RawToken::String(None)) => {
                    return Err(LexError {
                        message: "invalid string literal".to_string(),
                        span,
                    });
                }
                Err(_) => {
                    return Err(LexError {
                        message: "unexpected character".to_string(),
                        span,
                    });
                }
            };

            tokens.push(Token { kind, span });
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            span: span_between(self.src.len(), self.src.len()),
        });

        Ok(tokens)
    }
}
