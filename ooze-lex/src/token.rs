use ooze_ast::{Literal, Span};

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // Keywords
    KwFn,
    KwLet,
    KwSelect,
    KwElse,

    // Operators / punctuation
    Arrow,
    Colon,
    Eq,
    Amp,
    Comma,
    Semi,
    Underscore,

    LParen,
    RParen,
    LBrace,
    RBrace,

    // Literals / identifiers
    Ident(String),
    Literal(Literal),

    Eof,
}

impl TokenKind {
    /// Short description used in "expected ..." parse errors.
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::KwFn => "'fn'",
            TokenKind::KwLet => "'let'",
            TokenKind::KwSelect => "'select'",
            TokenKind::KwElse => "'else'",
            TokenKind::Arrow => "'->'",
            TokenKind::Colon => "':'",
            TokenKind::Eq => "'='",
            TokenKind::Amp => "'&'",
            TokenKind::Comma => "','",
            TokenKind::Semi => "';'",
            TokenKind::Underscore => "'_'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::Ident(_) => "identifier",
            TokenKind::Literal(_) => "literal",
            TokenKind::Eof => "end of input",
        }
    }
}
