#![forbid(unsafe_code)]

use std::collections::HashMap;

use miette::SourceSpan;

mod forest;
mod types;

pub use forest::{AstTag, Forest};
pub use types::{copy_type, copy_type_within, TypeGraph, TypeRef, TypeTag};

pub type Span = SourceSpan;
pub type TypeId = std::any::TypeId;

pub fn span(start: usize, len: usize) -> Span {
    SourceSpan::new(start.into(), len)
}

pub fn span_between(start: usize, end: usize) -> Span {
    debug_assert!(end >= start);
    span(start, end - start)
}

/// Index of a source in the source map. Source 0 is the env string holding
/// injected names; user sources start at 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SrcId(pub u32);

#[derive(Clone, Copy, Debug)]
pub struct SrcRef {
    pub src: SrcId,
    pub span: Span,
}

impl SrcRef {
    pub fn new(src: SrcId, span: Span) -> Self {
        Self { src, span }
    }

    /// A reference for synthesized nodes that have no surface syntax.
    pub fn synthetic() -> Self {
        Self {
            src: SrcId(0),
            span: span(0, 0),
        }
    }

    pub fn text<'a>(&self, srcs: &[&'a str]) -> &'a str {
        let start = self.span.offset();
        let end = start + self.span.len();
        &srcs[self.src.0 as usize][start..end]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AstId(pub u32);

impl AstId {
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
}

/// The parsed program: a flat forest of nodes with parallel side tables for
/// source references, deduced types and literal payloads.
#[derive(Clone, Debug, Default)]
pub struct Ast {
    pub forest: Forest,
    pub srcs: Vec<SrcRef>,
    pub types: Vec<TypeRef>,
    pub literals: HashMap<AstId, Literal>,
}

impl Ast {
    /// Append a node whose children (if any) are currently roots.
    pub fn add(&mut self, tag: AstTag, src: SrcRef, ty: TypeRef, children: &[AstId]) -> AstId {
        let id = self.forest.append(tag, children);
        debug_assert_eq!(id.idx(), self.srcs.len());
        self.srcs.push(src);
        self.types.push(ty);
        id
    }

    pub fn add_literal(
        &mut self,
        src: SrcRef,
        ty: TypeRef,
        literal: Literal,
    ) -> AstId {
        let id = self.add(AstTag::ExprLiteral, src, ty, &[]);
        self.literals.insert(id, literal);
        id
    }

    pub fn ty(&self, id: AstId) -> TypeRef {
        self.types[id.idx()]
    }

    pub fn set_ty(&mut self, id: AstId, ty: TypeRef) {
        self.types[id.idx()] = ty;
    }

    pub fn src(&self, id: AstId) -> SrcRef {
        self.srcs[id.idx()]
    }

    pub fn name<'a>(&self, id: AstId, srcs: &[&'a str]) -> &'a str {
        self.src(id).text(srcs)
    }
}
