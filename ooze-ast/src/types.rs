use std::collections::HashMap;

use crate::{SrcRef, TypeId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef(pub u32);

impl TypeRef {
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Leaf,
    Tuple,
    Borrow,
    Fn,
    Floating,
}

/// A DAG of type nodes. Concrete nodes are structurally hash-consed within
/// one graph; `Floating` nodes and unresolved named leaves are always fresh.
/// Sharing across graphs is explicit through [`copy_type`].
#[derive(Clone, Debug, Default)]
pub struct TypeGraph {
    tags: Vec<TypeTag>,
    ids: Vec<Option<TypeId>>,
    children: Vec<Vec<TypeRef>>,
    srcs: Vec<SrcRef>,
    dedup: HashMap<(TypeTag, Option<TypeId>, Vec<TypeRef>), TypeRef>,
}

impl TypeGraph {
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn refs(&self) -> impl Iterator<Item = TypeRef> {
        (0..self.tags.len() as u32).map(TypeRef)
    }

    pub fn tag(&self, t: TypeRef) -> TypeTag {
        self.tags[t.idx()]
    }

    pub fn id(&self, t: TypeRef) -> Option<TypeId> {
        self.ids[t.idx()]
    }

    pub fn children(&self, t: TypeRef) -> &[TypeRef] {
        &self.children[t.idx()]
    }

    pub fn src(&self, t: TypeRef) -> SrcRef {
        self.srcs[t.idx()]
    }

    pub fn set_id(&mut self, t: TypeRef, id: TypeId) {
        self.ids[t.idx()] = Some(id);
    }

    fn push(
        &mut self,
        tag: TypeTag,
        id: Option<TypeId>,
        children: Vec<TypeRef>,
        src: SrcRef,
    ) -> TypeRef {
        let t = TypeRef(self.tags.len() as u32);
        self.tags.push(tag);
        self.ids.push(id);
        self.children.push(children);
        self.srcs.push(src);
        t
    }

    fn add_consed(
        &mut self,
        tag: TypeTag,
        id: Option<TypeId>,
        children: Vec<TypeRef>,
        src: SrcRef,
    ) -> TypeRef {
        let key = (tag, id, children.clone());
        if let Some(existing) = self.dedup.get(&key) {
            return *existing;
        }
        let t = self.push(tag, id, children, src);
        self.dedup.insert(key, t);
        t
    }

    pub fn leaf(&mut self, id: TypeId) -> TypeRef {
        self.add_consed(TypeTag::Leaf, Some(id), Vec::new(), SrcRef::synthetic())
    }

    /// A leaf parsed from a type name, pending resolution to a `TypeId`.
    pub fn named(&mut self, src: SrcRef) -> TypeRef {
        self.push(TypeTag::Leaf, None, Vec::new(), src)
    }

    /// A fresh unknown, only valid while type checking runs.
    pub fn floating(&mut self, src: SrcRef) -> TypeRef {
        self.push(TypeTag::Floating, None, Vec::new(), src)
    }

    pub fn tuple(&mut self, children: Vec<TypeRef>, src: SrcRef) -> TypeRef {
        self.add_consed(TypeTag::Tuple, None, children, src)
    }

    pub fn unit(&mut self) -> TypeRef {
        self.tuple(Vec::new(), SrcRef::synthetic())
    }

    pub fn borrow(&mut self, inner: TypeRef, src: SrcRef) -> TypeRef {
        self.add_consed(TypeTag::Borrow, None, vec![inner], src)
    }

    pub fn func(&mut self, input: TypeRef, output: TypeRef, src: SrcRef) -> TypeRef {
        self.add_consed(TypeTag::Fn, None, vec![input, output], src)
    }

    pub fn is_unit(&self, t: TypeRef) -> bool {
        self.tag(t) == TypeTag::Tuple && self.children(t).is_empty()
    }

    pub fn contains_floating(&self, t: TypeRef) -> bool {
        match self.tag(t) {
            TypeTag::Floating => true,
            TypeTag::Leaf => false,
            _ => (0..self.children[t.idx()].len())
                .any(|i| self.contains_floating(self.children[t.idx()][i])),
        }
    }

    /// Deep structural equality. Unresolved leaves and floats only compare
    /// equal to themselves.
    pub fn same(&self, a: TypeRef, b: TypeRef) -> bool {
        if a == b {
            return true;
        }
        if self.tag(a) != self.tag(b) {
            return false;
        }
        match self.tag(a) {
            TypeTag::Floating => false,
            TypeTag::Leaf => match (self.id(a), self.id(b)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
            _ => {
                let (ca, cb) = (self.children(a), self.children(b));
                ca.len() == cb.len()
                    && ca.iter().zip(cb.iter()).all(|(x, y)| self.same(*x, *y))
            }
        }
    }
}

/// Copy a type from one graph into another, preserving sharing through the
/// supplied memo.
pub fn copy_type(
    from: &TypeGraph,
    to: &mut TypeGraph,
    memo: &mut HashMap<TypeRef, TypeRef>,
    t: TypeRef,
) -> TypeRef {
    if let Some(done) = memo.get(&t) {
        return *done;
    }
    let copied = match from.tag(t) {
        TypeTag::Leaf => match from.id(t) {
            Some(id) => to.leaf(id),
            None => to.named(from.src(t)),
        },
        TypeTag::Floating => to.floating(from.src(t)),
        tag => {
            let children = from
                .children(t)
                .to_vec()
                .into_iter()
                .map(|c| copy_type(from, to, memo, c))
                .collect();
            match tag {
                TypeTag::Tuple => to.tuple(children, from.src(t)),
                TypeTag::Borrow => to.add_consed(TypeTag::Borrow, None, children, from.src(t)),
                TypeTag::Fn => to.add_consed(TypeTag::Fn, None, children, from.src(t)),
                _ => unreachable!(),
            }
        }
    };
    memo.insert(t, copied);
    copied
}

/// Copy a type within one graph, giving every `Floating` a fresh identity
/// while preserving sharing through the memo.
pub fn copy_type_within(
    tg: &mut TypeGraph,
    memo: &mut HashMap<TypeRef, TypeRef>,
    t: TypeRef,
) -> TypeRef {
    if let Some(done) = memo.get(&t) {
        return *done;
    }
    let copied = match tg.tag(t) {
        TypeTag::Leaf => t,
        TypeTag::Floating => {
            let src = tg.src(t);
            tg.floating(src)
        }
        tag => {
            let src = tg.src(t);
            let children: Vec<TypeRef> = tg
                .children(t)
                .to_vec()
                .into_iter()
                .map(|c| copy_type_within(tg, memo, c))
                .collect();
            match tag {
                TypeTag::Tuple => tg.tuple(children, src),
                TypeTag::Borrow => tg.borrow(children[0], src),
                TypeTag::Fn => tg.func(children[0], children[1], src),
                _ => unreachable!(),
            }
        }
    };
    memo.insert(t, copied);
    copied
}
