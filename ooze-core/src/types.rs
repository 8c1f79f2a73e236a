use std::collections::{HashMap, HashSet};

use ooze_ast::{Literal, TypeGraph, TypeId, TypeRef, TypeTag};

/// Host-registered type information: name lookup in both directions plus the
/// set of types that pass by copy rather than move.
#[derive(Clone, Debug, Default)]
pub struct NativeTypeInfo {
    pub names: HashMap<String, TypeId>,
    pub type_names: HashMap<TypeId, String>,
    pub copyable: HashSet<TypeId>,
}

impl NativeTypeInfo {
    pub fn register(&mut self, name: &str, id: TypeId, copyable: bool) {
        self.names.insert(name.to_string(), id);
        self.type_names.insert(id, name.to_string());
        if copyable {
            self.copyable.insert(id);
        }
    }

    pub fn name_of(&self, id: TypeId) -> Option<&str> {
        self.type_names.get(&id).map(String::as_str)
    }
}

pub fn literal_type_id(literal: &Literal) -> TypeId {
    match literal {
        Literal::Bool(_) => TypeId::of::<bool>(),
        Literal::I8(_) => TypeId::of::<i8>(),
        Literal::I16(_) => TypeId::of::<i16>(),
        Literal::I32(_) => TypeId::of::<i32>(),
        Literal::I64(_) => TypeId::of::<i64>(),
        Literal::U8(_) => TypeId::of::<u8>(),
        Literal::U16(_) => TypeId::of::<u16>(),
        Literal::U32(_) => TypeId::of::<u32>(),
        Literal::U64(_) => TypeId::of::<u64>(),
        Literal::F32(_) => TypeId::of::<f32>(),
        Literal::F64(_) => TypeId::of::<f64>(),
        Literal::Str(_) => TypeId::of::<String>(),
    }
}

/// A binding passes by copy when every leaf of its type does; function
/// values and borrows are shared handles and always pass by copy.
pub fn is_copyable_type(tg: &TypeGraph, info: &NativeTypeInfo, t: TypeRef) -> bool {
    match tg.tag(t) {
        TypeTag::Leaf => tg
            .id(t)
            .map(|id| info.copyable.contains(&id))
            .unwrap_or(false),
        TypeTag::Fn | TypeTag::Borrow => true,
        TypeTag::Floating => false,
        TypeTag::Tuple => {
            let children = tg.children(t);
            children
                .iter()
                .all(|c| is_copyable_type(tg, info, *c))
        }
    }
}

/// Number of runtime terminals a value of this type occupies: one per leaf,
/// with function values opaque and borrows flattened to their inner leaves.
pub fn term_count(tg: &TypeGraph, t: TypeRef) -> usize {
    match tg.tag(t) {
        TypeTag::Leaf | TypeTag::Fn | TypeTag::Floating => 1,
        TypeTag::Borrow | TypeTag::Tuple => tg
            .children(t)
            .iter()
            .map(|c| term_count(tg, *c))
            .sum(),
    }
}

pub fn pretty_print(tg: &TypeGraph, info: &NativeTypeInfo, t: TypeRef) -> String {
    let mut out = String::new();
    print_into(&mut out, tg, info, t);
    out
}

fn print_into(out: &mut String, tg: &TypeGraph, info: &NativeTypeInfo, t: TypeRef) {
    match tg.tag(t) {
        TypeTag::Floating => out.push('_'),
        TypeTag::Leaf => match tg.id(t) {
            Some(id) => match info.name_of(id) {
                Some(name) => out.push_str(name),
                None => out.push_str(&format!("type {id:?}")),
            },
            None => out.push('_'),
        },
        TypeTag::Borrow => {
            out.push('&');
            print_into(out, tg, info, tg.children(t)[0]);
        }
        TypeTag::Tuple => {
            out.push('(');
            let children = tg.children(t).to_vec();
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                print_into(out, tg, info, *child);
            }
            out.push(')');
        }
        TypeTag::Fn => {
            let children = tg.children(t).to_vec();
            out.push_str("fn");
            print_into(out, tg, info, children[0]);
            out.push_str(" -> ");
            print_into(out, tg, info, children[1]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ooze_ast::SrcRef;

    fn info() -> NativeTypeInfo {
        let mut info = NativeTypeInfo::default();
        info.register("i32", TypeId::of::<i32>(), true);
        info.register("string", TypeId::of::<String>(), false);
        info
    }

    #[test]
    fn pretty_forms() {
        let info = info();
        let mut tg = TypeGraph::default();
        let i32_t = tg.leaf(TypeId::of::<i32>());
        let string_t = tg.leaf(TypeId::of::<String>());
        let pair = tg.tuple(vec![i32_t, string_t], SrcRef::synthetic());
        let borrowed = tg.borrow(i32_t, SrcRef::synthetic());
        let unit = tg.unit();
        let f = tg.func(unit, i32_t, SrcRef::synthetic());

        assert_eq!(pretty_print(&tg, &info, pair), "(i32, string)");
        assert_eq!(pretty_print(&tg, &info, borrowed), "&i32");
        assert_eq!(pretty_print(&tg, &info, f), "fn() -> i32");
    }

    #[test]
    fn copyability_follows_leaves() {
        let info = info();
        let mut tg = TypeGraph::default();
        let i32_t = tg.leaf(TypeId::of::<i32>());
        let string_t = tg.leaf(TypeId::of::<String>());
        let mixed = tg.tuple(vec![i32_t, string_t], SrcRef::synthetic());
        let ints = tg.tuple(vec![i32_t, i32_t], SrcRef::synthetic());

        assert!(is_copyable_type(&tg, &info, i32_t));
        assert!(!is_copyable_type(&tg, &info, string_t));
        assert!(!is_copyable_type(&tg, &info, mixed));
        assert!(is_copyable_type(&tg, &info, ints));
    }

    #[test]
    fn terminal_counts() {
        let mut tg = TypeGraph::default();
        let i32_t = tg.leaf(TypeId::of::<i32>());
        let pair = tg.tuple(vec![i32_t, i32_t], SrcRef::synthetic());
        let nested = tg.tuple(vec![i32_t, pair], SrcRef::synthetic());
        let borrowed_pair = tg.borrow(pair, SrcRef::synthetic());

        assert_eq!(term_count(&tg, i32_t), 1);
        assert_eq!(term_count(&tg, nested), 3);
        assert_eq!(term_count(&tg, borrowed_pair), 2);
    }
}
