use std::collections::HashMap;

use ooze_ast::{Ast, AstId, AstTag, SrcRef, TypeGraph, TypeId, TypeRef, TypeTag};

use crate::error::SemanticError;
use crate::ident::{calculate_ident_graph, IdentGraph};
use crate::types::{is_copyable_type, literal_type_id, pretty_print, NativeTypeInfo};

#[derive(Debug, Default)]
pub struct SemaData {
    pub ident_graph: IdentGraph,
    /// Resolved use → binding pattern, lexical bindings and globals alike.
    pub binding_of: HashMap<AstId, AstId>,
    /// The subset of `binding_of` that went through overload resolution.
    pub overloads: HashMap<AstId, AstId>,
    pub resolved_roots: Vec<AstId>,
    pub generic_roots: Vec<AstId>,
}

/// Evaluation units: module members plus bare roots, excluding injected
/// globals.
pub fn program_roots(ast: &Ast) -> Vec<AstId> {
    let mut roots = Vec::new();
    for root in ast.forest.roots() {
        match ast.forest.tag(root) {
            AstTag::Module => roots.extend(ast.forest.children(root)),
            AstTag::EnvValue => {}
            _ => roots.push(root),
        }
    }
    roots
}

pub fn type_name_resolution(
    srcs: &[&str],
    info: &NativeTypeInfo,
    tg: &mut TypeGraph,
    reqs: &[(TypeRef, SrcRef)],
) -> Result<(), Vec<SemanticError>> {
    let mut errors = Vec::new();
    for (t, src) in reqs {
        if tg.id(*t).is_some() {
            continue;
        }
        match info.names.get(src.text(srcs)) {
            Some(id) => tg.set_id(*t, *id),
            None => errors.push(SemanticError::new("undefined type", *src)),
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub fn unify(tg: &mut TypeGraph, a: TypeRef, b: TypeRef) -> Option<TypeRef> {
    if a == b {
        return Some(a);
    }
    match (tg.tag(a), tg.tag(b)) {
        (TypeTag::Floating, TypeTag::Floating) => Some(a),
        (TypeTag::Floating, _) => Some(b),
        (_, TypeTag::Floating) => Some(a),
        (TypeTag::Leaf, TypeTag::Leaf) => (tg.id(a) == tg.id(b)).then_some(a),
        (ta, tb) if ta == tb => {
            let ca = tg.children(a).to_vec();
            let cb = tg.children(b).to_vec();
            if ca.len() != cb.len() {
                return None;
            }
            let mut merged = Vec::with_capacity(ca.len());
            for (x, y) in ca.iter().zip(cb.iter()) {
                merged.push(unify(tg, *x, *y)?);
            }
            if merged == ca {
                Some(a)
            } else if merged == cb {
                Some(b)
            } else {
                let src = tg.src(a);
                Some(match ta {
                    TypeTag::Tuple => tg.tuple(merged, src),
                    TypeTag::Borrow => tg.borrow(merged[0], src),
                    TypeTag::Fn => tg.func(merged[0], merged[1], src),
                    _ => unreachable!(),
                })
            }
        }
        _ => None,
    }
}

pub fn can_unify(tg: &TypeGraph, a: TypeRef, b: TypeRef) -> bool {
    if a == b {
        return true;
    }
    match (tg.tag(a), tg.tag(b)) {
        (TypeTag::Floating, _) | (_, TypeTag::Floating) => true,
        (TypeTag::Leaf, TypeTag::Leaf) => tg.id(a) == tg.id(b),
        (ta, tb) if ta == tb => {
            let ca = tg.children(a);
            let cb = tg.children(b);
            ca.len() == cb.len()
                && ca
                    .iter()
                    .zip(cb.iter())
                    .all(|(x, y)| can_unify(tg, *x, *y))
        }
        _ => false,
    }
}

fn contains_borrow(tg: &TypeGraph, t: TypeRef) -> bool {
    match tg.tag(t) {
        TypeTag::Borrow => true,
        // Borrows inside a function signature are the callee's business.
        TypeTag::Fn | TypeTag::Leaf | TypeTag::Floating => false,
        TypeTag::Tuple => {
            let children = tg.children(t).to_vec();
            children.iter().any(|c| contains_borrow(tg, *c))
        }
    }
}

struct Propagation<'a> {
    srcs: &'a [&'a str],
    info: &'a NativeTypeInfo,
    ast: &'a mut Ast,
    tg: &'a mut TypeGraph,
    ig: &'a IdentGraph,
    binding_of: HashMap<AstId, AstId>,
    overloads: HashMap<AstId, AstId>,
    errors: Vec<SemanticError>,
    changed: bool,
}

impl<'a> Propagation<'a> {
    fn err_expected(&mut self, id: AstId, given: TypeRef) {
        let expected = pretty_print(self.tg, self.info, self.ast.ty(id));
        let given = pretty_print(self.tg, self.info, given);
        self.errors.push(SemanticError::new(
            format!("expected {expected}, given {given}"),
            self.ast.src(id),
        ));
    }

    /// Refine a node's type with information imposed from the outside.
    /// Tuple nodes recurse so mismatches land on the offending element.
    fn impose(&mut self, id: AstId, imposed: TypeRef) -> bool {
        let cur = self.ast.ty(id);
        let tag = self.ast.forest.tag(id);
        if matches!(tag, AstTag::ExprTuple | AstTag::PatternTuple)
            && self.tg.tag(cur) == TypeTag::Tuple
            && self.tg.tag(imposed) == TypeTag::Tuple
        {
            let comps = self.tg.children(imposed).to_vec();
            let children: Vec<_> = self.ast.forest.children(id).collect();
            if comps.len() == children.len() {
                let mut ok = true;
                for (child, comp) in children.iter().zip(comps) {
                    ok &= self.impose(*child, comp);
                }
                let tys = children.iter().map(|c| self.ast.ty(*c)).collect();
                let src = self.tg.src(cur);
                let recomposed = self.tg.tuple(tys, src);
                if recomposed != cur {
                    self.ast.set_ty(id, recomposed);
                    self.changed = true;
                }
                return ok;
            }
        }

        match unify(self.tg, cur, imposed) {
            Some(u) => {
                if u != cur {
                    self.ast.set_ty(id, u);
                    self.changed = true;
                }
                true
            }
            None => {
                self.err_expected(id, imposed);
                false
            }
        }
    }

    fn rule(&mut self, id: AstId) {
        match self.ast.forest.tag(id) {
            AstTag::Assignment => {
                let pattern = self.ast.forest.nth_child(id, 0);
                let expr = self.ast.forest.nth_child(id, 1);
                if self.impose(pattern, self.ast.ty(expr)) {
                    self.impose(expr, self.ast.ty(pattern));
                }
            }
            AstTag::ExprTuple | AstTag::PatternTuple => {
                let children: Vec<_> = self.ast.forest.children(id).collect();
                let tys = children.iter().map(|c| self.ast.ty(*c)).collect();
                let src = self.tg.src(self.ast.ty(id));
                let composed = self.tg.tuple(tys, src);
                self.impose(id, composed);
            }
            AstTag::ExprBorrow => {
                let child = self.ast.forest.nth_child(id, 0);
                let cur = self.ast.ty(id);
                if self.tg.tag(cur) == TypeTag::Borrow {
                    let inner = self.tg.children(cur)[0];
                    self.impose(child, inner);
                }
                let src = self.tg.src(cur);
                let child_ty = self.ast.ty(child);
                let composed = self.tg.borrow(child_ty, src);
                self.impose(id, composed);
            }
            AstTag::ExprSelect => {
                let cond = self.ast.forest.nth_child(id, 0);
                let on_true = self.ast.forest.nth_child(id, 1);
                let on_false = self.ast.forest.nth_child(id, 2);
                let bool_ty = self.tg.leaf(TypeId::of::<bool>());
                self.impose(cond, bool_ty);
                self.impose(on_true, self.ast.ty(id));
                self.impose(on_false, self.ast.ty(id));
                self.impose(id, self.ast.ty(on_true));
                self.impose(id, self.ast.ty(on_false));
            }
            AstTag::ExprWith => {
                let body = self.ast.forest.nth_child(id, 1);
                self.impose(body, self.ast.ty(id));
                self.impose(id, self.ast.ty(body));
            }
            AstTag::ExprCall => {
                let callee = self.ast.forest.nth_child(id, 0);
                let arg = self.ast.forest.nth_child(id, 1);
                let callee_ty = self.ast.ty(callee);
                let mut ok = true;
                if self.tg.tag(callee_ty) == TypeTag::Fn {
                    let input = self.tg.children(callee_ty)[0];
                    let output = self.tg.children(callee_ty)[1];
                    ok &= self.impose(arg, input);
                    ok &= self.impose(id, output);
                }
                if ok {
                    let src = self.tg.src(callee_ty);
                    let arg_ty = self.ast.ty(arg);
                    let out_ty = self.ast.ty(id);
                    let composed = self.tg.func(arg_ty, out_ty, src);
                    self.impose(callee, composed);
                }
            }
            AstTag::Fn => {
                let pattern = self.ast.forest.nth_child(id, 0);
                let body = self.ast.forest.nth_child(id, 1);
                let fn_ty = self.ast.ty(id);
                if self.tg.tag(fn_ty) == TypeTag::Fn {
                    let input = self.tg.children(fn_ty)[0];
                    let output = self.tg.children(fn_ty)[1];
                    self.impose(pattern, input);
                    self.impose(body, output);
                }
                let src = self.tg.src(fn_ty);
                let pattern_ty = self.ast.ty(pattern);
                let body_ty = self.ast.ty(body);
                let composed = self.tg.func(pattern_ty, body_ty, src);
                self.impose(id, composed);
            }
            AstTag::RootFn => {
                let name = self.ast.forest.nth_child(id, 0);
                let f = self.ast.forest.nth_child(id, 1);
                self.impose(name, self.ast.ty(f));
            }
            AstTag::ExprIdent => {
                if let Some(&pattern) = self.binding_of.get(&id) {
                    if self.ig.is_global(pattern) {
                        // Globals have fixed types; generic globals are
                        // imposed as a fresh copy so instantiations do not
                        // interfere.
                        let ty = self.ast.ty(pattern);
                        let imposed = if self.tg.contains_floating(ty) {
                            let mut memo = HashMap::new();
                            ooze_ast::copy_type_within(self.tg, &mut memo, ty)
                        } else {
                            ty
                        };
                        self.impose(id, imposed);
                    } else {
                        let ty = self.ast.ty(pattern);
                        if self.impose(id, ty) {
                            self.impose(pattern, self.ast.ty(id));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn resolve_overloads(&mut self, finalize: bool) {
        let ids: Vec<AstId> = self.ast.forest.ids().collect();
        for id in ids {
            if self.ast.forest.tag(id) != AstTag::ExprIdent
                || self.binding_of.contains_key(&id)
            {
                continue;
            }
            let candidates = self.ig.fanout(id).to_vec();
            if candidates.len() < 2 {
                continue;
            }
            let use_ty = self.ast.ty(id);
            let viable: Vec<AstId> = candidates
                .iter()
                .copied()
                .filter(|c| can_unify(self.tg, use_ty, self.ast.ty(*c)))
                .collect();

            if viable.len() == 1 {
                let winner = viable[0];
                self.binding_of.insert(id, winner);
                self.overloads.insert(id, winner);
                self.changed = true;
                self.rule(id);
            } else if finalize {
                let deduced = pretty_print(self.tg, self.info, use_ty);
                let (msg, listed) = if viable.is_empty() {
                    ("no matching overload found", candidates.clone())
                } else {
                    ("function call is ambiguous", viable.clone())
                };
                let mut notes =
                    vec![format!("deduced {deduced} [{} candidate(s)]", listed.len())];
                notes.extend(
                    listed
                        .iter()
                        .map(|c| format!("  {}", pretty_print(self.tg, self.info, self.ast.ty(*c)))),
                );
                self.errors.push(SemanticError::with_notes(
                    msg,
                    self.ast.src(id),
                    notes,
                ));
            }
        }
    }
}

/// Run all semantic passes over the AST: type-name resolution, literal
/// typing, identifier resolution, bidirectional constraint propagation with
/// overload resolution, then the language rules.
pub fn sema(
    srcs: &[&str],
    info: &NativeTypeInfo,
    ast: &mut Ast,
    tg: &mut TypeGraph,
    type_reqs: &[(TypeRef, SrcRef)],
) -> Result<SemaData, Vec<SemanticError>> {
    type_name_resolution(srcs, info, tg, type_reqs)?;

    let literal_ids: Vec<AstId> = ast.literals.keys().copied().collect();
    for id in literal_ids {
        let leaf = tg.leaf(literal_type_id(&ast.literals[&id]));
        ast.set_ty(id, leaf);
    }

    let ig = calculate_ident_graph(srcs, ast)?;

    let mut prop = Propagation {
        srcs,
        info,
        ast: &mut *ast,
        tg: &mut *tg,
        ig: &ig,
        binding_of: HashMap::new(),
        overloads: HashMap::new(),
        errors: Vec::new(),
        changed: false,
    };

    // Seed unambiguous identifier links.
    for id in prop.ast.forest.ids() {
        if prop.ast.forest.tag(id) == AstTag::ExprIdent {
            let fanout = ig.fanout(id);
            if fanout.len() == 1 {
                prop.binding_of.insert(id, fanout[0]);
                if ig.is_global(fanout[0]) {
                    prop.overloads.insert(id, fanout[0]);
                }
            }
        }
    }

    let max_passes = prop.ast.forest.len() * 4 + 16;
    for _ in 0..max_passes {
        prop.changed = false;
        let ids: Vec<AstId> = prop.ast.forest.ids().collect();
        for id in ids {
            prop.rule(id);
        }
        if !prop.errors.is_empty() {
            return Err(prop.errors);
        }
        prop.resolve_overloads(false);
        if !prop.errors.is_empty() {
            return Err(prop.errors);
        }
        if !prop.changed {
            break;
        }
    }

    prop.resolve_overloads(true);
    if !prop.errors.is_empty() {
        return Err(prop.errors);
    }

    let binding_of = prop.binding_of;
    let overloads = prop.overloads;

    // Partition roots: function roots with floating left in their signature
    // are generic templates, checked per call site.
    let mut resolved_roots = Vec::new();
    let mut generic_roots = Vec::new();
    for root in program_roots(ast) {
        let generic = ast.forest.tag(root) == AstTag::RootFn && {
            let f = ast.forest.nth_child(root, 1);
            tg.contains_floating(ast.ty(f))
        };
        if generic {
            generic_roots.push(root);
        } else {
            resolved_roots.push(root);
        }
    }

    let mut errors = Vec::new();

    // Everything outside generic templates must be concrete.
    for root in &resolved_roots {
        for id in ast.forest.pre_order(*root) {
            if tg.contains_floating(ast.ty(id)) {
                errors.push(SemanticError::new(
                    "unable to fully deduce type",
                    ast.src(id),
                ));
                break;
            }
        }
    }

    // Results cannot carry live borrows out of their graph.
    for root in &resolved_roots {
        let (checked, at) = match ast.forest.tag(*root) {
            AstTag::Assignment => {
                let rhs = ast.forest.nth_child(*root, 1);
                (ast.ty(rhs), rhs)
            }
            AstTag::RootFn => {
                let f = ast.forest.nth_child(*root, 1);
                let body = ast.forest.nth_child(f, 1);
                (ast.ty(body), body)
            }
            tag if tag.is_expr() => (ast.ty(*root), *root),
            _ => continue,
        };
        if contains_borrow(tg, checked) {
            errors.push(SemanticError::new(
                "cannot return a borrowed value",
                ast.src(at),
            ));
        }
    }

    // Move linearity: a non-copyable binding may be moved at most once.
    let generic_set: std::collections::HashSet<AstId> = generic_roots.iter().copied().collect();
    for id in ast.forest.ids() {
        if ast.forest.tag(id) != AstTag::PatternIdent {
            continue;
        }
        if generic_set.contains(&ast.forest.root_of(id)) {
            continue;
        }
        let ty = ast.ty(id);
        if tg.contains_floating(ty) || is_copyable_type(tg, info, ty) {
            continue;
        }
        let moves = ig
            .fanout(id)
            .iter()
            .filter(|use_id| !is_borrowed_use(ast, **use_id))
            .count();
        if moves >= 2 {
            let name = ast.name(id, srcs);
            errors.push(SemanticError::new(
                format!("binding '{name}' used {moves} times"),
                ast.src(id),
            ));
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(SemaData {
        ident_graph: ig,
        binding_of,
        overloads,
        resolved_roots,
        generic_roots,
    })
}

/// A use is a borrow rather than a move when, climbing through enclosing
/// tuples, it is directly wrapped by a borrow expression.
pub fn is_borrowed_use(ast: &Ast, mut id: AstId) -> bool {
    while let Some(parent) = ast.forest.parent(id) {
        match ast.forest.tag(parent) {
            AstTag::ExprBorrow => return true,
            AstTag::ExprTuple => id = parent,
            _ => return false,
        }
    }
    false
}
