use std::collections::HashMap;
use std::sync::Arc;

use ooze_ast::{Ast, AstId, AstTag, Literal, TypeGraph, TypeRef, TypeTag};
use ooze_rt::{
    AsyncFn, ConstructingGraph, FunctionGraph, Inst, InstData, Oterm, PassBy, Program, Value,
};

use crate::sema::is_borrowed_use;
use crate::types::{is_copyable_type, term_count, NativeTypeInfo};

/// A lowered expression or function, together with the free bindings it
/// captured as graph inputs (in discovery order).
pub struct LoweredGraph {
    pub value_captures: Vec<AstId>,
    pub borrow_captures: Vec<AstId>,
    pub graph: FunctionGraph,
}

/// Pass-by discipline per terminal, derived from the consumer-side type.
pub fn pass_bys_of(tg: &TypeGraph, info: &NativeTypeInfo, t: TypeRef, out: &mut Vec<PassBy>) {
    match tg.tag(t) {
        TypeTag::Leaf => {
            let copyable = tg
                .id(t)
                .map(|id| info.copyable.contains(&id))
                .unwrap_or(false);
            out.push(if copyable { PassBy::Copy } else { PassBy::Move });
        }
        TypeTag::Fn => out.push(PassBy::Copy),
        TypeTag::Borrow => {
            for _ in 0..term_count(tg, tg.children(t)[0]) {
                out.push(PassBy::Borrow);
            }
        }
        TypeTag::Tuple => {
            for child in tg.children(t).to_vec() {
                pass_bys_of(tg, info, child, out);
            }
        }
        TypeTag::Floating => unreachable!("floating type survived sema"),
    }
}

/// Borrow flag per terminal, preorder over the type's leaves.
pub fn borrows_of(tg: &TypeGraph, t: TypeRef, out: &mut Vec<bool>) {
    match tg.tag(t) {
        TypeTag::Leaf | TypeTag::Fn => out.push(false),
        TypeTag::Borrow => {
            for _ in 0..term_count(tg, tg.children(t)[0]) {
                out.push(true);
            }
        }
        TypeTag::Tuple => {
            for child in tg.children(t).to_vec() {
                borrows_of(tg, child, out);
            }
        }
        TypeTag::Floating => unreachable!("floating type survived sema"),
    }
}

pub fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Bool(v) => Value::of(*v),
        Literal::I8(v) => Value::of(*v),
        Literal::I16(v) => Value::of(*v),
        Literal::I32(v) => Value::of(*v),
        Literal::I64(v) => Value::of(*v),
        Literal::U8(v) => Value::of(*v),
        Literal::U16(v) => Value::of(*v),
        Literal::U32(v) => Value::of(*v),
        Literal::U64(v) => Value::of(*v),
        Literal::F32(v) => Value::of(*v),
        Literal::F64(v) => Value::of(*v),
        Literal::Str(v) => Value::of(v.clone()),
    }
}

struct Lowering<'a> {
    program: &'a Arc<Program>,
    ast: &'a Ast,
    tg: &'a TypeGraph,
    info: &'a NativeTypeInfo,
    binding_of: &'a HashMap<AstId, AstId>,
    global_insts: &'a HashMap<AstId, Inst>,
    use_insts: &'a HashMap<AstId, Inst>,
    cg: ConstructingGraph,
    bindings: HashMap<AstId, Vec<Oterm>>,
}

impl<'a> Lowering<'a> {
    fn pass_bys(&self, t: TypeRef) -> Vec<PassBy> {
        let mut out = Vec::new();
        pass_bys_of(self.tg, self.info, t, &mut out);
        out
    }

    /// Instruction for a call through this identifier, when it resolves to
    /// a known global.
    fn direct_inst(&self, use_id: AstId) -> Option<Inst> {
        if let Some(inst) = self.use_insts.get(&use_id) {
            return Some(*inst);
        }
        self.binding_of
            .get(&use_id)
            .and_then(|p| self.global_insts.get(p))
            .copied()
    }

    fn bind_pattern(&mut self, pattern: AstId, terms: &[Oterm], pos: &mut usize) {
        match self.ast.forest.tag(pattern) {
            AstTag::PatternTuple => {
                for child in self.ast.forest.children(pattern).collect::<Vec<_>>() {
                    self.bind_pattern(child, terms, pos);
                }
            }
            AstTag::PatternIdent => {
                let n = term_count(self.tg, self.ast.ty(pattern));
                self.bindings
                    .insert(pattern, terms[*pos..*pos + n].to_vec());
                *pos += n;
            }
            AstTag::PatternWildcard => {
                *pos += term_count(self.tg, self.ast.ty(pattern));
            }
            _ => unreachable!("not a pattern"),
        }
    }

    fn add_expr(&mut self, id: AstId) -> Vec<Oterm> {
        match self.ast.forest.tag(id) {
            AstTag::ExprLiteral => {
                let value = literal_value(&self.ast.literals[&id]);
                let inst = self.program.add(InstData::Value(value));
                self.cg.add(inst, &[], &[], 1)
            }

            AstTag::ExprIdent => {
                if let Some(inst) = self.use_insts.get(&id) {
                    let f = AsyncFn::new(self.program.clone(), *inst);
                    let value_inst = self.program.add(InstData::Value(Value::of(f)));
                    return self.cg.add(value_inst, &[], &[], 1);
                }
                let pattern = self.binding_of[&id];
                if let Some(terms) = self.bindings.get(&pattern) {
                    return terms.clone();
                }
                // A global in value position that was not captured: produce
                // its function value directly.
                let inst = self.global_insts[&pattern];
                let f = AsyncFn::new(self.program.clone(), inst);
                let value_inst = self.program.add(InstData::Value(Value::of(f)));
                self.cg.add(value_inst, &[], &[], 1)
            }

            AstTag::ExprTuple => {
                let mut terms = Vec::new();
                for child in self.ast.forest.children(id).collect::<Vec<_>>() {
                    terms.extend(self.add_expr(child));
                }
                terms
            }

            // Borrow-ness is a type property at the consumer; the terminals
            // pass straight through.
            AstTag::ExprBorrow => self.add_expr(self.ast.forest.nth_child(id, 0)),

            AstTag::ExprWith => {
                let assignment = self.ast.forest.nth_child(id, 0);
                let body = self.ast.forest.nth_child(id, 1);
                let pattern = self.ast.forest.nth_child(assignment, 0);
                let rhs = self.ast.forest.nth_child(assignment, 1);

                let terms = self.add_expr(rhs);
                self.bind_pattern(pattern, &terms, &mut 0);
                self.add_expr(body)
            }

            AstTag::ExprSelect => {
                let cond = self.ast.forest.nth_child(id, 0);
                let on_true = self.ast.forest.nth_child(id, 1);
                let on_false = self.ast.forest.nth_child(id, 2);

                let mut inputs = self.add_expr(cond);
                let true_terms = self.add_expr(on_true);
                let false_terms = self.add_expr(on_false);
                debug_assert_eq!(true_terms.len(), false_terms.len());
                inputs.extend(true_terms);
                inputs.extend(false_terms);

                let mut pass_bys = self.pass_bys(self.ast.ty(cond));
                pass_bys.extend(self.pass_bys(self.ast.ty(on_true)));
                pass_bys.extend(self.pass_bys(self.ast.ty(on_false)));

                let inst = self.program.add(InstData::Select);
                let outputs = term_count(self.tg, self.ast.ty(id)) as u32;
                self.cg.add(inst, &inputs, &pass_bys, outputs)
            }

            AstTag::ExprCall => {
                let callee = self.ast.forest.nth_child(id, 0);
                let arg = self.ast.forest.nth_child(id, 1);
                let outputs = term_count(self.tg, self.ast.ty(id)) as u32;

                let direct = self.ast.forest.tag(callee) == AstTag::ExprIdent
                    && !self
                        .binding_of
                        .get(&callee)
                        .map(|p| self.bindings.contains_key(p))
                        .unwrap_or(false)
                    && self.direct_inst(callee).is_some();

                if direct {
                    let inst = self.direct_inst(callee).expect("direct callee");
                    let arg_terms = self.add_expr(arg);
                    let pass_bys = self.pass_bys(self.ast.ty(arg));
                    self.cg.add(inst, &arg_terms, &pass_bys, outputs)
                } else {
                    let callee_terms = self.add_expr(callee);
                    debug_assert_eq!(callee_terms.len(), 1);
                    let mut inputs = callee_terms;
                    inputs.extend(self.add_expr(arg));

                    let mut pass_bys = vec![PassBy::Copy];
                    pass_bys.extend(self.pass_bys(self.ast.ty(arg)));

                    let inst = self.program.add(InstData::Functional {
                        output_count: outputs,
                    });
                    self.cg.add(inst, &inputs, &pass_bys, outputs)
                }
            }

            tag => unreachable!("cannot lower {tag:?}"),
        }
    }
}

fn is_within(ast: &Ast, mut id: AstId, root: AstId) -> bool {
    loop {
        if id == root {
            return true;
        }
        match ast.forest.parent(id) {
            Some(parent) => id = parent,
            None => return false,
        }
    }
}

/// Lower a typed expression or `Fn` node into a [`FunctionGraph`].
#[allow(clippy::too_many_arguments)]
pub fn create_graph(
    program: &Arc<Program>,
    ast: &Ast,
    tg: &TypeGraph,
    info: &NativeTypeInfo,
    binding_of: &HashMap<AstId, AstId>,
    global_insts: &HashMap<AstId, Inst>,
    use_insts: &HashMap<AstId, Inst>,
    id: AstId,
) -> LoweredGraph {
    let is_fn = ast.forest.tag(id) == AstTag::Fn;
    let (pattern, body) = if is_fn {
        (
            Some(ast.forest.nth_child(id, 0)),
            ast.forest.nth_child(id, 1),
        )
    } else {
        (None, id)
    };

    // Free bindings referenced by the expression become graph inputs, except
    // direct-call uses of known globals.
    let mut capture_order: Vec<AstId> = Vec::new();
    let mut capture_uses: HashMap<AstId, Vec<AstId>> = HashMap::new();
    for use_id in ast.forest.pre_order(id) {
        if ast.forest.tag(use_id) != AstTag::ExprIdent {
            continue;
        }
        if use_insts.contains_key(&use_id) {
            continue;
        }
        let p = binding_of[&use_id];
        if is_within(ast, p, id) {
            continue;
        }
        let call_position = ast
            .forest
            .parent(use_id)
            .map(|parent| {
                ast.forest.tag(parent) == AstTag::ExprCall
                    && ast.forest.nth_child(parent, 0) == use_id
            })
            .unwrap_or(false);
        if call_position && global_insts.contains_key(&p) {
            continue;
        }
        if !capture_uses.contains_key(&p) {
            capture_order.push(p);
        }
        capture_uses.entry(p).or_default().push(use_id);
    }

    let mut value_captures = Vec::new();
    let mut borrow_captures = Vec::new();
    for p in capture_order {
        let all_borrowed = capture_uses[&p]
            .iter()
            .all(|u| is_borrowed_use(ast, *u));
        // A copyable borrow-only capture could go either way; value capture
        // keeps the binding alive on the caller side.
        if all_borrowed && !is_copyable_type(tg, info, ast.ty(p)) {
            borrow_captures.push(p);
        } else {
            value_captures.push(p);
        }
    }

    // Input layout: value captures, then the entry pattern, then borrows.
    let mut input_borrows = Vec::new();
    for p in &value_captures {
        for _ in 0..term_count(tg, ast.ty(*p)) {
            input_borrows.push(false);
        }
    }
    if let Some(pattern) = pattern {
        borrows_of(tg, ast.ty(pattern), &mut input_borrows);
    }
    for p in &borrow_captures {
        for _ in 0..term_count(tg, ast.ty(*p)) {
            input_borrows.push(true);
        }
    }

    let (cg, terms) = ConstructingGraph::make(input_borrows);
    let mut lowering = Lowering {
        program,
        ast,
        tg,
        info,
        binding_of,
        global_insts,
        use_insts,
        cg,
        bindings: HashMap::new(),
    };

    let mut pos = 0;
    for p in &value_captures {
        let n = term_count(tg, ast.ty(*p));
        lowering.bindings.insert(*p, terms[pos..pos + n].to_vec());
        pos += n;
    }
    if let Some(pattern) = pattern {
        lowering.bind_pattern(pattern, &terms, &mut pos);
    }
    for p in &borrow_captures {
        let n = term_count(tg, ast.ty(*p));
        lowering.bindings.insert(*p, terms[pos..pos + n].to_vec());
        pos += n;
    }

    let outputs = lowering.add_expr(body);
    let pass_bys = lowering.pass_bys(ast.ty(body));
    let graph = lowering.cg.finalize(&outputs, &pass_bys);

    LoweredGraph {
        value_captures,
        borrow_captures,
        graph,
    }
}
