use std::collections::HashMap;
use std::sync::Arc;

use ooze_ast::{
    copy_type, copy_type_within, span_between, Ast, AstId, AstTag, Span, SrcId, SrcRef, TypeGraph,
    TypeId, TypeRef, TypeTag,
};
use ooze_core::{
    create_graph, is_copyable_type, pretty_print, sema, term_count, NativeTypeInfo, SemaData,
};
use ooze_rt::{execute, AsyncFn, ExecutorRef, Future, Inst, InstData, Program, Value};

use crate::bindings::{AsyncValue, Binding, Bindings};
use crate::errors::{contextualize, simple_error, Contextual, Errors};
use crate::registry::NativeRegistry;

/// The embedding environment: registered native types and functions, parsed
/// script functions, and the instruction pool they all live in. Built once,
/// grown monotonically by [`Env::parse_scripts`], consumed by [`Env::run`].
pub struct Env {
    src: String,
    name_spans: HashMap<String, Span>,
    ast: Ast,
    tg: TypeGraph,
    info: NativeTypeInfo,
    program: Arc<Program>,
    /// Global pattern → instruction, for natives and lowered script fns.
    fn_insts: HashMap<AstId, Inst>,
    /// Generic instantiation memo: (generic pattern, concrete type) → inst.
    generic_insts: HashMap<(AstId, String), Inst>,
}

fn intern(src: &mut String, spans: &mut HashMap<String, Span>, name: &str) -> Span {
    if let Some(span) = spans.get(name) {
        return *span;
    }
    let start = src.len();
    src.push_str(name);
    src.push(' ');
    let span = span_between(start, start + name.len());
    spans.insert(name.to_string(), span);
    span
}

impl Env {
    pub fn new(registry: NativeRegistry) -> Self {
        let mut env = Env {
            src: String::new(),
            name_spans: HashMap::new(),
            ast: Ast::default(),
            tg: TypeGraph::default(),
            info: NativeTypeInfo::default(),
            program: Program::new(),
            fn_insts: HashMap::new(),
            generic_insts: HashMap::new(),
        };

        for ty in registry.types {
            env.info.register(&ty.name, ty.id, ty.copyable);
        }
        for def in registry.fns {
            let mut inputs = Vec::with_capacity(def.params.len());
            let borrows: Vec<bool> = def.params.iter().map(|(_, b)| *b).collect();
            for (id, borrowed) in &def.params {
                let leaf = env.tg.leaf(*id);
                inputs.push(if *borrowed {
                    env.tg.borrow(leaf, SrcRef::synthetic())
                } else {
                    leaf
                });
            }
            let input = env.tg.tuple(inputs, SrcRef::synthetic());
            let (output, output_count) = if def.ret == TypeId::of::<()>() {
                (env.tg.unit(), 0)
            } else {
                (env.tg.leaf(def.ret), 1)
            };
            let fn_ty = env.tg.func(input, output, SrcRef::synthetic());

            let inst = env.program.add(InstData::NativeFn {
                f: def.f,
                borrows,
                output_count,
            });
            let pattern = env.add_global(&def.name, fn_ty);
            env.fn_insts.insert(pattern, inst);
        }

        env
    }

    /// An environment with the primitive types and their `clone` /
    /// `to_string` globals registered.
    pub fn with_primitives() -> Self {
        Env::new(crate::prelude::primitive_registry())
    }

    fn add_global(&mut self, name: &str, ty: TypeRef) -> AstId {
        let span = intern(&mut self.src, &mut self.name_spans, name);
        let src = SrcRef::new(SrcId(0), span);
        let pattern = self.ast.add(AstTag::PatternIdent, src, ty, &[]);
        self.ast.add(AstTag::EnvValue, src, ty, &[pattern]);
        pattern
    }

    pub fn pretty_print(&self, ty: TypeRef) -> String {
        pretty_print(&self.tg, &self.info, ty)
    }

    /// Registered globals: name and type of every native and script fn.
    pub fn globals(&self) -> Vec<(String, TypeRef)> {
        let srcs = [self.src.as_str()];
        let mut out = Vec::new();
        for root in self.ast.forest.roots() {
            match self.ast.forest.tag(root) {
                AstTag::EnvValue | AstTag::RootFn => {
                    let pattern = self.ast.forest.nth_child(root, 0);
                    out.push((
                        self.ast.name(pattern, &srcs).to_string(),
                        self.ast.ty(pattern),
                    ));
                }
                _ => {}
            }
        }
        out
    }

    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.info.names.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether a `to_string(&T) -> string` overload exists for this type.
    pub fn has_to_string(&self, name: &str) -> bool {
        let Some(&id) = self.info.names.get(name) else {
            return false;
        };
        let srcs = [self.src.as_str()];
        for root in self.ast.forest.roots() {
            if !matches!(self.ast.forest.tag(root), AstTag::EnvValue | AstTag::RootFn) {
                continue;
            }
            let pattern = self.ast.forest.nth_child(root, 0);
            if self.ast.name(pattern, &srcs) != "to_string" {
                continue;
            }
            let ty = self.ast.ty(pattern);
            if self.tg.tag(ty) != TypeTag::Fn {
                continue;
            }
            let input = self.tg.children(ty)[0];
            if self.tg.tag(input) == TypeTag::Tuple && self.tg.children(input).len() == 1 {
                let param = self.tg.children(input)[0];
                if self.tg.tag(param) == TypeTag::Borrow {
                    let inner = self.tg.children(param)[0];
                    if self.tg.id(inner) == Some(id) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Parse a bare type against the registered type names.
    pub fn parse_type(&mut self, text: &str) -> Result<TypeRef, Errors> {
        let mut tg = self.tg.clone();
        let (ty, reqs) = ooze_parse::parse_type(&mut tg, SrcId(1), text)
            .map_err(|errs| self.render(&[text], errs))?;
        let srcs = [self.src.as_str(), text];
        ooze_core::type_name_resolution(&srcs, &self.info, &mut tg, &reqs)
            .map_err(|errs| contextualize(&srcs, errs.into_iter().map(Into::into).collect()))?;
        self.tg = tg;
        Ok(ty)
    }

    fn render(&self, user_srcs: &[&str], errs: Vec<ooze_parse::ParseError>) -> Errors {
        let mut srcs = vec![self.src.as_str()];
        srcs.extend(user_srcs);
        contextualize(&srcs, errs.into_iter().map(Into::into).collect())
    }

    /// Parse, check and lower script functions into the environment. The
    /// environment is unchanged when any stage fails.
    pub fn parse_scripts(&mut self, files: &[&str]) -> Result<(), Errors> {
        let mut ast = self.ast.clone();
        let mut tg = self.tg.clone();
        let env_src = self.src.clone();

        let mut srcs: Vec<&str> = vec![&env_src];
        srcs.extend(files);

        let mut reqs = Vec::new();
        let mut parse_errors = Vec::new();
        for (i, text) in files.iter().enumerate() {
            match ooze_parse::parse(&mut ast, &mut tg, SrcId(i as u32 + 1), text) {
                Ok(r) => reqs.extend(r),
                Err(errs) => parse_errors.extend(errs),
            }
        }
        if !parse_errors.is_empty() {
            return Err(contextualize(
                &srcs,
                parse_errors.into_iter().map(Into::into).collect(),
            ));
        }

        let old_len = self.ast.forest.len() as u32;
        let (data, use_insts) = self.analyze(&mut ast, &mut tg, &srcs, &reqs)?;

        // Placeholders first so out-of-order and mutually recursive script
        // functions can call each other.
        let mut global_insts = self.fn_insts.clone();
        let mut placeholders = Vec::new();
        for root in &data.resolved_roots {
            if ast.forest.tag(*root) != AstTag::RootFn || root.0 < old_len {
                continue;
            }
            let pattern = ast.forest.nth_child(*root, 0);
            let placeholder = self.program.add(InstData::Placeholder);
            global_insts.insert(pattern, placeholder);
            placeholders.push((*root, pattern, placeholder));
        }

        for (root, _, placeholder) in &placeholders {
            let fn_id = ast.forest.nth_child(*root, 1);
            let lowered = create_graph(
                &self.program,
                &ast,
                &tg,
                &self.info,
                &data.binding_of,
                &global_insts,
                &use_insts,
                fn_id,
            );
            assert!(
                lowered.borrow_captures.is_empty(),
                "script functions cannot borrow the environment"
            );

            let graph = Arc::new(lowered.graph);
            if lowered.value_captures.is_empty() {
                self.program.set(*placeholder, InstData::Graph(graph));
            } else {
                let graph_inst = self.program.add(InstData::Graph(graph));
                let values = lowered
                    .value_captures
                    .iter()
                    .map(|p| Value::of(AsyncFn::new(self.program.clone(), global_insts[p])))
                    .collect();
                self.program.set(
                    *placeholder,
                    InstData::Curry {
                        inst: graph_inst,
                        values,
                    },
                );
            }
        }

        // Commit: concrete fns become typed global stubs, generic fns are
        // copied into the environment AST for per-call instantiation.
        for (root, pattern, placeholder) in &placeholders {
            let name = ast.name(*pattern, &srcs).to_string();
            let mut memo = HashMap::new();
            let fn_id = ast.forest.nth_child(*root, 1);
            let ty = copy_type(&tg, &mut self.tg, &mut memo, ast.ty(fn_id));
            let env_pattern = self.add_global(&name, ty);
            self.fn_insts.insert(env_pattern, *placeholder);
        }
        for root in &data.generic_roots {
            if root.0 < old_len {
                continue;
            }
            let mut memo = HashMap::new();
            self.import_subtree(&ast, &tg, &srcs, &mut memo, *root);
        }

        Ok(())
    }

    /// Copy a subtree into the environment AST, interning identifier names
    /// into the environment source so the original script can be dropped.
    fn import_subtree(
        &mut self,
        ast: &Ast,
        tg: &TypeGraph,
        srcs: &[&str],
        memo: &mut HashMap<TypeRef, TypeRef>,
        id: AstId,
    ) -> AstId {
        let children: Vec<AstId> = ast
            .forest
            .children(id)
            .collect::<Vec<_>>()
            .into_iter()
            .map(|c| self.import_subtree(ast, tg, srcs, memo, c))
            .collect();

        let tag = ast.forest.tag(id);
        let src = match tag {
            AstTag::PatternIdent | AstTag::ExprIdent => {
                let name = ast.name(id, srcs).to_string();
                let span = intern(&mut self.src, &mut self.name_spans, &name);
                SrcRef::new(SrcId(0), span)
            }
            _ => SrcRef::synthetic(),
        };
        let ty = copy_type(tg, &mut self.tg, memo, ast.ty(id));
        let new_id = self.ast.add(tag, src, ty, &children);
        if let Some(lit) = ast.literals.get(&id) {
            self.ast.literals.insert(new_id, lit.clone());
        }
        new_id
    }

    /// Copy a subtree within the working AST, refreshing type unknowns.
    fn clone_subtree(
        ast: &mut Ast,
        tg: &mut TypeGraph,
        memo: &mut HashMap<TypeRef, TypeRef>,
        id: AstId,
    ) -> AstId {
        let children: Vec<AstId> = ast
            .forest
            .children(id)
            .collect::<Vec<_>>()
            .into_iter()
            .map(|c| Env::clone_subtree(ast, tg, memo, c))
            .collect();
        let tag = ast.forest.tag(id);
        let src = ast.src(id);
        let ty = copy_type_within(tg, memo, ast.ty(id));
        let lit = ast.literals.get(&id).cloned();
        let new_id = ast.add(tag, src, ty, &children);
        if let Some(lit) = lit {
            ast.literals.insert(new_id, lit);
        }
        new_id
    }

    /// Run sema to a fixed point, instantiating generic functions at every
    /// call site that deduced a concrete type.
    fn analyze(
        &mut self,
        ast: &mut Ast,
        tg: &mut TypeGraph,
        srcs: &[&str],
        reqs: &[(TypeRef, SrcRef)],
    ) -> Result<(SemaData, HashMap<AstId, Inst>), Errors> {
        let env_len = self.ast.forest.len() as u32;
        let mut use_insts: HashMap<AstId, Inst> = HashMap::new();
        let mut use_keys: HashMap<AstId, (AstId, String)> = HashMap::new();
        let mut copies: HashMap<(AstId, String), AstId> = HashMap::new();
        // Instantiations of generics not yet committed to the env cannot go
        // in the persistent memo; their pattern ids are ephemeral.
        let mut session_insts: HashMap<(AstId, String), Inst> = HashMap::new();

        let data = loop {
            let data = sema(srcs, &self.info, ast, tg, reqs)
                .map_err(|errs| contextualize(srcs, errs.into_iter().map(Into::into).collect()))?;

            let mut changed = false;
            for (use_id, pattern) in &data.binding_of {
                if !data.ident_graph.is_global(*pattern)
                    || !tg.contains_floating(ast.ty(*pattern))
                    || use_keys.contains_key(use_id)
                {
                    continue;
                }
                let concrete = ast.ty(*use_id);
                if tg.contains_floating(concrete) {
                    // A use inside another generic template; it resolves
                    // when that template is instantiated.
                    continue;
                }
                let key = (*pattern, pretty_print(tg, &self.info, concrete));
                use_keys.insert(*use_id, key.clone());

                let memoized = if pattern.0 < env_len {
                    self.generic_insts.get(&key)
                } else {
                    session_insts.get(&key)
                };
                if let Some(inst) = memoized {
                    use_insts.insert(*use_id, *inst);
                } else if !copies.contains_key(&key) {
                    let root = ast.forest.parent(*pattern).expect("global declaration");
                    let fn_id = ast.forest.nth_child(root, 1);
                    let mut memo = HashMap::new();
                    let copy = Env::clone_subtree(ast, tg, &mut memo, fn_id);
                    ast.set_ty(copy, concrete);
                    copies.insert(key, copy);
                    changed = true;
                }
            }

            if !changed {
                break data;
            }
        };

        // Lower instantiations innermost-first: a copy is ready once every
        // generic use inside it has an instruction.
        let mut remaining: Vec<((AstId, String), AstId)> = copies.into_iter().collect();
        while !remaining.is_empty() {
            let mut progressed = false;
            let mut still = Vec::new();
            for (key, fn_id) in remaining {
                let ready = ast.forest.pre_order(fn_id).iter().all(|id| {
                    if ast.forest.tag(*id) != AstTag::ExprIdent {
                        return true;
                    }
                    match data.binding_of.get(id) {
                        Some(p)
                            if data.ident_graph.is_global(*p)
                                && tg.contains_floating(ast.ty(*p)) =>
                        {
                            use_insts.contains_key(id)
                        }
                        _ => true,
                    }
                });
                if !ready {
                    still.push((key, fn_id));
                    continue;
                }

                let lowered = create_graph(
                    &self.program,
                    ast,
                    tg,
                    &self.info,
                    &data.binding_of,
                    &self.fn_insts,
                    &use_insts,
                    fn_id,
                );
                let graph_inst = self.program.add(InstData::Graph(Arc::new(lowered.graph)));
                let inst = if lowered.value_captures.is_empty() {
                    graph_inst
                } else {
                    let values = lowered
                        .value_captures
                        .iter()
                        .map(|p| Value::of(AsyncFn::new(self.program.clone(), self.fn_insts[p])))
                        .collect();
                    self.program.add(InstData::Curry {
                        inst: graph_inst,
                        values,
                    })
                };

                if key.0 .0 < env_len {
                    self.generic_insts.insert(key.clone(), inst);
                } else {
                    session_insts.insert(key.clone(), inst);
                }
                for (use_id, use_key) in &use_keys {
                    if *use_key == key {
                        use_insts.insert(*use_id, inst);
                    }
                }
                progressed = true;
            }
            if !progressed {
                return Err(simple_error(
                    "unable to instantiate mutually recursive generic functions",
                ));
            }
            remaining = still;
        }

        Ok((data, use_insts))
    }

    /// Evaluate a REPL line: an expression yields its value, an assignment
    /// destructures into named bindings.
    pub fn run(
        &mut self,
        ex: &ExecutorRef,
        bindings: &mut Bindings,
        expr: &str,
    ) -> Result<Binding, Errors> {
        self.run_impl(ex, bindings, expr, false)
            .map(|(binding, _)| binding)
    }

    /// Like [`Env::run`], but non-assignments come back through their
    /// `to_string` overload. Assignments yield the empty string.
    pub fn run_to_string(
        &mut self,
        ex: &ExecutorRef,
        bindings: &mut Bindings,
        expr: &str,
    ) -> Result<String, Errors> {
        let (binding, stringified) = self.run_impl(ex, bindings, expr, true)?;
        if !stringified {
            return Ok(String::new());
        }
        let mut values = binding.values;
        assert_eq!(values.len(), 1);
        let value = values.remove(0).take().wait();
        Ok(value.downcast::<String>().expect("to_string yields string"))
    }

    fn run_impl(
        &mut self,
        ex: &ExecutorRef,
        bindings: &mut Bindings,
        expr: &str,
        wrap_to_string: bool,
    ) -> Result<(Binding, bool), Errors> {
        let mut ast = self.ast.clone();
        let mut tg = self.tg.clone();
        let mut env_src = self.src.clone();
        let mut name_spans = self.name_spans.clone();

        // Surface the REPL bindings as globals of the ephemeral AST.
        let mut by_pattern: HashMap<AstId, String> = HashMap::new();
        let mut names: Vec<&String> = bindings.keys().collect();
        names.sort();
        for name in names.into_iter().cloned().collect::<Vec<_>>() {
            let binding = &bindings[&name];
            let span = intern(&mut env_src, &mut name_spans, &name);
            let src = SrcRef::new(SrcId(0), span);
            let pattern = ast.add(AstTag::PatternIdent, src, binding.ty, &[]);
            ast.add(AstTag::EnvValue, src, binding.ty, &[pattern]);
            by_pattern.insert(pattern, name);
        }

        let srcs_owned = [env_src.clone(), expr.to_string()];
        let srcs: Vec<&str> = srcs_owned.iter().map(String::as_str).collect();

        let reqs = ooze_parse::parse_repl(&mut ast, &mut tg, SrcId(1), expr).map_err(|errs| {
            contextualize(&srcs, errs.into_iter().map(Into::into).collect())
        })?;

        let mut root = ast.forest.roots().last().expect("parsed root");
        let is_assignment = ast.forest.tag(root) == AstTag::Assignment;
        let stringify = wrap_to_string && !is_assignment;
        if stringify {
            // Wrap the expression in `to_string(&expr)`.
            let expr_ty = ast.ty(root);
            let borrow_ty = tg.borrow(expr_ty, SrcRef::synthetic());
            let borrow_id = ast.add(AstTag::ExprBorrow, ast.src(root), borrow_ty, &[root]);
            let tuple_ty = tg.tuple(vec![borrow_ty], SrcRef::synthetic());
            let tuple_id = ast.add(AstTag::ExprTuple, ast.src(root), tuple_ty, &[borrow_id]);
            let span = intern(&mut env_src, &mut name_spans, "to_string");
            let callee_src = SrcRef::new(SrcId(0), span);
            let callee_ty = tg.floating(callee_src);
            let callee_id = ast.add(AstTag::ExprIdent, callee_src, callee_ty, &[]);
            let call_ty = tg.floating(SrcRef::synthetic());
            root = ast.add(AstTag::ExprCall, ast.src(root), call_ty, &[callee_id, tuple_id]);
        }

        let srcs_owned = [env_src.clone(), expr.to_string()];
        let srcs: Vec<&str> = srcs_owned.iter().map(String::as_str).collect();
        let (data, use_insts) = self.analyze(&mut ast, &mut tg, &srcs, &reqs)?;

        let expr_root = if is_assignment {
            ast.forest.nth_child(root, 1)
        } else {
            root
        };

        let lowered = create_graph(
            &self.program,
            &ast,
            &tg,
            &self.info,
            &data.binding_of,
            &self.fn_insts,
            &use_insts,
            expr_root,
        );

        // Wire the captured free bindings: copyable REPL values are read
        // through a borrow and cloned, non-copyable values are consumed,
        // globals are passed as function values.
        let mut futures: Vec<Future> = Vec::new();
        let mut borrowed = Vec::new();
        for p in &lowered.value_captures {
            match by_pattern.get(p) {
                Some(name) => {
                    if is_copyable_type(&tg, &self.info, ast.ty(*p)) {
                        let binding = bindings.get_mut(name).expect("captured binding");
                        for v in &mut binding.values {
                            futures.push(v.borrow().cloned());
                        }
                    } else {
                        let binding = bindings.remove(name).expect("captured binding");
                        for v in binding.values {
                            futures.push(v.take());
                        }
                    }
                }
                None => {
                    let inst = self.fn_insts[p];
                    futures.push(Future::ready(Value::of(AsyncFn::new(
                        self.program.clone(),
                        inst,
                    ))));
                }
            }
        }
        for p in &lowered.borrow_captures {
            let name = by_pattern.get(p).expect("only bindings are borrowed");
            let binding = bindings.get_mut(name).expect("captured binding");
            for v in &mut binding.values {
                borrowed.push(v.borrow());
            }
        }

        let inst = self.program.add(InstData::Graph(Arc::new(lowered.graph)));
        let outs = execute(&self.program, inst, ex, futures, borrowed);

        let mut memo = HashMap::new();
        let result = if is_assignment {
            // Distribute outputs over the pattern's leaves.
            let pattern = ast.forest.nth_child(root, 0);
            let mut outs = outs.into_iter();
            for leaf in ast.forest.leaves(pattern) {
                let n = term_count(&tg, ast.ty(leaf));
                let values: Vec<AsyncValue> =
                    (&mut outs).take(n).map(AsyncValue::from).collect();
                if ast.forest.tag(leaf) == AstTag::PatternIdent {
                    let name = ast.name(leaf, &srcs).to_string();
                    let ty = copy_type(&tg, &mut self.tg, &mut memo, ast.ty(leaf));
                    bindings.insert(name, Binding { ty, values });
                }
            }
            Binding {
                ty: self.tg.unit(),
                values: Vec::new(),
            }
        } else {
            let ty = copy_type(&tg, &mut self.tg, &mut memo, ast.ty(expr_root));
            Binding {
                ty,
                values: outs.into_iter().map(AsyncValue::from).collect(),
            }
        };

        Ok((result, stringify))
    }

    /// Type-check an expression without lowering or executing it.
    pub fn type_check_expr(&mut self, expr: &str) -> Result<(), Errors> {
        self.type_check_with(expr, ooze_parse::parse_expr)
    }

    /// Type-check a single function definition.
    pub fn type_check_fn(&mut self, text: &str) -> Result<(), Errors> {
        self.type_check_with(text, ooze_parse::parse_function)
    }

    /// Type-check a binding pattern with optional annotation.
    pub fn type_check_binding(&mut self, text: &str) -> Result<(), Errors> {
        self.type_check_with(text, ooze_parse::parse_binding)
    }

    fn type_check_with(
        &mut self,
        text: &str,
        parse: fn(
            &mut Ast,
            &mut TypeGraph,
            SrcId,
            &str,
        ) -> Result<Vec<(TypeRef, SrcRef)>, Vec<ooze_parse::ParseError>>,
    ) -> Result<(), Errors> {
        let mut ast = self.ast.clone();
        let mut tg = self.tg.clone();
        let env_src = self.src.clone();
        let srcs_owned = [env_src, text.to_string()];
        let srcs: Vec<&str> = srcs_owned.iter().map(String::as_str).collect();

        let reqs = parse(&mut ast, &mut tg, SrcId(1), text).map_err(|errs| {
            contextualize(&srcs, errs.into_iter().map(Into::into).collect())
        })?;
        self.analyze(&mut ast, &mut tg, &srcs, &reqs).map(|_| ())
    }
}
