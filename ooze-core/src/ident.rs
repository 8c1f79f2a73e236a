use std::collections::HashSet;

use ooze_ast::{Ast, AstId, AstTag};

use crate::error::SemanticError;

/// Undirected usage ↔ binding graph over AST identifiers. Lexical uses link
/// to exactly one pattern; uses of globals link to every global sharing the
/// name (an overload set).
#[derive(Clone, Debug, Default)]
pub struct IdentGraph {
    fanouts: Vec<Vec<AstId>>,
    globals: HashSet<AstId>,
}

impl IdentGraph {
    pub fn fanout(&self, id: AstId) -> &[AstId] {
        &self.fanouts[id.idx()]
    }

    pub fn is_global(&self, id: AstId) -> bool {
        self.globals.contains(&id)
    }

    pub fn globals(&self) -> &HashSet<AstId> {
        &self.globals
    }
}

struct Ctx<'a> {
    srcs: &'a [&'a str],
    ast: &'a Ast,
    fanouts: Vec<Vec<AstId>>,
    globals: Vec<(&'a str, AstId)>,
    stack: Vec<(&'a str, AstId)>,
    errors: Vec<SemanticError>,
}

impl<'a> Ctx<'a> {
    fn link(&mut self, a: AstId, b: AstId) {
        self.fanouts[a.idx()].push(b);
        self.fanouts[b.idx()].push(a);
    }

    fn visit(&mut self, id: AstId) {
        match self.ast.forest.tag(id) {
            AstTag::PatternIdent => {
                self.stack.push((self.ast.name(id, self.srcs), id));
            }
            AstTag::Fn | AstTag::ExprWith => {
                let depth = self.stack.len();
                for child in self.ast.forest.children(id).collect::<Vec<_>>() {
                    self.visit(child);
                }
                self.stack.truncate(depth);
            }
            AstTag::ExprIdent => {
                let name = self.ast.name(id, self.srcs);
                if let Some((_, pattern)) =
                    self.stack.iter().rev().find(|(n, _)| *n == name).copied()
                {
                    self.link(id, pattern);
                    return;
                }
                let mut found = false;
                for (global_name, pattern) in self.globals.clone() {
                    if global_name == name {
                        self.link(id, pattern);
                        found = true;
                    }
                }
                if !found {
                    self.errors.push(SemanticError::new(
                        format!("use of undeclared binding '{name}'"),
                        self.ast.src(id),
                    ));
                }
            }
            AstTag::Assignment => {
                // The pattern shadows only after its initialiser.
                let pattern = self.ast.forest.nth_child(id, 0);
                let expr = self.ast.forest.nth_child(id, 1);
                self.visit(expr);
                self.visit(pattern);
            }
            AstTag::RootFn => {
                // The name pattern is a pre-registered global.
                self.visit(self.ast.forest.nth_child(id, 1));
            }
            AstTag::EnvValue => {}
            _ => {
                for child in self.ast.forest.children(id).collect::<Vec<_>>() {
                    self.visit(child);
                }
            }
        }
    }
}

/// A global declaration's name pattern, if this root introduces one.
fn global_pattern(ast: &Ast, root: AstId) -> Vec<AstId> {
    match ast.forest.tag(root) {
        AstTag::RootFn | AstTag::EnvValue => vec![ast.forest.nth_child(root, 0)],
        AstTag::Module => ast
            .forest
            .children(root)
            .flat_map(|child| global_pattern(ast, child))
            .collect(),
        _ => Vec::new(),
    }
}

pub fn calculate_ident_graph(
    srcs: &[&str],
    ast: &Ast,
) -> Result<IdentGraph, Vec<SemanticError>> {
    let mut globals = Vec::new();
    for root in ast.forest.roots() {
        for pattern in global_pattern(ast, root) {
            globals.push((ast.name(pattern, srcs), pattern));
        }
    }

    let mut ctx = Ctx {
        srcs,
        ast,
        fanouts: vec![Vec::new(); ast.forest.len()],
        globals,
        stack: Vec::new(),
        errors: Vec::new(),
    };

    for root in ast.forest.roots().collect::<Vec<_>>() {
        ctx.visit(root);
    }

    if !ctx.errors.is_empty() {
        return Err(ctx.errors);
    }

    Ok(IdentGraph {
        fanouts: ctx.fanouts,
        globals: ctx.globals.into_iter().map(|(_, id)| id).collect(),
    })
}
