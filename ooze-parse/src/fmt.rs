use ooze_ast::{Ast, AstId, AstTag, Literal, TypeGraph, TypeRef, TypeTag};

/// Render a parsed node back to source text. Works on unresolved ASTs:
/// named types print their spelling, unknowns print `_`.
pub fn format_node(ast: &Ast, tg: &TypeGraph, srcs: &[&str], id: AstId) -> String {
    let mut out = String::new();
    node(&mut out, ast, tg, srcs, id);
    out
}

pub fn format_type(tg: &TypeGraph, srcs: &[&str], t: TypeRef) -> String {
    let mut out = String::new();
    type_into(&mut out, tg, srcs, t);
    out
}

fn type_into(out: &mut String, tg: &TypeGraph, srcs: &[&str], t: TypeRef) {
    match tg.tag(t) {
        TypeTag::Floating => out.push('_'),
        TypeTag::Leaf => out.push_str(tg.src(t).text(srcs)),
        TypeTag::Borrow => {
            out.push('&');
            type_into(out, tg, srcs, tg.children(t)[0]);
        }
        TypeTag::Tuple => {
            out.push('(');
            for (i, child) in tg.children(t).iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                type_into(out, tg, srcs, *child);
            }
            out.push(')');
        }
        TypeTag::Fn => {
            out.push_str("fn");
            type_into(out, tg, srcs, tg.children(t)[0]);
            out.push_str(" -> ");
            type_into(out, tg, srcs, tg.children(t)[1]);
        }
    }
}

fn literal_into(out: &mut String, literal: &Literal) {
    match literal {
        Literal::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
        Literal::I8(v) => out.push_str(&format!("{v}i8")),
        Literal::I16(v) => out.push_str(&format!("{v}i16")),
        Literal::I32(v) => out.push_str(&v.to_string()),
        Literal::I64(v) => out.push_str(&format!("{v}i64")),
        Literal::U8(v) => out.push_str(&format!("{v}u8")),
        Literal::U16(v) => out.push_str(&format!("{v}u16")),
        Literal::U32(v) => out.push_str(&format!("{v}u32")),
        Literal::U64(v) => out.push_str(&format!("{v}u64")),
        Literal::F32(v) => out.push_str(&format!("{v}f32")),
        Literal::F64(v) => {
            let text = v.to_string();
            if text.contains('.') {
                out.push_str(&text);
            } else {
                out.push_str(&format!("{text}f64"));
            }
        }
        Literal::Str(v) => {
            out.push('\'');
            for c in v.chars() {
                match c {
                    '\n' => out.push_str("\\n"),
                    '\t' => out.push_str("\\t"),
                    '\r' => out.push_str("\\r"),
                    '\'' => out.push_str("\\'"),
                    '\\' => out.push_str("\\\\"),
                    c => out.push(c),
                }
            }
            out.push('\'');
        }
    }
}

fn comma_children(out: &mut String, ast: &Ast, tg: &TypeGraph, srcs: &[&str], id: AstId) {
    out.push('(');
    for (i, child) in ast.forest.children(id).enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        node(out, ast, tg, srcs, child);
    }
    out.push(')');
}

fn node(out: &mut String, ast: &Ast, tg: &TypeGraph, srcs: &[&str], id: AstId) {
    match ast.forest.tag(id) {
        AstTag::PatternWildcard => out.push('_'),
        AstTag::PatternIdent | AstTag::ExprIdent => out.push_str(ast.name(id, srcs)),
        AstTag::PatternTuple | AstTag::ExprTuple => comma_children(out, ast, tg, srcs, id),
        AstTag::ExprLiteral => literal_into(out, &ast.literals[&id]),
        AstTag::ExprBorrow => {
            out.push('&');
            node(out, ast, tg, srcs, ast.forest.nth_child(id, 0));
        }
        AstTag::ExprCall => {
            node(out, ast, tg, srcs, ast.forest.nth_child(id, 0));
            comma_children(out, ast, tg, srcs, ast.forest.nth_child(id, 1));
        }
        AstTag::ExprSelect => {
            out.push_str("select ");
            node(out, ast, tg, srcs, ast.forest.nth_child(id, 0));
            out.push_str(" { ");
            node(out, ast, tg, srcs, ast.forest.nth_child(id, 1));
            out.push_str(" } else { ");
            node(out, ast, tg, srcs, ast.forest.nth_child(id, 2));
            out.push_str(" }");
        }
        AstTag::ExprWith => {
            out.push_str("{ ");
            let mut cur = id;
            while ast.forest.tag(cur) == AstTag::ExprWith {
                node(out, ast, tg, srcs, ast.forest.nth_child(cur, 0));
                out.push_str("; ");
                cur = ast.forest.nth_child(cur, 1);
            }
            node(out, ast, tg, srcs, cur);
            out.push_str(" }");
        }
        AstTag::Assignment => {
            out.push_str("let ");
            let pattern = ast.forest.nth_child(id, 0);
            node(out, ast, tg, srcs, pattern);
            out.push_str(": ");
            type_into(out, tg, srcs, ast.ty(pattern));
            out.push_str(" = ");
            node(out, ast, tg, srcs, ast.forest.nth_child(id, 1));
        }
        AstTag::Fn => {
            let pattern = ast.forest.nth_child(id, 0);
            out.push('(');
            for (i, param) in ast.forest.children(pattern).enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                node(out, ast, tg, srcs, param);
                out.push_str(": ");
                type_into(out, tg, srcs, ast.ty(param));
            }
            out.push_str(") -> ");
            let fn_ty = ast.ty(id);
            type_into(out, tg, srcs, tg.children(fn_ty)[1]);
            out.push_str(" = ");
            node(out, ast, tg, srcs, ast.forest.nth_child(id, 1));
        }
        AstTag::RootFn => {
            out.push_str("fn ");
            out.push_str(ast.name(ast.forest.nth_child(id, 0), srcs));
            node(out, ast, tg, srcs, ast.forest.nth_child(id, 1));
        }
        AstTag::Module => {
            for (i, child) in ast.forest.children(id).enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                node(out, ast, tg, srcs, child);
            }
        }
        AstTag::EnvValue => out.push_str(ast.name(ast.forest.nth_child(id, 0), srcs)),
    }
}
