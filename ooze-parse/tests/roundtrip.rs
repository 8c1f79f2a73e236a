use ooze_ast::{Ast, AstId, AstTag, SrcId, TypeGraph};
use ooze_parse::{format_node, parse, parse_repl};

/// Structure of a parsed tree ignoring spans and type references: tags,
/// spelled names and literal payloads.
fn shape(ast: &Ast, srcs: &[&str], id: AstId) -> String {
    let tag = ast.forest.tag(id);
    let label = match tag {
        AstTag::PatternIdent | AstTag::ExprIdent => {
            format!("{tag:?}({})", ast.name(id, srcs))
        }
        AstTag::ExprLiteral => format!("{tag:?}({:?})", ast.literals[&id]),
        _ => format!("{tag:?}"),
    };
    let children: Vec<String> = ast
        .forest
        .children(id)
        .map(|c| shape(ast, srcs, c))
        .collect();
    if children.is_empty() {
        label
    } else {
        format!("{label}[{}]", children.join(", "))
    }
}

fn assert_script_round_trips(script: &str) {
    let mut ast = Ast::default();
    let mut tg = TypeGraph::default();
    parse(&mut ast, &mut tg, SrcId(1), script).expect("parse");
    let root = ast.forest.roots().last().expect("module");
    let srcs = ["", script];
    let printed = format_node(&ast, &tg, &srcs, root);

    let mut ast2 = Ast::default();
    let mut tg2 = TypeGraph::default();
    parse(&mut ast2, &mut tg2, SrcId(1), &printed)
        .unwrap_or_else(|e| panic!("reparse of {printed:?} failed: {e:?}"));
    let root2 = ast2.forest.roots().last().expect("module");
    let srcs2 = ["", printed.as_str()];

    assert_eq!(
        shape(&ast, &srcs, root),
        shape(&ast2, &srcs2, root2),
        "printed form: {printed}"
    );
}

fn assert_repl_round_trips(line: &str) {
    let mut ast = Ast::default();
    let mut tg = TypeGraph::default();
    parse_repl(&mut ast, &mut tg, SrcId(1), line).expect("parse");
    let root = ast.forest.roots().last().expect("root");
    let srcs = ["", line];
    let printed = format_node(&ast, &tg, &srcs, root);

    let mut ast2 = Ast::default();
    let mut tg2 = TypeGraph::default();
    parse_repl(&mut ast2, &mut tg2, SrcId(1), &printed)
        .unwrap_or_else(|e| panic!("reparse of {printed:?} failed: {e:?}"));
    let root2 = ast2.forest.roots().last().expect("root");
    let srcs2 = ["", printed.as_str()];

    assert_eq!(
        shape(&ast, &srcs, root),
        shape(&ast2, &srcs2, root2),
        "printed form: {printed}"
    );
}

#[test]
fn scripts_round_trip() {
    for script in [
        "fn f(x: i32, y: i32) -> i32 = sum(sum(x, y), y)",
        "fn f(x: i32) -> string { let x = &x; to_string(x) }",
        "fn f(b: bool) -> i32 = select b { 1 } else { 2 }",
        "fn f((w, x): (i32, i32), (y, z): (i32, i32)) -> _ = ((z, x), (y, w))",
        "fn f(_: i32, x: i32) -> _ = x",
        "fn one() -> i32 = 1\nfn f(g: fn() -> i32) -> i32 = g()",
        "fn f(x: &i32) -> string = to_string(x)",
        "fn f() -> _ { let x = (1, 2); let (y, z) = x; (z, y) }",
    ] {
        assert_script_round_trips(script);
    }
}

#[test]
fn repl_lines_round_trip() {
    for line in [
        "1",
        "0.5",
        "5i64",
        "2.5f32",
        "'a\\nb'",
        "true",
        "((1), 2)",
        "f(5, 6)",
        "f(x)(y)",
        "&1",
        "clone(&x)",
        "let x = 1",
        "let (x, (y, z)) = (1, (2, 3))",
        "let (_, x, _, y) = (1, 2, 3, 4)",
        "let x: f32 = 1",
        "select b { (1, 2) } else { (3, 4) }",
        "{ let a = 1; let b = 2; (a, b) }",
    ] {
        assert_repl_round_trips(line);
    }
}
