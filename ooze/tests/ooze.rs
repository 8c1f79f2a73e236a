use ooze::{
    make_seq_executor, make_task_executor, make_tokio_executor, Binding, Bindings, Env,
    ExecutorRef, NativeRegistry, Value,
};

fn await_binding(b: Binding) -> Vec<Value> {
    b.values.into_iter().map(|v| v.take().wait()).collect()
}

fn run_script(
    mut env: Env,
    script: &str,
    expr: &str,
) -> Result<(String, Vec<Value>), Vec<String>> {
    let ex = make_seq_executor();
    env.parse_scripts(&[script]).map_err(|e| e.lines)?;
    let mut bindings = Bindings::new();
    let binding = env.run(&ex, &mut bindings, expr).map_err(|e| e.lines)?;
    assert!(bindings.is_empty());
    Ok((env.pretty_print(binding.ty), await_binding(binding)))
}

fn check_run<T: PartialEq + std::fmt::Debug + 'static>(
    env: Env,
    script: &str,
    expr: &str,
    expected_type: &str,
    expected: Vec<T>,
) {
    let (ty, values) = run_script(env, script, expr).expect("run");
    assert_eq!(ty, expected_type);
    let values: Vec<T> = values
        .into_iter()
        .map(|v| v.downcast::<T>().ok().expect("result type"))
        .collect();
    assert_eq!(values, expected);
}

fn check_error(env: Env, script: &str, expr: &str, expected: &[&str]) {
    let errs = run_script(env, script, expr).expect_err("expected error");
    assert_eq!(errs, expected.iter().map(|s| s.to_string()).collect::<Vec<_>>());
}

fn int_env() -> Env {
    let mut registry = NativeRegistry::new();
    registry.add_type::<i32>("i32");
    Env::new(registry)
}

#[test]
fn basic() {
    let mut registry = NativeRegistry::new();
    registry.add_type::<i32>("i32");
    registry.add_fn("sum", |x: i32, y: i32| x + y);
    let env = Env::new(registry);

    check_run(
        env,
        "fn f(x: i32, y: i32) -> i32 = sum(sum(x, y), y)",
        "f(5, 6)",
        "i32",
        vec![17],
    );
}

#[test]
fn no_args() {
    check_run(int_env(), "fn f() -> i32 = 17", "f()", "i32", vec![17]);
}

#[test]
fn identity() {
    check_run(int_env(), "fn f(x: i32) -> i32 = x", "f(5)", "i32", vec![5]);
}

#[test]
fn borrow_param() {
    check_run(
        Env::with_primitives(),
        "fn f(x: &i32) -> string = to_string(x)",
        "f(&1)",
        "string",
        vec!["1".to_string()],
    );
}

#[test]
fn borrow_assign() {
    check_run(
        Env::with_primitives(),
        "fn f(x: i32) -> string { let x = &x; to_string(x) }",
        "f(1)",
        "string",
        vec!["1".to_string()],
    );
}

#[test]
fn tuple() {
    check_run(
        Env::with_primitives(),
        "",
        "((1), 2)",
        "((i32), i32)",
        vec![1, 2],
    );
}

#[test]
fn tuple_fn() {
    check_run(
        Env::with_primitives(),
        "fn f((w, x): (i32, i32), (y, z): (i32, i32)) -> _ = ((z, x), (y, w))",
        "f((1, 2), (3, 4))",
        "((i32, i32), (i32, i32))",
        vec![4, 2, 3, 1],
    );
}

#[test]
fn tuple_parameter() {
    check_run(
        Env::with_primitives(),
        "fn f(x: (i32, i32)) -> _ { let (y, z) = x; (z, y) }",
        "f((1, 2))",
        "(i32, i32)",
        vec![2, 1],
    );
}

#[test]
fn tuple_assignment() {
    check_run(
        Env::with_primitives(),
        "fn f() -> _ { let x = (1, 2); let (y, z) = x; (z, y) }",
        "f()",
        "(i32, i32)",
        vec![2, 1],
    );
}

#[test]
fn fn_parameter() {
    check_run(
        Env::with_primitives(),
        "fn one() -> i32 = 1\nfn f(g: fn() -> i32) -> i32 = g()",
        "f(one)",
        "i32",
        vec![1],
    );
}

#[test]
fn wildcard_parameter() {
    check_run(
        Env::with_primitives(),
        "fn f(_: i32, x: i32) -> _ = x",
        "f(1, 2)",
        "i32",
        vec![2],
    );
}

#[test]
fn wildcard_assignment() {
    check_run(
        Env::with_primitives(),
        "fn f() -> _ { let (_, x) = (1, 2); x }",
        "f()",
        "i32",
        vec![2],
    );
}

#[test]
fn select() {
    let script = "fn f(b: bool) -> i32 = select b { 1 } else { 2 }";
    check_run(Env::with_primitives(), script, "f(true)", "i32", vec![1]);
    check_run(Env::with_primitives(), script, "f(false)", "i32", vec![2]);
}

#[test]
fn expr_rebind() {
    let mut registry = NativeRegistry::new();
    registry.add_type::<i32>("i32");
    registry.add_fn("double", |x: i32| x + x);
    check_run(
        Env::new(registry),
        "fn f(x: i32) -> i32 { let x = double(x); let x = double(x); x }",
        "f(1)",
        "i32",
        vec![4],
    );
}

#[test]
fn scope_shadowing() {
    let script = "fn f(a: i32, b: i32) -> (i32, (string, i32, i32)) {\
                  \n  let b = {\
                  \n    let c: i32 = a;\
                  \n    let a: string = 'abc';\
                  \n    (a, b, c)\
                  \n  };\
                  \n  (a, b)\
                  \n}";
    let (ty, values) = run_script(Env::with_primitives(), script, "f(1, 2)").expect("run");
    assert_eq!(ty, "(i32, (string, i32, i32))");
    assert_eq!(values[0].downcast_ref::<i32>(), Some(&1));
    assert_eq!(values[1].downcast_ref::<String>().map(String::as_str), Some("abc"));
    assert_eq!(values[2].downcast_ref::<i32>(), Some(&2));
    assert_eq!(values[3].downcast_ref::<i32>(), Some(&1));
}

#[test]
fn out_of_order_definitions() {
    check_run(
        Env::with_primitives(),
        "fn f() -> _ = g()\nfn g() -> i32 = 1",
        "f()",
        "i32",
        vec![1],
    );
}

#[test]
fn already_moved() {
    let mut registry = NativeRegistry::new();
    registry.add_type::<i32>("i32");
    registry.add_move_type::<Box<i32>>("unique_int");
    registry.add_fn("make_unique_int", |x: i32| Box::new(x));

    check_error(
        Env::new(registry),
        "fn f(x: unique_int) -> (unique_int, unique_int) = (x, x)",
        "f(make_unique_int(0))",
        &[
            "1:5 error: binding 'x' used 2 times",
            " | fn f(x: unique_int) -> (unique_int, unique_int) = (x, x)",
            " |      ^",
        ],
    );
}

#[test]
fn clone_native() {
    let mut registry = NativeRegistry::new();
    registry.add_move_type::<String>("string");
    check_run(
        Env::new(registry),
        "",
        "clone(&'abc')",
        "string",
        vec!["abc".to_string()],
    );
}

#[test]
fn custom_type() {
    #[derive(Clone, Debug, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    let mut registry = NativeRegistry::new();
    registry.add_type::<i32>("i32");
    registry.add_move_type::<Point>("Point");
    registry.add_fn("sum", |a: Point, b: Point| Point {
        x: a.x + b.x,
        y: a.y + b.y,
    });
    registry.add_fn::<(ooze::ByRef<i32>, ooze::ByRef<i32>, Point)>("create_point", |x: &i32, y: &i32| {
        Point { x: *x, y: *y }
    });

    check_run(
        Env::new(registry),
        "fn f(x: Point, y: Point) -> Point = sum(sum(x, y), y)",
        "f(create_point(&1, &2), create_point(&9, &7))",
        "Point",
        vec![Point { x: 19, y: 16 }],
    );
}

#[test]
fn assign_empty() {
    let mut env = Env::with_primitives();
    let ex = make_seq_executor();
    let mut bindings = Bindings::new();
    let result = env.run(&ex, &mut bindings, "let () = ()").expect("run");
    assert_eq!(env.pretty_print(result.ty), "()");
    assert!(bindings.is_empty());
}

fn assign(env: &mut Env, bindings: &mut Bindings, line: &str) {
    let ex = make_seq_executor();
    let result = env.run(&ex, bindings, line).expect("run");
    assert_eq!(env.pretty_print(result.ty), "()");
    assert!(result.values.is_empty());
}

fn check_binding<T: PartialEq + std::fmt::Debug + 'static>(
    env: &Env,
    bindings: &mut Bindings,
    name: &str,
    expected_type: &str,
    expected: Vec<T>,
) {
    let binding = bindings.remove(name).expect("binding");
    assert_eq!(env.pretty_print(binding.ty), expected_type);
    let values: Vec<T> = await_binding(binding)
        .into_iter()
        .map(|v| v.downcast::<T>().ok().expect("binding type"))
        .collect();
    assert_eq!(values, expected);
}

#[test]
fn assign_basic() {
    let mut env = Env::with_primitives();
    let mut bindings = Bindings::new();
    assign(&mut env, &mut bindings, "let x = 1");
    check_binding(&env, &mut bindings, "x", "i32", vec![1]);
}

#[test]
fn assign_tuple_nested_destructure() {
    let mut env = Env::with_primitives();
    let mut bindings = Bindings::new();
    assign(&mut env, &mut bindings, "let (x, (y, z)) = (1, (2, 3))");
    assert_eq!(bindings.len(), 3);
    check_binding(&env, &mut bindings, "x", "i32", vec![1]);
    check_binding(&env, &mut bindings, "y", "i32", vec![2]);
    check_binding(&env, &mut bindings, "z", "i32", vec![3]);
}

#[test]
fn assign_tuple_wildcard() {
    let mut env = Env::with_primitives();
    let mut bindings = Bindings::new();
    assign(&mut env, &mut bindings, "let (_, x, _, y) = (1, 2, 3, 4)");
    assert_eq!(bindings.len(), 2);
    check_binding(&env, &mut bindings, "x", "i32", vec![2]);
    check_binding(&env, &mut bindings, "y", "i32", vec![4]);
}

#[test]
fn assign_whole_tuple() {
    let mut env = Env::with_primitives();
    let mut bindings = Bindings::new();
    assign(&mut env, &mut bindings, "let x = (1, 2)");
    check_binding(&env, &mut bindings, "x", "(i32, i32)", vec![1, 2]);
}

#[test]
fn assign_deduce_overloads() {
    let mut registry = NativeRegistry::new();
    registry.add_type::<i32>("i32");
    registry.add_type::<f32>("f32");
    registry.add_fn("f", || 5_i32);
    registry.add_fn("f", || 3.0_f32);
    let mut env = Env::new(registry);

    let mut bindings = Bindings::new();
    assign(&mut env, &mut bindings, "let (x, y) : (i32, f32) = (f(), f())");
    check_binding(&env, &mut bindings, "x", "i32", vec![5]);
    check_binding(&env, &mut bindings, "y", "f32", vec![3.0_f32]);
}

#[test]
fn assign_wrong_type() {
    check_error(
        Env::with_primitives(),
        "",
        "let x: f32 = 1",
        &[
            "1:4 error: expected f32, given i32",
            " | let x: f32 = 1",
            " |     ^",
        ],
    );
}

#[test]
fn run_borrow() {
    check_error(
        Env::with_primitives(),
        "",
        "&1",
        &[
            "1:0 error: cannot return a borrowed value",
            " | &1",
            " | ^~",
        ],
    );
}

#[test]
fn assign_borrow() {
    check_error(
        Env::with_primitives(),
        "",
        "let x = &1",
        &[
            "1:8 error: cannot return a borrowed value",
            " | let x = &1",
            " |         ^~",
        ],
    );
}

#[test]
fn undeclared_function() {
    check_error(
        Env::with_primitives(),
        "",
        "f()",
        &[
            "1:0 error: use of undeclared binding 'f'",
            " | f()",
            " | ^",
        ],
    );
}

#[test]
fn undeclared_binding() {
    check_error(
        Env::with_primitives(),
        "",
        "x",
        &["1:0 error: use of undeclared binding 'x'", " | x", " | ^"],
    );
}

#[test]
fn bad_pattern() {
    check_error(
        Env::with_primitives(),
        "",
        "let (x) = ()",
        &[
            "1:4 error: expected (_), given ()",
            " | let (x) = ()",
            " |     ^~~",
        ],
    );
}

#[test]
fn expr_arg_mismatch() {
    let mut registry = NativeRegistry::new();
    registry.add_type::<i32>("i32");
    registry.add_move_type::<String>("string");
    registry.add_fn("f", |_: i32| {});
    check_error(
        Env::new(registry),
        "",
        "f('abc')",
        &[
            "1:2 error: expected string, given i32",
            " | f('abc')",
            " |   ^~~~~",
        ],
    );
}

#[test]
fn to_string_basic() {
    let ex = make_seq_executor();
    let mut env = Env::with_primitives();
    let mut bindings = Bindings::new();
    assert_eq!(env.run_to_string(&ex, &mut bindings, "1").expect("run"), "1");
}

#[test]
fn to_string_fn_result() {
    let ex = make_seq_executor();
    let mut env = Env::with_primitives();
    env.parse_scripts(&["fn f() -> string = 'abc'"]).expect("parse");
    let mut bindings = Bindings::new();
    assert_eq!(
        env.run_to_string(&ex, &mut bindings, "f()").expect("run"),
        "abc"
    );
}

#[test]
fn copy_binding_survives() {
    let ex = make_seq_executor();
    let mut env = Env::with_primitives();
    let mut bindings = Bindings::new();

    assign(&mut env, &mut bindings, "let x = 3");
    let first = env.run(&ex, &mut bindings, "x").expect("run");
    assert_eq!(await_binding(first)[0].downcast_ref::<i32>(), Some(&3));
    let second = env.run(&ex, &mut bindings, "x").expect("run");
    assert_eq!(await_binding(second)[0].downcast_ref::<i32>(), Some(&3));
}

#[test]
fn move_binding_is_extracted() {
    let ex = make_seq_executor();
    let mut env = Env::with_primitives();
    let mut bindings = Bindings::new();

    assign(&mut env, &mut bindings, "let x = 'abc'");
    let result = env.run(&ex, &mut bindings, "x").expect("run");
    assert_eq!(
        await_binding(result)[0].downcast_ref::<String>().map(String::as_str),
        Some("abc")
    );

    let errs = env.run(&ex, &mut bindings, "x").expect_err("moved out");
    assert_eq!(errs.lines[0], "1:0 error: use of undeclared binding 'x'");
}

#[test]
fn assign_env_fn_to_binding() {
    let ex = make_seq_executor();
    let mut registry = NativeRegistry::new();
    registry.add_type::<i32>("i32");
    registry.add_fn("f", || 3_i32);
    let mut env = Env::new(registry);
    let mut bindings = Bindings::new();

    assign(&mut env, &mut bindings, "let f2 = f");
    let result = env.run(&ex, &mut bindings, "f2()").expect("run");
    assert_eq!(await_binding(result)[0].downcast_ref::<i32>(), Some(&3));
}

#[test]
fn assign_script_fn_to_binding() {
    let ex = make_seq_executor();
    let mut env = Env::with_primitives();
    env.parse_scripts(&["fn f() -> i32 = 3"]).expect("parse");
    let mut bindings = Bindings::new();

    assign(&mut env, &mut bindings, "let f2 = f");
    let result = env.run(&ex, &mut bindings, "f2()").expect("run");
    assert_eq!(await_binding(result)[0].downcast_ref::<i32>(), Some(&3));
}

#[test]
fn reuse_borrowed_binding() {
    let ex = make_seq_executor();
    let mut env = Env::with_primitives();
    let mut bindings = Bindings::new();

    assign(&mut env, &mut bindings, "let x = 'abc'");
    for _ in 0..2 {
        let result = env.run(&ex, &mut bindings, "clone(&x)").expect("run");
        assert_eq!(
            await_binding(result)[0].downcast_ref::<String>().map(String::as_str),
            Some("abc")
        );
        assert!(bindings.contains_key("x"));
    }
}

#[test]
fn reuse_to_string_binding() {
    let ex = make_seq_executor();
    let mut env = Env::with_primitives();
    let mut bindings = Bindings::new();

    assert_eq!(
        env.run_to_string(&ex, &mut bindings, "let x = 1").expect("run"),
        ""
    );
    assert_eq!(env.run_to_string(&ex, &mut bindings, "x").expect("run"), "1");
    assert_eq!(env.run_to_string(&ex, &mut bindings, "x").expect("run"), "1");
}

#[test]
fn reuse_assign_binding_indirect() {
    let ex = make_seq_executor();
    let mut env = Env::with_primitives();
    let mut bindings = Bindings::new();

    assign(&mut env, &mut bindings, "let x = 1");
    assign(&mut env, &mut bindings, "let y = clone(&x)");
    assign(&mut env, &mut bindings, "let z = clone(&x)");
    let result = env.run(&ex, &mut bindings, "(x, y, z)").expect("run");
    assert_eq!(env.pretty_print(result.ty), "(i32, i32, i32)");
    let values = await_binding(result);
    for v in values {
        assert_eq!(v.downcast_ref::<i32>(), Some(&1));
    }
}

#[test]
fn tuple_untuple() {
    let ex = make_seq_executor();
    let mut env = Env::with_primitives();
    let mut bindings = Bindings::new();

    assign(&mut env, &mut bindings, "let x = 3");
    assign(&mut env, &mut bindings, "let y = 'abc'");
    assign(&mut env, &mut bindings, "let z = (x, y)");
    assign(&mut env, &mut bindings, "let (a, b) = z");
    let result = env.run(&ex, &mut bindings, "(a, b)").expect("run");
    assert_eq!(env.pretty_print(result.ty), "(i32, string)");
    let values = await_binding(result);
    assert_eq!(values[0].downcast_ref::<i32>(), Some(&3));
    assert_eq!(values[1].downcast_ref::<String>().map(String::as_str), Some("abc"));
}

#[test]
fn overwrite_binding() {
    let ex = make_seq_executor();
    let mut env = Env::with_primitives();
    let mut bindings = Bindings::new();

    assign(&mut env, &mut bindings, "let x = 3");
    assign(&mut env, &mut bindings, "let x = 4");
    let result = env.run(&ex, &mut bindings, "x").expect("run");
    assert_eq!(await_binding(result)[0].downcast_ref::<i32>(), Some(&4));
}

#[test]
fn overloaded_fn_binding_is_ambiguous() {
    let ex = make_seq_executor();
    let mut registry = NativeRegistry::new();
    registry.add_type::<i32>("i32");
    registry.add_fn("f", || 1_i32);
    let mut env = Env::new(registry);
    let mut bindings = Bindings::new();

    assign(&mut env, &mut bindings, "let f = 1");
    let errs = env.run(&ex, &mut bindings, "f").expect_err("ambiguous");
    assert_eq!(errs.lines[0], "1:0 error: function call is ambiguous");
    assert!(errs.lines.iter().any(|l| l.contains("2 candidate(s)")));
}

#[test]
fn print_fn_value_is_an_error() {
    let ex = make_seq_executor();
    let mut registry = NativeRegistry::new();
    registry.add_type::<i32>("i32");
    registry.add_fn("f", || 1_i32);
    let mut env = Env::new(registry);
    let mut bindings = Bindings::new();

    env.run_to_string(&ex, &mut bindings, "f").expect_err("no to_string for fns");
}

#[test]
fn parse_error_leaves_env_unchanged() {
    let mut env = Env::with_primitives();
    let before = env.globals().len();
    env.parse_scripts(&["fn f() -> i32 = "]).expect_err("parse error");
    assert_eq!(env.globals().len(), before);

    env.parse_scripts(&["fn f() -> i32 = 3"]).expect("parse");
    assert_eq!(env.globals().len(), before + 1);
}

#[test]
fn generic_fn_instantiates_per_call_site() {
    let ex = make_seq_executor();
    let mut env = Env::with_primitives();
    env.parse_scripts(&[
        "fn f(x: &_) -> string = to_string(x)\nfn g(x: i32) -> string = f(&x)",
    ])
    .expect("parse");

    let mut bindings = Bindings::new();
    let result = env.run(&ex, &mut bindings, "(g(3), f(&0.5))").expect("run");
    assert_eq!(env.pretty_print(result.ty), "(string, string)");
    let values = await_binding(result);
    assert_eq!(values[0].downcast_ref::<String>().map(String::as_str), Some("3"));
    assert_eq!(values[1].downcast_ref::<String>().map(String::as_str), Some("0.5"));
}

#[test]
fn executors_agree() {
    let executors: Vec<ExecutorRef> = vec![
        make_seq_executor(),
        make_task_executor(4),
        make_tokio_executor(2),
    ];

    for ex in executors {
        let mut registry = NativeRegistry::new();
        registry.add_type::<i32>("i32");
        registry.add_fn("sum", |x: i32, y: i32| x + y);
        let mut env = Env::new(registry);
        env.parse_scripts(&["fn f(x: i32, y: i32) -> i32 = sum(sum(x, y), y)"])
            .expect("parse");

        let mut bindings = Bindings::new();
        let result = env.run(&ex, &mut bindings, "f(5, 6)").expect("run");
        assert_eq!(await_binding(result)[0].downcast_ref::<i32>(), Some(&17));
    }
}

#[test]
fn type_check_entry_points() {
    let mut env = Env::with_primitives();
    env.type_check_expr("(1, 'a')").expect("expr");
    env.type_check_fn("fn f(x: i32) -> i32 = x").expect("fn");
    env.type_check_binding("x: (i32, string)").expect("binding");
    env.type_check_expr("nope").expect_err("undeclared");
}
