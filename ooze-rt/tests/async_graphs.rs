use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ooze_rt::{
    execute, make_seq_executor, make_task_executor, make_tokio_executor, AsyncFn,
    ConstructingGraph, ExecutorRef, Future, Inst, InstData, PassBy, Program, Value,
};

fn native(
    program: &Program,
    borrows: Vec<bool>,
    output_count: u32,
    f: impl Fn(Vec<Value>, Vec<&Value>) -> Vec<Value> + Send + Sync + 'static,
) -> Inst {
    program.add(InstData::NativeFn {
        f: Arc::new(f),
        borrows,
        output_count,
    })
}

fn run(
    program: &Arc<Program>,
    inst: Inst,
    ex: &ExecutorRef,
    values: Vec<Value>,
    borrows: Vec<Value>,
) -> Vec<Value> {
    let futures = values.into_iter().map(Future::ready).collect();
    let mut posts = Vec::new();
    let borrowed = borrows
        .into_iter()
        .map(|v| {
            let (bf, post) = ooze_rt::borrow(Future::ready(v));
            posts.push(post);
            bf
        })
        .collect();
    let outs = execute(program, inst, ex, futures, borrowed);
    outs.into_iter().map(Future::wait).collect()
}

fn run_seq(program: &Arc<Program>, inst: Inst, values: Vec<Value>, borrows: Vec<Value>) -> Vec<Value> {
    run(program, inst, &make_seq_executor(), values, borrows)
}

fn i32s(values: Vec<Value>) -> Vec<i32> {
    values
        .into_iter()
        .map(|v| v.downcast::<i32>().expect("i32"))
        .collect()
}

#[test]
fn value_instruction() {
    let program = Program::new();
    let inst = program.add(InstData::Value(Value::of(1_i32)));
    assert_eq!(i32s(run_seq(&program, inst, vec![], vec![])), vec![1]);
    // Constants can be produced repeatedly.
    assert_eq!(i32s(run_seq(&program, inst, vec![], vec![])), vec![1]);
}

#[test]
fn native_function_with_values_and_borrows() {
    let program = Program::new();
    let add = native(&program, vec![false, true], 1, |values, borrows| {
        let x = values[0].downcast_ref::<i32>().expect("i32");
        let y = borrows[0].downcast_ref::<i32>().expect("i32");
        vec![Value::of(x + y)]
    });
    assert_eq!(
        i32s(run_seq(&program, add, vec![Value::of(2_i32)], vec![Value::of(7_i32)])),
        vec![9]
    );
}

#[test]
fn curry_fixes_leading_inputs() {
    let program = Program::new();
    let add = native(&program, vec![false, false], 1, |values, _| {
        let x = values[0].downcast_ref::<i32>().expect("i32");
        let y = values[1].downcast_ref::<i32>().expect("i32");
        vec![Value::of(x + y)]
    });
    let add5 = program.add(InstData::Curry {
        inst: add,
        values: vec![Value::of(5_i32)],
    });
    assert_eq!(
        i32s(run_seq(&program, add5, vec![Value::of(6_i32)], vec![])),
        vec![11]
    );
}

#[test]
fn functional_invokes_a_function_value() {
    let program = Program::new();
    let add1 = native(&program, vec![false], 1, |values, _| {
        let x = values[0].downcast_ref::<i32>().expect("i32");
        vec![Value::of(x + 1)]
    });
    let functional = program.add(InstData::Functional { output_count: 1 });

    let f = Value::of(AsyncFn::new(program.clone(), add1));
    assert_eq!(
        i32s(run_seq(&program, functional, vec![f, Value::of(6_i32)], vec![])),
        vec![7]
    );
}

#[test]
fn select_forwards_the_chosen_branch() {
    let program = Program::new();
    let select = program.add(InstData::Select);

    let pick = |cond: bool| {
        i32s(run_seq(
            &program,
            select,
            vec![
                Value::of(cond),
                Value::of(1_i32),
                Value::of(2_i32),
                Value::of(3_i32),
                Value::of(4_i32),
            ],
            vec![],
        ))
    };
    assert_eq!(pick(true), vec![1, 2]);
    assert_eq!(pick(false), vec![3, 4]);
}

#[test]
fn if_invokes_only_one_branch() {
    let program = Program::new();
    let identity = native(&program, vec![false], 1, |values, _| values);
    let add1 = native(&program, vec![false], 1, |values, _| {
        let x = values[0].downcast_ref::<i32>().expect("i32");
        vec![Value::of(x + 1)]
    });
    let if_inst = program.add(InstData::If {
        output_count: 1,
        on_true: identity,
        on_false: add1,
    });

    assert_eq!(
        i32s(run_seq(&program, if_inst, vec![Value::of(true), Value::of(5_i32)], vec![])),
        vec![5]
    );
    assert_eq!(
        i32s(run_seq(&program, if_inst, vec![Value::of(false), Value::of(5_i32)], vec![])),
        vec![6]
    );
}

#[test]
fn converge_threads_state_until_done() {
    let program = Program::new();
    // body(x, &limit) -> (x + 1 >= limit, x + 1)
    let body = native(&program, vec![false, true], 2, |values, borrows| {
        let x = values[0].downcast_ref::<i32>().expect("i32");
        let limit = borrows[0].downcast_ref::<i32>().expect("i32");
        vec![Value::of(x + 1 >= *limit), Value::of(x + 1)]
    });
    let converge = program.add(InstData::Converge);

    let body_value = Value::of(AsyncFn::new(program.clone(), body));
    let outs = run_seq(
        &program,
        converge,
        vec![body_value.try_clone().expect("fn"), Value::of(false), Value::of(5_i32)],
        vec![Value::of(10_i32)],
    );
    assert_eq!(i32s(outs), vec![10]);

    let outs = run_seq(
        &program,
        converge,
        vec![body_value, Value::of(true), Value::of(5_i32)],
        vec![Value::of(10_i32)],
    );
    assert_eq!(i32s(outs), vec![5]);
}

#[derive(Debug)]
struct Sentinel {
    copies: Arc<AtomicUsize>,
}

impl Sentinel {
    fn new() -> (Self, Arc<AtomicUsize>) {
        let copies = Arc::new(AtomicUsize::new(0));
        (
            Self {
                copies: copies.clone(),
            },
            copies,
        )
    }
}

impl Clone for Sentinel {
    fn clone(&self) -> Self {
        self.copies.fetch_add(1, Ordering::SeqCst);
        Self {
            copies: self.copies.clone(),
        }
    }
}

#[test]
fn move_edges_do_not_copy() {
    let program = Program::new();
    let forward = native(&program, vec![false], 1, |values, _| values);

    let (mut cg, inputs) = ConstructingGraph::make(vec![false]);
    let out = cg.add(forward, &[inputs[0]], &[PassBy::Move], 1);
    let out = cg.add(forward, &out, &[PassBy::Move], 1);
    let g = cg.finalize(&out, &[PassBy::Move]);
    let inst = program.add(InstData::Graph(Arc::new(g)));

    let (sentinel, copies) = Sentinel::new();
    let outs = run_seq(&program, inst, vec![Value::of(sentinel)], vec![]);
    assert_eq!(outs.len(), 1);
    assert_eq!(copies.load(Ordering::SeqCst), 0);
}

#[test]
fn copy_edge_copies_once_and_move_still_wins() {
    let program = Program::new();
    let forward = native(&program, vec![false], 1, |values, _| values);

    // One copy consumer plus a direct move to the outputs.
    let (mut cg, inputs) = ConstructingGraph::make(vec![false]);
    let copied = cg.add(forward, &[inputs[0]], &[PassBy::Copy], 1);
    let g = cg.finalize(&[copied[0], inputs[0]], &[PassBy::Move, PassBy::Move]);
    let inst = program.add(InstData::Graph(Arc::new(g)));

    let (sentinel, copies) = Sentinel::new();
    let outs = run_seq(&program, inst, vec![Value::of(sentinel)], vec![]);
    assert_eq!(outs.len(), 2);
    assert_eq!(copies.load(Ordering::SeqCst), 1);
}

#[test]
fn borrowed_value_returns_to_owner_after_release() {
    let program = Program::new();
    let read = native(&program, vec![true], 1, |_, borrows| {
        let x = borrows[0].downcast_ref::<i32>().expect("i32");
        vec![Value::of(x * 2)]
    });

    let (mut cg, inputs) = ConstructingGraph::make(vec![false]);
    let doubled = cg.add(read, &[inputs[0]], &[PassBy::Borrow], 1);
    // The original value is moved out after the borrow releases.
    let g = cg.finalize(&[doubled[0], inputs[0]], &[PassBy::Move, PassBy::Move]);
    let inst = program.add(InstData::Graph(Arc::new(g)));

    let outs = run_seq(&program, inst, vec![Value::of(21_i32)], vec![]);
    assert_eq!(i32s(outs), vec![42, 21]);
}

#[test]
fn move_wired_before_borrow_still_waits_for_release() {
    let program = Program::new();
    let forward = native(&program, vec![false], 1, |values, _| values);
    let read = native(&program, vec![true], 1, |_, borrows| {
        let x = borrows[0].downcast_ref::<i32>().expect("i32");
        vec![Value::of(x * 2)]
    });

    // The moving consumer is wired first; the borrow attaches afterwards and
    // must still observe the value before it is released to the mover.
    let (mut cg, inputs) = ConstructingGraph::make(vec![false]);
    let moved = cg.add(forward, &[inputs[0]], &[PassBy::Move], 1);
    let doubled = cg.add(read, &[inputs[0]], &[PassBy::Borrow], 1);
    let g = cg.finalize(&[moved[0], doubled[0]], &[PassBy::Move, PassBy::Move]);
    let inst = program.add(InstData::Graph(Arc::new(g)));

    let outs = run_seq(&program, inst, vec![Value::of(21_i32)], vec![]);
    assert_eq!(i32s(outs), vec![21, 42]);
}

#[test]
fn nested_graphs_compose() {
    let program = Program::new();
    let add = native(&program, vec![false, false], 1, |values, _| {
        let x = values[0].downcast_ref::<i32>().expect("i32");
        let y = values[1].downcast_ref::<i32>().expect("i32");
        vec![Value::of(x + y)]
    });

    let (mut cg, inputs) = ConstructingGraph::make(vec![false]);
    let doubled = cg.add(add, &[inputs[0], inputs[0]], &[PassBy::Copy, PassBy::Copy], 1);
    let inner = program.add(InstData::Graph(Arc::new(
        cg.finalize(&doubled, &[PassBy::Move]),
    )));

    let (mut cg, inputs) = ConstructingGraph::make(vec![false]);
    let once = cg.add(inner, &[inputs[0]], &[PassBy::Copy], 1);
    let twice = cg.add(inner, &[once[0]], &[PassBy::Copy], 1);
    let outer = program.add(InstData::Graph(Arc::new(
        cg.finalize(&twice, &[PassBy::Move]),
    )));

    assert_eq!(
        i32s(run_seq(&program, outer, vec![Value::of(3_i32)], vec![])),
        vec![12]
    );
}

#[test]
fn outputs_agree_across_executors() {
    let program = Program::new();
    let add = native(&program, vec![false, false], 1, |values, _| {
        let x = values[0].downcast_ref::<i32>().expect("i32");
        let y = values[1].downcast_ref::<i32>().expect("i32");
        vec![Value::of(x + y)]
    });

    // A small diamond: two independent additions joined at the end.
    let (mut cg, inputs) = ConstructingGraph::make(vec![false, false]);
    let left = cg.add(add, &[inputs[0], inputs[1]], &[PassBy::Copy, PassBy::Copy], 1);
    let right = cg.add(add, &[inputs[1], inputs[0]], &[PassBy::Copy, PassBy::Copy], 1);
    let joined = cg.add(add, &[left[0], right[0]], &[PassBy::Move, PassBy::Move], 1);
    let inst = program.add(InstData::Graph(Arc::new(
        cg.finalize(&joined, &[PassBy::Move]),
    )));

    let executors = [
        make_seq_executor(),
        make_task_executor(4),
        make_tokio_executor(2),
    ];
    for ex in &executors {
        let outs = run(
            &program,
            inst,
            ex,
            vec![Value::of(20_i32), Value::of(1_i32)],
            vec![],
        );
        assert_eq!(i32s(outs), vec![42]);
    }
}

#[test]
fn placeholders_support_forward_references() {
    let program = Program::new();
    let placeholder = program.add(InstData::Placeholder);

    // A graph that calls through the placeholder before it is fulfilled.
    let (mut cg, inputs) = ConstructingGraph::make(vec![false]);
    let out = cg.add(placeholder, &[inputs[0]], &[PassBy::Move], 1);
    let outer = program.add(InstData::Graph(Arc::new(cg.finalize(&out, &[PassBy::Move]))));

    let add1 = native(&program, vec![false], 1, |values, _| {
        let x = values[0].downcast_ref::<i32>().expect("i32");
        vec![Value::of(x + 1)]
    });
    program.set(placeholder, InstData::Curry { inst: add1, values: vec![] });

    assert_eq!(
        i32s(run_seq(&program, outer, vec![Value::of(41_i32)], vec![])),
        vec![42]
    );
}

#[test]
fn stress_functional_on_task_executor() {
    let program = Program::new();
    let functional = program.add(InstData::Functional { output_count: 1 });
    let add = native(&program, vec![false, true], 1, |values, borrows| {
        let x = values[0].downcast_ref::<i32>().expect("i32");
        let y = borrows[0].downcast_ref::<i32>().expect("i32");
        vec![Value::of(x + y)]
    });

    let ex = make_task_executor(4);
    for i in 0..100_i32 {
        let f = Value::of(AsyncFn::new(program.clone(), add));
        let outs = run(
            &program,
            functional,
            &ex,
            vec![f, Value::of(5_i32)],
            vec![Value::of(i)],
        );
        assert_eq!(i32s(outs), vec![5 + i]);
    }
}
