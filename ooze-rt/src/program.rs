use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::executor::ExecutorRef;
use crate::future::{borrow, promise, BorrowedFuture, Future, Promise};
use crate::graph::{FunctionGraph, Oterm, PassBy};
use crate::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Inst(pub u32);

pub type NativeImpl = Arc<dyn Fn(Vec<Value>, Vec<&Value>) -> Vec<Value> + Send + Sync>;

pub enum InstData {
    /// Produce a constant.
    Value(Value),
    /// A native function; `borrows` marks which language-level parameters
    /// arrive as borrowed futures.
    NativeFn {
        f: NativeImpl,
        borrows: Vec<bool>,
        output_count: u32,
    },
    /// A nested dataflow graph.
    Graph(Arc<FunctionGraph>),
    /// Fix leading value inputs of another instruction.
    Curry { inst: Inst, values: Vec<Value> },
    /// First input is a function value, the rest are forwarded as arguments.
    Functional { output_count: u32 },
    /// First input is a bool, followed by two equal-arity branches; forwards
    /// the chosen branch's values.
    Select,
    /// Invoke one of two sub-functions based on a bool condition.
    If {
        output_count: u32,
        on_true: Inst,
        on_false: Inst,
    },
    /// Loop a body returning `(done, state...)` until done, reusing the
    /// borrowed inputs each iteration.
    Converge,
    /// Reserved handle, set later; supports forward references.
    Placeholder,
}

/// Append-only instruction pool.
#[derive(Default)]
pub struct Program {
    insts: RwLock<Vec<InstData>>,
}

impl Program {
    pub fn new() -> Arc<Program> {
        Arc::new(Program::default())
    }

    pub fn add(&self, data: InstData) -> Inst {
        let mut insts = self.insts.write().expect("program lock");
        let inst = Inst(insts.len() as u32);
        insts.push(data);
        inst
    }

    /// Fulfil a placeholder.
    pub fn set(&self, inst: Inst, data: InstData) {
        let mut insts = self.insts.write().expect("program lock");
        insts[inst.0 as usize] = data;
    }

    pub fn len(&self) -> usize {
        self.insts.read().expect("program lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fetch(&self, inst: Inst) -> Snapshot {
        let insts = self.insts.read().expect("program lock");
        match &insts[inst.0 as usize] {
            InstData::Value(v) => Snapshot::Value(
                v.try_clone()
                    .expect("value instructions hold copyable values"),
            ),
            InstData::NativeFn {
                f,
                borrows,
                output_count,
            } => Snapshot::NativeFn {
                f: f.clone(),
                borrows: borrows.clone(),
                output_count: *output_count,
            },
            InstData::Graph(g) => Snapshot::Graph(g.clone()),
            InstData::Curry { inst, values } => Snapshot::Curry {
                inst: *inst,
                values: values
                    .iter()
                    .map(|v| v.try_clone().expect("curried values are copyable"))
                    .collect(),
            },
            InstData::Functional { output_count } => Snapshot::Functional {
                output_count: *output_count,
            },
            InstData::Select => Snapshot::Select,
            InstData::If {
                output_count,
                on_true,
                on_false,
            } => Snapshot::If {
                output_count: *output_count,
                on_true: *on_true,
                on_false: *on_false,
            },
            InstData::Converge => Snapshot::Converge,
            InstData::Placeholder => panic!("executed an unfulfilled placeholder"),
        }
    }
}

enum Snapshot {
    Value(Value),
    NativeFn {
        f: NativeImpl,
        borrows: Vec<bool>,
        output_count: u32,
    },
    Graph(Arc<FunctionGraph>),
    Curry {
        inst: Inst,
        values: Vec<Value>,
    },
    Functional {
        output_count: u32,
    },
    Select,
    If {
        output_count: u32,
        on_true: Inst,
        on_false: Inst,
    },
    Converge,
}

/// An instruction handle plus its program: callable with value and borrowed
/// inputs, yielding one future per output.
#[derive(Clone)]
pub struct AsyncFn {
    pub program: Arc<Program>,
    pub inst: Inst,
}

impl AsyncFn {
    pub fn new(program: Arc<Program>, inst: Inst) -> Self {
        Self { program, inst }
    }

    pub fn call(
        &self,
        ex: &ExecutorRef,
        futures: Vec<Future>,
        borrowed: Vec<BorrowedFuture>,
    ) -> Vec<Future> {
        execute(&self.program, self.inst, ex, futures, borrowed)
    }
}

fn make_outputs(count: usize) -> (Vec<Promise>, Vec<Future>) {
    (0..count).map(|_| promise()).unzip()
}

type GatherAction = Box<dyn FnOnce(Vec<Value>, Vec<BorrowedFuture>) + Send>;

struct Gather {
    slots: Vec<Option<Value>>,
    borrowed: Vec<BorrowedFuture>,
    missing: usize,
    action: Option<GatherAction>,
}

fn gather_done(state: &Arc<std::sync::Mutex<Gather>>) {
    let ready = {
        let mut g = state.lock().expect("gather lock");
        g.missing -= 1;
        if g.missing > 0 {
            None
        } else {
            let action = g.action.take().expect("gather runs once");
            let values = g.slots.drain(..).map(|v| v.expect("slot filled")).collect();
            let borrowed = std::mem::take(&mut g.borrowed);
            Some((action, values, borrowed))
        }
    };
    if let Some((action, values, borrowed)) = ready {
        action(values, borrowed);
    }
}

/// Run `action` once every future has resolved and every borrow is ready.
fn gather(
    futures: Vec<Future>,
    borrowed: Vec<BorrowedFuture>,
    action: impl FnOnce(Vec<Value>, Vec<BorrowedFuture>) + Send + 'static,
) {
    let missing = futures.len() + borrowed.len();
    if missing == 0 {
        action(Vec::new(), Vec::new());
        return;
    }

    let state = Arc::new(std::sync::Mutex::new(Gather {
        slots: futures.iter().map(|_| None).collect(),
        borrowed: borrowed.clone(),
        missing,
        action: Some(Box::new(action)),
    }));

    for (i, f) in futures.into_iter().enumerate() {
        let state = state.clone();
        f.on_ready(move |value| {
            state.lock().expect("gather lock").slots[i] = Some(value);
            gather_done(&state);
        });
    }
    for bf in borrowed {
        let state = state.clone();
        bf.on_ready(move |_| gather_done(&state));
    }
}

pub fn execute(
    program: &Arc<Program>,
    inst: Inst,
    ex: &ExecutorRef,
    mut futures: Vec<Future>,
    borrowed: Vec<BorrowedFuture>,
) -> Vec<Future> {
    match program.fetch(inst) {
        Snapshot::Value(value) => {
            debug_assert!(futures.is_empty() && borrowed.is_empty());
            vec![Future::ready(value)]
        }

        Snapshot::NativeFn {
            f, output_count, ..
        } => {
            let (promises, outs) = make_outputs(output_count as usize);
            let ex = ex.clone();
            gather(futures, borrowed, move |values, borrowed| {
                ex.spawn(Box::new(move || {
                    let refs: Vec<&Value> = borrowed
                        .iter()
                        .map(|b| b.get().expect("gathered borrow is ready"))
                        .collect();
                    let results = f(values, refs);
                    assert_eq!(results.len(), promises.len());
                    for (value, p) in results.into_iter().zip(promises) {
                        p.send(value);
                    }
                }));
            });
            outs
        }

        Snapshot::Graph(g) => run_graph(program, &g, ex, futures, borrowed),

        Snapshot::Curry { inst, values } => {
            let mut curried: Vec<Future> = values.into_iter().map(Future::ready).collect();
            curried.append(&mut futures);
            execute(program, inst, ex, curried, borrowed)
        }

        Snapshot::Functional { output_count } => {
            let (promises, outs) = make_outputs(output_count as usize);
            let callee = futures.remove(0);
            let ex = ex.clone();
            callee.on_ready(move |value| {
                let f: AsyncFn = value
                    .downcast()
                    .unwrap_or_else(|_| panic!("callee is not a function value"));
                let results = f.call(&ex, futures, borrowed);
                assert_eq!(results.len(), promises.len());
                for (out, p) in results.into_iter().zip(promises) {
                    out.forward(p);
                }
            });
            outs
        }

        Snapshot::Select => {
            assert!(borrowed.is_empty(), "select branches pass by value");
            let cond = futures.remove(0);
            assert_eq!(futures.len() % 2, 0, "select branches have equal arity");
            let arity = futures.len() / 2;
            let (promises, outs) = make_outputs(arity);
            cond.on_ready(move |value| {
                let which = value
                    .downcast::<bool>()
                    .unwrap_or_else(|_| panic!("select condition is not a bool"));
                let else_half = futures.split_off(arity);
                let (chosen, other) = if which {
                    (futures, else_half)
                } else {
                    (else_half, futures)
                };
                // The untaken branch still gets consumed; its futures drop here.
                drop(other);
                for (f, p) in chosen.into_iter().zip(promises) {
                    f.forward(p);
                }
            });
            outs
        }

        Snapshot::If {
            output_count,
            on_true,
            on_false,
        } => {
            let (promises, outs) = make_outputs(output_count as usize);
            let cond = futures.remove(0);
            let ex = ex.clone();
            let program = program.clone();
            cond.on_ready(move |value| {
                let which = value
                    .downcast::<bool>()
                    .unwrap_or_else(|_| panic!("if condition is not a bool"));
                let inst = if which { on_true } else { on_false };
                let results = execute(&program, inst, &ex, futures, borrowed);
                assert_eq!(results.len(), promises.len());
                for (out, p) in results.into_iter().zip(promises) {
                    out.forward(p);
                }
            });
            outs
        }

        Snapshot::Converge => {
            let body_future = futures.remove(0);
            let done = futures.remove(0);
            let state = futures;
            let (promises, outs) = make_outputs(state.len());
            let ex = ex.clone();
            body_future.on_ready(move |value| {
                let body: AsyncFn = value
                    .downcast()
                    .unwrap_or_else(|_| panic!("converge body is not a function value"));
                converge_step(ex, body, done, state, borrowed, promises);
            });
            outs
        }
    }
}

fn converge_step(
    ex: ExecutorRef,
    body: AsyncFn,
    done: Future,
    state: Vec<Future>,
    borrowed: Vec<BorrowedFuture>,
    promises: Vec<Promise>,
) {
    done.on_ready(move |value| {
        let finished = value
            .downcast::<bool>()
            .unwrap_or_else(|_| panic!("converge flag is not a bool"));
        if finished {
            for (f, p) in state.into_iter().zip(promises) {
                f.forward(p);
            }
        } else {
            let mut results = body.call(&ex, state, borrowed.clone());
            let next_done = results.remove(0);
            converge_step(ex, body, next_done, results, borrowed, promises);
        }
    });
}

#[derive(Clone, Copy, Default)]
struct TermUse {
    moves: u32,
    copies: u32,
    borrows: u32,
}

impl TermUse {
    fn total(&self) -> u32 {
        self.moves + self.copies + self.borrows
    }
}

enum Slot {
    Owned(Future),
    Shared {
        bf: BorrowedFuture,
        post: Option<Future>,
    },
    SharedInput(BorrowedFuture),
    Taken,
}

fn ensure_shared(slot: &mut Slot) {
    if let Slot::Owned(_) = slot {
        let Slot::Owned(f) = std::mem::replace(slot, Slot::Taken) else {
            unreachable!()
        };
        let (bf, post) = borrow(f);
        *slot = Slot::Shared {
            bf,
            post: Some(post),
        };
    }
}

fn consume(slots: &mut HashMap<Oterm, Slot>, uses: &TermUse, term: Oterm, pass_by: PassBy) -> Consumed {
    let slot = slots.get_mut(&term).expect("terminal has a producer");
    match pass_by {
        PassBy::Move => {
            if uses.total() > 1 {
                // Other consumers share this terminal; the move receives the
                // value only after their read handles release.
                ensure_shared(slot);
            }
            match std::mem::replace(slot, Slot::Taken) {
                Slot::Owned(f) => Consumed::Future(f),
                Slot::Shared { bf, post } => {
                    let post = post.expect("moved terminal was already moved");
                    // Keep the read handle alive in the slot until wiring
                    // ends so later copy/borrow edges can still attach.
                    *slot = Slot::Shared { bf, post: None };
                    Consumed::Future(post)
                }
                Slot::SharedInput(_) => panic!("cannot move out of a borrowed input"),
                Slot::Taken => panic!("terminal moved twice"),
            }
        }
        PassBy::Copy => match slot {
            Slot::Owned(_) if uses.total() == 1 => {
                let Slot::Owned(f) = std::mem::replace(slot, Slot::Taken) else {
                    unreachable!()
                };
                Consumed::Future(f)
            }
            Slot::SharedInput(bf) => Consumed::Future(bf.cloned()),
            _ => {
                ensure_shared(slot);
                let Slot::Shared { bf, .. } = slot else {
                    panic!("terminal consumed after move")
                };
                Consumed::Future(bf.cloned())
            }
        },
        PassBy::Borrow => match slot {
            Slot::SharedInput(bf) => Consumed::Borrowed(bf.clone()),
            _ => {
                ensure_shared(slot);
                let Slot::Shared { bf, .. } = slot else {
                    panic!("terminal borrowed after move")
                };
                Consumed::Borrowed(bf.clone())
            }
        },
    }
}

enum Consumed {
    Future(Future),
    Borrowed(BorrowedFuture),
}

fn run_graph(
    program: &Arc<Program>,
    g: &Arc<FunctionGraph>,
    ex: &ExecutorRef,
    value_inputs: Vec<Future>,
    borrow_inputs: Vec<BorrowedFuture>,
) -> Vec<Future> {
    // Count consumers of every terminal up front; the copy strategy depends
    // on whether a terminal is shared.
    let mut uses: HashMap<Oterm, TermUse> = HashMap::new();
    for node in &g.nodes {
        for (term, pass_by) in &node.inputs {
            let u = uses.entry(*term).or_default();
            match pass_by {
                PassBy::Move => u.moves += 1,
                PassBy::Copy => u.copies += 1,
                PassBy::Borrow => u.borrows += 1,
            }
        }
    }
    for (term, pass_by) in &g.outputs {
        let u = uses.entry(*term).or_default();
        match pass_by {
            PassBy::Move => u.moves += 1,
            PassBy::Copy => u.copies += 1,
            PassBy::Borrow => u.borrows += 1,
        }
    }

    let mut slots: HashMap<Oterm, Slot> = HashMap::new();
    let mut values = value_inputs.into_iter();
    let mut borrows = borrow_inputs.into_iter();
    for (port, is_borrow) in g.input_borrows.iter().enumerate() {
        let term = Oterm {
            node: 0,
            port: port as u32,
        };
        let slot = if *is_borrow {
            Slot::SharedInput(borrows.next().expect("missing borrowed input"))
        } else {
            Slot::Owned(values.next().expect("missing value input"))
        };
        slots.insert(term, slot);
    }
    assert!(values.next().is_none(), "too many value inputs");
    assert!(borrows.next().is_none(), "too many borrowed inputs");

    for (i, node) in g.nodes.iter().enumerate() {
        let mut futures = Vec::new();
        let mut borrowed = Vec::new();
        for (term, pass_by) in &node.inputs {
            let u = uses.get(term).copied().unwrap_or_default();
            match consume(&mut slots, &u, *term, *pass_by) {
                Consumed::Future(f) => futures.push(f),
                Consumed::Borrowed(bf) => borrowed.push(bf),
            }
        }

        let outs = execute(program, node.inst, ex, futures, borrowed);
        assert_eq!(outs.len(), node.output_count as usize);
        for (port, f) in outs.into_iter().enumerate() {
            slots.insert(
                Oterm {
                    node: i as u32 + 1,
                    port: port as u32,
                },
                Slot::Owned(f),
            );
        }
    }

    let mut results = Vec::with_capacity(g.outputs.len());
    for (term, pass_by) in &g.outputs {
        let u = uses.get(term).copied().unwrap_or_default();
        match consume(&mut slots, &u, *term, *pass_by) {
            Consumed::Future(f) => results.push(f),
            Consumed::Borrowed(_) => unreachable!("graph outputs cannot be borrowed"),
        }
    }

    // Dropping the remaining slots releases our read handles; borrowed
    // values return to their owners once all consumers finish.
    drop(slots);
    results
}
