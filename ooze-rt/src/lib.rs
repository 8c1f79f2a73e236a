#![forbid(unsafe_code)]

mod executor;
mod future;
mod graph;
mod program;
mod value;

pub use executor::{make_seq_executor, make_task_executor, make_tokio_executor, Executor, ExecutorRef, Task};
pub use future::{borrow, promise, BorrowedFuture, Future, Promise};
pub use graph::{ConstructingGraph, FunctionGraph, GraphNode, Oterm, PassBy};
pub use program::{execute, AsyncFn, Inst, InstData, NativeImpl, Program};
pub use value::Value;
