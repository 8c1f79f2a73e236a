#![forbid(unsafe_code)]

mod bindings;
mod env;
mod errors;
pub mod prelude;
mod registry;

pub use bindings::{AsyncValue, Binding, BindingState, Bindings};
pub use env::Env;
pub use errors::Errors;
pub use registry::{ByRef, ByValue, NativeCallable, NativeRegistry, NativeSignature};

pub use ooze_ast::TypeRef;
pub use ooze_rt::{
    make_seq_executor, make_task_executor, make_tokio_executor, ExecutorRef, Future, Value,
};
