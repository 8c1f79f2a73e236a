use std::collections::HashMap;

use ooze_ast::TypeRef;
use ooze_rt::{borrow, BorrowedFuture, Future};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum BindingState {
    Ready,
    Borrowed,
    NotReady,
}

/// A value held by the REPL between evaluations: either an owned future or
/// a borrowed read handle plus the post future returning the value.
#[derive(Debug)]
pub struct AsyncValue {
    future: Option<Future>,
    borrowed: Option<BorrowedFuture>,
}

impl From<Future> for AsyncValue {
    fn from(future: Future) -> Self {
        Self {
            future: Some(future),
            borrowed: None,
        }
    }
}

impl AsyncValue {
    /// Share the value; the owned future becomes the post future.
    pub fn borrow(&mut self) -> BorrowedFuture {
        if self.borrowed.is_none() {
            let (bf, post) = borrow(self.future.take().expect("value present"));
            self.borrowed = Some(bf);
            self.future = Some(post);
        }
        self.borrowed.as_ref().expect("just borrowed").clone()
    }

    /// Consume the value, releasing our own read handle first.
    pub fn take(mut self) -> Future {
        self.borrowed.take();
        self.future.take().expect("value present")
    }

    pub fn state(&self) -> BindingState {
        if self.borrowed.is_some() {
            BindingState::Borrowed
        } else if self.future.as_ref().is_some_and(Future::is_ready) {
            BindingState::Ready
        } else {
            BindingState::NotReady
        }
    }

    /// Block until the value is back in hand and ready.
    pub fn await_ready(mut self) -> AsyncValue {
        self.borrowed.take();
        let value = self.future.take().expect("value present").wait();
        AsyncValue::from(Future::ready(value))
    }
}

#[derive(Debug)]
pub struct Binding {
    pub ty: TypeRef,
    pub values: Vec<AsyncValue>,
}

impl Binding {
    pub fn state(&self) -> BindingState {
        self.values
            .iter()
            .map(AsyncValue::state)
            .max()
            .unwrap_or(BindingState::Ready)
    }
}

pub type Bindings = HashMap<String, Binding>;
