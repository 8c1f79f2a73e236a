use std::sync::{Arc, Condvar, Mutex, OnceLock};

use crate::value::Value;

type Callback = Box<dyn FnOnce(Value) + Send>;

struct Channel {
    state: Mutex<ChannelState>,
    cv: Condvar,
}

struct ChannelState {
    value: Option<Value>,
    callback: Option<Callback>,
    poisoned: bool,
}

/// Write end of a single-producer single-consumer slot.
pub struct Promise {
    ch: Arc<Channel>,
    sent: bool,
}

/// Read end of a single-producer single-consumer slot. Linear: produced
/// once, consumed at most once.
pub struct Future {
    ch: Arc<Channel>,
}

impl std::fmt::Debug for Future {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Future").finish_non_exhaustive()
    }
}

pub fn promise() -> (Promise, Future) {
    let ch = Arc::new(Channel {
        state: Mutex::new(ChannelState {
            value: None,
            callback: None,
            poisoned: false,
        }),
        cv: Condvar::new(),
    });
    (
        Promise {
            ch: ch.clone(),
            sent: false,
        },
        Future { ch },
    )
}

impl Promise {
    pub fn send(mut self, value: Value) {
        self.sent = true;
        let callback = {
            let mut state = self.ch.state.lock().expect("future lock");
            match state.callback.take() {
                Some(cb) => Some(cb),
                None => {
                    state.value = Some(value);
                    self.ch.cv.notify_all();
                    return;
                }
            }
        };
        if let Some(cb) = callback {
            cb(value);
        }
    }
}

impl Drop for Promise {
    fn drop(&mut self) {
        if self.sent {
            return;
        }
        // The producer went away; poison the slot so consumers don't hang.
        let mut state = self.ch.state.lock().expect("future lock");
        state.poisoned = true;
        state.callback = None;
        self.ch.cv.notify_all();
    }
}

impl Future {
    pub fn ready(value: Value) -> Future {
        let (p, f) = promise();
        p.send(value);
        f
    }

    /// Whether the value has already arrived.
    pub fn is_ready(&self) -> bool {
        self.ch.state.lock().expect("future lock").value.is_some()
    }

    /// Block until the value arrives.
    pub fn wait(self) -> Value {
        let mut state = self.ch.state.lock().expect("future lock");
        loop {
            if let Some(value) = state.value.take() {
                return value;
            }
            if state.poisoned {
                panic!("awaited a poisoned future");
            }
            state = self.ch.cv.wait(state).expect("future lock");
        }
    }

    /// Run `f` with the value once it arrives, on whichever thread fulfils
    /// the promise (or immediately when already fulfilled).
    pub fn on_ready(self, f: impl FnOnce(Value) + Send + 'static) {
        let value = {
            let mut state = self.ch.state.lock().expect("future lock");
            match state.value.take() {
                Some(value) => Some(value),
                None => {
                    if !state.poisoned {
                        state.callback = Some(Box::new(f));
                    }
                    return;
                }
            }
        };
        if let Some(value) = value {
            f(value);
        }
    }

    pub fn then(self, f: impl FnOnce(Value) -> Value + Send + 'static) -> Future {
        let (p, out) = promise();
        self.on_ready(move |value| p.send(f(value)));
        out
    }

    /// Forward this future's value into an existing promise.
    pub fn forward(self, p: Promise) {
        self.on_ready(move |value| p.send(value));
    }
}

struct BorrowCore {
    value: OnceLock<Value>,
    waiters: Mutex<BorrowWaiters>,
    cv: Condvar,
    post: Mutex<Option<Promise>>,
}

struct BorrowWaiters {
    ready: bool,
    callbacks: Vec<Box<dyn FnOnce() + Send>>,
}

impl Drop for BorrowCore {
    fn drop(&mut self) {
        // All read handles are gone. Return the value to the owner; if the
        // producer never resolved the post promise drops and poisons.
        let post = self.post.lock().expect("borrow lock").take();
        if let (Some(post), Some(value)) = (post, self.value.take()) {
            post.send(value);
        }
    }
}

/// A ref-counted read capability over a future-backed value. Cloning shares
/// the capability; the underlying value is released to the post future once
/// every clone has dropped.
#[derive(Clone)]
pub struct BorrowedFuture {
    core: Arc<BorrowCore>,
}

impl std::fmt::Debug for BorrowedFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BorrowedFuture").finish_non_exhaustive()
    }
}

/// Split a future into a shared read handle and the post future carrying the
/// value back out once all read handles are released.
pub fn borrow(f: Future) -> (BorrowedFuture, Future) {
    let (post_promise, post_future) = promise();
    let core = Arc::new(BorrowCore {
        value: OnceLock::new(),
        waiters: Mutex::new(BorrowWaiters {
            ready: false,
            callbacks: Vec::new(),
        }),
        cv: Condvar::new(),
        post: Mutex::new(Some(post_promise)),
    });

    let writer = core.clone();
    f.on_ready(move |value| {
        writer
            .value
            .set(value)
            .unwrap_or_else(|_| panic!("borrowed value set twice"));
        let callbacks = {
            let mut waiters = writer.waiters.lock().expect("borrow lock");
            waiters.ready = true;
            writer.cv.notify_all();
            std::mem::take(&mut waiters.callbacks)
        };
        for cb in callbacks {
            cb();
        }
    });

    (BorrowedFuture { core }, post_future)
}

impl BorrowedFuture {
    /// The borrowed value, if it has arrived.
    pub fn get(&self) -> Option<&Value> {
        self.core.value.get()
    }

    /// Block until the borrowed value is available.
    pub fn wait_ready(&self) -> &Value {
        let mut waiters = self.core.waiters.lock().expect("borrow lock");
        while !waiters.ready {
            waiters = self.core.cv.wait(waiters).expect("borrow lock");
        }
        drop(waiters);
        self.core.value.get().expect("ready borrow has a value")
    }

    /// Run `f` once the borrowed value is available. The handle clone held
    /// by the callback is released when it completes.
    pub fn on_ready(&self, f: impl FnOnce(&BorrowedFuture) + Send + 'static) {
        let this = self.clone();
        let mut waiters = self.core.waiters.lock().expect("borrow lock");
        if waiters.ready {
            drop(waiters);
            f(&this);
        } else {
            waiters.callbacks.push(Box::new(move || f(&this)));
        }
    }

    /// A future resolving to `f(&value)` once the value is available.
    pub fn then(&self, f: impl FnOnce(&Value) -> Value + Send + 'static) -> Future {
        let (p, out) = promise();
        self.on_ready(move |this| {
            let value = this.get().expect("ready borrow has a value");
            p.send(f(value));
        });
        out
    }

    /// A future resolving to a clone of the borrowed value.
    pub fn cloned(&self) -> Future {
        self.then(|value| {
            value
                .try_clone()
                .expect("pass-by-copy requires a copyable value")
        })
    }
}
