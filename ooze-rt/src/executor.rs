use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

pub type Task = Box<dyn FnOnce() + Send>;

/// The capability the runtime needs from a scheduler: accept a task. The
/// runtime makes no work-stealing assumption; correctness holds on a
/// single-threaded executor that never preempts.
pub trait Executor: Send + Sync {
    fn spawn(&self, task: Task);
}

/// A non-owning handle; clones keep the underlying executor alive.
pub type ExecutorRef = Arc<dyn Executor>;

struct SeqExecutor;

impl Executor for SeqExecutor {
    fn spawn(&self, task: Task) {
        task();
    }
}

/// An executor that runs every task inline on the calling thread.
pub fn make_seq_executor() -> ExecutorRef {
    Arc::new(SeqExecutor)
}

struct PoolShared {
    queues: Vec<Mutex<VecDeque<Task>>>,
    sync: Mutex<PoolSync>,
    cv: Condvar,
}

struct PoolSync {
    pending: usize,
    shutdown: bool,
}

struct TaskExecutor {
    shared: Arc<PoolShared>,
    next: AtomicUsize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Executor for TaskExecutor {
    fn spawn(&self, task: Task) {
        let n = self.shared.queues.len();
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % n;
        self.shared.queues[slot]
            .lock()
            .expect("task queue lock")
            .push_back(task);
        let mut sync = self.shared.sync.lock().expect("pool lock");
        sync.pending += 1;
        drop(sync);
        self.shared.cv.notify_one();
    }
}

impl Drop for TaskExecutor {
    fn drop(&mut self) {
        {
            let mut sync = self.shared.sync.lock().expect("pool lock");
            sync.shutdown = true;
        }
        self.shared.cv.notify_all();
        for handle in self.workers.lock().expect("worker lock").drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: Arc<PoolShared>, index: usize) {
    loop {
        let task = {
            let mut sync = shared.sync.lock().expect("pool lock");
            loop {
                if sync.pending > 0 {
                    sync.pending -= 1;
                    break;
                }
                if sync.shutdown {
                    return;
                }
                sync = shared.cv.wait(sync).expect("pool lock");
            }
            drop(sync);

            // Own queue first, then steal from the back of the others.
            steal(&shared, index)
        };

        match task {
            Some(task) => task(),
            None => {
                // Give the reservation back; another worker raced us to it.
                let mut sync = shared.sync.lock().expect("pool lock");
                sync.pending += 1;
                drop(sync);
                shared.cv.notify_one();
            }
        }
    }
}

fn steal(shared: &PoolShared, index: usize) -> Option<Task> {
    let n = shared.queues.len();
    if let Some(task) = shared.queues[index]
        .lock()
        .expect("task queue lock")
        .pop_front()
    {
        return Some(task);
    }
    for offset in 1..n {
        let victim = (index + offset) % n;
        if let Some(task) = shared.queues[victim]
            .lock()
            .expect("task queue lock")
            .pop_back()
        {
            return Some(task);
        }
    }
    None
}

/// A work-stealing pool over `n` OS threads (all available parallelism when
/// `n` is zero).
pub fn make_task_executor(n: usize) -> ExecutorRef {
    let n = if n == 0 {
        std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1)
    } else {
        n
    };

    let shared = Arc::new(PoolShared {
        queues: (0..n).map(|_| Mutex::new(VecDeque::new())).collect(),
        sync: Mutex::new(PoolSync {
            pending: 0,
            shutdown: false,
        }),
        cv: Condvar::new(),
    });

    let workers = (0..n)
        .map(|i| {
            let shared = shared.clone();
            std::thread::spawn(move || worker_loop(shared, i))
        })
        .collect();

    Arc::new(TaskExecutor {
        shared,
        next: AtomicUsize::new(0),
        workers: Mutex::new(workers),
    })
}

struct TokioExecutor {
    runtime: tokio::runtime::Runtime,
}

impl Executor for TokioExecutor {
    fn spawn(&self, task: Task) {
        self.runtime.spawn(async move { task() });
    }
}

/// A work-stealing executor backed by an external library runtime (tokio).
pub fn make_tokio_executor(n: usize) -> ExecutorRef {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if n > 0 {
        builder.worker_threads(n);
    }
    let runtime = builder.build().expect("tokio runtime");
    Arc::new(TokioExecutor { runtime })
}
