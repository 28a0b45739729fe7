use std::io;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, select, Receiver, Sender};
use crossbeam::sync::WaitGroup;
use log::{error, trace};

use super::WorkerFn;
use crate::context::Context;

/// The pool's handle on one running worker.
pub(crate) struct WorkerRecord {
    pub(crate) id: String,
    pub(crate) ctx: Context,
    /// Disconnects once the worker thread has fully exited.
    pub(crate) closed: Receiver<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Running,
    Sleeping,
    Exited,
}

/// Dropped when the worker thread ends, on normal exit or unwind.
struct WorkerExit {
    id: String,
    _closed: Sender<()>,
    _registration: WaitGroup,
}

impl Drop for WorkerExit {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("Worker {} panicked and will not be restarted", self.id);
        } else {
            trace!("Worker {} exited", self.id);
        }
    }
}

/// Spawns the thread for a new worker and returns its record.
///
/// `registration` is held by the thread until it exits, which is what
/// `Pool::close` waits on.
pub(crate) fn spawn_worker(
    id: String,
    ctx: Context,
    f: WorkerFn,
    restart_delay: Duration,
    registration: WaitGroup,
) -> io::Result<WorkerRecord> {
    let (closed_tx, closed_rx) = channel::bounded(0);
    let exit = WorkerExit {
        id: id.clone(),
        _closed: closed_tx,
        _registration: registration,
    };
    let worker_ctx = ctx.clone();

    thread::Builder::new()
        .name(format!("pool-worker-{id}"))
        .spawn(move || {
            let _exit = exit;
            run_worker(&worker_ctx, &f, restart_delay);
        })?;

    Ok(WorkerRecord {
        id,
        ctx,
        closed: closed_rx,
    })
}

/// Invokes `f` until `ctx` is cancelled, pausing `restart_delay` between
/// invocations. A zero delay restarts immediately.
///
/// Panics from `f` are not caught.
fn run_worker(ctx: &Context, f: &WorkerFn, restart_delay: Duration) {
    let id = ctx.worker_id().unwrap_or_default();
    let mut state = WorkerState::Running;

    while state != WorkerState::Exited {
        state = match state {
            WorkerState::Running => {
                f(ctx);
                if ctx.is_cancelled() {
                    WorkerState::Exited
                } else if restart_delay.is_zero() {
                    WorkerState::Running
                } else {
                    WorkerState::Sleeping
                }
            }
            WorkerState::Sleeping => select! {
                recv(ctx.done()) -> _ => WorkerState::Exited,
                recv(channel::after(restart_delay)) -> _ => WorkerState::Running,
            },
            WorkerState::Exited => WorkerState::Exited,
        };

        if state == WorkerState::Running {
            trace!("Worker {id} restarting");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn returns_once_cancelled_inside_function() {
        let ctx = Context::background().with_worker_id("w");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let f: WorkerFn = Arc::new(move |ctx: &Context| {
            if counter.fetch_add(1, Ordering::SeqCst) == 2 {
                ctx.cancel();
            }
        });

        run_worker(&ctx, &f, Duration::ZERO);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn cancellation_interrupts_restart_delay() {
        let ctx = Context::background().with_worker_id("w");
        let remote = ctx.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });
        let f: WorkerFn = Arc::new(|_: &Context| {});

        let start = Instant::now();
        run_worker(&ctx, &f, Duration::from_secs(30));
        assert!(start.elapsed() < Duration::from_secs(10));
        canceller.join().unwrap();
    }

    #[test]
    fn completion_signal_fires_on_exit() {
        let root = Context::background();
        let wait_group = WaitGroup::new();
        let f: WorkerFn = Arc::new(|ctx: &Context| {
            ctx.done().recv().ok();
        });

        let record = spawn_worker(
            "w".to_owned(),
            root.with_worker_id("w"),
            f,
            Duration::ZERO,
            wait_group.clone(),
        )
        .unwrap();

        record.ctx.cancel();
        assert!(record.closed.recv().is_err());
        wait_group.wait();
        assert_eq!(record.id, "w");
    }
}
