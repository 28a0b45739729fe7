use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::sync::WaitGroup;
use log::{debug, error};
use parking_lot::Mutex;

use crate::config::PoolBuilder;
use crate::context::Context;
use crate::id::IdFn;
use crate::{PoolError, Result};

mod worker;

use self::worker::{spawn_worker, WorkerRecord};

/// The function every worker runs.
///
/// It receives the worker's [`Context`] and is expected to return promptly
/// once that context is cancelled.
pub type WorkerFn = Arc<dyn Fn(&Context) + Send + Sync>;

/// A resizable pool of supervised workers all running the same function.
///
/// Every worker runs on its own thread, invoking the function again whenever
/// it returns while the worker is still wanted. Workers are identified by a
/// unique string, retrievable inside the function with
/// [`id_from_context`](crate::id_from_context).
///
/// Dropping the pool closes it.
pub struct Pool {
    shared: Arc<Shared>,
}

struct Shared {
    root: Context,
    f: WorkerFn,
    restart_delay: Duration,
    id_fn: IdFn,
    state: Mutex<State>,
}

/// Tracked workers. `workers` and `worker_map` always hold the same ids.
struct State {
    /// Spawn order, oldest first.
    workers: Vec<String>,
    worker_map: HashMap<String, WorkerRecord>,
    /// `None` once the pool is closed.
    wait_group: Option<WaitGroup>,
}

impl Pool {
    /// Creates a pool running `f` with default options.
    ///
    /// The pool starts with zero workers; call [`Pool::resize`] to run some.
    pub fn new<F>(f: F) -> Pool
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        Pool::builder(f).build()
    }

    /// Returns a builder for a pool running `f`.
    pub fn builder<F>(f: F) -> PoolBuilder
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        PoolBuilder::new(Arc::new(f))
    }

    pub(crate) fn from_parts(
        f: WorkerFn,
        parent: &Context,
        restart_delay: Duration,
        id_fn: IdFn,
    ) -> Pool {
        Pool {
            shared: Arc::new(Shared {
                root: parent.child(),
                f,
                restart_delay,
                id_fn,
                state: Mutex::new(State {
                    workers: Vec::new(),
                    worker_map: HashMap::new(),
                    wait_group: Some(WaitGroup::new()),
                }),
            }),
        }
    }

    /// Changes the number of tracked workers to `n`.
    ///
    /// Growing starts new workers. Shrinking cancels the oldest workers and
    /// stops tracking them right away; their threads may still be winding
    /// down when this returns.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Spawn`] if a worker thread cannot be created.
    /// Workers started before the failure stay tracked.
    pub fn resize(&self, n: usize) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.wait_group.is_none() {
            debug!("Pool is closed, ignoring resize to {n}");
            return Ok(());
        }

        let len = state.workers.len();
        if len < n {
            for _ in len..n {
                self.shared.start_worker(&mut state)?;
            }
        } else if len > n {
            let State {
                workers,
                worker_map,
                ..
            } = &mut *state;
            for id in workers.drain(..len - n) {
                if let Some(worker) = worker_map.remove(&id) {
                    worker.ctx.cancel();
                }
            }
        }

        debug!("Resized pool from {len} to {n} workers");
        Ok(())
    }

    /// Cancels every worker and blocks until all of their threads exit.
    ///
    /// Workers no longer tracked after a shrink or kill are waited for too.
    /// Blocks forever if the worker function ignores cancellation.
    pub fn close(&self) {
        let wait_group = self.shared.state.lock().wait_group.take();
        self.shared.root.cancel();
        if let Some(wait_group) = wait_group {
            debug!("Waiting for workers to stop");
            wait_group.wait();
            debug!("Pool closed");
        }
    }

    /// Identifiers of the tracked workers, oldest first.
    pub fn worker_ids(&self) -> Vec<String> {
        self.shared.state.lock().workers.clone()
    }

    /// Number of tracked workers.
    pub fn len(&self) -> usize {
        self.shared.state.lock().workers.len()
    }

    /// Returns `true` if no workers are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Kills the worker with the given id and replaces it with a new one.
    ///
    /// The worker stops being tracked immediately. Its replacement is started
    /// once the killed worker's thread has fully exited, so the two never run
    /// at the same time. Returns `Ok(false)` if no such worker is tracked.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Spawn`] if the thread that waits for the killed
    /// worker cannot be created. The worker is left running in that case.
    pub fn kill_worker(&self, id: &str) -> Result<bool> {
        let mut state = self.shared.state.lock();
        let Some(closed) = state.worker_map.get(id).map(|w| w.closed.clone()) else {
            return Ok(false);
        };

        if let Some(registration) = state.wait_group.clone() {
            let shared = Arc::clone(&self.shared);
            thread::Builder::new()
                .name(format!("pool-respawn-{id}"))
                .spawn(move || {
                    // Disconnects once the killed worker has exited.
                    let _ = closed.recv();
                    let mut state = shared.state.lock();
                    if let Err(e) = shared.start_worker(&mut state) {
                        error!("Failed to start replacement worker: {e}");
                    }
                    drop(registration);
                })
                .map_err(PoolError::Spawn)?;
        }

        if let Some(worker) = state.worker_map.remove(id) {
            worker.ctx.cancel();
            debug!("Killed worker {}", worker.id);
        }
        state.workers.retain(|w| w != id);
        Ok(true)
    }
}

impl Shared {
    /// Starts one worker under a fresh unique id. The caller holds the lock.
    fn start_worker(&self, state: &mut State) -> Result<()> {
        let Some(wait_group) = state.wait_group.as_ref() else {
            debug!("Pool is closed, not starting worker");
            return Ok(());
        };

        let id = loop {
            let id = (self.id_fn)();
            if !state.worker_map.contains_key(&id) {
                break id;
            }
        };

        let ctx = self.root.with_worker_id(&id);
        let worker = spawn_worker(
            id.clone(),
            ctx.clone(),
            Arc::clone(&self.f),
            self.restart_delay,
            wait_group.clone(),
        )
        .map_err(|e| {
            ctx.cancel();
            PoolError::Spawn(e)
        })?;

        debug!("Started worker {id}");
        state.workers.push(id.clone());
        state.worker_map.insert(id, worker);
        Ok(())
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn idle(ctx: &Context) {
        ctx.done().recv().ok();
    }

    #[test]
    fn starts_with_no_workers() {
        let pool = Pool::new(idle);
        assert!(pool.is_empty());
        assert!(pool.worker_ids().is_empty());
    }

    #[test]
    fn retries_colliding_ids() {
        let next = AtomicUsize::new(0);
        let pool = Pool::builder(idle)
            .id_fn(move || {
                let n = next.fetch_add(1, Ordering::SeqCst);
                format!("w{}", n / 2)
            })
            .build();

        pool.resize(3).unwrap();
        assert_eq!(pool.worker_ids(), vec!["w0", "w1", "w2"]);
        pool.close();
    }

    #[test]
    fn later_options_override_earlier_ones() {
        let pool = Pool::builder(idle)
            .id_fn(|| "first".to_owned())
            .restart_delay(Duration::from_secs(1))
            .id_fn(crate::default_id)
            .restart_delay(Duration::ZERO)
            .build();

        assert_eq!(pool.shared.restart_delay, Duration::ZERO);
        pool.resize(2).unwrap();
        assert!(pool.worker_ids().iter().all(|id| id != "first"));
    }

    #[test]
    fn map_and_list_stay_in_step() {
        let pool = Pool::new(idle);
        pool.resize(6).unwrap();
        pool.resize(2).unwrap();
        let victim = pool.worker_ids()[0].clone();
        assert!(pool.kill_worker(&victim).unwrap());

        let state = pool.shared.state.lock();
        assert_eq!(state.workers.len(), state.worker_map.len());
        assert!(state.workers.iter().all(|id| state.worker_map.contains_key(id)));
    }
}
