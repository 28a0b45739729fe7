use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

/// A cancellable lifetime scope.
///
/// Scopes form a tree: cancelling a context cancels every context derived
/// from it with [`Context::child`], including ones derived afterwards.
/// Cancellation is irreversible.
///
/// A context handed to a worker function also carries that worker's
/// identifier, see [`id_from_context`].
#[derive(Clone)]
pub struct Context {
    scope: Arc<Scope>,
    worker_id: Option<Arc<str>>,
}

struct Scope {
    cancelled: AtomicBool,
    /// Never yields a message; disconnects once `done_tx` is dropped.
    done: Receiver<()>,
    state: Mutex<ScopeState>,
}

struct ScopeState {
    /// `None` once cancelled.
    done_tx: Option<Sender<()>>,
    children: Vec<Weak<Scope>>,
}

impl Scope {
    fn new(cancelled: bool) -> Self {
        let (tx, rx) = channel::bounded(0);
        let done_tx = if cancelled {
            drop(tx);
            None
        } else {
            Some(tx)
        };
        Scope {
            cancelled: AtomicBool::new(cancelled),
            done: rx,
            state: Mutex::new(ScopeState {
                done_tx,
                children: Vec::new(),
            }),
        }
    }

    fn cancel(&self) {
        let children = {
            let mut state = self.state.lock();
            let Some(tx) = state.done_tx.take() else {
                return;
            };
            self.cancelled.store(true, Ordering::Release);
            drop(tx);
            std::mem::take(&mut state.children)
        };

        for child in children {
            if let Some(child) = child.upgrade() {
                child.cancel();
            }
        }
    }
}

impl Context {
    /// Creates a fresh root scope with no parent.
    ///
    /// It is only cancelled by an explicit call to [`Context::cancel`].
    pub fn background() -> Self {
        Context {
            scope: Arc::new(Scope::new(false)),
            worker_id: None,
        }
    }

    /// Derives a child scope.
    ///
    /// The child is cancelled whenever this context is. Deriving from an
    /// already cancelled context yields a cancelled child.
    pub fn child(&self) -> Self {
        let mut state = self.scope.state.lock();
        let scope = if state.done_tx.is_some() {
            let scope = Arc::new(Scope::new(false));
            state.children.retain(|c| c.strong_count() > 0);
            state.children.push(Arc::downgrade(&scope));
            scope
        } else {
            Arc::new(Scope::new(true))
        };
        Context {
            scope,
            worker_id: self.worker_id.clone(),
        }
    }

    /// Derives a child scope that carries a worker identifier.
    pub(crate) fn with_worker_id(&self, id: &str) -> Self {
        let mut ctx = self.child();
        ctx.worker_id = Some(Arc::from(id));
        ctx
    }

    /// Cancels this scope and all of its descendants.
    pub fn cancel(&self) {
        self.scope.cancel();
    }

    /// Returns `true` once this scope or any ancestor has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.scope.cancelled.load(Ordering::Acquire)
    }

    /// A channel that disconnects when the scope is cancelled.
    ///
    /// No message is ever sent on it, so it is meant to be raced in a
    /// `crossbeam::channel::select!` alongside other channels:
    /// `recv(ctx.done()) -> _ => return`.
    pub fn done(&self) -> &Receiver<()> {
        &self.scope.done
    }

    /// Blocks for `timeout` or until cancellation, whichever comes first.
    ///
    /// Returns `true` if the full duration elapsed without cancellation.
    pub fn sleep(&self, timeout: Duration) -> bool {
        matches!(
            self.scope.done.recv_timeout(timeout),
            Err(RecvTimeoutError::Timeout)
        ) && !self.is_cancelled()
    }

    /// The identifier of the worker this context belongs to, if any.
    pub fn worker_id(&self) -> Option<&str> {
        self.worker_id.as_deref()
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::background()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("worker_id", &self.worker_id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Retrieves the worker identifier from a context passed to a worker
/// function.
///
/// Returns `None` for contexts that were not created by a pool.
pub fn id_from_context(ctx: &Context) -> Option<&str> {
    ctx.worker_id()
}
