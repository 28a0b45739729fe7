#![deny(missing_docs)]

//! A resizable pool of supervised, individually cancellable worker threads.
//!
//! A [`Pool`] runs N copies of one function, each on its own thread under
//! its own cancellable [`Context`]. N can change at any time with
//! [`Pool::resize`]; a function that returns while its worker is still
//! wanted is restarted after a fixed delay; [`Pool::kill_worker`] replaces a
//! single worker once it has fully stopped; [`Pool::close`] stops everything
//! and waits for every thread to exit.

mod config;
mod context;
mod error;
mod id;
mod pool;

pub use config::{PoolBuilder, PoolConfig};
pub use context::{id_from_context, Context};
pub use error::{PoolError, Result};
pub use id::{default_id, IdFn};
pub use pool::{Pool, WorkerFn};
