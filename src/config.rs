use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::id::{default_id, IdFn};
use crate::pool::{Pool, WorkerFn};
use crate::{PoolError, Result};

/// Pool settings that can be loaded from a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Number of workers to run.
    pub workers: usize,
    /// Pause between a worker function returning and its next invocation.
    pub restart_delay_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            workers: num_cpus::get(),
            restart_delay_ms: 0,
        }
    }
}

impl PoolConfig {
    /// Reads a config from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: PoolConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Restart delay as a `Duration`.
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(PoolError::InvalidConfig(
                "workers must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Builds a [`Pool`]. Options apply in call order; later calls win.
pub struct PoolBuilder {
    f: WorkerFn,
    parent: Context,
    restart_delay: Duration,
    id_fn: IdFn,
}

impl PoolBuilder {
    pub(crate) fn new(f: WorkerFn) -> Self {
        PoolBuilder {
            f,
            parent: Context::background(),
            restart_delay: Duration::ZERO,
            id_fn: Arc::new(default_id),
        }
    }

    /// Sets the parent scope of the pool. Cancelling it stops every worker.
    pub fn parent(mut self, ctx: Context) -> Self {
        self.parent = ctx;
        self
    }

    /// Sets the delay before a returned worker function is invoked again.
    pub fn restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Sets the worker identifier generator.
    pub fn id_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.id_fn = Arc::new(f);
        self
    }

    /// Applies the file-level settings. The worker count is not applied here;
    /// pass it to [`Pool::resize`].
    pub fn config(self, config: &PoolConfig) -> Self {
        self.restart_delay(config.restart_delay())
    }

    /// Creates the pool. It runs no workers until the first `resize`.
    pub fn build(self) -> Pool {
        Pool::from_parts(self.f, &self.parent, self.restart_delay, self.id_fn)
    }
}
