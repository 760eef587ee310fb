//! Fixed-size fork-join thread team.
//!
//! A phase runs a closure exactly once on every member and returns only when
//! all members are done, which is the barrier between phases. Workload
//! regions run on the same threads, so a member's per-thread counters see
//! whatever share of the workload the pool schedules on it.

use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::error::{Error, Result};
use crate::registry::OrdinalFn;

pub struct Team {
    pool: ThreadPool,
    size: usize,
}

impl Team {
    pub fn new(size: usize) -> Result<Team> {
        if size == 0 {
            return Err(Error::Config("team size must be at least 1".into()));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|i| format!("perfteam-{}", i))
            .build()
            .map_err(|e| Error::Team(e.to_string()))?;
        debug!(size, "thread team ready");
        Ok(Team { pool, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Ordinal of the calling thread within this team's pool.
    pub fn ordinal_accessor(&self) -> OrdinalFn {
        Arc::new(rayon::current_thread_index)
    }

    /// Run `phase` once on every member, passing the member's ordinal.
    ///
    /// Every member finishes the phase before this returns, failed or not.
    /// The first fatal error (lowest ordinal) is returned; non-fatal errors
    /// are expected to have been logged by the member and are dropped.
    pub fn phase<F>(&self, name: &str, phase: F) -> Result<()>
    where
        F: Fn(usize) -> Result<()> + Sync,
    {
        debug!(phase = name, "entering team phase");
        let outcomes = self.pool.broadcast(|ctx| phase(ctx.index()));
        for outcome in outcomes {
            match outcome {
                Err(e) if e.is_fatal() => return Err(e),
                _ => {}
            }
        }
        Ok(())
    }

    /// Run `op` inside the team's pool; nested parallel iterators use the
    /// team's threads.
    pub fn install<R, OP>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }
}
