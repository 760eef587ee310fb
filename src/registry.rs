//! Worker ordinal -> counter context table.
//!
//! The table is shared by the whole team but partitioned: slot `i` is only
//! ever touched by the worker whose ordinal is `i`. Each slot sits behind its
//! own mutex so the table is `Sync`; with the partitioning those locks are
//! never contended.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::context::{ContextId, ContextState, CounterContext};
use crate::error::{Error, Result};

/// Returns the ordinal of the calling worker, `None` outside the team.
pub type OrdinalFn = Arc<dyn Fn() -> Option<usize> + Send + Sync>;

pub struct ContextRegistry<H> {
    slots: Vec<Mutex<Option<CounterContext<H>>>>,
    ordinal: OrdinalFn,
}

impl<H> ContextRegistry<H> {
    /// A registry with `size` empty slots.
    pub fn new(size: usize, ordinal: OrdinalFn) -> ContextRegistry<H> {
        ContextRegistry {
            slots: (0..size).map(|_| Mutex::new(None)).collect(),
            ordinal,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Store `context` in slot `ordinal`.
    ///
    /// The caller must be the worker owning `ordinal`, and the slot must be
    /// empty or hold a context that was already destroyed.
    pub fn bind(&self, ordinal: usize, context: CounterContext<H>) -> Result<()> {
        let mut slot = self.owned_slot(ordinal)?;
        if let Some(old) = slot.as_ref() {
            if old.state() != ContextState::Destroyed {
                return Err(Error::Registry(format!(
                    "slot {} still holds live context {} ({:?})",
                    ordinal,
                    old.id(),
                    old.state()
                )));
            }
        }
        *slot = Some(context);
        Ok(())
    }

    /// Run `f` on the context bound to `ordinal`.
    pub fn lookup<R, F>(&self, ordinal: usize, f: F) -> Result<R>
    where
        F: FnOnce(&mut CounterContext<H>) -> R,
    {
        let mut slot = self.owned_slot(ordinal)?;
        match slot.as_mut() {
            Some(ctx) => Ok(f(ctx)),
            None => Err(Error::Registry(format!("slot {} is unbound", ordinal))),
        }
    }

    /// Fails unless every slot holds a context that has not been destroyed.
    pub fn ensure_bound(&self) -> Result<()> {
        for ordinal in 0..self.slots.len() {
            match self.state(ordinal) {
                ContextState::Uncreated | ContextState::Destroyed => {
                    return Err(Error::Registry(format!(
                        "slot {} has no live context",
                        ordinal
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// State of the context in slot `ordinal`; `Uncreated` when unbound.
    pub fn state(&self, ordinal: usize) -> ContextState {
        self.slots
            .get(ordinal)
            .and_then(|s| lock(s).as_ref().map(|c| c.state()))
            .unwrap_or(ContextState::Uncreated)
    }

    pub fn context_id(&self, ordinal: usize) -> Option<ContextId> {
        self.slots
            .get(ordinal)
            .and_then(|s| lock(s).as_ref().map(|c| c.id()))
    }

    /// Number of slots holding a destroyed context.
    pub fn destroyed(&self) -> usize {
        (0..self.slots.len())
            .filter(|i| self.state(*i) == ContextState::Destroyed)
            .count()
    }

    /// Empty every slot. Contexts that are still live are dropped, which
    /// releases their facility resources.
    pub fn clear(&self) {
        for slot in self.slots.iter() {
            lock(slot).take();
        }
    }

    fn owned_slot(&self, ordinal: usize) -> Result<MutexGuard<'_, Option<CounterContext<H>>>> {
        let slot = self.slots.get(ordinal).ok_or_else(|| {
            Error::Registry(format!(
                "ordinal {} out of range for a team of {}",
                ordinal,
                self.slots.len()
            ))
        })?;
        let caller = (self.ordinal)();
        if caller != Some(ordinal) {
            return Err(Error::Registry(format!(
                "slot {} accessed by worker {:?}",
                ordinal, caller
            )));
        }
        Ok(lock(slot))
    }
}

// A panicking worker poisons only its own slot; the contents stay usable.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<H> fmt::Debug for ContextRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let states: Vec<ContextState> = (0..self.slots.len()).map(|i| self.state(i)).collect();
        f.debug_struct("ContextRegistry")
            .field("states", &states)
            .finish()
    }
}
