//! Per-thread counter contexts.
//!
//! A context binds one worker thread to the counting facility for exactly one
//! measurement session. Its state only moves forward:
//!
//! ```text
//! Uncreated -> Created -> Started -> Stopped -> Destroyed
//! ```
//!
//! Only the thread that created a context may drive it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::events::{Counts, EventSpecifier};
use crate::facility::{CounterHandle, Facility};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextState {
    Uncreated,
    Created,
    Started,
    Stopped,
    Destroyed,
}

impl ContextState {
    fn successor(self) -> Option<ContextState> {
        match self {
            ContextState::Uncreated => Some(ContextState::Created),
            ContextState::Created => Some(ContextState::Started),
            ContextState::Started => Some(ContextState::Stopped),
            ContextState::Stopped => Some(ContextState::Destroyed),
            ContextState::Destroyed => None,
        }
    }
}

/// Process-unique identity of a context. Never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

pub struct CounterContext<H> {
    id: ContextId,
    ordinal: usize,
    owner: ThreadId,
    state: ContextState,
    handle: Option<H>,
    subscribed: Vec<bool>,
}

impl<H: CounterHandle> CounterContext<H> {
    /// Allocate a context for the calling thread, which becomes its owner.
    pub fn create<F>(facility: &F, ordinal: usize) -> Result<CounterContext<H>>
    where
        F: Facility<Handle = H>,
    {
        let handle = facility
            .create_handle()
            .map_err(|source| Error::ContextCreate { ordinal, source })?;
        let id = ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed));
        debug!(thread = ordinal, context = %id, facility = facility.name(), "context created");

        Ok(CounterContext {
            id,
            ordinal,
            owner: thread::current().id(),
            state: ContextState::Created,
            handle: Some(handle),
            subscribed: Vec::new(),
        })
    }

    /// Attach every event of `spec`, in order.
    ///
    /// An event the facility rejects is logged and skipped; its count slot
    /// stays empty. Returns how many events were attached.
    pub fn subscribe(&mut self, spec: &EventSpecifier) -> Result<usize> {
        self.check(ContextState::Created, ContextState::Created)?;
        let ordinal = self.ordinal;
        let handle = self.live_handle()?;

        let mut subscribed = Vec::with_capacity(spec.len());
        for name in spec.names() {
            match handle.subscribe(name) {
                Ok(()) => subscribed.push(true),
                Err(e) => {
                    let err = Error::EventSubscribe {
                        ordinal,
                        event: name.clone(),
                        reason: e.to_string(),
                    };
                    warn!("{}", err);
                    subscribed.push(false);
                }
            }
        }
        self.subscribed = subscribed;
        Ok(self.subscribed.iter().filter(|s| **s).count())
    }

    pub fn start(&mut self) -> Result<()> {
        self.check(ContextState::Created, ContextState::Started)?;
        let ordinal = self.ordinal;
        self.live_handle()?.start().map_err(|e| Error::Start {
            ordinal,
            reason: e.to_string(),
        })?;
        self.state = ContextState::Started;
        Ok(())
    }

    /// Stop counting and return the counts accumulated since `start`.
    pub fn stop(&mut self) -> Result<Counts> {
        self.check(ContextState::Started, ContextState::Stopped)?;
        let ordinal = self.ordinal;
        let raw = self.live_handle()?.stop().map_err(|e| Error::Stop {
            ordinal,
            reason: e.to_string(),
        })?;

        let mut raw = raw.into_iter();
        let values = self
            .subscribed
            .iter()
            .map(|&attached| if attached { raw.next() } else { None })
            .collect();
        self.state = ContextState::Stopped;
        Ok(Counts::new(values))
    }

    /// Release the handle.
    ///
    /// The context is `Destroyed` afterwards even when the facility reports a
    /// problem; that problem comes back as a non-fatal [`Error::Destroy`].
    pub fn destroy(&mut self) -> Result<()> {
        self.check(ContextState::Stopped, ContextState::Destroyed)?;
        let handle = self.live_handle_owned()?;
        self.state = ContextState::Destroyed;
        debug!(thread = self.ordinal, context = %self.id, "context destroyed");
        handle.release().map_err(|e| Error::Destroy {
            ordinal: self.ordinal,
            reason: e.to_string(),
        })
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    fn check(&self, from: ContextState, to: ContextState) -> Result<()> {
        if thread::current().id() != self.owner {
            return Err(Error::ForeignThread {
                ordinal: self.ordinal,
            });
        }
        let legal = self.state == from && (from == to || from.successor() == Some(to));
        if !legal {
            return Err(Error::Lifecycle {
                ordinal: self.ordinal,
                from: self.state,
                to,
            });
        }
        Ok(())
    }

    fn live_handle(&mut self) -> Result<&mut H> {
        let ordinal = self.ordinal;
        self.handle.as_mut().ok_or(Error::Lifecycle {
            ordinal,
            from: ContextState::Destroyed,
            to: ContextState::Destroyed,
        })
    }

    fn live_handle_owned(&mut self) -> Result<H> {
        let ordinal = self.ordinal;
        self.handle.take().ok_or(Error::Lifecycle {
            ordinal,
            from: ContextState::Destroyed,
            to: ContextState::Destroyed,
        })
    }
}

impl<H> fmt::Debug for CounterContext<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CounterContext")
            .field("id", &self.id)
            .field("ordinal", &self.ordinal)
            .field("state", &self.state)
            .field("subscribed", &self.subscribed)
            .finish()
    }
}
