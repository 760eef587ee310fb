//! Error taxonomy for counter sessions.
//!
//! Conditions split into two groups. Fatal ones abort the whole measurement:
//! a half-measured team has no safe continuation. Recoverable ones (an event
//! the hardware does not support, teardown hiccups) are logged where they are
//! detected and never travel further.

use std::io;

use thiserror::Error;

use crate::context::ContextState;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The counting facility could not be brought up for this process.
    #[error("counting facility `{facility}` failed to initialise: {reason}")]
    LibraryInit {
        facility: &'static str,
        reason: String,
    },

    /// A worker could not allocate its counter context.
    #[error("thread {ordinal}: cannot create counter context: {source}")]
    ContextCreate { ordinal: usize, source: io::Error },

    /// An event name could not be attached to a context.
    #[error("thread {ordinal}: event `{event}` not subscribed: {reason}")]
    EventSubscribe {
        ordinal: usize,
        event: String,
        reason: String,
    },

    #[error("thread {ordinal}: cannot start counters: {reason}")]
    Start { ordinal: usize, reason: String },

    #[error("thread {ordinal}: cannot stop counters: {reason}")]
    Stop { ordinal: usize, reason: String },

    /// Releasing a stopped context failed. Counts already read stay valid.
    #[error("thread {ordinal}: cannot destroy counter context: {reason}")]
    Destroy { ordinal: usize, reason: String },

    /// Process-scope shutdown found something left behind.
    #[error("facility `{facility}` shutdown: {reason}")]
    Cleanup {
        facility: &'static str,
        reason: String,
    },

    #[error("thread {ordinal}: illegal context transition {from:?} -> {to:?}")]
    Lifecycle {
        ordinal: usize,
        from: ContextState,
        to: ContextState,
    },

    #[error("context of thread {ordinal} touched by a thread that did not create it")]
    ForeignThread { ordinal: usize },

    #[error("context registry: {0}")]
    Registry(String),

    #[error("thread {ordinal} contributed twice to the same session")]
    DuplicateContribution { ordinal: usize },

    #[error("thread team: {0}")]
    Team(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether this condition must abort the measurement.
    ///
    /// Subscription failures and teardown problems are absorbed where they
    /// occur; everything else ends the process.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::EventSubscribe { .. } | Error::Destroy { .. } | Error::Cleanup { .. } => false,
            _ => true,
        }
    }
}
