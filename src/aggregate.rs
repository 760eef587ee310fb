//! Session totals.

use std::fmt;
use std::sync::Mutex;

use tracing::info;

use crate::context::ContextId;
use crate::error::{Error, Result};
use crate::events::{Counts, EventSpecifier};

/// What one thread handed in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadReport {
    pub ordinal: usize,
    pub context: ContextId,
    pub counts: Counts,
}

#[derive(Debug, Default)]
struct Tally {
    total: u64,
    threads: Vec<Option<ThreadReport>>,
}

/// Sums the primary event across a team under a lock.
#[derive(Debug)]
pub struct Aggregator {
    label: String,
    events: EventSpecifier,
    expected: u64,
    tally: Mutex<Tally>,
}

impl Aggregator {
    pub fn new(label: impl Into<String>, events: EventSpecifier, team_size: usize, expected: u64) -> Aggregator {
        Aggregator {
            label: label.into(),
            events,
            expected,
            tally: Mutex::new(Tally {
                total: 0,
                threads: vec![None; team_size],
            }),
        }
    }

    /// Add the primary count of `ordinal`. Each ordinal contributes at most
    /// once per session.
    pub fn contribute(&self, ordinal: usize, context: ContextId, counts: Counts) -> Result<()> {
        let mut tally = self
            .tally
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let slot = tally.threads.get_mut(ordinal).ok_or_else(|| {
            Error::Registry(format!("contribution from unknown ordinal {}", ordinal))
        })?;
        if slot.is_some() {
            return Err(Error::DuplicateContribution { ordinal });
        }
        let primary = counts.primary();
        *slot = Some(ThreadReport {
            ordinal,
            context,
            counts,
        });
        tally.total = tally.total.wrapping_add(primary);
        Ok(())
    }

    /// Snapshot of the session so far. Calling it again without new
    /// contributions yields the same report.
    pub fn report(&self) -> Report {
        let tally = self
            .tally
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let report = Report {
            label: self.label.clone(),
            events: self.events.clone(),
            total: tally.total,
            expected: self.expected,
            threads: tally.threads.iter().flatten().cloned().collect(),
        };
        info!(
            session = %report.label,
            total = report.total,
            expected = report.expected,
            "session aggregated"
        );
        report
    }
}

/// Aggregated result of one session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub label: String,
    pub events: EventSpecifier,
    pub total: u64,
    pub expected: u64,
    pub threads: Vec<ThreadReport>,
}

impl Report {
    pub fn matches_expected(&self) -> bool {
        self.total == self.expected
    }

    /// Ordinals whose primary count is non-zero.
    pub fn active_ordinals(&self) -> Vec<usize> {
        self.threads
            .iter()
            .filter(|t| t.counts.primary() != 0)
            .map(|t| t.ordinal)
            .collect()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for t in self.threads.iter() {
            for (name, value) in self.events.names().iter().zip(t.counts.iter()) {
                match value {
                    Some(v) => writeln!(f, "Thread {} {}: {}", t.ordinal, name, v)?,
                    None => writeln!(f, "Thread {} {}: n/a", t.ordinal, name)?,
                }
            }
        }
        writeln!(f, "=========== Total ({}): {}", self.label, self.total)?;
        write!(f, "=========== expected total: {}", self.expected)
    }
}
