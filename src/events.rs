//! Event specifiers and the counts they produce.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::Error;

/// Name of the floating-point operation event every facility understands.
pub const FP_OPS: &str = "FP_OPS";

/// An ordered, immutable list of event names.
///
/// The first entry is the primary event: the only one whose totals are
/// checked against an expected value. Cloning is cheap so every thread of a
/// team can hold the same specifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventSpecifier {
    names: Arc<[String]>,
}

impl EventSpecifier {
    pub fn new<I, S>(names: I) -> Result<EventSpecifier, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|s| s.into().trim().to_string())
            .collect();
        if names.is_empty() {
            return Err(Error::Config("at least one event is required".into()));
        }
        if let Some(blank) = names.iter().position(|n| n.is_empty()) {
            return Err(Error::Config(format!("event #{} has an empty name", blank)));
        }
        Ok(EventSpecifier {
            names: names.into(),
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn primary(&self) -> &str {
        &self.names[0]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for EventSpecifier {
    fn default() -> EventSpecifier {
        EventSpecifier {
            names: vec![FP_OPS.to_string()].into(),
        }
    }
}

impl FromStr for EventSpecifier {
    type Err = Error;

    /// Parses a comma separated list, e.g. `FP_OPS,instructions`.
    fn from_str(s: &str) -> Result<EventSpecifier, Error> {
        EventSpecifier::new(s.split(','))
    }
}

/// Per-thread counts, one slot per specifier entry.
///
/// Slots of events that could not be subscribed are `None`; their value is
/// meaningless and must not feed correctness checks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Counts {
    values: Vec<Option<u64>>,
}

impl Counts {
    pub fn new(values: Vec<Option<u64>>) -> Counts {
        Counts { values }
    }

    /// Count of the primary event, zero if it was never subscribed.
    pub fn primary(&self) -> u64 {
        self.get(0).unwrap_or(0)
    }

    pub fn get(&self, idx: usize) -> Option<u64> {
        self.values.get(idx).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<u64>> + '_ {
        self.values.iter().copied()
    }
}

impl fmt::Display for Counts {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            match v {
                Some(v) => write!(f, "{}", v)?,
                None => write!(f, "n/a")?,
            }
        }
        Ok(())
    }
}
