//! Software-counted events.
//!
//! Instrumented kernels report the work they do with [`tally`]; the values
//! land in per-thread counters that a [`SoftHandle`] snapshots on start and
//! diffs on stop. Unlike hardware counters these are exact and need no
//! privileges, so they serve hosts without PMU access and the test-suite.

use std::cell::Cell;
use std::io;
use std::thread::{self, ThreadId};

use tracing::debug;

use crate::facility::{CounterHandle, Facility, LiveHandles, LiveToken};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SoftEvent {
    /// Floating-point operations.
    FpOps,
    /// Kernel output rows finished.
    KernelRows,
}

impl SoftEvent {
    pub const ALL: [SoftEvent; 2] = [SoftEvent::FpOps, SoftEvent::KernelRows];

    pub fn name(self) -> &'static str {
        match self {
            SoftEvent::FpOps => "FP_OPS",
            SoftEvent::KernelRows => "KERNEL_ROWS",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            SoftEvent::FpOps => "Floating-point operations reported by instrumented kernels.",
            SoftEvent::KernelRows => "Output rows finished by instrumented kernels.",
        }
    }

    pub fn from_name(name: &str) -> Option<SoftEvent> {
        SoftEvent::ALL
            .iter()
            .copied()
            .find(|e| e.name().eq_ignore_ascii_case(name))
    }

    fn slot(self) -> usize {
        self as usize
    }
}

thread_local! {
    static TALLIES: [Cell<u64>; 2] = [Cell::new(0), Cell::new(0)];
}

/// Add `n` occurrences of `event` to the calling thread's counter.
#[inline]
pub fn tally(event: SoftEvent, n: u64) {
    TALLIES.with(|t| {
        let c = &t[event.slot()];
        c.set(c.get().wrapping_add(n));
    });
}

fn read(event: SoftEvent) -> u64 {
    TALLIES.with(|t| t[event.slot()].get())
}

/// The software counting facility.
#[derive(Debug, Default)]
pub struct SoftFacility {
    live: LiveHandles,
}

impl SoftFacility {
    /// Software counters need no global setup; this cannot fail.
    pub fn init() -> SoftFacility {
        debug!("soft counting facility initialised");
        SoftFacility::default()
    }
}

impl Facility for SoftFacility {
    type Handle = SoftHandle;

    fn name(&self) -> &'static str {
        "soft"
    }

    fn create_handle(&self) -> io::Result<SoftHandle> {
        Ok(SoftHandle {
            owner: thread::current().id(),
            events: Vec::new(),
            baseline: Vec::new(),
            running: false,
            _token: self.live.token(),
        })
    }

    fn live_handles(&self) -> usize {
        self.live.get()
    }
}

impl Drop for SoftFacility {
    fn drop(&mut self) {
        crate::warn_on_live_handles(self.name(), self.live.get());
    }
}

#[derive(Debug)]
pub struct SoftHandle {
    owner: ThreadId,
    events: Vec<SoftEvent>,
    baseline: Vec<u64>,
    running: bool,
    _token: LiveToken,
}

impl SoftHandle {
    fn on_owner(&self) -> io::Result<()> {
        if thread::current().id() != self.owner {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "software counters read from a foreign thread",
            ));
        }
        Ok(())
    }
}

impl CounterHandle for SoftHandle {
    fn subscribe(&mut self, event: &str) -> io::Result<()> {
        let ev = SoftEvent::from_name(event).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no such software event")
        })?;
        self.events.push(ev);
        Ok(())
    }

    fn start(&mut self) -> io::Result<()> {
        self.on_owner()?;
        self.baseline = self.events.iter().map(|e| read(*e)).collect();
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> io::Result<Vec<u64>> {
        self.on_owner()?;
        if !self.running {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "software counters were never started",
            ));
        }
        self.running = false;
        Ok(self
            .events
            .iter()
            .zip(self.baseline.iter())
            .map(|(e, base)| read(*e).wrapping_sub(*base))
            .collect())
    }

    fn release(self) -> io::Result<()> {
        Ok(())
    }
}
