//! Per-thread hardware performance counter sessions for fork-join workloads.
//!
//! A [`Measurement`] owns a fixed-size thread [`Team`]. Each session makes
//! every team member create, start, stop and destroy its own
//! [`CounterContext`], with a barrier between the phases, runs a
//! [`Workload`] inside the start/stop window and sums the primary event of
//! all members in an [`Aggregator`].
//!
//! Counting itself is delegated to a [`Facility`]: Linux `perf_event_open`
//! ([`linux::PerfFacility`]) or software counters fed by instrumented
//! kernels ([`soft::SoftFacility`]).
//!
//! ```no_run
//! use perfteam::{EventSpecifier, Measurement, Team};
//! use perfteam::soft::SoftFacility;
//! use perfteam::workload::Matmul;
//!
//! let facility = SoftFacility::init();
//! let mut m = Measurement::new(&facility, Team::new(8)?, EventSpecifier::default());
//! let (parallel, serial) = m.run_pair(&Matmul::new(256, 42), 0)?;
//! println!("{}\n{}", parallel.report, serial.report);
//! # Ok::<(), perfteam::Error>(())
//! ```

pub mod aggregate;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod facility;
pub mod intel;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod registry;
pub mod session;
pub mod soft;
pub mod team;
pub mod workload;

pub use crate::aggregate::{Aggregator, Report, ThreadReport};
pub use crate::context::{ContextId, ContextState, CounterContext};
pub use crate::error::{Error, Result};
pub use crate::events::{Counts, EventSpecifier};
pub use crate::facility::{CounterHandle, Facility};
pub use crate::registry::ContextRegistry;
pub use crate::session::{Measurement, SessionKind, SessionOutcome, SessionPhase};
pub use crate::team::Team;
pub use crate::workload::Workload;

pub(crate) fn warn_on_live_handles(facility: &'static str, live: usize) {
    if live > 0 {
        let e = Error::Cleanup {
            facility,
            reason: format!("{} counter handle(s) still live", live),
        };
        tracing::warn!("{}", e);
    } else {
        tracing::debug!(facility, "counting facility shut down");
    }
}
