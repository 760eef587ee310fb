//! Measurement sessions.
//!
//! A session drives the team through
//!
//! ```text
//! Idle -> CreatingContexts -> Started -> WorkloadRunning -> Stopping -> Aggregated -> Idle
//! ```
//!
//! Every arrow between the first five states is a team barrier. Contexts are
//! created fresh for each session and destroyed before it ends.

use tracing::{debug, info, warn};

use crate::aggregate::{Aggregator, Report};
use crate::context::CounterContext;
use crate::error::{Error, Result};
use crate::events::EventSpecifier;
use crate::facility::Facility;
use crate::registry::ContextRegistry;
use crate::team::Team;
use crate::workload::Workload;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    CreatingContexts,
    Started,
    WorkloadRunning,
    Stopping,
    Aggregated,
}

impl SessionPhase {
    fn successor(self) -> SessionPhase {
        match self {
            SessionPhase::Idle => SessionPhase::CreatingContexts,
            SessionPhase::CreatingContexts => SessionPhase::Started,
            SessionPhase::Started => SessionPhase::WorkloadRunning,
            SessionPhase::WorkloadRunning => SessionPhase::Stopping,
            SessionPhase::Stopping => SessionPhase::Aggregated,
            SessionPhase::Aggregated => SessionPhase::Idle,
        }
    }
}

/// How the workload is spread over the team.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionKind {
    /// The workload is decomposed across the team.
    Parallel,
    /// One member runs the whole workload; the others count nothing.
    Serial { ordinal: usize },
}

impl SessionKind {
    fn label(self, team_size: usize) -> String {
        match self {
            SessionKind::Parallel => format!("{} threads", team_size),
            SessionKind::Serial { .. } => "single threaded".to_string(),
        }
    }
}

/// Result of a finished session.
#[derive(Clone, Debug)]
pub struct SessionOutcome {
    pub kind: SessionKind,
    pub report: Report,
    /// Contexts that reached `Destroyed`.
    pub destroyed: usize,
}

/// Owns the team and registry and runs sessions on them, one at a time.
pub struct Measurement<'f, F: Facility> {
    facility: &'f F,
    team: Team,
    registry: ContextRegistry<F::Handle>,
    events: EventSpecifier,
    phase: SessionPhase,
}

impl<'f, F: Facility> Measurement<'f, F> {
    pub fn new(facility: &'f F, team: Team, events: EventSpecifier) -> Measurement<'f, F> {
        let registry = ContextRegistry::new(team.size(), team.ordinal_accessor());
        Measurement {
            facility,
            team,
            registry,
            events,
            phase: SessionPhase::Idle,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn team(&self) -> &Team {
        &self.team
    }

    pub fn registry(&self) -> &ContextRegistry<F::Handle> {
        &self.registry
    }

    /// Run the parallel session followed by the serial one.
    pub fn run_pair<W: Workload>(
        &mut self,
        workload: &W,
        serial_ordinal: usize,
    ) -> Result<(SessionOutcome, SessionOutcome)> {
        let parallel = self.run(SessionKind::Parallel, workload)?;
        let serial = self.run(
            SessionKind::Serial {
                ordinal: serial_ordinal,
            },
            workload,
        )?;
        Ok((parallel, serial))
    }

    /// Run one complete session.
    ///
    /// On a fatal error every context still alive is dropped, releasing its
    /// facility resources, and the measurement returns to `Idle`.
    pub fn run<W: Workload>(&mut self, kind: SessionKind, workload: &W) -> Result<SessionOutcome> {
        if let SessionKind::Serial { ordinal } = kind {
            if ordinal >= self.team.size() {
                return Err(Error::Config(format!(
                    "serial ordinal {} outside a team of {}",
                    ordinal,
                    self.team.size()
                )));
            }
        }
        if self.phase != SessionPhase::Idle {
            return Err(Error::Team(format!(
                "session started while in phase {:?}",
                self.phase
            )));
        }

        let result = self.drive(kind, workload);
        self.registry.clear();
        self.phase = SessionPhase::Idle;
        if let Err(e) = &result {
            warn!("session aborted: {}", e);
        }
        result
    }

    fn drive<W: Workload>(&mut self, kind: SessionKind, workload: &W) -> Result<SessionOutcome> {
        let aggregator = Aggregator::new(
            kind.label(self.team.size()),
            self.events.clone(),
            self.team.size(),
            workload.expected_total(),
        );

        self.advance(SessionPhase::CreatingContexts);
        {
            let (facility, registry, events) = (self.facility, &self.registry, &self.events);
            self.team.phase("create", |ordinal| {
                let mut ctx = CounterContext::create(facility, ordinal)?;
                ctx.subscribe(events)?;
                registry.bind(ordinal, ctx)
            })?;
        }
        self.registry.ensure_bound()?;

        self.advance(SessionPhase::Started);
        {
            let registry = &self.registry;
            self.team
                .phase("start", |ordinal| registry.lookup(ordinal, |c| c.start())?)?;
        }

        self.advance(SessionPhase::WorkloadRunning);
        match kind {
            SessionKind::Parallel => self.team.install(|| workload.run_parallel()),
            SessionKind::Serial { ordinal } => self.team.phase("workload", |me| {
                if me == ordinal {
                    workload.run_serial();
                }
                Ok(())
            })?,
        }

        self.advance(SessionPhase::Stopping);
        {
            let (registry, aggregator) = (&self.registry, &aggregator);
            self.team.phase("stop", |ordinal| {
                let (id, counts) = registry.lookup(ordinal, |c| -> Result<_> {
                    let counts = c.stop()?;
                    if let Err(e) = c.destroy() {
                        if e.is_fatal() {
                            return Err(e);
                        }
                        warn!("{}", e);
                    }
                    Ok((c.id(), counts))
                })??;
                aggregator.contribute(ordinal, id, counts)
            })?;
        }

        self.advance(SessionPhase::Aggregated);
        let destroyed = self.registry.destroyed();
        let report = aggregator.report();
        info!(
            session = %report.label,
            destroyed,
            matches = report.matches_expected(),
            "session finished"
        );
        Ok(SessionOutcome {
            kind,
            report,
            destroyed,
        })
    }

    fn advance(&mut self, to: SessionPhase) {
        debug_assert_eq!(self.phase.successor(), to);
        debug!(from = ?self.phase, ?to, "session phase");
        self.phase = to;
    }
}
