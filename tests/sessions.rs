use std::collections::HashSet;
use std::io;

use perfteam::soft::{SoftFacility, SoftHandle};
use perfteam::workload::{Matmul, Workload};
use perfteam::{
    ContextState, CounterHandle, Error, EventSpecifier, Facility, Measurement, SessionKind,
    SessionPhase, Team,
};

fn measurement(facility: &SoftFacility, threads: usize) -> Measurement<'_, SoftFacility> {
    Measurement::new(facility, Team::new(threads).unwrap(), EventSpecifier::default())
}

#[test]
fn default_scenario_expectation() {
    assert_eq!(Matmul::new(0, 42).expected_total(), 0);
    let n: u64 = 1024;
    assert_eq!(2 * n * n * n, 2_147_483_648);
}

#[test]
fn both_sessions_count_two_n_cubed() {
    let facility = SoftFacility::init();
    let mut m = measurement(&facility, 8);
    let matmul = Matmul::new(128, 42);

    let (parallel, serial) = m.run_pair(&matmul, 0).unwrap();
    assert_eq!(parallel.report.expected, 2 * 128 * 128 * 128);
    assert!(parallel.report.matches_expected(), "{}", parallel.report);
    assert!(serial.report.matches_expected(), "{}", serial.report);
    assert_eq!(parallel.report.label, "8 threads");
    assert_eq!(serial.report.label, "single threaded");
    assert_eq!(parallel.kind, SessionKind::Parallel);
}

#[test]
fn every_member_reports_once() {
    let facility = SoftFacility::init();
    let mut m = measurement(&facility, 4);
    let out = m.run(SessionKind::Parallel, &Matmul::new(32, 42)).unwrap();
    let ordinals: Vec<usize> = out.report.threads.iter().map(|t| t.ordinal).collect();
    assert_eq!(ordinals, vec![0, 1, 2, 3]);
    let sum: u64 = out.report.threads.iter().map(|t| t.counts.primary()).sum();
    assert_eq!(sum, out.report.total);
}

#[test]
fn serial_session_has_one_active_member() {
    let facility = SoftFacility::init();
    let mut m = measurement(&facility, 8);
    let out = m
        .run(SessionKind::Serial { ordinal: 0 }, &Matmul::new(64, 42))
        .unwrap();
    assert_eq!(out.report.active_ordinals(), vec![0]);
    assert_eq!(out.report.threads.len(), 8);
    for t in out.report.threads.iter().filter(|t| t.ordinal != 0) {
        assert_eq!(t.counts.primary(), 0);
    }
}

#[test]
fn serial_session_on_another_member() {
    let facility = SoftFacility::init();
    let mut m = measurement(&facility, 4);
    let matmul = Matmul::new(16, 7);
    let (_, serial) = m.run_pair(&matmul, 3).unwrap();
    assert_eq!(serial.kind, SessionKind::Serial { ordinal: 3 });
    assert_eq!(serial.report.active_ordinals(), vec![3]);
    assert!(serial.report.matches_expected());
}

#[test]
fn contexts_are_destroyed_and_not_reused() {
    let facility = SoftFacility::init();
    let mut m = measurement(&facility, 4);
    let matmul = Matmul::new(16, 42);

    let (parallel, serial) = m.run_pair(&matmul, 0).unwrap();
    assert_eq!(parallel.destroyed, 4);
    assert_eq!(serial.destroyed, 4);
    assert_eq!(facility.live_handles(), 0);

    let first: HashSet<_> = parallel.report.threads.iter().map(|t| t.context).collect();
    let second: HashSet<_> = serial.report.threads.iter().map(|t| t.context).collect();
    assert_eq!(first.len(), 4);
    assert_eq!(second.len(), 4);
    assert!(first.is_disjoint(&second));

    assert_eq!(m.phase(), SessionPhase::Idle);
    for ordinal in 0..4 {
        assert_eq!(m.registry().state(ordinal), ContextState::Uncreated);
    }
}

#[test]
fn zero_order_counts_nothing() {
    let facility = SoftFacility::init();
    let mut m = measurement(&facility, 2);
    let (parallel, serial) = m.run_pair(&Matmul::new(0, 42), 0).unwrap();
    assert_eq!(parallel.report.total, 0);
    assert_eq!(serial.report.total, 0);
    assert!(parallel.report.matches_expected());
    assert!(serial.report.active_ordinals().is_empty());
}

#[test]
fn single_member_team() {
    let facility = SoftFacility::init();
    let mut m = measurement(&facility, 1);
    let (parallel, serial) = m.run_pair(&Matmul::new(24, 42), 0).unwrap();
    assert!(parallel.report.matches_expected());
    assert_eq!(parallel.report.total, serial.report.total);
    assert_eq!(parallel.report.label, "1 threads");
}

#[test]
fn unknown_secondary_event_is_skipped() {
    let facility = SoftFacility::init();
    let events: EventSpecifier = "FP_OPS,NOT_AN_EVENT,KERNEL_ROWS".parse().unwrap();
    let mut m = Measurement::new(&facility, Team::new(4).unwrap(), events);
    let out = m.run(SessionKind::Parallel, &Matmul::new(16, 42)).unwrap();

    assert!(out.report.matches_expected());
    let rows: u64 = out
        .report
        .threads
        .iter()
        .map(|t| {
            assert_eq!(t.counts.get(1), None);
            t.counts.get(2).unwrap()
        })
        .sum();
    assert_eq!(rows, 16);
    assert!(out.report.to_string().contains("NOT_AN_EVENT: n/a"));
}

#[test]
fn unknown_primary_event_reads_zero() {
    let facility = SoftFacility::init();
    let events: EventSpecifier = "NOT_AN_EVENT".parse().unwrap();
    let mut m = Measurement::new(&facility, Team::new(2).unwrap(), events);
    let out = m.run(SessionKind::Parallel, &Matmul::new(8, 42)).unwrap();
    assert_eq!(out.report.total, 0);
    assert!(!out.report.matches_expected());
    assert_eq!(out.destroyed, 2);
}

#[test]
fn measurement_is_reusable() {
    let facility = SoftFacility::init();
    let mut m = measurement(&facility, 3);
    let matmul = Matmul::new(12, 42);
    for _ in 0..3 {
        let (parallel, serial) = m.run_pair(&matmul, 1).unwrap();
        assert!(parallel.report.matches_expected());
        assert!(serial.report.matches_expected());
    }
    assert_eq!(facility.live_handles(), 0);
}

/// Soft counters that break on demand: `create_handle` fails on one team
/// member, `stop` on another, `release` on every member.
#[derive(Default)]
struct FlakyFacility {
    inner: SoftFacility,
    create_fails_on: Option<usize>,
    stop_fails_on: Option<usize>,
    release_fails: bool,
}

struct FlakyHandle {
    inner: SoftHandle,
    stop_fails: bool,
    release_fails: bool,
}

impl Facility for FlakyFacility {
    type Handle = FlakyHandle;

    fn name(&self) -> &'static str {
        "flaky"
    }

    fn create_handle(&self) -> io::Result<FlakyHandle> {
        let me = rayon::current_thread_index();
        if me.is_some() && me == self.create_fails_on {
            return Err(io::Error::from_raw_os_error(libc::EMFILE));
        }
        Ok(FlakyHandle {
            inner: self.inner.create_handle()?,
            stop_fails: me.is_some() && me == self.stop_fails_on,
            release_fails: self.release_fails,
        })
    }

    fn live_handles(&self) -> usize {
        self.inner.live_handles()
    }
}

impl CounterHandle for FlakyHandle {
    fn subscribe(&mut self, event: &str) -> io::Result<()> {
        self.inner.subscribe(event)
    }

    fn start(&mut self) -> io::Result<()> {
        self.inner.start()
    }

    fn stop(&mut self) -> io::Result<Vec<u64>> {
        let counts = self.inner.stop()?;
        if self.stop_fails {
            return Err(io::Error::new(io::ErrorKind::Other, "counter state lost"));
        }
        Ok(counts)
    }

    fn release(self) -> io::Result<()> {
        self.inner.release()?;
        if self.release_fails {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }
        Ok(())
    }
}

#[test]
fn create_failure_aborts_and_releases_everything() {
    let facility = FlakyFacility {
        create_fails_on: Some(2),
        ..FlakyFacility::default()
    };
    let mut m = Measurement::new(&facility, Team::new(4).unwrap(), EventSpecifier::default());

    match m.run(SessionKind::Parallel, &Matmul::new(16, 42)) {
        Err(Error::ContextCreate { ordinal: 2, .. }) => {}
        other => panic!("unexpected outcome {:?}", other.map(|o| o.report)),
    }
    assert_eq!(facility.live_handles(), 0);
    assert_eq!(m.phase(), SessionPhase::Idle);
    for ordinal in 0..4 {
        assert_eq!(m.registry().state(ordinal), ContextState::Uncreated);
    }
}

#[test]
fn stop_failure_aborts_and_releases_everything() {
    let facility = FlakyFacility {
        stop_fails_on: Some(1),
        ..FlakyFacility::default()
    };
    let mut m = Measurement::new(&facility, Team::new(4).unwrap(), EventSpecifier::default());

    match m.run_pair(&Matmul::new(16, 42), 0) {
        Err(Error::Stop { ordinal: 1, .. }) => {}
        other => panic!("unexpected outcome {:?}", other.map(|(a, _)| a.report)),
    }
    assert_eq!(facility.live_handles(), 0);
    assert_eq!(m.phase(), SessionPhase::Idle);
}

#[test]
fn release_failure_keeps_counts() {
    let facility = FlakyFacility {
        release_fails: true,
        ..FlakyFacility::default()
    };
    let mut m = Measurement::new(&facility, Team::new(4).unwrap(), EventSpecifier::default());
    let matmul = Matmul::new(16, 42);

    let (parallel, serial) = m.run_pair(&matmul, 2).unwrap();
    assert_eq!(parallel.report.total, matmul.expected_total());
    assert_eq!(serial.report.total, matmul.expected_total());
    assert_eq!(serial.report.active_ordinals(), vec![2]);
    assert_eq!(parallel.destroyed, 4);
    assert_eq!(serial.destroyed, 4);
    assert_eq!(facility.live_handles(), 0);
    assert_eq!(m.phase(), SessionPhase::Idle);
}

/// The documented default run: N = 1024 on a team of 8. Slow in debug
/// builds; run with `cargo test --release -- --ignored`.
#[test]
#[ignore]
fn default_scenario_counts_exactly() {
    let facility = SoftFacility::init();
    let mut m = measurement(&facility, 8);
    let matmul = Matmul::new(1024, 42);
    let (parallel, serial) = m.run_pair(&matmul, 0).unwrap();
    assert_eq!(parallel.report.total, 2_147_483_648);
    assert_eq!(serial.report.total, 2_147_483_648);
    assert_eq!(serial.report.active_ordinals(), vec![0]);
}
