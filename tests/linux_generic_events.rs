#![cfg(target_os = "linux")]

use perfteam::linux::PerfFacility;
use perfteam::workload::{Matmul, Workload};
use perfteam::{ContextState, CounterContext, EventSpecifier, Facility, Measurement, Team};

/// Hosts without perf access (containers, high paranoid levels) skip.
fn facility() -> Option<PerfFacility> {
    match PerfFacility::init() {
        Ok(f) => Some(f),
        Err(e) => {
            eprintln!("skipping: {}", e);
            None
        }
    }
}

#[test]
pub fn test_page_faults() {
    let pc = match facility() {
        Some(f) => f,
        None => return,
    };
    let spec: EventSpecifier = "page-faults".parse().unwrap();
    let mut ctx = CounterContext::create(&pc, 0).expect("Could not create context");
    assert_eq!(ctx.subscribe(&spec).unwrap(), 1);

    // Big enough to be mmaped and not come from pre-faulted heap memory.
    let mut buf = vec![0u8; 1024 * 1024 * 16];

    ctx.start().expect("Can not start the counter");
    // Touch two pages:
    buf[0] = 0x1;
    buf[4096] = 0x1;
    std::hint::black_box(&buf);
    let counts = ctx.stop().expect("Can not stop the counter");
    ctx.destroy().unwrap();

    assert!(counts.primary() >= 2, "page faults: {}", counts);
    assert_eq!(ctx.state(), ContextState::Destroyed);
    assert_eq!(pc.live_handles(), 0);
}

#[test]
pub fn test_unknown_event_is_skipped() {
    let pc = match facility() {
        Some(f) => f,
        None => return,
    };
    let spec: EventSpecifier = "task-clock,no-such-event".parse().unwrap();
    let mut ctx = CounterContext::create(&pc, 0).unwrap();
    assert_eq!(ctx.subscribe(&spec).unwrap(), 1);
    ctx.start().unwrap();
    let counts = ctx.stop().unwrap();
    assert!(counts.get(0).is_some());
    assert_eq!(counts.get(1), None);
}

#[test]
pub fn test_team_session_cleans_up() {
    let pc = match facility() {
        Some(f) => f,
        None => return,
    };
    let mut m = Measurement::new(&pc, Team::new(4).unwrap(), "task-clock".parse().unwrap());
    let (parallel, serial) = m.run_pair(&Matmul::new(64, 42), 0).unwrap();
    assert_eq!(parallel.destroyed, 4);
    assert_eq!(serial.destroyed, 4);
    assert_eq!(parallel.report.threads.len(), 4);
    assert_eq!(pc.live_handles(), 0);
}

/// Needs a CPU exposing `FP_ARITH_INST_RETIRED` and a build without FMA
/// contraction surprises.
#[test]
#[ignore]
pub fn test_fp_ops_matches_two_n_cubed() {
    let pc = facility().expect("perf unavailable");
    let n = 256;
    let matmul = Matmul::new(n, 42);
    let mut m = Measurement::new(&pc, Team::new(8).unwrap(), EventSpecifier::default());
    let (parallel, serial) = m.run_pair(&matmul, 0).unwrap();
    assert_eq!(matmul.expected_total(), 2 * 256 * 256 * 256);
    assert_eq!(parallel.report.total, matmul.expected_total());
    assert_eq!(serial.report.total, matmul.expected_total());
    assert_eq!(serial.report.active_ordinals(), vec![0]);
}
