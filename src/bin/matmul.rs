use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use perfteam::config::{Backend, Config};
use perfteam::soft::SoftFacility;
use perfteam::workload::{Matmul, Workload};
use perfteam::{Error, Facility, Measurement, Result, Team};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn measure<F: Facility>(facility: &F, config: &Config) -> Result<()> {
    let team = Team::new(config.threads)?;
    let mut measurement = Measurement::new(facility, team, config.events.clone());
    let matmul = Matmul::new(config.order, config.seed);
    info!(
        n = config.order,
        threads = config.threads,
        facility = facility.name(),
        expected = matmul.expected_total(),
        "measuring matrix multiply"
    );

    let (parallel, serial) = measurement.run_pair(&matmul, config.serial_ordinal)?;
    println!("{}", parallel.report);
    println!("{}", serial.report);
    info!(checksum = matmul.checksum(), "done");
    Ok(())
}

#[cfg(target_os = "linux")]
fn measure_perf(config: &Config) -> Result<()> {
    let facility = perfteam::linux::PerfFacility::init()?;
    measure(&facility, config)
}

#[cfg(not(target_os = "linux"))]
fn measure_perf(_config: &Config) -> Result<()> {
    Err(Error::LibraryInit {
        facility: "perf",
        reason: "perf events are only available on Linux".into(),
    })
}

fn run(config: &Config) -> Result<()> {
    config.validate()?;
    match config.backend {
        Backend::Perf => measure_perf(config),
        Backend::Soft => measure(&SoftFacility::init(), config),
    }
}

fn main() {
    init_logging();
    let config = Config::parse();
    if let Err(e) = run(&config) {
        error!("{}", e);
        eprintln!("perfteam-matmul: {}", e);
        if let Error::LibraryInit { .. } = e {
            eprintln!("hint: try --backend soft or lower /proc/sys/kernel/perf_event_paranoid");
        }
        std::process::exit(1);
    }
}
