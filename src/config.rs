//! Command line configuration.

use std::mem;

use clap::{Parser, ValueEnum};

use crate::error::{Error, Result};
use crate::events::EventSpecifier;

pub const DEFAULT_ORDER: usize = 1024;
pub const DEFAULT_THREADS: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Hardware counters through Linux perf events.
    Perf,
    /// Software counters reported by the instrumented kernel.
    Soft,
}

/// Count floating-point operations of a matrix multiply per thread, once
/// with the multiply spread over the team and once on a single member.
#[derive(Clone, Debug, Parser)]
#[command(name = "perfteam-matmul", version)]
pub struct Config {
    /// Matrix order N.
    #[arg(value_name = "N", default_value_t = DEFAULT_ORDER)]
    pub order: usize,

    /// Team size.
    #[arg(value_name = "THREADS", default_value_t = DEFAULT_THREADS)]
    pub threads: usize,

    /// Counting facility.
    #[arg(long, value_enum, default_value = "perf", env = "PERFTEAM_BACKEND")]
    pub backend: Backend,

    /// Comma separated event names; the first one is checked against the
    /// expected total.
    #[arg(long, default_value = "FP_OPS", env = "PERFTEAM_EVENTS")]
    pub events: EventSpecifier,

    /// Team member running the serial session's workload.
    #[arg(long, default_value_t = 0)]
    pub serial_ordinal: usize,

    /// Seed for the matrix contents.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            order: DEFAULT_ORDER,
            threads: DEFAULT_THREADS,
            backend: Backend::Perf,
            events: EventSpecifier::default(),
            serial_ordinal: 0,
            seed: 42,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(Error::Config("THREADS must be at least 1".into()));
        }
        if self.serial_ordinal >= self.threads {
            return Err(Error::Config(format!(
                "--serial-ordinal {} must be below THREADS ({})",
                self.serial_ordinal, self.threads
            )));
        }
        let too_large = || Error::Config(format!("N = {} is too large", self.order));
        let n = self.order as u64;
        2u64.checked_mul(n)
            .and_then(|x| x.checked_mul(n))
            .and_then(|x| x.checked_mul(n))
            .ok_or_else(too_large)?;
        // A, B and C, one f64 each per element.
        let bytes = self
            .order
            .checked_mul(self.order)
            .and_then(|sq| sq.checked_mul(3 * mem::size_of::<f64>()))
            .ok_or_else(too_large)?;
        if bytes > isize::MAX as usize {
            return Err(too_large());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("perfteam-matmul").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn documented_defaults() {
        let c = parse(&[]);
        assert_eq!(c.order, 1024);
        assert_eq!(c.threads, 8);
        assert_eq!(c.events, EventSpecifier::default());
        assert_eq!(c.serial_ordinal, 0);
        c.validate().unwrap();
    }

    #[test]
    fn positional_order_and_threads() {
        let c = parse(&["1500", "4", "--backend", "soft", "--events", "FP_OPS,KERNEL_ROWS"]);
        assert_eq!(c.order, 1500);
        assert_eq!(c.threads, 4);
        assert_eq!(c.backend, Backend::Soft);
        assert_eq!(c.events.len(), 2);
    }

    #[test]
    fn order_only() {
        let c = parse(&["64"]);
        assert_eq!((c.order, c.threads), (64, DEFAULT_THREADS));
    }

    #[test]
    fn invalid_combinations() {
        assert!(parse(&["16", "0"]).validate().is_err());
        assert!(parse(&["16", "2", "--serial-ordinal", "2"]).validate().is_err());
        assert!(Config::try_parse_from(["perfteam-matmul", "--events", ""]).is_err());
    }

    #[test]
    fn order_bounded_by_expected_total() {
        assert!(matches!(
            parse(&["2097152", "1"]).validate(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            parse(&[&usize::MAX.to_string(), "1"]).validate(),
            Err(Error::Config(_))
        ));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn largest_countable_order() {
        parse(&["2097151", "1"]).validate().unwrap();
    }
}
