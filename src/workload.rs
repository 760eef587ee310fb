//! Instrumented workloads.
//!
//! The counting machinery only needs a workload whose primary-event total is
//! known in advance and does not depend on how the work is spread across
//! threads. The reference workload is a dense matrix multiply.

use std::sync::Mutex;

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::soft::{self, SoftEvent};

pub trait Workload: Sync {
    /// Analytic count of the primary event for one run.
    fn expected_total(&self) -> u64;

    /// Run decomposed over the current rayon pool.
    fn run_parallel(&self);

    /// Run on the calling thread only.
    fn run_serial(&self);
}

/// `C += A * B` on square row-major `f64` matrices of order `n`.
pub struct Matmul {
    n: usize,
    a: Vec<f64>,
    b: Vec<f64>,
    c: Mutex<Vec<f64>>,
}

impl Matmul {
    /// Matrices filled with uniform `[0, 1)` values from a seeded generator.
    pub fn new(n: usize, seed: u64) -> Matmul {
        let mut rng = StdRng::seed_from_u64(seed);
        let dist = Uniform::new(0.0f64, 1.0);
        let mut fill = || -> Vec<f64> { (0..n * n).map(|_| dist.sample(&mut rng)).collect() };
        let a = fill();
        let b = fill();
        let c = fill();
        Matmul {
            n,
            a,
            b,
            c: Mutex::new(c),
        }
    }

    pub fn order(&self) -> usize {
        self.n
    }

    /// Sum over `C`, handy to keep results observable.
    pub fn checksum(&self) -> f64 {
        self.c
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .sum()
    }

    fn with_c<R>(&self, f: impl FnOnce(&mut [f64]) -> R) -> R {
        let mut c = self.c.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut c)
    }
}

/// One output row: `c_row += a_row * B`. Two flops per inner iteration.
#[inline(never)]
fn matmul_row(a_row: &[f64], b: &[f64], c_row: &mut [f64], n: usize) {
    for k in 0..n {
        let a_ik = a_row[k];
        let b_row = &b[k * n..(k + 1) * n];
        for j in 0..n {
            c_row[j] += a_ik * b_row[j];
        }
    }
    soft::tally(SoftEvent::FpOps, 2 * (n as u64) * (n as u64));
    soft::tally(SoftEvent::KernelRows, 1);
}

impl Workload for Matmul {
    fn expected_total(&self) -> u64 {
        let n = self.n as u64;
        2 * n * n * n
    }

    #[inline(never)]
    fn run_parallel(&self) {
        let n = self.n;
        if n == 0 {
            return;
        }
        let (a, b) = (&self.a, &self.b);
        self.with_c(|c| {
            c.par_chunks_mut(n)
                .enumerate()
                .for_each(|(i, c_row)| matmul_row(&a[i * n..(i + 1) * n], b, c_row, n));
        });
    }

    #[inline(never)]
    fn run_serial(&self) {
        let n = self.n;
        if n == 0 {
            return;
        }
        let (a, b) = (&self.a, &self.b);
        self.with_c(|c| {
            for (i, c_row) in c.chunks_mut(n).enumerate() {
                matmul_row(&a[i * n..(i + 1) * n], b, c_row, n);
            }
        });
    }
}
