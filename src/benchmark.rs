//! Argon2id iteration-count calibration.
//!
//! Picks the number of passes `i` such that hashing at a fixed memory cost
//! takes about `target_time_ms` on this machine. Fixed per-call overhead
//! (memory allocation, lazy initialisation) is estimated separately and
//! kept out of the per-iteration rate.
//!
//! Outline:
//! 1. warm-up run at 8 KiB / 1 pass, reported but excluded from accounting;
//! 2. baseline rate at 8 KiB, doubling passes until the clock moves;
//! 3. main search: exponential until the first non-zero sample, then
//!    linear steps `round((target + setup - duration) / rate)` until the
//!    step is zero;
//! 4. shave at most half of the last step to bound overshoot from one
//!    noisy sample, then round up;
//! 5. optionally re-measure once to report the relative error.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::crypto::kdf::KdfParams;
use crate::crypto::provider::CryptoProvider;
use crate::errors::{Result, VaultError};

/// Memory cost used for warm-up and baseline runs.
pub const BASELINE_MEMORY_KIB: u32 = 8;

/// Upper bound on `iterations * memory_kib` during the search.
const MAX_WORK_KIB: f64 = u32::MAX as f64;

/// Baseline doubling gives up past this many passes.
const MAX_BASELINE_ITERATIONS: u32 = 1 << 20;

/// Linear refinement stops after this many rounds even if still moving.
const MAX_ROUNDS: usize = 32;

const BENCH_SALT: [u8; 16] = [0u8; 16];

/// What to calibrate for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkOptions {
    pub target_time_ms: f64,
    pub memory_kib: u32,
    pub parallelism: u32,
    /// Re-measure at the chosen count and report the relative error.
    #[serde(default)]
    pub measure_error: bool,
}

impl Default for BenchmarkOptions {
    fn default() -> Self {
        Self {
            target_time_ms: 1000.0,
            memory_kib: 32 * 1024,
            parallelism: 1,
            measure_error: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Durations {
    pub warmup: f64,
    pub setup: f64,
    pub overall: f64,
    pub ms_per_iteration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkResult {
    pub iterations: u32,
    /// log2 of the chosen work relative to the 8 KiB baseline rate.
    pub bits: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<f64>,
    pub durations: Durations,
}

impl BenchmarkResult {
    /// Parameters to use for new vaults.
    pub fn kdf_params(&self, options: &BenchmarkOptions) -> KdfParams {
        KdfParams::new(options.parallelism, options.memory_kib, self.iterations)
    }
}

type Hasher<'a> = Box<dyn FnMut(&KdfParams) -> Result<()> + 'a>;

/// One calibration run.
pub struct KdfBenchmark<'a> {
    clock: &'a dyn Clock,
    reference_clock: Option<&'a dyn Clock>,
    hasher: Hasher<'a>,
}

impl<'a> KdfBenchmark<'a> {
    /// Benchmark the provider's real Argon2id.
    pub fn new(clock: &'a dyn Clock, crypto: &'a dyn CryptoProvider) -> Self {
        Self::with_hasher(clock, move |params| {
            crypto.argon2id(b"", &BENCH_SALT, params).map(drop)
        })
    }

    /// Benchmark an arbitrary hash function (used to simulate timings).
    pub fn with_hasher<F>(clock: &'a dyn Clock, hasher: F) -> Self
    where
        F: FnMut(&KdfParams) -> Result<()> + 'a,
    {
        Self {
            clock,
            reference_clock: None,
            hasher: Box::new(hasher),
        }
    }

    /// Undistorted clock for the optional error measurement.
    pub fn reference_clock(mut self, clock: &'a dyn Clock) -> Self {
        self.reference_clock = Some(clock);
        self
    }

    fn measure(
        &mut self,
        clock: &dyn Clock,
        parallelism: u32,
        memory_kib: u32,
        iterations: u32,
    ) -> Result<f64> {
        let params = KdfParams::new(parallelism, memory_kib, iterations);
        let start = clock.now_ms();
        (self.hasher)(&params)?;
        Ok((clock.now_ms() - start).max(0.0))
    }

    pub fn run(&mut self, options: &BenchmarkOptions) -> Result<BenchmarkResult> {
        if !(options.target_time_ms.is_finite() && options.target_time_ms > 0.0) {
            return Err(VaultError::Benchmark(format!(
                "target time must be positive (got {})",
                options.target_time_ms
            )));
        }
        KdfParams::new(options.parallelism, options.memory_kib, 1).validate()?;

        let clock = self.clock;
        let target = options.target_time_ms;
        let memory = f64::from(options.memory_kib);
        let start = clock.now_ms();

        let warmup = self.measure(clock, 1, BASELINE_MEMORY_KIB, 1)?;

        let min_ms_per_iteration = {
            let mut iterations = 1u32;
            loop {
                let duration = self.measure(clock, 1, BASELINE_MEMORY_KIB, iterations)?;
                if duration > 0.0 {
                    break duration / f64::from(iterations);
                }
                if iterations >= MAX_BASELINE_ITERATIONS {
                    return Err(VaultError::Benchmark(
                        "clock did not advance while measuring the baseline".into(),
                    ));
                }
                iterations *= 2;
            }
        };

        let mut i = 0.5_f64;
        let mut ms_per_iteration = 0.0_f64;
        let mut setup = 0.0_f64;
        let mut duration = 0.0_f64;
        let mut first: Option<(f64, f64)> = None;
        let mut last_step = 0.0_f64;
        let mut rounds = 0usize;

        loop {
            let searching = ms_per_iteration <= 0.0;
            let step = if searching {
                i
            } else {
                ((target + setup - duration) / ms_per_iteration).round()
            };
            if step == 0.0 {
                break;
            }

            let next = (i + step).max(1.0);
            if next == i {
                break;
            }
            if next * memory > MAX_WORK_KIB {
                if searching {
                    return Err(VaultError::Benchmark(
                        "clock did not advance before reaching the memory ceiling".into(),
                    ));
                }
                break;
            }
            rounds += 1;
            if rounds > MAX_ROUNDS {
                debug!(rounds, "benchmark stopped refining");
                break;
            }

            last_step = next - i;
            i = next;
            // `i` is integral here: 0.5 doubles to 1 and every later step is rounded.
            duration = self.measure(clock, options.parallelism, options.memory_kib, i as u32)?;
            if duration <= 0.0 {
                continue;
            }

            match first {
                None => {
                    first = Some((i, duration));
                    ms_per_iteration = duration / i;
                }
                Some((first_i, first_duration)) => {
                    if i > first_i && duration > first_duration {
                        ms_per_iteration = (duration - first_duration) / (i - first_i);
                    }
                    setup = (first_duration - ms_per_iteration * first_i).max(0.0);
                }
            }
            debug!(iterations = i, duration, ms_per_iteration, setup, "benchmark sample");
        }

        if ms_per_iteration <= 0.0 {
            return Err(VaultError::Benchmark(
                "clock did not advance during calibration".into(),
            ));
        }

        let overshoot = (duration - setup - target) / ms_per_iteration;
        i -= overshoot.clamp(0.0, last_step.max(0.0) / 2.0);
        let iterations = (i.ceil() as u32).max(1);

        let work = f64::from(iterations) * ms_per_iteration - setup;
        let bits = (work / min_ms_per_iteration).max(1.0).log2();

        let error = if options.measure_error {
            let reference = self.reference_clock.unwrap_or(clock);
            let measured =
                self.measure(reference, options.parallelism, options.memory_kib, iterations)?;
            Some((measured - setup - target) / target)
        } else {
            None
        };

        let result = BenchmarkResult {
            iterations,
            bits,
            error,
            durations: Durations {
                warmup,
                setup,
                overall: clock.now_ms() - start,
                ms_per_iteration,
            },
        };
        info!(
            iterations,
            bits,
            ms_per_iteration,
            memory_kib = options.memory_kib,
            "Argon2id benchmark complete"
        );
        Ok(result)
    }
}
