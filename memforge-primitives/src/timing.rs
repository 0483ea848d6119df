//! Stopwatches with configurable double-call policies.
//!
//! A plain [`StopWatch`] records rounds of start/stop pairs. The policies
//! decide what a second consecutive start (or stop) does, which is what lets
//! a group of threads share one watch: with `SaveEarliest` on start and
//! `SaveLatest` on stop, the shared watch spans from the first thread in to
//! the last thread out.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// What to do on a second consecutive start (or stop) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoubleCallPolicy {
    /// Assert that calls alternate strictly.
    Forbidden,
    /// Keep the first timestamp, ignore later ones.
    SaveEarliest,
    /// Overwrite with the latest timestamp.
    SaveLatest,
}

/// Unit the extracted durations are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Secs,
    Millis,
    Micros,
    Nanos,
}

impl TimeUnit {
    fn cast(self, d: Duration) -> f64 {
        match self {
            TimeUnit::Secs => d.as_secs_f64(),
            TimeUnit::Millis => d.as_secs_f64() * 1e3,
            TimeUnit::Micros => d.as_secs_f64() * 1e6,
            TimeUnit::Nanos => d.as_secs_f64() * 1e9,
        }
    }
}

/// Single-threaded stopwatch recording start/stop rounds.
#[derive(Debug, Clone)]
pub struct StopWatch {
    start_policy: DoubleCallPolicy,
    stop_policy: DoubleCallPolicy,
    rounds: Vec<(Instant, Instant)>,
    running: Option<Instant>,
}

impl Default for StopWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl StopWatch {
    /// Watch with strictly alternating start/stop calls.
    pub fn new() -> Self {
        Self::with_policies(DoubleCallPolicy::Forbidden, DoubleCallPolicy::Forbidden)
    }

    pub fn with_policies(start_policy: DoubleCallPolicy, stop_policy: DoubleCallPolicy) -> Self {
        Self {
            start_policy,
            stop_policy,
            rounds: Vec::new(),
            running: None,
        }
    }

    /// Begin a round.
    pub fn start(&mut self) {
        if self.running.is_some() {
            match self.start_policy {
                DoubleCallPolicy::Forbidden => {
                    panic!("stopwatch started twice without an intervening stop")
                }
                DoubleCallPolicy::SaveEarliest => return,
                DoubleCallPolicy::SaveLatest => {}
            }
        }
        // Timestamp taken last so setup above does not count.
        self.running = Some(Instant::now());
    }

    /// End the running round.
    pub fn stop(&mut self) {
        // Timestamp taken first so the policy check does not count.
        let end = Instant::now();
        match self.running.take() {
            Some(start) => self.rounds.push((start, end)),
            None => match self.stop_policy {
                DoubleCallPolicy::Forbidden => {
                    panic!("stopwatch stopped while not running")
                }
                DoubleCallPolicy::SaveEarliest => {}
                DoubleCallPolicy::SaveLatest => {
                    if let Some(last) = self.rounds.last_mut() {
                        last.1 = end;
                    }
                }
            },
        }
    }

    /// Number of completed rounds.
    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }

    /// Durations of all completed rounds.
    pub fn durations(&self, unit: TimeUnit) -> Vec<f64> {
        self.rounds
            .iter()
            .map(|&(start, end)| unit.cast(end - start))
            .collect()
    }

    pub fn duration_sum(&self, unit: TimeUnit) -> f64 {
        self.durations(unit).iter().sum()
    }

    pub fn duration_avg(&self, unit: TimeUnit) -> f64 {
        if self.rounds.is_empty() {
            return 0.0;
        }
        self.duration_sum(unit) / self.rounds.len() as f64
    }

    pub fn duration_min(&self, unit: TimeUnit) -> f64 {
        self.durations(unit).into_iter().fold(f64::INFINITY, f64::min)
    }

    pub fn duration_max(&self, unit: TimeUnit) -> f64 {
        self.durations(unit).into_iter().fold(0.0, f64::max)
    }
}

/// Thread-safe stopwatch shared by the workers of a group.
#[derive(Debug)]
pub struct SharedStopWatch {
    inner: Mutex<StopWatch>,
}

impl SharedStopWatch {
    pub fn with_policies(start_policy: DoubleCallPolicy, stop_policy: DoubleCallPolicy) -> Self {
        Self {
            inner: Mutex::new(StopWatch::with_policies(start_policy, stop_policy)),
        }
    }

    pub fn start(&self) {
        self.inner.lock().expect("stopwatch lock poisoned").start();
    }

    pub fn stop(&self) {
        self.inner.lock().expect("stopwatch lock poisoned").stop();
    }

    pub fn duration_sum(&self, unit: TimeUnit) -> f64 {
        self.inner
            .lock()
            .expect("stopwatch lock poisoned")
            .duration_sum(unit)
    }

    pub fn round_count(&self) -> usize {
        self.inner
            .lock()
            .expect("stopwatch lock poisoned")
            .round_count()
    }
}
