//! Global atomic counters for scheduler observability.
//!
//! Counters are incremented silently at the call site and are process-wide
//! running totals; they are never reset outside tests. A run takes a
//! [`MetricsSnapshot`] when it starts and reports only the movement since
//! then via [`Metrics::flush_run`]. Runs that overlap in one process see
//! each other's increments in that delta.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    generations: AtomicU64,
    generator_errors: AtomicU64,
    candidates_passed: AtomicU64,
    judge_invocations: AtomicU64,
    judge_cache_hits: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            generations: AtomicU64::new(0),
            generator_errors: AtomicU64::new(0),
            candidates_passed: AtomicU64::new(0),
            judge_invocations: AtomicU64::new(0),
            judge_cache_hits: AtomicU64::new(0),
        }
    }

    /// One generator call was made.
    pub fn inc_generations(&self) {
        self.generations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "generations", "counter incremented");
    }

    pub fn inc_generator_errors(&self) {
        self.generator_errors.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "generator_errors", "counter incremented");
    }

    /// A candidate passed every blocking gate.
    pub fn inc_candidates_passed(&self) {
        self.candidates_passed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "candidates_passed", "counter incremented");
    }

    pub fn inc_judge_invocations(&self) {
        self.judge_invocations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "judge_invocations", "counter incremented");
    }

    pub fn inc_judge_cache_hits(&self) {
        self.judge_cache_hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "judge_cache_hits", "counter incremented");
    }

    /// Current totals.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            generations: self.generations(),
            generator_errors: self.generator_errors(),
            candidates_passed: self.candidates_passed(),
            judge_invocations: self.judge_invocations(),
            judge_cache_hits: self.judge_cache_hits(),
        }
    }

    /// Emit one run's counter deltas as a single `info!` event.
    pub fn flush_run(&self, run_id: &str, delta: &MetricsSnapshot) {
        tracing::info!(
            metric = "flush",
            scope = "run",
            run_id = %run_id,
            generations = delta.generations,
            generator_errors = delta.generator_errors,
            candidates_passed = delta.candidates_passed,
            judge_invocations = delta.judge_invocations,
            judge_cache_hits = delta.judge_cache_hits,
        );
    }

    pub fn generations(&self) -> u64 {
        self.generations.load(Ordering::Relaxed)
    }

    pub fn generator_errors(&self) -> u64 {
        self.generator_errors.load(Ordering::Relaxed)
    }

    pub fn candidates_passed(&self) -> u64 {
        self.candidates_passed.load(Ordering::Relaxed)
    }

    pub fn judge_invocations(&self) -> u64 {
        self.judge_invocations.load(Ordering::Relaxed)
    }

    pub fn judge_cache_hits(&self) -> u64 {
        self.judge_cache_hits.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.generations.store(0, Ordering::Relaxed);
        self.generator_errors.store(0, Ordering::Relaxed);
        self.candidates_passed.store(0, Ordering::Relaxed);
        self.judge_invocations.store(0, Ordering::Relaxed);
        self.judge_cache_hits.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time copy of the counters, or a difference of two copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub generations: u64,
    pub generator_errors: u64,
    pub candidates_passed: u64,
    pub judge_invocations: u64,
    pub judge_cache_hits: u64,
}

impl MetricsSnapshot {
    /// Movement from `earlier` to `self`.
    pub fn since(&self, earlier: &MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            generations: self.generations.saturating_sub(earlier.generations),
            generator_errors: self.generator_errors.saturating_sub(earlier.generator_errors),
            candidates_passed: self.candidates_passed.saturating_sub(earlier.candidates_passed),
            judge_invocations: self.judge_invocations.saturating_sub(earlier.judge_invocations),
            judge_cache_hits: self.judge_cache_hits.saturating_sub(earlier.judge_cache_hits),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_generations();
        m.inc_generations();
        m.inc_generator_errors();
        m.inc_judge_cache_hits();
        assert_eq!(m.generations(), 2);
        assert_eq!(m.generator_errors(), 1);
        assert_eq!(m.judge_cache_hits(), 1);
        assert_eq!(m.judge_invocations(), 0);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_generations();
        m.inc_candidates_passed();
        m.inc_judge_invocations();
        m.reset();
        assert_eq!(m.generations(), 0);
        assert_eq!(m.candidates_passed(), 0);
        assert_eq!(m.judge_invocations(), 0);
    }

    #[test]
    fn snapshot_delta_covers_only_later_increments() {
        let m = Metrics::new();
        m.inc_generations();
        m.inc_judge_cache_hits();
        let baseline = m.snapshot();

        m.inc_generations();
        m.inc_generations();
        m.inc_generator_errors();
        let delta = m.snapshot().since(&baseline);

        assert_eq!(delta.generations, 2);
        assert_eq!(delta.generator_errors, 1);
        assert_eq!(delta.judge_cache_hits, 0);
        assert_eq!(m.generations(), 3);
    }

    #[test]
    fn delta_never_underflows() {
        let m = Metrics::new();
        m.inc_candidates_passed();
        let later = m.snapshot();
        m.reset();
        assert_eq!(m.snapshot().since(&later), MetricsSnapshot::default());
    }
}
