//! SIEVE - Filter Metrics
//! Atomic counters recorded by the filter facade, readable from any
//! thread without locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Operation counters for one filter.
///
/// All counters use `Ordering::Relaxed`; they are for observability only.
#[derive(Debug)]
pub struct FilterMetrics {
    /// Items passed to `add`/`add_all`.
    pub adds: AtomicU64,
    /// Adds that reported the item as already present.
    pub duplicates: AtomicU64,
    /// Items passed to `contains`/`contains_all`.
    pub lookups: AtomicU64,
    /// Lookups that reported the item as present.
    pub positives: AtomicU64,
    pub persists: AtomicU64,
    pub restores: AtomicU64,
    /// Calls that returned an error.
    pub failures: AtomicU64,
    opened: Instant,
}

impl FilterMetrics {
    pub fn new() -> Self {
        Self {
            adds: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            lookups: AtomicU64::new(0),
            positives: AtomicU64::new(0),
            persists: AtomicU64::new(0),
            restores: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            opened: Instant::now(),
        }
    }

    /// Record the flags returned by an add call.
    pub fn record_adds(&self, already_present: &[bool]) {
        let dups = already_present.iter().filter(|&&b| b).count();
        self.adds
            .fetch_add(already_present.len() as u64, Ordering::Relaxed);
        self.duplicates.fetch_add(dups as u64, Ordering::Relaxed);
    }

    /// Record the flags returned by a lookup call.
    pub fn record_lookups(&self, found: &[bool]) {
        let hits = found.iter().filter(|&&b| b).count();
        self.lookups.fetch_add(found.len() as u64, Ordering::Relaxed);
        self.positives.fetch_add(hits as u64, Ordering::Relaxed);
    }

    pub fn record_persist(&self) {
        self.persists.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_restore(&self) {
        self.restores.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Share of added items that were already present.
    pub fn duplicate_ratio(&self) -> f64 {
        let adds = self.adds.load(Ordering::Relaxed);
        if adds == 0 {
            return 0.0;
        }
        self.duplicates.load(Ordering::Relaxed) as f64 / adds as f64
    }

    pub fn uptime_secs(&self) -> f64 {
        self.opened.elapsed().as_secs_f64()
    }

    /// Format metrics as a human-readable report.
    pub fn report(&self) -> String {
        format!(
            "\n═══ SIEVE Filter Metrics ═══\n\
             Items:\n\
               adds:       {}\n\
               duplicates: {} ({:.1}%)\n\
               lookups:    {}\n\
               positives:  {}\n\
             Storage:\n\
               persists:   {}\n\
               restores:   {}\n\
             Failures:     {}\n\
             Uptime: {:.2}s",
            self.adds.load(Ordering::Relaxed),
            self.duplicates.load(Ordering::Relaxed),
            self.duplicate_ratio() * 100.0,
            self.lookups.load(Ordering::Relaxed),
            self.positives.load(Ordering::Relaxed),
            self.persists.load(Ordering::Relaxed),
            self.restores.load(Ordering::Relaxed),
            self.failures.load(Ordering::Relaxed),
            self.uptime_secs(),
        )
    }
}

impl Default for FilterMetrics {
    fn default() -> Self {
        Self::new()
    }
}
