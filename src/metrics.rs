//! Gateway metrics.
//!
//! Counts calls into the translation and speech providers and the
//! hit/miss ratio of the speech audio cache. One instance is shared by
//! every gateway of a running server.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct GatewayMetrics {
    translation_calls: AtomicUsize,
    translation_failures: AtomicUsize,
    speech_cache_hits: AtomicUsize,
    speech_cache_misses: AtomicUsize,
    speech_calls: AtomicUsize,
    speech_failures: AtomicUsize,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_translation_call(&self) {
        self.translation_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_translation_failure(&self) {
        self.translation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_speech_cache_hit(&self) {
        self.speech_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_speech_cache_miss(&self) {
        self.speech_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_speech_call(&self) {
        self.speech_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_speech_failure(&self) {
        self.speech_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot every counter and derive the rates.
    pub fn report(&self) -> MetricsReport {
        let translation_calls = self.translation_calls.load(Ordering::Relaxed);
        let translation_failures = self.translation_failures.load(Ordering::Relaxed);
        let hits = self.speech_cache_hits.load(Ordering::Relaxed);
        let misses = self.speech_cache_misses.load(Ordering::Relaxed);

        MetricsReport {
            translation_calls,
            translation_failures,
            translation_success_rate: success_rate(translation_calls, translation_failures),
            speech_calls: self.speech_calls.load(Ordering::Relaxed),
            speech_failures: self.speech_failures.load(Ordering::Relaxed),
            speech_cache_hits: hits,
            speech_cache_misses: misses,
            speech_cache_hit_rate: percentage(hits, hits + misses),
        }
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64) * 100.0
    }
}

fn success_rate(calls: usize, failures: usize) -> f64 {
    percentage(calls.saturating_sub(failures), calls)
}

/// Point-in-time view of [`GatewayMetrics`], served to admins as JSON.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub translation_calls: usize,
    pub translation_failures: usize,
    /// Percentage (0-100)
    pub translation_success_rate: f64,
    pub speech_calls: usize,
    pub speech_failures: usize,
    pub speech_cache_hits: usize,
    pub speech_cache_misses: usize,
    /// Percentage (0-100)
    pub speech_cache_hit_rate: f64,
}
