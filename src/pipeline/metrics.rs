//! Process-wide ingestion metrics.
//!
//! Per-document costs accumulate locally during processing and flush into
//! these counters behind one mutex at the end of each document.

use crate::llm::CostRecord;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Aggregated totals served by `stats()`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    /// Documents by result status label.
    pub status_counts: BTreeMap<String, u64>,
    /// Documents by triage category label.
    pub category_counts: BTreeMap<String, u64>,
    /// Error counts by kind label.
    pub error_counts: BTreeMap<String, u64>,
    /// Cost totals per provider.
    pub provider_costs: BTreeMap<String, ProviderCost>,
    /// Total USD across providers.
    pub total_usd: f64,
    /// Vocabulary suggestions accumulated for curator review.
    pub vocabulary_suggestions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProviderCost {
    pub calls: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub usd: f64,
}

/// Shared metrics sink.
#[derive(Default)]
pub struct Metrics {
    inner: Mutex<Stats>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_status(&self, status: &str) {
        let mut stats = self.lock();
        *stats.status_counts.entry(status.to_string()).or_default() += 1;
    }

    pub fn record_category(&self, category: &str) {
        let mut stats = self.lock();
        *stats.category_counts.entry(category.to_string()).or_default() += 1;
    }

    pub fn record_error(&self, kind: &str) {
        let mut stats = self.lock();
        *stats.error_counts.entry(kind.to_string()).or_default() += 1;
    }

    pub fn record_costs(&self, costs: &[CostRecord]) {
        let mut stats = self.lock();
        for cost in costs {
            let entry = stats
                .provider_costs
                .entry(cost.provider.clone())
                .or_default();
            entry.calls += 1;
            entry.tokens_in += cost.tokens_in;
            entry.tokens_out += cost.tokens_out;
            entry.usd += cost.usd;
            stats.total_usd += cost.usd;
        }
    }

    pub fn record_suggestions(&self, suggestions: &[String]) {
        let mut stats = self.lock();
        for suggestion in suggestions {
            if !stats.vocabulary_suggestions.contains(suggestion) {
                stats.vocabulary_suggestions.push(suggestion.clone());
            }
        }
    }

    /// Snapshot for `stats()`.
    pub fn snapshot(&self) -> Stats {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Stats> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn costs_aggregate_per_provider() {
        let metrics = Metrics::new();
        metrics.record_costs(&[
            CostRecord {
                provider: "groq".into(),
                model: "m".into(),
                tokens_in: 100,
                tokens_out: 50,
                usd: 0.001,
            },
            CostRecord {
                provider: "groq".into(),
                model: "m".into(),
                tokens_in: 200,
                tokens_out: 80,
                usd: 0.002,
            },
        ]);
        let stats = metrics.snapshot();
        let groq = &stats.provider_costs["groq"];
        assert_eq!(groq.calls, 2);
        assert_eq!(groq.tokens_in, 300);
        assert!((stats.total_usd - 0.003).abs() < 1e-12);
    }
}
