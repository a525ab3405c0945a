//! Streaming run metrics.
//!
//! The aggregator is purely additive: each case report is folded in exactly
//! once as it completes, so totals are live while the run is still going.
//! Errored cases are tracked separately from graded failures and excluded
//! from accuracy.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{CaseReport, Outcome, RetrievalRank};

/// Running latency accumulator for one phase
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PhaseLatency {
    /// Samples folded in
    pub count: u64,
    /// Sum of all samples in milliseconds
    pub total_ms: f64,
}

impl PhaseLatency {
    fn add(&mut self, duration: Duration) {
        self.count += 1;
        self.total_ms += duration.as_secs_f64() * 1000.0;
    }

    /// Mean latency in milliseconds, `None` before any sample
    pub fn mean_ms(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.total_ms / self.count as f64)
        }
    }
}

/// Running retrieval-rank accumulator.
///
/// Samples come only from cases that carry a [`RetrievalRank`]; scenarios
/// and abstention cases contribute nothing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RankStats {
    /// Cases with a rank sample
    pub count: u64,
    /// Sum of reciprocal ranks
    pub rr_total: f64,
    /// Cases where the gold answer ranked first
    pub hit_at_1: u64,
    /// Cases where the gold answer ranked in the top 5
    pub hit_at_5: u64,
    /// Cases where the gold answer ranked in the top 10
    pub hit_at_10: u64,
}

impl RankStats {
    fn add(&mut self, rank: &RetrievalRank) {
        self.count += 1;
        self.rr_total += rank.reciprocal_rank;
        self.hit_at_1 += u64::from(rank.hit_at_1);
        self.hit_at_5 += u64::from(rank.hit_at_5);
        self.hit_at_10 += u64::from(rank.hit_at_10);
    }

    /// Mean reciprocal rank, `None` before any sample
    pub fn mrr(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.rr_total / self.count as f64)
        }
    }

    /// Fraction of sampled cases with a hit in the top `k` (1, 5 or 10)
    pub fn hit_rate(&self, k: usize) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        let hits = match k {
            1 => self.hit_at_1,
            5 => self.hit_at_5,
            10 => self.hit_at_10,
            _ => return None,
        };
        Some(hits as f64 / self.count as f64)
    }
}

/// Per-category tallies
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryStats {
    /// Graded correct
    pub passed: u64,
    /// Graded wrong
    pub failed: u64,
    /// Infrastructure faults
    pub errored: u64,
    /// Query-phase latency over graded cases
    pub query_latency: PhaseLatency,
    /// Retrieval-rank quality over sampled cases
    pub retrieval: RankStats,
}

impl CategoryStats {
    /// Accuracy over graded cases, `None` when none were graded
    pub fn accuracy(&self) -> Option<f64> {
        let graded = self.passed + self.failed;
        if graded == 0 {
            None
        } else {
            Some(self.passed as f64 / graded as f64)
        }
    }
}

/// Accumulates case outcomes into run-level statistics
#[derive(Debug, Default)]
pub struct RunAggregator {
    passed: u64,
    failed: u64,
    errored: u64,
    ingest: PhaseLatency,
    index_wait: PhaseLatency,
    query: PhaseLatency,
    retrieval: RankStats,
    categories: BTreeMap<String, CategoryStats>,
    failure_modes: BTreeMap<String, u64>,
}

impl RunAggregator {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one finished case in. Must be called exactly once per case.
    pub fn fold(&mut self, report: &CaseReport) {
        let category = self
            .categories
            .entry(report.category.clone())
            .or_default();

        match &report.outcome {
            Outcome::Passed => {
                self.passed += 1;
                category.passed += 1;
            }
            Outcome::Failed { mode, .. } => {
                self.failed += 1;
                category.failed += 1;
                *self.failure_modes.entry(mode.clone()).or_insert(0) += 1;
            }
            Outcome::Errored { .. } => {
                self.errored += 1;
                category.errored += 1;
                // An errored case never completed its phases; folding its
                // zeroed timings would dilute the means toward zero.
                return;
            }
        }

        self.ingest.add(report.timings.ingest);
        self.index_wait.add(report.timings.index_wait);
        category.query_latency.add(report.timings.query);
        self.query.add(report.timings.query);

        if let Some(rank) = &report.rank {
            self.retrieval.add(rank);
            category.retrieval.add(rank);
        }
    }

    /// Total cases folded so far
    pub fn total(&self) -> u64 {
        self.passed + self.failed + self.errored
    }

    /// Accuracy over graded (non-errored) cases.
    ///
    /// `None` when no case was graded; reported as N/A, never a
    /// divide-by-zero.
    pub fn accuracy(&self) -> Option<f64> {
        let graded = self.passed + self.failed;
        if graded == 0 {
            None
        } else {
            Some(self.passed as f64 / graded as f64)
        }
    }

    /// Build the machine-readable run summary artifact
    pub fn summary(
        &self,
        run_id: impl Into<String>,
        provider: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> RunSummary {
        RunSummary {
            run_id: run_id.into(),
            provider: provider.into(),
            started_at,
            finished_at: Utc::now(),
            total: self.total(),
            passed: self.passed,
            failed: self.failed,
            errored: self.errored,
            accuracy: self.accuracy(),
            mean_ingest_ms: self.ingest.mean_ms(),
            mean_index_wait_ms: self.index_wait.mean_ms(),
            mean_query_ms: self.query.mean_ms(),
            mrr: self.retrieval.mrr(),
            hit_at_1: self.retrieval.hit_rate(1),
            hit_at_5: self.retrieval.hit_rate(5),
            hit_at_10: self.retrieval.hit_rate(10),
            categories: self.categories.clone(),
            failure_modes: self.failure_modes.clone(),
        }
    }
}

/// Machine-readable summary of a completed run, written as JSON for
/// downstream reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique id of the run all container tags were scoped to
    pub run_id: String,
    /// Provider name as reported by the backend
    pub provider: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the summary was built
    pub finished_at: DateTime<Utc>,
    /// Cases folded in
    pub total: u64,
    /// Graded correct
    pub passed: u64,
    /// Graded wrong
    pub failed: u64,
    /// Infrastructure faults
    pub errored: u64,
    /// `None` (serialized as null) when no case was graded
    pub accuracy: Option<f64>,
    /// Mean ingest latency over graded cases
    pub mean_ingest_ms: Option<f64>,
    /// Mean index-wait latency over graded cases
    pub mean_index_wait_ms: Option<f64>,
    /// Mean query latency over graded cases
    pub mean_query_ms: Option<f64>,
    /// Mean reciprocal rank over cases with a rank sample
    pub mrr: Option<f64>,
    /// Fraction of sampled cases with the gold answer ranked first
    pub hit_at_1: Option<f64>,
    /// Fraction of sampled cases with the gold answer in the top 5
    pub hit_at_5: Option<f64>,
    /// Fraction of sampled cases with the gold answer in the top 10
    pub hit_at_10: Option<f64>,
    /// Per-category breakdown
    pub categories: BTreeMap<String, CategoryStats>,
    /// Failure-mode frequencies across the run
    pub failure_modes: BTreeMap<String, u64>,
}

impl RunSummary {
    /// A run is unhealthy only when every case hit an infrastructure fault.
    ///
    /// Graded failures are a valid measurement outcome; they never make the
    /// run unhealthy on their own.
    pub fn is_healthy(&self) -> bool {
        self.total == 0 || self.errored < self.total
    }
}
