//! Run orchestration.
//!
//! Each test case walks the state machine
//! `pending -> ingesting -> indexing -> querying -> grading` and terminates
//! as passed, failed or errored. Cases run concurrently under a bounded
//! worker pool; a slow or failed case never stalls the pool, and every exit
//! path releases the case's container tag and attempts best-effort cleanup.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::answer::AnswerGenerator;
use crate::classifier::{grade_benchmark, grade_scenario, hit_within, is_abstention, reciprocal_rank};
use crate::config::RunConfig;
use crate::error::{AppResult, CaseError, CaseResult, ProviderError};
use crate::isolation::ContainerRegistry;
use crate::metrics::{RunAggregator, RunSummary};
use crate::model::{
    CaseReport, CaseTimings, ContainerTag, Outcome, RetrievalRank, TestCase, TestCaseKind,
};
use crate::provider::{IngestOptions, MemoryProvider, SearchOptions};

/// Lifecycle state of a case, for logging and fault context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseState {
    /// Waiting for a worker slot
    Pending,
    /// Storing the case's sessions
    Ingesting,
    /// Waiting for stored memories to become searchable
    Indexing,
    /// Issuing the task query and generating the answer
    Querying,
    /// Classifying the answer
    Grading,
}

/// Drives test cases end-to-end against one provider
pub struct RunOrchestrator {
    run_id: String,
    provider: Arc<dyn MemoryProvider>,
    answerer: Arc<dyn AnswerGenerator>,
    registry: Arc<ContainerRegistry>,
    config: RunConfig,
}

impl RunOrchestrator {
    /// Create an orchestrator for one run. The container registry is owned
    /// by the orchestrator and discarded with it.
    pub fn new(
        provider: Arc<dyn MemoryProvider>,
        answerer: Arc<dyn AnswerGenerator>,
        config: RunConfig,
    ) -> Self {
        let run_id = format!("run-{}", &Uuid::new_v4().simple().to_string()[..8]);
        let registry = Arc::new(ContainerRegistry::new(run_id.clone()));
        Self {
            run_id,
            provider,
            answerer,
            registry,
            config,
        }
    }

    /// The run id all container tags are scoped to
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run every case with bounded concurrency and return the run summary.
    ///
    /// Individual case faults are captured as errored outcomes; only a
    /// provider that is unreachable before any case starts fails the run
    /// outright.
    pub async fn run(self: Arc<Self>, cases: Vec<TestCase>) -> AppResult<RunSummary> {
        let started_at = Utc::now();

        self.provider.initialize().await?;

        info!(
            run_id = %self.run_id,
            provider = self.provider.name(),
            cases = cases.len(),
            concurrency = self.config.concurrency,
            "Starting run"
        );

        let aggregator = Arc::new(Mutex::new(RunAggregator::new()));
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));

        let mut handles = Vec::with_capacity(cases.len());
        for case in cases {
            let orchestrator = Arc::clone(&self);
            let aggregator = Arc::clone(&aggregator);
            let semaphore = Arc::clone(&semaphore);

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let report = orchestrator.run_case(case).await;
                aggregator.lock().await.fold(&report);
                report
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(report) => match &report.outcome {
                    Outcome::Passed => {
                        debug!(case = %report.case_id, "Case passed");
                    }
                    Outcome::Failed { mode, .. } => {
                        info!(case = %report.case_id, mode = %mode, "Case failed");
                    }
                    Outcome::Errored { cause } => {
                        warn!(case = %report.case_id, cause = %cause, "Case errored");
                    }
                },
                Err(e) => {
                    warn!(error = %e, "Case task panicked");
                }
            }
        }

        let summary =
            aggregator
                .lock()
                .await
                .summary(&self.run_id, self.provider.name(), started_at);

        info!(
            run_id = %self.run_id,
            total = summary.total,
            passed = summary.passed,
            failed = summary.failed,
            errored = summary.errored,
            "Run complete"
        );

        Ok(summary)
    }

    /// Run one case to a terminal outcome, retrying bounded times on
    /// connection faults. Never returns an error: infrastructure faults
    /// become an errored report.
    pub async fn run_case(&self, case: TestCase) -> CaseReport {
        let budget = Duration::from_millis(self.config.case_budget_ms);
        let mut attempt = 0u32;

        loop {
            let tag = match self.registry.mint(&case.id).await {
                Ok(tag) => tag,
                Err(e) => {
                    return CaseReport {
                        case_id: case.id.clone(),
                        category: case.category.clone(),
                        outcome: Outcome::Errored {
                            cause: e.to_string(),
                        },
                        timings: CaseTimings::default(),
                        retrieved: Vec::new(),
                        answer: None,
                        rank: None,
                    };
                }
            };

            let result = match tokio::time::timeout(budget, self.execute_case(&case, &tag)).await
            {
                Ok(inner) => inner,
                Err(_) => Err(CaseError::CaseTimeout {
                    budget_ms: self.config.case_budget_ms,
                }),
            };

            // Every exit path releases the tag and attempts cleanup; since
            // tags are never reused, correctness does not depend on the
            // cleanup succeeding, only hygiene does.
            let ids = self.registry.release(&tag).await;
            if !ids.is_empty() {
                if let Err(e) = self.provider.clear(&tag, &ids).await {
                    warn!(tag = %tag, error = %e, "Container cleanup failed");
                }
            }

            match result {
                Ok((outcome, timings, retrieved, answer, rank)) => {
                    return CaseReport {
                        case_id: case.id.clone(),
                        category: case.category.clone(),
                        outcome,
                        timings,
                        retrieved,
                        answer: Some(answer),
                        rank,
                    };
                }
                Err(e) => {
                    let retryable = matches!(
                        &e,
                        CaseError::Provider(p) if p.is_connection()
                    );
                    if retryable && attempt < self.config.max_case_retries {
                        attempt += 1;
                        warn!(
                            case = %case.id,
                            attempt,
                            error = %e,
                            "Connection fault, retrying case under a fresh tag"
                        );
                        continue;
                    }
                    return CaseReport {
                        case_id: case.id.clone(),
                        category: case.category.clone(),
                        outcome: Outcome::Errored {
                            cause: e.to_string(),
                        },
                        timings: CaseTimings::default(),
                        retrieved: Vec::new(),
                        answer: None,
                        rank: None,
                    };
                }
            }
        }
    }

    /// The ingest -> index-wait -> query -> grade pipeline for one attempt
    async fn execute_case(
        &self,
        case: &TestCase,
        tag: &ContainerTag,
    ) -> CaseResult<(Outcome, CaseTimings, Vec<String>, String, Option<RetrievalRank>)> {
        let mut timings = CaseTimings::default();

        debug!(case = %case.id, tag = %tag, state = ?CaseState::Ingesting, "Case state");
        let started = Instant::now();
        let ingest_result = self
            .provider
            .ingest(&case.sessions, &IngestOptions::new(tag.clone()))
            .await?;
        timings.ingest = started.elapsed();

        self.registry.record(tag, &ingest_result.document_ids).await?;

        debug!(case = %case.id, tag = %tag, state = ?CaseState::Indexing, "Case state");
        let started = Instant::now();
        let case_id = case.id.clone();
        let progress = move |p: crate::provider::IndexProgress| {
            debug!(
                case = %case_id,
                completed = p.completed.len(),
                failed = p.failed.len(),
                "Indexing progress"
            );
        };
        match self
            .provider
            .await_indexing(&ingest_result, tag, Some(&progress))
            .await
        {
            Ok(()) => {}
            Err(ProviderError::IndexingIncomplete { budget_ms, .. }) => {
                return Err(CaseError::IndexTimeout { budget_ms });
            }
            Err(e) => return Err(e.into()),
        }
        timings.index_wait = started.elapsed();

        debug!(case = %case.id, tag = %tag, state = ?CaseState::Querying, "Case state");
        let started = Instant::now();
        let query = case.kind.query();
        let results = self
            .provider
            .search(
                query,
                &SearchOptions::new(tag.clone(), self.config.search_limit),
            )
            .await?;
        timings.query = started.elapsed();

        let retrieved: Vec<String> = results.iter().map(|r| r.content.clone()).collect();

        let answer = self
            .answerer
            .generate(query, &results)
            .await
            .map_err(|e| CaseError::Grading {
                message: e.to_string(),
            })?;

        debug!(case = %case.id, tag = %tag, state = ?CaseState::Grading, "Case state");
        let (outcome, rank) = match &case.kind {
            TestCaseKind::Benchmark { gold_answer, .. } => {
                // Rank metrics only make sense when there is content to
                // find; abstention gold answers carry none.
                let rank = if is_abstention(gold_answer) {
                    None
                } else {
                    Some(RetrievalRank {
                        reciprocal_rank: reciprocal_rank(gold_answer, &retrieved),
                        hit_at_1: hit_within(gold_answer, &retrieved, 1),
                        hit_at_5: hit_within(gold_answer, &retrieved, 5),
                        hit_at_10: hit_within(gold_answer, &retrieved, 10),
                    })
                };
                (grade_benchmark(gold_answer, &answer, &retrieved), rank)
            }
            TestCaseKind::Scenario {
                criteria,
                failure_modes,
                ..
            } => (
                grade_scenario(criteria, failure_modes, &answer, &retrieved),
                None,
            ),
        };

        Ok((outcome, timings, retrieved, answer, rank))
    }
}

/// Sample `n` cases stratified by category.
///
/// Allocation is proportional per category with at least one case from each,
/// topped up from the remainder when rounding leaves a gap, then shuffled to
/// avoid category clustering. Deterministic for a fixed seed. Sampling only
/// selects which cases enter the pool, never how they run.
pub fn stratified_sample(cases: Vec<TestCase>, n: usize, seed: u64) -> Vec<TestCase> {
    if n == 0 || n >= cases.len() {
        return cases;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let total = cases.len();

    let mut by_category: BTreeMap<String, Vec<TestCase>> = BTreeMap::new();
    for case in cases {
        by_category.entry(case.category.clone()).or_default().push(case);
    }

    let mut sampled = Vec::new();
    let mut remainder = Vec::new();
    for (_, mut group) in by_category {
        group.shuffle(&mut rng);
        let quota = ((n * group.len()) / total).max(1).min(group.len());
        let rest = group.split_off(quota);
        sampled.extend(group);
        remainder.extend(rest);
    }

    if sampled.len() > n {
        sampled.shuffle(&mut rng);
        sampled.truncate(n);
    } else if sampled.len() < n {
        remainder.shuffle(&mut rng);
        sampled.extend(remainder.into_iter().take(n - sampled.len()));
    }

    sampled.shuffle(&mut rng);
    sampled
}
