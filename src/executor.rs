//! Executor: admission, timeouts and timing around one backend call.

pub mod metrics;
pub mod pool;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::backend::{BackendFailure, BackendRequest, RawResponse, SearchBackend};
use crate::config::PoolConfig;
use crate::query::assembled::AssembledQuery;

use metrics::{ExecutionMetrics, ExecutionTiming, MetricsCollector, RequestOutcome, Timer};
use pool::{AdmissionPools, OpClass};

/// Why an execution produced no usable response.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionFailure {
    /// No admission slot within the wait budget. The backend was not
    /// contacted.
    Rejected(OpClass),
    /// The client-side deadline elapsed, or the backend gave up on every
    /// shard before finding anything.
    TimedOut(OpClass),
    /// The backend answered with an error.
    Backend(BackendFailure),
}

/// Result of one execution attempt.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Hits {
        response: RawResponse,
        timing: ExecutionTiming,
        /// Set when the backend returned partial results.
        warning: Option<&'static str>,
    },
    Failure {
        failure: ExecutionFailure,
        timing: ExecutionTiming,
    },
}

impl ExecutionOutcome {
    pub fn timing(&self) -> ExecutionTiming {
        match self {
            ExecutionOutcome::Hits { timing, .. } | ExecutionOutcome::Failure { timing, .. } => {
                *timing
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Hits { .. })
    }
}

/// Runs assembled queries against a backend through the admission pools.
pub struct Executor {
    backend: Arc<dyn SearchBackend>,
    pools: AdmissionPools,
    metrics: MetricsCollector,
}

impl Executor {
    pub fn new(backend: Arc<dyn SearchBackend>, pools: &PoolConfig) -> Self {
        Executor {
            backend,
            pools: AdmissionPools::new(pools),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn pools(&self) -> &AdmissionPools {
        &self.pools
    }

    pub fn metrics(&self) -> ExecutionMetrics {
        self.metrics.snapshot()
    }

    /// Execute one query. Never retries.
    pub async fn execute(&self, query: &AssembledQuery) -> ExecutionOutcome {
        let op = query.op_class;
        let admission = match self.pools.acquire(op).await {
            Ok(admission) => admission,
            Err(rejected) => {
                warn!(
                    op_class = op.as_str(),
                    waited_ms = rejected.waited.as_millis() as u64,
                    "No admission slot available"
                );
                self.metrics.record_rejection(rejected.waited);
                return ExecutionOutcome::Failure {
                    failure: ExecutionFailure::Rejected(op),
                    timing: ExecutionTiming {
                        admission_wait: rejected.waited,
                        ..Default::default()
                    },
                };
            }
        };

        let request = BackendRequest {
            index: query.index.path(),
            body: query.to_body(),
            params: query.params(),
            client_timeout: query.client_timeout,
        };

        let timer = Timer::start();
        let result = tokio::time::timeout(query.client_timeout, self.backend.search(&request)).await;
        let mut timing = ExecutionTiming {
            admission_wait: admission.waited,
            request: Some(timer.elapsed()),
            backend_took: None,
        };
        drop(admission);

        let (outcome, class, hits) = match result {
            Err(_) => {
                warn!(
                    op_class = op.as_str(),
                    index = %request.index,
                    timeout_ms = query.client_timeout.as_millis() as u64,
                    "Client-side deadline elapsed"
                );
                (
                    ExecutionOutcome::Failure {
                        failure: ExecutionFailure::TimedOut(op),
                        timing,
                    },
                    RequestOutcome::Timeout,
                    0,
                )
            }
            Ok(Err(failure)) if failure.client_timeout => (
                ExecutionOutcome::Failure {
                    failure: ExecutionFailure::TimedOut(op),
                    timing,
                },
                RequestOutcome::Timeout,
                0,
            ),
            Ok(Err(failure)) => (
                ExecutionOutcome::Failure {
                    failure: ExecutionFailure::Backend(failure),
                    timing,
                },
                RequestOutcome::Failure,
                0,
            ),
            Ok(Ok(response)) => {
                timing.backend_took = Some(Duration::from_millis(response.took));
                let hits = response.hit_count() as u64;
                if response.timed_out && hits == 0 {
                    warn!(
                        op_class = op.as_str(),
                        index = %request.index,
                        took_ms = response.took,
                        "Backend timed out without results"
                    );
                    (
                        ExecutionOutcome::Failure {
                            failure: ExecutionFailure::TimedOut(op),
                            timing,
                        },
                        RequestOutcome::Timeout,
                        0,
                    )
                } else if response.timed_out {
                    warn!(
                        op_class = op.as_str(),
                        index = %request.index,
                        hits,
                        "Backend returned partial results"
                    );
                    (
                        ExecutionOutcome::Hits {
                            response,
                            timing,
                            warning: Some(op.timed_out_key()),
                        },
                        RequestOutcome::Partial,
                        hits,
                    )
                } else {
                    (
                        ExecutionOutcome::Hits {
                            response,
                            timing,
                            warning: None,
                        },
                        RequestOutcome::Success,
                        hits,
                    )
                }
            }
        };

        self.metrics.record_request(&outcome.timing(), class, hits);
        debug!(
            op_class = op.as_str(),
            index = %request.index,
            success = outcome.is_success(),
            request_ms = timing.request.map(|d| d.as_millis() as u64).unwrap_or_default(),
            "Executed search"
        );
        outcome
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("pools", &self.pools)
            .field("metrics", &self.metrics)
            .finish()
    }
}
