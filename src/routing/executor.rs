//! Failover execution
//!
//! Walks a routing plan in order, one bounded attempt per provider, stopping
//! at the first success. Single-attempt failures are absorbed here: they are
//! recorded against the provider and the walk advances. Only exhaustion,
//! cancellation, deadline expiry, or an empty plan surface to the caller.

use crate::config::ExecutorConfig;
use crate::core::error::Error;
use crate::core::types::{
    AttemptReport, AttemptState, OpValue, OperationKind, Outcome, Payload, ProviderType, Request,
};
use crate::metrics::PerformanceMonitor;
use crate::prediction::{FailurePredictor, FailureType};
use crate::providers::DataProvider;
use crate::registry::ProviderRegistry;
use crate::routing::RoutingPlan;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Result of one provider attempt
pub(crate) enum AttemptResult {
    Succeeded {
        report: AttemptReport,
        value: OpValue,
    },
    Failed {
        report: AttemptReport,
    },
    /// Cancellation arrived mid-attempt; nothing recorded against the
    /// in-flight provider
    Cancelled {
        report: AttemptReport,
    },
}

/// Sequential failover executor
pub struct FailoverExecutor {
    registry: Arc<ProviderRegistry>,
    monitor: Arc<PerformanceMonitor>,
    predictor: Arc<FailurePredictor>,
    config: ExecutorConfig,
}

impl FailoverExecutor {
    /// Create an executor over the shared engine components
    pub fn new(
        registry: Arc<ProviderRegistry>,
        monitor: Arc<PerformanceMonitor>,
        predictor: Arc<FailurePredictor>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            registry,
            monitor,
            predictor,
            config,
        }
    }

    pub(crate) fn attempt_budget(&self) -> Duration {
        self.config.attempt_timeout()
    }

    /// Execute a request against a plan, failing over until one provider
    /// succeeds or the plan is exhausted
    #[instrument(skip_all, fields(operation = %request.operation, request_id = %request.id))]
    pub async fn execute(
        &self,
        request: &Request,
        plan: &RoutingPlan,
        cancel: &CancellationToken,
    ) -> Outcome {
        if plan.is_empty() {
            return Outcome::no_eligible_providers(request.operation);
        }

        let deadline = Instant::now() + self.config.operation_timeout();
        let mut attempts: Vec<AttemptReport> = Vec::new();
        let mut last_error: Option<String> = None;

        for entry in &plan.entries {
            if cancel.is_cancelled() {
                return Outcome::cancelled().with_attempts(attempts);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Outcome::deadline_exceeded(last_error).with_attempts(attempts);
            }
            let budget = remaining.min(self.config.attempt_timeout());

            match self.attempt(request, &entry.provider, budget, cancel).await {
                AttemptResult::Succeeded { report, value } => {
                    let provider = report.provider;
                    attempts.push(report);
                    let message =
                        format!("operation {} served by {provider}", request.operation);
                    return Outcome::ok(provider, value, message).with_attempts(attempts);
                }
                AttemptResult::Cancelled { report } => {
                    attempts.push(report);
                    return Outcome::cancelled().with_attempts(attempts);
                }
                AttemptResult::Failed { report } => {
                    warn!(
                        "attempt against {} failed: {}",
                        report.provider,
                        report.error.as_deref().unwrap_or("unknown error")
                    );
                    last_error.clone_from(&report.error);
                    attempts.push(report);
                }
            }
        }

        Outcome::all_providers_failed(last_error).with_attempts(attempts)
    }

    /// One bounded attempt against a single provider
    ///
    /// Shared with the replication coordinator, which runs attempts
    /// concurrently instead of sequentially.
    pub(crate) async fn attempt(
        &self,
        request: &Request,
        provider: &Arc<dyn DataProvider>,
        budget: Duration,
        cancel: &CancellationToken,
    ) -> AttemptResult {
        let provider_type = provider.provider_type();
        self.monitor.begin_attempt(provider_type);
        let started = Instant::now();

        let outcome = tokio::select! {
            () = cancel.cancelled() => None,
            result = tokio::time::timeout(budget, Self::dispatch(request, provider)) => Some(result),
        };

        let latency = started.elapsed();
        self.monitor.end_attempt(provider_type);

        match outcome {
            None => AttemptResult::Cancelled {
                report: Self::report(provider_type, AttemptState::InFlight, latency, None),
            },
            Some(Ok(Ok(value))) => {
                self.monitor.record_outcome(
                    provider_type,
                    latency,
                    true,
                    Some(provider.cost_per_operation()),
                );
                self.predictor.record_attempt(provider_type);
                debug!(
                    "provider {provider_type} served {} in {}ms",
                    request.operation,
                    latency.as_millis()
                );
                AttemptResult::Succeeded {
                    report: Self::report(provider_type, AttemptState::Succeeded, latency, None),
                    value,
                }
            }
            Some(Ok(Err(error))) => {
                self.note_failure(provider_type, latency, &error).await;
                AttemptResult::Failed {
                    report: Self::report(
                        provider_type,
                        AttemptState::Failed,
                        latency,
                        Some(error.to_string()),
                    ),
                }
            }
            Some(Err(_elapsed)) => {
                let error =
                    Error::timeout(format!("attempt timed out after {}ms", budget.as_millis()));
                self.note_failure(provider_type, latency, &error).await;
                AttemptResult::Failed {
                    report: Self::report(
                        provider_type,
                        AttemptState::Failed,
                        latency,
                        Some(error.to_string()),
                    ),
                }
            }
        }
    }

    async fn dispatch(
        request: &Request,
        provider: &Arc<dyn DataProvider>,
    ) -> crate::core::error::Result<OpValue> {
        match (request.operation, &request.payload) {
            (OperationKind::SaveEntity, Payload::Entity(entity)) => provider.save(entity).await,
            (OperationKind::LoadEntity, Payload::EntityId(id)) => provider.load(id).await,
            (OperationKind::Search, Payload::Query(query)) => provider.search(query).await,
            (OperationKind::DeleteEntity, Payload::EntityId(id)) => provider.delete(id).await,
            _ => Err(Error::invalid_argument(
                "request payload does not match its operation kind",
            )),
        }
    }

    async fn note_failure(&self, provider_type: ProviderType, latency: Duration, error: &Error) {
        let consecutive = self
            .monitor
            .record_outcome(provider_type, latency, false, None);
        self.predictor.record_attempt(provider_type);
        self.predictor.record_failure(
            provider_type,
            FailureType::classify(error),
            error.to_string(),
        );
        if consecutive >= self.config.degrade_after {
            self.registry.mark_degraded(provider_type).await;
        }
    }

    fn report(
        provider: ProviderType,
        state: AttemptState,
        latency: Duration,
        error: Option<String>,
    ) -> AttemptReport {
        AttemptReport {
            provider,
            state,
            latency_ms: latency.as_millis() as u64,
            error,
        }
    }
}
