//! Replicated write execution
//!
//! Replication is parallel by design, distinct from the sequential failover
//! walk: the write fans out concurrently to the first R plan entries and the
//! aggregate outcome is judged against the policy's success rule. Partial
//! failure under a met policy is a success with a degradation report, not a
//! hard error.

use crate::config::ReplicationPolicy;
use crate::core::types::{
    AttemptReport, FailedReplica, Outcome, ProviderType, ReplicationReport, Request,
};
use crate::routing::RoutingPlan;
use crate::routing::executor::{AttemptResult, FailoverExecutor};
use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Concurrent fan-out coordinator for replicable writes
pub struct ReplicationCoordinator {
    executor: Arc<FailoverExecutor>,
}

impl ReplicationCoordinator {
    /// Create a coordinator sharing the executor's attempt path
    pub fn new(executor: Arc<FailoverExecutor>) -> Self {
        Self { executor }
    }

    /// Fan a write out to the first R plan entries and aggregate the result
    #[instrument(skip_all, fields(operation = %request.operation, request_id = %request.id))]
    pub async fn execute_replicated(
        &self,
        request: &Request,
        plan: &RoutingPlan,
        policy: &ReplicationPolicy,
        cancel: &CancellationToken,
    ) -> Outcome {
        if plan.is_empty() {
            return Outcome::no_eligible_providers(request.operation);
        }

        let target = policy.replicas.min(plan.len());
        let budget = self.executor.attempt_budget();
        debug!("replicating {} to {target} providers", request.operation);

        let attempts_iter = plan
            .entries
            .iter()
            .take(target)
            .map(|entry| self.executor.attempt(request, &entry.provider, budget, cancel));
        let results = join_all(attempts_iter).await;

        let mut attempts: Vec<AttemptReport> = Vec::with_capacity(target);
        let mut succeeded: Vec<ProviderType> = Vec::new();
        let mut failed: Vec<FailedReplica> = Vec::new();
        let mut value = None;
        let mut last_error: Option<String> = None;
        let mut cancelled = false;

        for result in results {
            match result {
                AttemptResult::Succeeded { report, value: v } => {
                    succeeded.push(report.provider);
                    if value.is_none() {
                        value = Some(v);
                    }
                    attempts.push(report);
                }
                AttemptResult::Failed { report } => {
                    let error = report.error.clone().unwrap_or_default();
                    last_error = Some(error.clone());
                    failed.push(FailedReplica {
                        provider: report.provider,
                        error,
                    });
                    attempts.push(report);
                }
                AttemptResult::Cancelled { report } => {
                    cancelled = true;
                    attempts.push(report);
                }
            }
        }

        if cancelled {
            return Outcome::cancelled().with_attempts(attempts);
        }

        let report = ReplicationReport {
            target,
            succeeded,
            failed,
        };
        let required = policy.required_successes(target);

        match value {
            Some(value) if report.succeeded.len() >= required => {
                let provider = report.succeeded[0];
                let message = if report.is_degraded() {
                    warn!(
                        "replication degraded: {}/{} replicas succeeded",
                        report.succeeded.len(),
                        target
                    );
                    format!(
                        "replicated write met policy with {}/{} replicas; replication degraded",
                        report.succeeded.len(),
                        target
                    )
                } else {
                    format!("replicated write succeeded on all {target} replicas")
                };
                let mut outcome = Outcome::ok(provider, value, message);
                outcome.replication = Some(report);
                outcome.with_attempts(attempts)
            }
            _ => Outcome::replication_failed(report, last_error).with_attempts(attempts),
        }
    }
}
