//! Provider routing and scoring
//!
//! Builds an ordered provider plan per request from current registry state
//! and telemetry. Planning is CPU-only; nothing here blocks on I/O.

use crate::config::EngineConfig;
use crate::core::types::{ProviderType, Request};
use crate::metrics::PerformanceMonitor;
use crate::prediction::FailurePredictor;
use crate::providers::DataProvider;
use crate::registry::ProviderRegistry;
use std::sync::Arc;
use tracing::{debug, instrument};

pub mod executor;
pub mod replication;
#[cfg(test)]
pub(crate) mod test_support;

pub use executor::FailoverExecutor;
pub use replication::ReplicationCoordinator;

/// One candidate in a routing plan
#[derive(Clone)]
pub struct PlannedProvider {
    pub provider: Arc<dyn DataProvider>,
    /// Composite score at planning time
    pub score: f64,
    /// Whether this entry heads the plan by caller override
    pub preferred: bool,
}

/// Ordered candidate providers for one request
///
/// Derived fresh per request, never persisted.
#[derive(Clone, Default)]
pub struct RoutingPlan {
    pub entries: Vec<PlannedProvider>,
}

impl RoutingPlan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Provider types in plan order, for logs and assertions
    pub fn provider_types(&self) -> Vec<ProviderType> {
        self.entries
            .iter()
            .map(|e| e.provider.provider_type())
            .collect()
    }
}

/// Router computing composite provider scores and ordered plans
pub struct Router {
    registry: Arc<ProviderRegistry>,
    monitor: Arc<PerformanceMonitor>,
    predictor: Arc<FailurePredictor>,
    risk_penalty: f64,
    max_fallback_depth: usize,
}

impl Router {
    /// Create a router over the shared engine components
    pub fn new(
        registry: Arc<ProviderRegistry>,
        monitor: Arc<PerformanceMonitor>,
        predictor: Arc<FailurePredictor>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            registry,
            monitor,
            predictor,
            risk_penalty: config.scoring.risk_penalty,
            max_fallback_depth: config.router.max_fallback_depth,
        }
    }

    /// Composite score: registry weight times the monitor's overall score,
    /// minus the risk penalty
    fn composite_score(&self, provider_type: ProviderType, weight: f64) -> f64 {
        let overall = self.monitor.score(provider_type).overall;
        let risk = self.predictor.risk_score(provider_type);
        weight * overall - self.risk_penalty * risk
    }

    /// Build the ordered provider plan for a request
    ///
    /// An eligible preferred provider heads the plan regardless of score;
    /// the remainder is sorted descending by composite score with ties
    /// broken by registration order. Zero eligible providers yield an empty
    /// plan, which the executor reports as a distinct outcome.
    #[instrument(skip_all, fields(operation = %request.operation, request_id = %request.id))]
    pub async fn plan(&self, request: &Request) -> RoutingPlan {
        let eligible = self.registry.list_eligible(request.operation).await;
        if eligible.is_empty() {
            debug!("no eligible providers for operation {}", request.operation);
            return RoutingPlan::default();
        }

        let mut head: Option<PlannedProvider> = None;
        let mut remainder: Vec<PlannedProvider> = Vec::with_capacity(eligible.len());

        for candidate in eligible {
            let provider_type = candidate.provider.provider_type();
            let score = self.composite_score(provider_type, candidate.weight);
            if head.is_none() && request.preferred_provider == Some(provider_type) {
                head = Some(PlannedProvider {
                    provider: candidate.provider,
                    score,
                    preferred: true,
                });
            } else {
                remainder.push(PlannedProvider {
                    provider: candidate.provider,
                    score,
                    preferred: false,
                });
            }
        }

        // Stable sort keeps registration order on score ties
        remainder.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut entries = Vec::with_capacity(remainder.len() + 1);
        if let Some(preferred) = head {
            entries.push(preferred);
        }
        entries.extend(remainder);
        entries.truncate(self.max_fallback_depth);

        let plan = RoutingPlan { entries };
        debug!(
            "planned {} candidates: {:?}",
            plan.len(),
            plan.provider_types()
        );
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::core::error::Result;
    use crate::core::types::{Entity, OpValue, OperationKind, SearchQuery};
    use crate::prediction::FailureType;
    use async_trait::async_trait;
    use std::time::Duration;

    struct StubProvider {
        provider_type: ProviderType,
    }

    #[async_trait]
    impl DataProvider for StubProvider {
        fn provider_type(&self) -> ProviderType {
            self.provider_type
        }

        fn name(&self) -> &str {
            "stub"
        }

        fn capabilities(&self) -> &[OperationKind] {
            &[
                OperationKind::SaveEntity,
                OperationKind::LoadEntity,
                OperationKind::Search,
                OperationKind::DeleteEntity,
            ]
        }

        async fn activate(&self) -> Result<bool> {
            Ok(true)
        }

        async fn deactivate(&self) -> Result<bool> {
            Ok(true)
        }

        async fn save(&self, entity: &Entity) -> Result<OpValue> {
            Ok(OpValue::Saved {
                id: entity.id.clone(),
            })
        }

        async fn load(&self, _id: &str) -> Result<OpValue> {
            Ok(OpValue::Deleted(false))
        }

        async fn search(&self, _query: &SearchQuery) -> Result<OpValue> {
            Ok(OpValue::Entities(Vec::new()))
        }

        async fn delete(&self, _id: &str) -> Result<OpValue> {
            Ok(OpValue::Deleted(false))
        }
    }

    struct Fixture {
        registry: Arc<ProviderRegistry>,
        monitor: Arc<PerformanceMonitor>,
        predictor: Arc<FailurePredictor>,
        router: Router,
    }

    fn fixture(config: &EngineConfig) -> Fixture {
        let registry = Arc::new(ProviderRegistry::new());
        let monitor = Arc::new(PerformanceMonitor::new(
            config.scoring.clone(),
            config.monitor.clone(),
        ));
        let predictor = Arc::new(FailurePredictor::new(config.predictor.clone()));
        let router = Router::new(
            Arc::clone(&registry),
            Arc::clone(&monitor),
            Arc::clone(&predictor),
            config,
        );
        Fixture {
            registry,
            monitor,
            predictor,
            router,
        }
    }

    async fn add_provider(fixture: &Fixture, provider_type: ProviderType) {
        fixture
            .registry
            .register(Arc::new(StubProvider { provider_type }))
            .await
            .unwrap();
        fixture.registry.activate(provider_type).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_plan_when_no_providers() {
        let config = EngineConfig::default();
        let fixture = fixture(&config);
        let plan = fixture.router.plan(&Request::load("e1")).await;
        assert!(plan.is_empty());
    }

    #[tokio::test]
    async fn test_identical_scores_keep_registration_order() {
        let config = EngineConfig::default();
        let fixture = fixture(&config);
        let order = [
            ProviderType::Neo4j,
            ProviderType::MongoDb,
            ProviderType::Ipfs,
        ];
        for provider_type in order {
            add_provider(&fixture, provider_type).await;
        }

        // No telemetry recorded: every provider scores the neutral default
        let plan = fixture.router.plan(&Request::load("e1")).await;
        assert_eq!(plan.provider_types(), order.to_vec());
    }

    #[tokio::test]
    async fn test_higher_scoring_provider_ranks_first() {
        let config = EngineConfig::default();
        let fixture = fixture(&config);
        add_provider(&fixture, ProviderType::MongoDb).await;
        add_provider(&fixture, ProviderType::Ipfs).await;

        // MongoDb is slow and failing, Ipfs fast and healthy
        for _ in 0..10 {
            fixture.monitor.record_outcome(
                ProviderType::MongoDb,
                Duration::from_millis(2_000),
                false,
                None,
            );
            fixture.monitor.record_outcome(
                ProviderType::Ipfs,
                Duration::from_millis(20),
                true,
                None,
            );
        }

        let plan = fixture.router.plan(&Request::load("e1")).await;
        assert_eq!(
            plan.provider_types(),
            vec![ProviderType::Ipfs, ProviderType::MongoDb]
        );
        assert!(plan.entries[0].score > plan.entries[1].score);
    }

    #[tokio::test]
    async fn test_eligible_preferred_provider_heads_plan_regardless_of_score() {
        let config = EngineConfig::default();
        let fixture = fixture(&config);
        add_provider(&fixture, ProviderType::MongoDb).await;
        add_provider(&fixture, ProviderType::Ipfs).await;

        // Make the preferred provider strictly worse
        for _ in 0..10 {
            fixture.monitor.record_outcome(
                ProviderType::Ipfs,
                Duration::from_millis(3_000),
                false,
                None,
            );
        }

        let request = Request::load("e1").with_preferred_provider(ProviderType::Ipfs);
        let plan = fixture.router.plan(&request).await;
        assert_eq!(
            plan.provider_types(),
            vec![ProviderType::Ipfs, ProviderType::MongoDb]
        );
        assert!(plan.entries[0].preferred);
    }

    #[tokio::test]
    async fn test_ineligible_preferred_provider_is_ignored() {
        let config = EngineConfig::default();
        let fixture = fixture(&config);
        add_provider(&fixture, ProviderType::MongoDb).await;

        let request = Request::load("e1").with_preferred_provider(ProviderType::Ethereum);
        let plan = fixture.router.plan(&request).await;
        assert_eq!(plan.provider_types(), vec![ProviderType::MongoDb]);
        assert!(!plan.entries[0].preferred);
    }

    #[tokio::test]
    async fn test_risk_penalty_demotes_failing_provider() {
        let config = EngineConfig::default();
        let fixture = fixture(&config);
        add_provider(&fixture, ProviderType::MongoDb).await;
        add_provider(&fixture, ProviderType::Ipfs).await;

        for _ in 0..10 {
            fixture.predictor.record_attempt(ProviderType::MongoDb);
            fixture.predictor.record_failure(
                ProviderType::MongoDb,
                FailureType::Timeout,
                "slow",
            );
        }

        let plan = fixture.router.plan(&Request::load("e1")).await;
        assert_eq!(
            plan.provider_types(),
            vec![ProviderType::Ipfs, ProviderType::MongoDb]
        );
    }

    #[tokio::test]
    async fn test_plan_truncates_to_max_fallback_depth() {
        let mut config = EngineConfig::default();
        config.router.max_fallback_depth = 2;
        let fixture = fixture(&config);
        for provider_type in [
            ProviderType::MongoDb,
            ProviderType::Ipfs,
            ProviderType::Redis,
            ProviderType::Neo4j,
        ] {
            add_provider(&fixture, provider_type).await;
        }

        let plan = fixture.router.plan(&Request::load("e1")).await;
        assert_eq!(plan.len(), 2);
    }

    #[tokio::test]
    async fn test_registry_weight_biases_ordering() {
        let config = EngineConfig::default();
        let fixture = fixture(&config);
        add_provider(&fixture, ProviderType::MongoDb).await;
        add_provider(&fixture, ProviderType::Ipfs).await;

        fixture
            .registry
            .set_weight(ProviderType::Ipfs, 2.0)
            .await
            .unwrap();

        let plan = fixture.router.plan(&Request::load("e1")).await;
        assert_eq!(
            plan.provider_types(),
            vec![ProviderType::Ipfs, ProviderType::MongoDb]
        );
    }
}
