//! Data service facade
//!
//! Owns and wires the engine components: registry, performance monitor,
//! failure predictor, router, failover executor, and replication
//! coordinator. Callers submit requests here and get the canonical outcome
//! back; the facade makes no assumption about the transport in front of it.

use crate::config::EngineConfig;
use crate::core::error::Result;
use crate::core::types::{ActivationState, Entity, Outcome, ProviderType, Request, SearchQuery};
use crate::metrics::PerformanceMonitor;
use crate::prediction::FailurePredictor;
use crate::providers::DataProvider;
use crate::registry::ProviderRegistry;
use crate::routing::{FailoverExecutor, ReplicationCoordinator, Router};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Aggregate provider counts for monitoring surfaces
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct EngineStatistics {
    pub total_providers: usize,
    pub registered: usize,
    pub activated: usize,
    pub degraded: usize,
    pub deactivated: usize,
}

/// Unified data-access service
///
/// One instance per process, created explicitly and injected where needed;
/// there is no hidden global state. Must be constructed within a tokio
/// runtime: the monitor's lifecycle watcher is spawned here.
pub struct DataService {
    config: EngineConfig,
    registry: Arc<ProviderRegistry>,
    monitor: Arc<PerformanceMonitor>,
    predictor: Arc<FailurePredictor>,
    router: Router,
    executor: Arc<FailoverExecutor>,
    replication: ReplicationCoordinator,
}

impl DataService {
    /// Build and wire the engine from a validated configuration
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

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
            &config,
        );
        let executor = Arc::new(FailoverExecutor::new(
            Arc::clone(&registry),
            Arc::clone(&monitor),
            Arc::clone(&predictor),
            config.executor.clone(),
        ));
        let replication = ReplicationCoordinator::new(Arc::clone(&executor));

        // Stale metrics are reset whenever a provider is (re)activated
        Arc::clone(&monitor).watch(&registry);

        Ok(Self {
            config,
            registry,
            monitor,
            predictor,
            router,
            executor,
            replication,
        })
    }

    /// Build the engine with default configuration
    pub fn with_defaults() -> Result<Self> {
        Self::new(EngineConfig::default())
    }

    /// Register a provider, recording its region for geography scoring
    pub async fn register_provider(&self, provider: Arc<dyn DataProvider>) -> Result<()> {
        self.monitor.attach_region(
            provider.provider_type(),
            provider.region().map(str::to_string),
        );
        self.registry.register(provider).await
    }

    /// Register and immediately activate a provider
    pub async fn register_and_activate(&self, provider: Arc<dyn DataProvider>) -> Result<()> {
        let provider_type = provider.provider_type();
        self.register_provider(provider).await?;
        self.registry.activate(provider_type).await
    }

    /// Execute a request with a fresh cancellation token
    pub async fn execute(&self, request: Request) -> Outcome {
        self.execute_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Execute a request under a caller-held cancellation token
    ///
    /// Replicable writes go through the replication coordinator; everything
    /// else takes the sequential failover path.
    pub async fn execute_with_cancel(
        &self,
        request: Request,
        cancel: CancellationToken,
    ) -> Outcome {
        let plan = self.router.plan(&request).await;
        if request.replicate && request.operation.is_write() {
            self.replication
                .execute_replicated(&request, &plan, &self.config.replication, &cancel)
                .await
        } else {
            self.executor.execute(&request, &plan, &cancel).await
        }
    }

    /// Save an entity through the routing engine
    pub async fn save(&self, entity: Entity) -> Outcome {
        self.execute(Request::save(entity)).await
    }

    /// Load an entity by id
    pub async fn load<S: Into<String>>(&self, id: S) -> Outcome {
        self.execute(Request::load(id)).await
    }

    /// Search entities
    pub async fn search(&self, query: SearchQuery) -> Outcome {
        self.execute(Request::search(query)).await
    }

    /// Delete an entity by id
    pub async fn delete<S: Into<String>>(&self, id: S) -> Outcome {
        self.execute(Request::delete(id)).await
    }

    /// Provider counts by activation state
    pub async fn statistics(&self) -> EngineStatistics {
        let counts = self.registry.counts_by_state().await;
        let get = |state: ActivationState| counts.get(&state).copied().unwrap_or(0);
        EngineStatistics {
            total_providers: self.registry.len().await,
            registered: get(ActivationState::Registered),
            activated: get(ActivationState::Activated),
            degraded: get(ActivationState::Degraded),
            deactivated: get(ActivationState::Deactivated),
        }
    }

    /// Current risk score for a provider
    pub fn risk_score(&self, provider_type: ProviderType) -> f64 {
        self.predictor.risk_score(provider_type)
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn predictor(&self) -> &Arc<FailurePredictor> {
        &self.predictor
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
