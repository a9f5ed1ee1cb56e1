//! Shared test doubles for the routing modules

use crate::config::EngineConfig;
use crate::core::error::{Error, Result};
use crate::core::types::{Entity, OpValue, OperationKind, ProviderType, SearchQuery};
use crate::metrics::PerformanceMonitor;
use crate::prediction::FailurePredictor;
use crate::providers::DataProvider;
use crate::registry::ProviderRegistry;
use crate::routing::{FailoverExecutor, Router};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Scriptable provider: succeeds or fails per mode, counting calls
pub(crate) struct ScriptedProvider {
    provider_type: ProviderType,
    mode: Mode,
    calls: AtomicU32,
}

pub(crate) enum Mode {
    Succeed,
    FailProtocol,
    FailTimeout,
    Hang,
}

impl ScriptedProvider {
    pub(crate) fn new(provider_type: ProviderType, mode: Mode) -> Self {
        Self {
            provider_type,
            mode,
            calls: AtomicU32::new(0),
        }
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn run(&self, value: OpValue) -> Result<OpValue> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            Mode::Succeed => Ok(value),
            Mode::FailProtocol => Err(Error::provider(
                self.provider_type.to_string(),
                "scripted failure",
            )),
            Mode::FailTimeout => Err(Error::timeout("scripted timeout")),
            Mode::Hang => {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Ok(value)
            }
        }
    }
}

#[async_trait]
impl DataProvider for ScriptedProvider {
    fn provider_type(&self) -> ProviderType {
        self.provider_type
    }

    fn name(&self) -> &str {
        "scripted"
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
        self.run(OpValue::Saved {
            id: entity.id.clone(),
        })
        .await
    }

    async fn load(&self, id: &str) -> Result<OpValue> {
        self.run(OpValue::Entity(Entity::with_id(id, "doc", json!({}))))
            .await
    }

    async fn search(&self, _query: &SearchQuery) -> Result<OpValue> {
        self.run(OpValue::Entities(Vec::new())).await
    }

    async fn delete(&self, _id: &str) -> Result<OpValue> {
        self.run(OpValue::Deleted(true)).await
    }
}

pub(crate) struct Harness {
    pub registry: Arc<ProviderRegistry>,
    pub monitor: Arc<PerformanceMonitor>,
    pub predictor: Arc<FailurePredictor>,
    pub router: Router,
    pub executor: FailoverExecutor,
}

pub(crate) fn harness(config: &EngineConfig) -> Harness {
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
    let executor = FailoverExecutor::new(
        Arc::clone(&registry),
        Arc::clone(&monitor),
        Arc::clone(&predictor),
        config.executor.clone(),
    );
    Harness {
        registry,
        monitor,
        predictor,
        router,
        executor,
    }
}

pub(crate) async fn add(
    harness: &Harness,
    provider_type: ProviderType,
    mode: Mode,
) -> Arc<ScriptedProvider> {
    let provider = Arc::new(ScriptedProvider::new(provider_type, mode));
    harness
        .registry
        .register(Arc::clone(&provider) as Arc<dyn DataProvider>)
        .await
        .unwrap();
    harness.registry.activate(provider_type).await.unwrap();
    provider
}
