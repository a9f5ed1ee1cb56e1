//! Provider registry
//!
//! Owns the set of known providers, their activation lifecycle, and their
//! selection weights. An explicit component instance injected into the
//! router, executor, and monitor; deliberately not a process-wide singleton.

use crate::core::error::{Error, Result};
use crate::core::types::{ActivationState, OperationKind, ProviderType};
use crate::providers::DataProvider;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

/// Lifecycle events other components may subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Registered(ProviderType),
    Activated(ProviderType),
    Degraded(ProviderType),
    Deactivated(ProviderType),
}

/// An eligible provider handle handed to the router
#[derive(Clone)]
pub struct EligibleProvider {
    pub provider: Arc<dyn DataProvider>,
    /// Selection weight, mutable through the registry
    pub weight: f64,
}

struct ProviderEntry {
    provider: Arc<dyn DataProvider>,
    state: ActivationState,
    weight: f64,
}

/// Thread-safe provider registry
///
/// Registration order is preserved; it is the stable tie-break for routing
/// plans. Read-mostly: lookups take a read lock, lifecycle transitions a
/// write lock.
pub struct ProviderRegistry {
    entries: RwLock<Vec<ProviderEntry>>,
    events: broadcast::Sender<LifecycleEvent>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            entries: RwLock::new(Vec::new()),
            events,
        }
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: LifecycleEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Register a provider in `Registered` state
    ///
    /// Idempotent on provider type: re-registering an already known provider
    /// is a no-op.
    pub async fn register(&self, provider: Arc<dyn DataProvider>) -> Result<()> {
        let provider_type = provider.provider_type();
        let mut entries = self.entries.write().await;
        if entries
            .iter()
            .any(|e| e.provider.provider_type() == provider_type)
        {
            debug!("provider {provider_type} already registered");
            return Ok(());
        }
        entries.push(ProviderEntry {
            provider,
            state: ActivationState::Registered,
            weight: 1.0,
        });
        drop(entries);
        info!("registered provider {provider_type}");
        self.emit(LifecycleEvent::Registered(provider_type));
        Ok(())
    }

    /// Activate a registered provider
    ///
    /// Invokes the provider's activation hook; if the hook errors or returns
    /// `false` the entry keeps its previous state and the error propagates.
    pub async fn activate(&self, provider_type: ProviderType) -> Result<()> {
        let provider = {
            let entries = self.entries.read().await;
            let entry = entries
                .iter()
                .find(|e| e.provider.provider_type() == provider_type)
                .ok_or_else(|| Error::not_found(format!("provider {provider_type}")))?;
            if entry.state == ActivationState::Activated {
                return Ok(());
            }
            Arc::clone(&entry.provider)
        };

        match provider.activate().await {
            Ok(true) => {}
            Ok(false) => {
                return Err(Error::provider(
                    provider_type.to_string(),
                    "activation hook declined",
                ));
            }
            Err(err) => {
                warn!("activation of provider {provider_type} failed: {err}");
                return Err(err);
            }
        }

        let mut entries = self.entries.write().await;
        if let Some(entry) = entries
            .iter_mut()
            .find(|e| e.provider.provider_type() == provider_type)
        {
            entry.state = ActivationState::Activated;
        }
        drop(entries);
        info!("activated provider {provider_type}");
        self.emit(LifecycleEvent::Activated(provider_type));
        Ok(())
    }

    /// Deactivate a provider and release its resources
    ///
    /// The state transition happens even when the deactivation hook errors;
    /// the hook failure is logged, not propagated.
    pub async fn deactivate(&self, provider_type: ProviderType) -> Result<()> {
        let provider = {
            let entries = self.entries.read().await;
            let entry = entries
                .iter()
                .find(|e| e.provider.provider_type() == provider_type)
                .ok_or_else(|| Error::not_found(format!("provider {provider_type}")))?;
            Arc::clone(&entry.provider)
        };

        if let Err(err) = provider.deactivate().await {
            warn!("deactivation hook of provider {provider_type} failed: {err}");
        }

        let mut entries = self.entries.write().await;
        if let Some(entry) = entries
            .iter_mut()
            .find(|e| e.provider.provider_type() == provider_type)
        {
            entry.state = ActivationState::Deactivated;
        }
        drop(entries);
        info!("deactivated provider {provider_type}");
        self.emit(LifecycleEvent::Deactivated(provider_type));
        Ok(())
    }

    /// Mark an activated provider as degraded, removing it from plans
    ///
    /// Driven by the performance monitor's consecutive-failure count; a
    /// degraded provider returns to service through [`activate`](Self::activate).
    pub async fn mark_degraded(&self, provider_type: ProviderType) {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries
            .iter_mut()
            .find(|e| e.provider.provider_type() == provider_type)
        else {
            return;
        };
        if entry.state != ActivationState::Activated {
            return;
        }
        entry.state = ActivationState::Degraded;
        drop(entries);
        warn!("provider {provider_type} marked degraded");
        self.emit(LifecycleEvent::Degraded(provider_type));
    }

    /// Current activation state, `Unregistered` for unknown providers
    pub async fn state(&self, provider_type: ProviderType) -> ActivationState {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.provider.provider_type() == provider_type)
            .map_or(ActivationState::Unregistered, |e| e.state)
    }

    /// Set the selection weight used to bias routing
    pub async fn set_weight(&self, provider_type: ProviderType, weight: f64) -> Result<()> {
        if !(weight.is_finite() && weight >= 0.0) {
            return Err(Error::invalid_argument("weight must be finite and >= 0"));
        }
        let mut entries = self.entries.write().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.provider.provider_type() == provider_type)
            .ok_or_else(|| Error::not_found(format!("provider {provider_type}")))?;
        entry.weight = weight;
        Ok(())
    }

    /// All activated providers declaring support for an operation kind,
    /// in registration order
    pub async fn list_eligible(&self, operation: OperationKind) -> Vec<EligibleProvider> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.state == ActivationState::Activated && e.provider.supports(operation))
            .map(|e| EligibleProvider {
                provider: Arc::clone(&e.provider),
                weight: e.weight,
            })
            .collect()
    }

    /// Look up a provider handle regardless of state
    pub async fn get(&self, provider_type: ProviderType) -> Option<Arc<dyn DataProvider>> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.provider.provider_type() == provider_type)
            .map(|e| Arc::clone(&e.provider))
    }

    /// Number of registered providers
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Provider counts grouped by activation state
    pub async fn counts_by_state(&self) -> HashMap<ActivationState, usize> {
        let mut counts = HashMap::new();
        for entry in self.entries.read().await.iter() {
            *counts.entry(entry.state).or_insert(0) += 1;
        }
        counts
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;
    use crate::core::types::{Entity, OpValue, SearchQuery};
    use async_trait::async_trait;

    struct StubProvider {
        provider_type: ProviderType,
        capabilities: Vec<OperationKind>,
        fail_activation: bool,
    }

    impl StubProvider {
        fn new(provider_type: ProviderType) -> Self {
            Self {
                provider_type,
                capabilities: vec![
                    OperationKind::SaveEntity,
                    OperationKind::LoadEntity,
                    OperationKind::Search,
                    OperationKind::DeleteEntity,
                ],
                fail_activation: false,
            }
        }

        fn with_capabilities(mut self, capabilities: Vec<OperationKind>) -> Self {
            self.capabilities = capabilities;
            self
        }

        fn failing_activation(mut self) -> Self {
            self.fail_activation = true;
            self
        }
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
            &self.capabilities
        }

        async fn activate(&self) -> crate::core::error::Result<bool> {
            if self.fail_activation {
                Err(Error::provider("stub", "activation refused"))
            } else {
                Ok(true)
            }
        }

        async fn deactivate(&self) -> crate::core::error::Result<bool> {
            Ok(true)
        }

        async fn save(&self, entity: &Entity) -> crate::core::error::Result<OpValue> {
            Ok(OpValue::Saved {
                id: entity.id.clone(),
            })
        }

        async fn load(&self, id: &str) -> crate::core::error::Result<OpValue> {
            Err(Error::not_found(format!("entity {id}")))
        }

        async fn search(&self, _query: &SearchQuery) -> crate::core::error::Result<OpValue> {
            Ok(OpValue::Entities(Vec::new()))
        }

        async fn delete(&self, _id: &str) -> crate::core::error::Result<OpValue> {
            Ok(OpValue::Deleted(false))
        }
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = ProviderRegistry::new();
        registry
            .register(Arc::new(StubProvider::new(ProviderType::InMemory)))
            .await
            .unwrap();
        registry
            .register(Arc::new(StubProvider::new(ProviderType::InMemory)))
            .await
            .unwrap();
        assert_eq!(registry.len().await, 1);
        assert_eq!(
            registry.state(ProviderType::InMemory).await,
            ActivationState::Registered
        );
    }

    #[tokio::test]
    async fn test_activation_failure_keeps_registered_state() {
        let registry = ProviderRegistry::new();
        registry
            .register(Arc::new(
                StubProvider::new(ProviderType::MongoDb).failing_activation(),
            ))
            .await
            .unwrap();

        assert!(registry.activate(ProviderType::MongoDb).await.is_err());
        assert_eq!(
            registry.state(ProviderType::MongoDb).await,
            ActivationState::Registered
        );
    }

    #[tokio::test]
    async fn test_only_activated_capable_providers_are_eligible() {
        let registry = ProviderRegistry::new();
        registry
            .register(Arc::new(StubProvider::new(ProviderType::MongoDb)))
            .await
            .unwrap();
        registry
            .register(Arc::new(
                StubProvider::new(ProviderType::Ipfs)
                    .with_capabilities(vec![OperationKind::SaveEntity]),
            ))
            .await
            .unwrap();
        registry
            .register(Arc::new(StubProvider::new(ProviderType::Redis)))
            .await
            .unwrap();

        registry.activate(ProviderType::MongoDb).await.unwrap();
        registry.activate(ProviderType::Ipfs).await.unwrap();
        // Redis stays Registered

        let eligible = registry.list_eligible(OperationKind::Search).await;
        let types: Vec<ProviderType> = eligible
            .iter()
            .map(|e| e.provider.provider_type())
            .collect();
        assert_eq!(types, vec![ProviderType::MongoDb]);

        let eligible = registry.list_eligible(OperationKind::SaveEntity).await;
        let types: Vec<ProviderType> = eligible
            .iter()
            .map(|e| e.provider.provider_type())
            .collect();
        assert_eq!(types, vec![ProviderType::MongoDb, ProviderType::Ipfs]);
    }

    #[tokio::test]
    async fn test_eligibility_preserves_registration_order() {
        let registry = ProviderRegistry::new();
        let order = [
            ProviderType::Neo4j,
            ProviderType::MongoDb,
            ProviderType::Ipfs,
        ];
        for provider_type in order {
            registry
                .register(Arc::new(StubProvider::new(provider_type)))
                .await
                .unwrap();
            registry.activate(provider_type).await.unwrap();
        }

        let eligible = registry.list_eligible(OperationKind::LoadEntity).await;
        let types: Vec<ProviderType> = eligible
            .iter()
            .map(|e| e.provider.provider_type())
            .collect();
        assert_eq!(types, order.to_vec());
    }

    #[tokio::test]
    async fn test_degraded_provider_leaves_plans_and_reactivates() {
        let registry = ProviderRegistry::new();
        registry
            .register(Arc::new(StubProvider::new(ProviderType::MongoDb)))
            .await
            .unwrap();
        registry.activate(ProviderType::MongoDb).await.unwrap();

        registry.mark_degraded(ProviderType::MongoDb).await;
        assert_eq!(
            registry.state(ProviderType::MongoDb).await,
            ActivationState::Degraded
        );
        assert!(registry.list_eligible(OperationKind::Search).await.is_empty());

        registry.activate(ProviderType::MongoDb).await.unwrap();
        assert_eq!(
            registry.state(ProviderType::MongoDb).await,
            ActivationState::Activated
        );
    }

    #[tokio::test]
    async fn test_lifecycle_events_are_broadcast() {
        let registry = ProviderRegistry::new();
        let mut events = registry.subscribe();

        registry
            .register(Arc::new(StubProvider::new(ProviderType::MongoDb)))
            .await
            .unwrap();
        registry.activate(ProviderType::MongoDb).await.unwrap();
        registry.deactivate(ProviderType::MongoDb).await.unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            LifecycleEvent::Registered(ProviderType::MongoDb)
        );
        assert_eq!(
            events.recv().await.unwrap(),
            LifecycleEvent::Activated(ProviderType::MongoDb)
        );
        assert_eq!(
            events.recv().await.unwrap(),
            LifecycleEvent::Deactivated(ProviderType::MongoDb)
        );
    }

    #[tokio::test]
    async fn test_weight_validation() {
        let registry = ProviderRegistry::new();
        registry
            .register(Arc::new(StubProvider::new(ProviderType::MongoDb)))
            .await
            .unwrap();

        assert!(registry.set_weight(ProviderType::MongoDb, 2.0).await.is_ok());
        assert!(
            registry
                .set_weight(ProviderType::MongoDb, -1.0)
                .await
                .is_err()
        );
        assert!(
            registry
                .set_weight(ProviderType::Ipfs, 1.0)
                .await
                .is_err()
        );
    }
}
