//! In-memory reference provider
//!
//! The simplest complete adapter: a process-local entity store with naive
//! text search. Used by tests and demos, and as the template for real
//! backend adapters.

use crate::core::error::{Error, Result};
use crate::core::types::{Entity, OpValue, OperationKind, ProviderType, SearchQuery};
use crate::providers::DataProvider;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};

const CAPABILITIES: &[OperationKind] = &[
    OperationKind::SaveEntity,
    OperationKind::LoadEntity,
    OperationKind::Search,
    OperationKind::DeleteEntity,
];

/// Process-local entity store
pub struct InMemoryProvider {
    entities: DashMap<String, Entity>,
    active: AtomicBool,
    region: Option<String>,
}

impl InMemoryProvider {
    /// Create an empty in-memory provider
    pub fn new() -> Self {
        Self {
            entities: DashMap::new(),
            active: AtomicBool::new(false),
            region: None,
        }
    }

    /// Tag the provider with a region for geography scoring
    pub fn with_region<S: Into<String>>(mut self, region: S) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Number of stored entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn ensure_active(&self) -> Result<()> {
        if self.active.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::provider(
                self.provider_type().to_string(),
                "provider is not active",
            ))
        }
    }

    fn matches(entity: &Entity, query: &SearchQuery) -> bool {
        if let Some(kind) = &query.kind {
            if &entity.kind != kind {
                return false;
            }
        }
        let needle = query.text.to_lowercase();
        if needle.is_empty() {
            return true;
        }
        entity.id.to_lowercase().contains(&needle)
            || entity.kind.to_lowercase().contains(&needle)
            || entity.data.to_string().to_lowercase().contains(&needle)
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataProvider for InMemoryProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }

    fn name(&self) -> &str {
        "In-memory store"
    }

    fn description(&self) -> &str {
        "Process-local entity store with naive text search"
    }

    fn capabilities(&self) -> &[OperationKind] {
        CAPABILITIES
    }

    fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    async fn activate(&self) -> Result<bool> {
        self.active.store(true, Ordering::SeqCst);
        Ok(true)
    }

    async fn deactivate(&self) -> Result<bool> {
        self.active.store(false, Ordering::SeqCst);
        Ok(true)
    }

    async fn save(&self, entity: &Entity) -> Result<OpValue> {
        self.ensure_active()?;
        let mut stored = entity.clone();
        if let Some(existing) = self.entities.get(&entity.id) {
            stored.version = existing.version + 1;
            stored.created_at = existing.created_at;
        }
        stored.updated_at = Utc::now();
        let id = stored.id.clone();
        self.entities.insert(id.clone(), stored);
        Ok(OpValue::Saved { id })
    }

    async fn load(&self, id: &str) -> Result<OpValue> {
        self.ensure_active()?;
        self.entities
            .get(id)
            .map(|e| OpValue::Entity(e.clone()))
            .ok_or_else(|| Error::not_found(format!("entity {id}")))
    }

    async fn search(&self, query: &SearchQuery) -> Result<OpValue> {
        self.ensure_active()?;
        let mut results: Vec<Entity> = self
            .entities
            .iter()
            .filter(|e| Self::matches(e.value(), query))
            .map(|e| e.value().clone())
            .collect();
        results.sort_by(|a, b| a.id.cmp(&b.id));
        results.truncate(query.limit);
        Ok(OpValue::Entities(results))
    }

    async fn delete(&self, id: &str) -> Result<OpValue> {
        self.ensure_active()?;
        let existed = self.entities.remove(id).is_some();
        Ok(OpValue::Deleted(existed))
    }
}
