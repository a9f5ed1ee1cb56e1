//! Provider interfaces and implementations
//!
//! Backend adapters implement [`DataProvider`]; the engine depends only on
//! this contract plus the declared capability set and type/category tags,
//! never on adapter internals.

use crate::core::error::Result;
use crate::core::types::{Entity, OpValue, OperationKind, ProviderCategory, ProviderType, SearchQuery};
use async_trait::async_trait;

/// Uniform backend provider contract
///
/// Operation methods return the canonical [`OpValue`] wrapped in [`Result`];
/// adapter errors are absorbed by the failover executor and recorded against
/// the provider, they never reach callers raw.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Stable provider tag, the provider's identity in the registry
    fn provider_type(&self) -> ProviderType;

    /// Provider category, derived from the type tag by default
    fn category(&self) -> ProviderCategory {
        self.provider_type().category()
    }

    /// Human-readable provider name
    fn name(&self) -> &str;

    /// Optional longer description
    fn description(&self) -> &str {
        ""
    }

    /// Operation kinds this provider declares support for
    fn capabilities(&self) -> &[OperationKind];

    /// Geographic region tag, when the backend has one
    fn region(&self) -> Option<&str> {
        None
    }

    /// Static cost-per-operation hint fed to the performance monitor
    fn cost_per_operation(&self) -> f64 {
        0.0
    }

    /// Activation hook; a `false` or error return blocks the registry
    /// transition to `Activated`
    async fn activate(&self) -> Result<bool>;

    /// Deactivation hook; releases provider resources
    async fn deactivate(&self) -> Result<bool>;

    /// Store or update an entity
    async fn save(&self, entity: &Entity) -> Result<OpValue>;

    /// Load an entity by id
    async fn load(&self, id: &str) -> Result<OpValue>;

    /// Search entities
    async fn search(&self, query: &SearchQuery) -> Result<OpValue>;

    /// Delete an entity by id
    async fn delete(&self, id: &str) -> Result<OpValue>;

    /// Whether this provider declares support for an operation kind
    fn supports(&self, operation: OperationKind) -> bool {
        self.capabilities().contains(&operation)
    }
}

// Submodules
pub mod memory;

// Re-export implementations
pub use memory::InMemoryProvider;
