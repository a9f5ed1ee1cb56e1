//! Polystore - a unified data-access engine
//!
//! Callers submit generic entity operations (save, load, search, delete) and
//! the engine decides, per request, which of the registered backend providers
//! serves it: a router scores every eligible provider from live performance
//! and failure telemetry, the failover executor walks the resulting plan
//! until one provider succeeds, and replicable writes fan out concurrently to
//! multiple providers under a configurable success rule.

pub mod config;
pub mod core;
pub mod metrics;
pub mod prediction;
pub mod providers;
pub mod registry;
pub mod routing;
pub mod services;

pub use crate::config::EngineConfig;
pub use crate::core::error::{Error, Result};
pub use crate::core::types::{
    Entity, FailureKind, OpValue, OperationKind, Outcome, Priority, ProviderCategory,
    ProviderType, Request, SearchQuery,
};
pub use crate::providers::{DataProvider, InMemoryProvider};
pub use crate::registry::ProviderRegistry;
pub use crate::routing::{Router, RoutingPlan};
pub use crate::services::DataService;
