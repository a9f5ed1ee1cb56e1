//! Shared data types: providers, requests, entities, and outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Backend provider tags, stable across the system
///
/// The set is closed on purpose: dispatch happens by declared capability,
/// never by inspecting a concrete adapter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderType {
    MongoDb,
    PostgresDb,
    Neo4j,
    Redis,
    Ipfs,
    Ethereum,
    ActivityPub,
    LocalFile,
    InMemory,
}

impl ProviderType {
    /// The fixed category a provider type belongs to
    pub fn category(&self) -> ProviderCategory {
        match self {
            Self::MongoDb | Self::PostgresDb | Self::Neo4j | Self::Ipfs | Self::ActivityPub => {
                ProviderCategory::StorageAndNetwork
            }
            Self::Redis | Self::LocalFile | Self::InMemory => ProviderCategory::StorageLocal,
            Self::Ethereum => ProviderCategory::Ledger,
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::MongoDb => "mongodb",
            Self::PostgresDb => "postgresdb",
            Self::Neo4j => "neo4j",
            Self::Redis => "redis",
            Self::Ipfs => "ipfs",
            Self::Ethereum => "ethereum",
            Self::ActivityPub => "activitypub",
            Self::LocalFile => "localfile",
            Self::InMemory => "inmemory",
        };
        write!(f, "{tag}")
    }
}

/// Broad provider categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderCategory {
    StorageAndNetwork,
    StorageLocal,
    Ledger,
    OffChainMeta,
}

/// Provider activation lifecycle
///
/// Only `Activated` providers are eligible for routing plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ActivationState {
    #[default]
    Unregistered,
    Registered,
    Activated,
    Degraded,
    Deactivated,
}

impl std::fmt::Display for ActivationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::Unregistered => "unregistered",
            Self::Registered => "registered",
            Self::Activated => "activated",
            Self::Degraded => "degraded",
            Self::Deactivated => "deactivated",
        };
        write!(f, "{tag}")
    }
}

/// Generic operation kinds providers may declare support for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    SaveEntity,
    LoadEntity,
    Search,
    DeleteEntity,
}

impl OperationKind {
    /// Whether this operation mutates provider state
    pub fn is_write(&self) -> bool {
        matches!(self, Self::SaveEntity | Self::DeleteEntity)
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::SaveEntity => "save-entity",
            Self::LoadEntity => "load-entity",
            Self::Search => "search",
            Self::DeleteEntity => "delete-entity",
        };
        write!(f, "{tag}")
    }
}

/// Request priority, advisory for adapters and telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// Generic unit of data the operation kinds act upon
///
/// The payload schema is the caller's business; the engine only moves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique entity identifier
    pub id: String,
    /// Application-defined kind tag (e.g. "avatar", "document")
    pub kind: String,
    /// Arbitrary JSON payload
    pub data: serde_json::Value,
    /// Monotonic version counter, bumped on save
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Create a new entity with a generated id
    pub fn new<K: Into<String>>(kind: K, data: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            kind: kind.into(),
            data,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create an entity with an explicit id
    pub fn with_id<I: Into<String>, K: Into<String>>(
        id: I,
        kind: K,
        data: serde_json::Value,
    ) -> Self {
        let mut entity = Self::new(kind, data);
        entity.id = id.into();
        entity
    }
}

/// Search parameters for the search operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free-text query matched against entity content
    pub text: String,
    /// Optional kind filter
    pub kind: Option<String>,
    /// Maximum number of results
    pub limit: usize,
}

impl SearchQuery {
    /// Create a query with the default result limit
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            kind: None,
            limit: 10,
        }
    }

    /// Restrict results to one entity kind
    pub fn with_kind<S: Into<String>>(mut self, kind: S) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Set the maximum number of results
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Operation payload, coherent with the request's operation kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Payload {
    Entity(Entity),
    EntityId(String),
    Query(SearchQuery),
}

/// The unit of work submitted to the engine
///
/// Immutable once submitted; the engine derives a fresh routing plan for
/// each request from current registry and telemetry state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Generated request id, carried through logs and telemetry
    pub id: Uuid,
    pub operation: OperationKind,
    pub payload: Payload,
    /// Explicit caller override: heads the plan whenever eligible
    pub preferred_provider: Option<ProviderType>,
    pub priority: Priority,
    /// Free-form parameter bag passed through to adapters
    pub params: HashMap<String, String>,
    /// Fan the write out to multiple providers per the replication policy
    pub replicate: bool,
}

impl Request {
    fn new(operation: OperationKind, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation,
            payload,
            preferred_provider: None,
            priority: Priority::default(),
            params: HashMap::new(),
            replicate: false,
        }
    }

    /// Save (create or update) an entity
    pub fn save(entity: Entity) -> Self {
        Self::new(OperationKind::SaveEntity, Payload::Entity(entity))
    }

    /// Load an entity by id
    pub fn load<S: Into<String>>(id: S) -> Self {
        Self::new(OperationKind::LoadEntity, Payload::EntityId(id.into()))
    }

    /// Search entities
    pub fn search(query: SearchQuery) -> Self {
        Self::new(OperationKind::Search, Payload::Query(query))
    }

    /// Delete an entity by id
    pub fn delete<S: Into<String>>(id: S) -> Self {
        Self::new(OperationKind::DeleteEntity, Payload::EntityId(id.into()))
    }

    /// Pin a preferred provider; it heads the plan whenever eligible
    pub fn with_preferred_provider(mut self, provider: ProviderType) -> Self {
        self.preferred_provider = Some(provider);
        self
    }

    /// Set the request priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Attach a free-form parameter
    pub fn with_param<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Mark a write for replicated execution
    pub fn replicated(mut self) -> Self {
        self.replicate = true;
        self
    }
}

/// Typed value produced by a provider operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpValue {
    Entity(Entity),
    Entities(Vec<Entity>),
    Saved { id: String },
    Deleted(bool),
}

/// Terminal, non-success outcome kinds surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// No activated provider declares support for the requested operation
    NoEligibleProviders,
    /// Every provider in the plan was attempted and failed
    AllProvidersFailed,
    /// The per-operation deadline fired before the plan was exhausted
    DeadlineExceeded,
    /// A replicated write did not meet its success rule
    ReplicationFailed,
    /// Caller-initiated abort; not counted as any provider's fault
    Cancelled,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::NoEligibleProviders => "no eligible providers",
            Self::AllProvidersFailed => "all providers failed",
            Self::DeadlineExceeded => "operation deadline exceeded",
            Self::ReplicationFailed => "replication policy not met",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{tag}")
    }
}

/// Per-attempt execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptState {
    Pending,
    InFlight,
    Succeeded,
    Failed,
}

/// Diagnostic record of a single provider attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptReport {
    pub provider: ProviderType,
    pub state: AttemptState,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// One failed replica in a replication report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedReplica {
    pub provider: ProviderType,
    pub error: String,
}

/// Aggregate view of a replicated write
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationReport {
    /// Number of replicas targeted (policy count capped at plan length)
    pub target: usize,
    pub succeeded: Vec<ProviderType>,
    pub failed: Vec<FailedReplica>,
}

impl ReplicationReport {
    /// Whether the write met its policy but lost at least one replica
    pub fn is_degraded(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Canonical outcome wrapper returned by every operation
///
/// Callers never see a raw provider error: failures are normalized into
/// [`FailureKind`] plus a diagnostic detail carrying the last underlying
/// error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    pub value: Option<OpValue>,
    pub message: String,
    /// Provider that served the request, when one did
    pub provider: Option<ProviderType>,
    pub failure: Option<FailureKind>,
    /// Last underlying error, kept for diagnostics
    pub detail: Option<String>,
    pub replication: Option<ReplicationReport>,
    pub attempts: Vec<AttemptReport>,
}

impl Outcome {
    /// Successful outcome served by one provider
    pub fn ok<S: Into<String>>(provider: ProviderType, value: OpValue, message: S) -> Self {
        Self {
            success: true,
            value: Some(value),
            message: message.into(),
            provider: Some(provider),
            failure: None,
            detail: None,
            replication: None,
            attempts: Vec::new(),
        }
    }

    fn failed<S: Into<String>>(kind: FailureKind, message: S, detail: Option<String>) -> Self {
        Self {
            success: false,
            value: None,
            message: message.into(),
            provider: None,
            failure: Some(kind),
            detail,
            replication: None,
            attempts: Vec::new(),
        }
    }

    /// No activated provider supports the operation
    pub fn no_eligible_providers(operation: OperationKind) -> Self {
        Self::failed(
            FailureKind::NoEligibleProviders,
            format!("no eligible providers for operation {operation}"),
            None,
        )
    }

    /// The plan was exhausted without a success
    pub fn all_providers_failed(detail: Option<String>) -> Self {
        Self::failed(
            FailureKind::AllProvidersFailed,
            "all providers in the routing plan failed",
            detail,
        )
    }

    /// The per-operation deadline fired mid-plan
    pub fn deadline_exceeded(detail: Option<String>) -> Self {
        Self::failed(
            FailureKind::DeadlineExceeded,
            "operation deadline exceeded before the plan was exhausted",
            detail,
        )
    }

    /// Caller-initiated cancellation
    pub fn cancelled() -> Self {
        Self::failed(FailureKind::Cancelled, "operation cancelled by caller", None)
    }

    /// A replicated write missed its success rule
    pub fn replication_failed(report: ReplicationReport, detail: Option<String>) -> Self {
        let mut outcome = Self::failed(
            FailureKind::ReplicationFailed,
            format!(
                "replication succeeded on {}/{} replicas, below policy",
                report.succeeded.len(),
                report.target
            ),
            detail,
        );
        outcome.replication = Some(report);
        outcome
    }

    /// Attach per-attempt diagnostics
    pub fn with_attempts(mut self, attempts: Vec<AttemptReport>) -> Self {
        self.attempts = attempts;
        self
    }

    /// Successful replicated write that lost at least one replica
    pub fn is_degraded_replication(&self) -> bool {
        self.success
            && self
                .replication
                .as_ref()
                .is_some_and(ReplicationReport::is_degraded)
    }
}
