//! Engine configuration
//!
//! Configuration is read once at startup and merged in priority order:
//! defaults, then a TOML file, then `POLYSTORE_`-prefixed environment
//! variables. Hot reload is out of scope.

use crate::core::error::{Error, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for configuration overrides
pub const CONFIG_ENV_PREFIX: &str = "POLYSTORE";

/// Weights for the composite provider score
///
/// The four positive terms are normalized by their sum, so only relative
/// magnitudes matter; `risk_penalty` is subtracted separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub performance: f64,
    pub availability: f64,
    pub cost: f64,
    pub geography: f64,
    /// Penalty multiplier applied to the failure-risk score
    pub risk_penalty: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        // Performance and availability dominate by default
        Self {
            performance: 0.35,
            availability: 0.35,
            cost: 0.15,
            geography: 0.15,
            risk_penalty: 0.25,
        }
    }
}

impl ScoringWeights {
    /// Sum of the four positive weights, used for normalization
    pub fn positive_sum(&self) -> f64 {
        self.performance + self.availability + self.cost + self.geography
    }
}

/// Router/scorer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Maximum plan length, bounding retry storms
    pub max_fallback_depth: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_fallback_depth: 5,
        }
    }
}

/// Failover executor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Per-attempt timeout in milliseconds
    pub attempt_timeout_ms: u64,
    /// Per-operation deadline in milliseconds, across all attempts
    pub operation_timeout_ms: u64,
    /// Consecutive failures before a provider is marked degraded
    pub degrade_after: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_ms: 5_000,
            operation_timeout_ms: 30_000,
            degrade_after: 5,
        }
    }
}

impl ExecutorConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

/// Success rule for replicated writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ReplicationRule {
    /// Succeed if at least one replica succeeds
    #[default]
    BestEffort,
    /// Succeed if more than half of the targeted replicas succeed
    Majority,
}

/// Replication policy for writes flagged as replicable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationPolicy {
    /// Target replica count, capped at plan length during execution
    pub replicas: usize,
    pub rule: ReplicationRule,
}

impl Default for ReplicationPolicy {
    fn default() -> Self {
        Self {
            replicas: 3,
            rule: ReplicationRule::default(),
        }
    }
}

impl ReplicationPolicy {
    /// Number of successful replicas required for `target` attempted
    pub fn required_successes(&self, target: usize) -> usize {
        match self.rule {
            ReplicationRule::BestEffort => 1,
            ReplicationRule::Majority => target / 2 + 1,
        }
    }
}

/// Performance monitor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Smoothing factor for the decayed error rate, in (0, 1]
    pub error_rate_alpha: f64,
    /// Trailing attempt window used for the uptime ratio
    pub uptime_window: usize,
    /// Latency treated as "good" when normalizing the performance score
    pub latency_target_ms: u64,
    /// Cost-per-operation mapped to a zero cost score
    pub cost_ceiling: f64,
    /// Region of this deployment, for the geography sub-score
    pub home_region: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            error_rate_alpha: 0.2,
            uptime_window: 100,
            latency_target_ms: 250,
            cost_ceiling: 0.01,
            home_region: None,
        }
    }
}

/// Failure predictor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// Fixed increment applied to a (type, cause) risk weight per failure
    pub risk_increment: f64,
    /// Attempt-count floor when deriving the base failure rate
    pub attempt_floor: u64,
    /// Half-life of risk weights in seconds; zero disables decay
    pub risk_half_life_secs: u64,
    /// Retained failure events per provider; older events are pruned
    pub max_events: usize,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            risk_increment: 0.1,
            attempt_floor: 10,
            risk_half_life_secs: 3_600,
            max_events: 256,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub scoring: ScoringWeights,
    pub router: RouterConfig,
    pub executor: ExecutorConfig,
    pub replication: ReplicationPolicy,
    pub monitor: MonitorConfig,
    pub predictor: PredictorConfig,
}

impl EngineConfig {
    /// Load configuration from defaults, an optional TOML file, and
    /// environment variables (later sources override earlier ones)
    pub fn load_from<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        if let Some(path) = path {
            let path = path.as_ref();
            if path.exists() {
                figment = figment.merge(Toml::file(path));
                tracing::info!("loaded configuration file {}", path.display());
            } else {
                tracing::debug!("configuration file {} not found", path.display());
            }
        }

        figment = figment.merge(Env::prefixed(&format!("{CONFIG_ENV_PREFIX}_")).split("_"));

        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from defaults and environment variables only
    pub fn load() -> Result<Self> {
        Self::load_from(None::<&Path>)
    }

    /// Write the configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let rendered = toml::to_string_pretty(self)
            .map_err(|err| Error::config(format!("failed to serialize configuration: {err}")))?;
        std::fs::write(path.as_ref(), rendered)?;
        Ok(())
    }

    /// Validate configuration at startup
    pub fn validate(&self) -> Result<()> {
        let w = &self.scoring;
        if w.performance < 0.0 || w.availability < 0.0 || w.cost < 0.0 || w.geography < 0.0 {
            return Err(Error::config("scoring weights must be non-negative"));
        }
        if w.positive_sum() <= 0.0 {
            return Err(Error::config("at least one scoring weight must be positive"));
        }
        if w.risk_penalty < 0.0 {
            return Err(Error::config("risk_penalty must be non-negative"));
        }
        if self.router.max_fallback_depth == 0 {
            return Err(Error::config("max_fallback_depth must be at least 1"));
        }
        if self.executor.attempt_timeout_ms == 0 || self.executor.operation_timeout_ms == 0 {
            return Err(Error::config("executor timeouts must be positive"));
        }
        if self.executor.degrade_after == 0 {
            return Err(Error::config("degrade_after must be at least 1"));
        }
        if self.replication.replicas == 0 {
            return Err(Error::config("replication.replicas must be at least 1"));
        }
        if self.monitor.error_rate_alpha <= 0.0 || self.monitor.error_rate_alpha > 1.0 {
            return Err(Error::config("error_rate_alpha must be in (0, 1]"));
        }
        if self.monitor.uptime_window == 0 {
            return Err(Error::config("uptime_window must be at least 1"));
        }
        if self.monitor.latency_target_ms == 0 {
            return Err(Error::config("latency_target_ms must be positive"));
        }
        if self.monitor.cost_ceiling <= 0.0 {
            return Err(Error::config("cost_ceiling must be positive"));
        }
        if self.predictor.risk_increment <= 0.0 {
            return Err(Error::config("risk_increment must be positive"));
        }
        if self.predictor.attempt_floor == 0 {
            return Err(Error::config("attempt_floor must be at least 1"));
        }
        if self.predictor.max_events == 0 {
            return Err(Error::config("max_events must be at least 1"));
        }
        Ok(())
    }
}
