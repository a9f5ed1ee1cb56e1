//! Failure prediction
//!
//! A frequency/risk-weight heuristic, not a trained model: every recorded
//! failure appends an immutable event, feeds the provider's base failure
//! rate, and reinforces a per-(type, cause) risk weight. The router reads a
//! single scalar risk score per provider as a penalty term.

use crate::config::PredictorConfig;
use crate::core::error::Error;
use crate::core::types::ProviderType;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Failure classification recorded with every event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureType {
    Timeout,
    Auth,
    NotFound,
    TransientNetwork,
    RateLimited,
    Protocol,
    Unknown,
}

impl FailureType {
    /// Classify an engine error into a failure type
    pub fn classify(error: &Error) -> Self {
        match error {
            Error::Timeout { .. } => Self::Timeout,
            Error::Auth { .. } => Self::Auth,
            Error::NotFound { .. } => Self::NotFound,
            Error::Network { .. } | Error::Io { .. } => Self::TransientNetwork,
            Error::RateLimited { .. } => Self::RateLimited,
            Error::Provider { .. } | Error::Json { .. } => Self::Protocol,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for FailureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::Timeout => "timeout",
            Self::Auth => "auth",
            Self::NotFound => "not-found",
            Self::TransientNetwork => "transient-network",
            Self::RateLimited => "rate-limited",
            Self::Protocol => "protocol",
            Self::Unknown => "unknown",
        };
        write!(f, "{tag}")
    }
}

/// Immutable failure record
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FailureEvent {
    pub provider: ProviderType,
    pub failure_type: FailureType,
    pub cause: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct RiskWeight {
    weight: f64,
    last_hit: DateTime<Utc>,
}

/// Per-provider failure history and derived risk state
#[derive(Debug, Default)]
struct FailureModel {
    /// Append-only, pruned oldest-first beyond the configured cap
    events: VecDeque<FailureEvent>,
    attempts: u64,
    failures: u64,
    base_rate: f64,
    weights: HashMap<String, RiskWeight>,
}

/// Failure predictor keyed by provider
pub struct FailurePredictor {
    models: DashMap<ProviderType, FailureModel>,
    config: PredictorConfig,
}

impl FailurePredictor {
    /// Create a predictor with the given settings
    pub fn new(config: PredictorConfig) -> Self {
        Self {
            models: DashMap::new(),
            config,
        }
    }

    /// Exponential decay since the key's last failure; half-life zero
    /// disables decay entirely
    fn decayed(&self, weight: f64, last_hit: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        if self.config.risk_half_life_secs == 0 {
            return weight;
        }
        let elapsed = (now - last_hit).num_milliseconds().max(0) as f64 / 1_000.0;
        let half_life = self.config.risk_half_life_secs as f64;
        weight * 0.5_f64.powf(elapsed / half_life)
    }

    fn recompute_base_rate(&self, model: &mut FailureModel) {
        let attempts = model.attempts.max(self.config.attempt_floor);
        model.base_rate = model.failures as f64 / attempts as f64;
    }

    /// Record one completed attempt (success or failure) for the base rate
    pub fn record_attempt(&self, provider_type: ProviderType) {
        let mut model = self.models.entry(provider_type).or_default();
        model.attempts += 1;
        self.recompute_base_rate(&mut model);
    }

    /// Record a failure: append the event and reinforce its risk key
    pub fn record_failure<S: Into<String>>(
        &self,
        provider_type: ProviderType,
        failure_type: FailureType,
        cause: S,
    ) {
        let cause = cause.into();
        let now = Utc::now();
        let key = format!("{failure_type}:{cause}");

        let mut model = self.models.entry(provider_type).or_default();
        model.events.push_back(FailureEvent {
            provider: provider_type,
            failure_type,
            cause,
            at: now,
        });
        while model.events.len() > self.config.max_events {
            model.events.pop_front();
        }

        model.failures += 1;
        self.recompute_base_rate(&mut model);

        let increment = self.config.risk_increment;
        match model.weights.get_mut(&key) {
            Some(risk) => {
                // Decay the stored weight before reinforcing it
                risk.weight = self.decayed(risk.weight, risk.last_hit, now) + increment;
                risk.last_hit = now;
            }
            None => {
                model.weights.insert(
                    key.clone(),
                    RiskWeight {
                        weight: increment,
                        last_hit: now,
                    },
                );
            }
        }

        debug!(
            "recorded failure for provider {provider_type}: {key} (base rate {:.3})",
            model.base_rate
        );
    }

    /// Scalar risk score in [0, 1] combining the base failure rate and the
    /// maximum decayed risk weight
    pub fn risk_score(&self, provider_type: ProviderType) -> f64 {
        let Some(model) = self.models.get(&provider_type) else {
            return 0.0;
        };
        let now = Utc::now();
        let max_weight = model
            .weights
            .values()
            .map(|r| self.decayed(r.weight, r.last_hit, now))
            .fold(0.0_f64, f64::max);
        (0.5 * model.base_rate + 0.5 * max_weight.min(1.0)).clamp(0.0, 1.0)
    }

    /// Base failure rate for one provider
    pub fn base_rate(&self, provider_type: ProviderType) -> f64 {
        self.models
            .get(&provider_type)
            .map_or(0.0, |m| m.base_rate)
    }

    /// Snapshot of a provider's failure log, newest last
    pub fn events(&self, provider_type: ProviderType) -> Vec<FailureEvent> {
        self.models
            .get(&provider_type)
            .map(|m| m.events.iter().cloned().collect())
            .unwrap_or_default()
    }
}
