//! Performance monitoring
//!
//! Per-provider rolling aggregates fed by executor outcome events, plus the
//! derived sub-scores the router combines into a composite. Aggregates use
//! incremental formulas and a bounded trailing window only; no unbounded
//! history is retained. Updates to one provider's metrics are serialized
//! through its map entry, readers get eventually-consistent snapshots.

use crate::config::{MonitorConfig, ScoringWeights};
use crate::core::types::ProviderType;
use crate::registry::{LifecycleEvent, ProviderRegistry};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::{counter, gauge, histogram};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

/// Rolling aggregate for one provider
///
/// Never deleted; reset on explicit administrative action or provider
/// reactivation.
#[derive(Debug, Clone)]
pub struct ProviderPerformanceMetrics {
    pub total_requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    /// Incrementally-updated mean latency in milliseconds
    pub avg_response_ms: f64,
    pub peak_response_ms: f64,
    pub min_response_ms: f64,
    /// Exponentially-decayed failure ratio in [0, 1]
    pub error_rate: f64,
    /// Success ratio over the trailing attempt window
    pub uptime_pct: f64,
    pub active_connections: u32,
    /// Cost-per-operation EWMA from adapter hints
    pub avg_cost: f64,
    pub cost_samples: u64,
    pub region: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    started_at: Instant,
    recent: VecDeque<bool>,
}

impl ProviderPerformanceMetrics {
    fn new() -> Self {
        Self {
            total_requests: 0,
            successes: 0,
            failures: 0,
            consecutive_failures: 0,
            avg_response_ms: 0.0,
            peak_response_ms: 0.0,
            min_response_ms: 0.0,
            error_rate: 0.0,
            uptime_pct: 1.0,
            active_connections: 0,
            avg_cost: 0.0,
            cost_samples: 0,
            region: None,
            last_updated: None,
            started_at: Instant::now(),
            recent: VecDeque::new(),
        }
    }

    /// Completed requests per second since the aggregate started
    pub fn throughput_per_sec(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.total_requests as f64 / elapsed
    }
}

/// Sub-scores plus the rolled-up overall score, all in [0, 1]
///
/// `overall` is a pure function of the four sub-scores and the configured
/// weights; two calls without an intervening outcome return identical values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderScore {
    pub availability: f64,
    pub performance: f64,
    pub cost: f64,
    pub geography: f64,
    pub overall: f64,
}

impl ProviderScore {
    /// Neutral default for providers with no recorded metrics
    pub fn neutral() -> Self {
        Self {
            availability: 0.5,
            performance: 0.5,
            cost: 0.5,
            geography: 0.5,
            overall: 0.5,
        }
    }
}

/// Per-provider performance monitor
pub struct PerformanceMonitor {
    states: DashMap<ProviderType, ProviderPerformanceMetrics>,
    weights: ScoringWeights,
    config: MonitorConfig,
}

impl PerformanceMonitor {
    /// Create a monitor with the given scoring weights and settings
    pub fn new(weights: ScoringWeights, config: MonitorConfig) -> Self {
        Self {
            states: DashMap::new(),
            weights,
            config,
        }
    }

    /// Spawn a task resetting a provider's stale metrics on (re)activation
    ///
    /// Must be called within a tokio runtime.
    pub fn watch(self: Arc<Self>, registry: &ProviderRegistry) {
        let monitor = self;
        let mut events = registry.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(LifecycleEvent::Activated(provider_type)) => {
                        monitor.reset(provider_type);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("metrics watcher lagged, skipped {skipped} lifecycle events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    /// Record a static region tag for geography scoring
    pub fn attach_region(&self, provider_type: ProviderType, region: Option<String>) {
        self.states
            .entry(provider_type)
            .or_insert_with(ProviderPerformanceMetrics::new)
            .region = region;
    }

    /// Record one completed attempt against a provider
    ///
    /// Returns the provider's consecutive-failure count after the update,
    /// which the executor compares against its degradation threshold.
    pub fn record_outcome(
        &self,
        provider_type: ProviderType,
        latency: Duration,
        success: bool,
        cost_hint: Option<f64>,
    ) -> u32 {
        let latency_ms = latency.as_secs_f64() * 1_000.0;
        let alpha = self.config.error_rate_alpha;

        let mut state = self
            .states
            .entry(provider_type)
            .or_insert_with(ProviderPerformanceMetrics::new);

        state.total_requests += 1;
        if success {
            state.successes += 1;
            state.consecutive_failures = 0;
        } else {
            state.failures += 1;
            state.consecutive_failures += 1;
        }

        // Incremental latency aggregates, no sample retention
        if state.total_requests == 1 {
            state.min_response_ms = latency_ms;
        } else {
            state.min_response_ms = state.min_response_ms.min(latency_ms);
        }
        state.peak_response_ms = state.peak_response_ms.max(latency_ms);
        state.avg_response_ms +=
            (latency_ms - state.avg_response_ms) / state.total_requests as f64;

        let sample = if success { 0.0 } else { 1.0 };
        state.error_rate = alpha * sample + (1.0 - alpha) * state.error_rate;

        state.recent.push_back(success);
        while state.recent.len() > self.config.uptime_window {
            state.recent.pop_front();
        }
        let up = state.recent.iter().filter(|s| **s).count();
        state.uptime_pct = up as f64 / state.recent.len() as f64;

        if let Some(cost) = cost_hint {
            state.avg_cost = if state.cost_samples == 0 {
                cost
            } else {
                0.2 * cost + 0.8 * state.avg_cost
            };
            state.cost_samples += 1;
        }

        state.last_updated = Some(Utc::now());
        let consecutive = state.consecutive_failures;
        drop(state);

        let status = if success { "success" } else { "error" };
        counter!("polystore_provider_requests_total", "provider" => provider_type.to_string(), "status" => status.to_string()).increment(1);
        histogram!("polystore_provider_response_time_seconds", "provider" => provider_type.to_string()).record(latency.as_secs_f64());

        consecutive
    }

    /// Increment the active-connection gauge around an attempt
    pub fn begin_attempt(&self, provider_type: ProviderType) {
        let mut state = self
            .states
            .entry(provider_type)
            .or_insert_with(ProviderPerformanceMetrics::new);
        state.active_connections += 1;
        let count = state.active_connections;
        drop(state);
        gauge!("polystore_provider_active_connections", "provider" => provider_type.to_string())
            .set(f64::from(count));
    }

    /// Decrement the active-connection gauge
    pub fn end_attempt(&self, provider_type: ProviderType) {
        let mut state = self
            .states
            .entry(provider_type)
            .or_insert_with(ProviderPerformanceMetrics::new);
        state.active_connections = state.active_connections.saturating_sub(1);
        let count = state.active_connections;
        drop(state);
        gauge!("polystore_provider_active_connections", "provider" => provider_type.to_string())
            .set(f64::from(count));
    }

    /// Eventually-consistent snapshot of one provider's aggregates
    pub fn snapshot(&self, provider_type: ProviderType) -> Option<ProviderPerformanceMetrics> {
        self.states.get(&provider_type).map(|s| s.clone())
    }

    /// Current sub-scores plus overall score
    ///
    /// Unknown or never-attempted providers get the neutral default so newly
    /// activated backends are treated as average, not penalized.
    pub fn score(&self, provider_type: ProviderType) -> ProviderScore {
        let Some(state) = self.states.get(&provider_type) else {
            return ProviderScore::neutral();
        };

        let geography = self.geography_score(state.region.as_deref());
        if state.total_requests == 0 {
            let mut score = ProviderScore::neutral();
            score.geography = geography;
            score.overall = self.overall(&score);
            return score;
        }

        let availability = (state.uptime_pct * (1.0 - state.error_rate)).clamp(0.0, 1.0);
        let target = self.config.latency_target_ms as f64;
        let performance = target / (target + state.avg_response_ms);
        let cost = if state.cost_samples == 0 {
            0.5
        } else {
            1.0 - (state.avg_cost / self.config.cost_ceiling).min(1.0)
        };

        let mut score = ProviderScore {
            availability,
            performance,
            cost,
            geography,
            overall: 0.0,
        };
        score.overall = self.overall(&score);
        score
    }

    fn overall(&self, score: &ProviderScore) -> f64 {
        let w = &self.weights;
        (w.performance * score.performance
            + w.availability * score.availability
            + w.cost * score.cost
            + w.geography * score.geography)
            / w.positive_sum()
    }

    fn geography_score(&self, region: Option<&str>) -> f64 {
        match (self.config.home_region.as_deref(), region) {
            (Some(home), Some(region)) if home == region => 1.0,
            (Some(_), Some(_)) => 0.25,
            _ => 0.5,
        }
    }

    /// Reset a provider's aggregates, keeping its static region tag
    pub fn reset(&self, provider_type: ProviderType) {
        if let Some(mut state) = self.states.get_mut(&provider_type) {
            let region = state.region.take();
            *state = ProviderPerformanceMetrics::new();
            state.region = region;
            info!("reset performance metrics for provider {provider_type}");
        }
    }
}
