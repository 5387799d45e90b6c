//! # Application State Management
//!
//! Shared state handed to every HTTP handler and session loop: the loaded
//! configuration, service-wide counters, and the two process-wide
//! collaborators of the streaming core: the transcription engine and the
//! identity verifier. Both collaborators are stateless and shared behind
//! `Arc` trait objects; sessions receive them by injection at construction,
//! never through globals.

use crate::auth::IdentityVerifier;
use crate::config::AppConfig;
use crate::transcription::TranscriptionEngine;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration; read-mostly after startup
    pub config: Arc<RwLock<AppConfig>>,

    /// Service-wide counters, updated by middleware and session loops
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// Shared transcription engine, safe for concurrent invocation from
    /// multiple session loops
    pub engine: Arc<dyn TranscriptionEngine>,

    /// Credential resolver used at channel acceptance
    pub verifier: Arc<dyn IdentityVerifier>,

    /// Server start time, for uptime reporting
    pub start_time: Instant,
}

/// Counters reported by the health and metrics endpoints.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// HTTP requests processed since start
    pub request_count: u64,

    /// HTTP error responses since start
    pub error_count: u64,

    /// Streaming sessions currently connected
    pub active_sessions: u32,

    /// Streaming sessions accepted since start
    pub total_sessions: u64,

    /// Per-endpoint request statistics, keyed by "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        engine: Arc<dyn TranscriptionEngine>,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            engine,
            verifier,
            start_time: Instant::now(),
        }
    }

    /// Cheap copy of the current configuration; the lock is released
    /// immediately.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    pub fn increment_request_count(&self) {
        self.metrics.write().unwrap().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.metrics.write().unwrap().error_count += 1;
    }

    /// Record one handled request against its endpoint counters.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();
        let endpoint_metric = metrics
            .endpoint_metrics
            .entry(endpoint.to_string())
            .or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// A streaming session was accepted.
    pub fn session_started(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.active_sessions += 1;
        metrics.total_sessions += 1;
    }

    /// A streaming session ended for any reason.
    pub fn session_ended(&self) {
        let mut metrics = self.metrics.write().unwrap();
        // Guard against underflow if teardown paths ever double-report.
        if metrics.active_sessions > 0 {
            metrics.active_sessions -= 1;
        }
    }

    /// Consistent copy of the counters for serialization.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            active_sessions: metrics.active_sessions,
            total_sessions: metrics.total_sessions,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ConfigTokenVerifier;
    use crate::config::AuthConfig;
    use crate::transcription::engine::{EngineError, EngineOutput};

    struct NullEngine;

    impl TranscriptionEngine for NullEngine {
        fn transcribe(&self, _audio: &[u8]) -> Result<EngineOutput, EngineError> {
            Ok(EngineOutput {
                text: String::new(),
                language: String::new(),
            })
        }
    }

    fn state() -> AppState {
        AppState::new(
            AppConfig::default(),
            Arc::new(NullEngine),
            Arc::new(ConfigTokenVerifier::new(&AuthConfig::default())),
        )
    }

    #[test]
    fn session_counters_track_starts_and_ends() {
        let state = state();
        state.session_started();
        state.session_started();
        state.session_ended();

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.active_sessions, 1);
        assert_eq!(snapshot.total_sessions, 2);
    }

    #[test]
    fn session_ended_never_underflows() {
        let state = state();
        state.session_ended();
        assert_eq!(state.get_metrics_snapshot().active_sessions, 0);
    }

    #[test]
    fn endpoint_metrics_accumulate() {
        let state = state();
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["GET /health"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 20.0);
        assert_eq!(metric.error_rate(), 0.5);
    }
}
