//! Tracing configuration structures

use serde::{Deserialize, Serialize};

/// Output format of the local log layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, one line per event
    #[default]
    Text,
    /// One JSON object per event, for log shippers
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Configuration for distributed tracing and local logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    /// Export spans to the collector. Logging and context propagation work either way.
    pub enabled: bool,

    /// OTLP collector endpoint (gRPC)
    /// Example: "http://jaeger:4317" (Jaeger with OTLP support)
    /// Example: "http://tempo:4317" (Grafana Tempo)
    pub otlp_endpoint: Option<String>,

    /// Sample rate (0.0 to 1.0)
    pub sample_rate: f64,

    /// Service version (from Git tag or semantic versioning)
    pub service_version: String,

    /// Deployment environment (development, staging, production)
    pub environment: String,

    /// Local log output format
    pub log_format: LogFormat,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            otlp_endpoint: Some("http://jaeger:4317".to_string()),
            sample_rate: 1.0,
            service_version: "0.1.0".to_string(),
            environment: "development".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl TracingConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `TRACING_ENABLED`: Enable span export (true/false)
    /// - `OTLP_ENDPOINT`: OTLP collector endpoint (default: http://jaeger:4317)
    /// - `TRACING_SAMPLE_RATE`: Sample rate (0.0-1.0)
    /// - `SERVICE_VERSION`: Service version
    /// - `APP_ENV`: Environment (development/staging/production)
    /// - `LOG_FORMAT`: `json` or `text`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`TracingConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let enabled = lookup("TRACING_ENABLED")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.enabled);

        let otlp_endpoint = lookup("OTLP_ENDPOINT").or(defaults.otlp_endpoint);

        let sample_rate = lookup("TRACING_SAMPLE_RATE")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(defaults.sample_rate)
            .clamp(0.0, 1.0);

        let service_version = lookup("SERVICE_VERSION").unwrap_or(defaults.service_version);

        let environment = lookup("APP_ENV").unwrap_or(defaults.environment);

        let log_format = lookup("LOG_FORMAT")
            .map(|v| LogFormat::parse(&v))
            .unwrap_or(defaults.log_format);

        Self {
            enabled,
            otlp_endpoint,
            sample_rate,
            service_version,
            environment,
            log_format,
        }
    }
}
