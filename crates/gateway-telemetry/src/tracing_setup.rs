//! Logging and distributed tracing setup.
//!
//! Installs one global subscriber:
//! - an `EnvFilter` (`RUST_LOG` wins over the configured level)
//! - a JSON or human-readable fmt layer
//! - an OpenTelemetry span layer when enabled

use gateway_config::{LogFormat, TelemetryConfig};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::{
    trace::{Config, RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Install the OpenTelemetry layer
    pub otel_enabled: bool,
    /// Service name
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Sampling rate (0.0 - 1.0)
    pub sampling_rate: f64,
    /// Default filter directive
    pub log_level: String,
    /// Output format
    pub log_format: LogFormat,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            otel_enabled: false,
            service_name: "llm-policy-gateway".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            sampling_rate: 1.0,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

impl From<&TelemetryConfig> for TracingConfig {
    fn from(config: &TelemetryConfig) -> Self {
        Self {
            otel_enabled: config.otel_enabled,
            service_name: config.service_name.clone(),
            log_level: config.log_level.clone(),
            log_format: config.log_format,
            ..Self::default()
        }
        .with_sampling_rate(config.sampling_ratio)
    }
}

impl TracingConfig {
    /// Create a new tracing configuration
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set the sampling rate
    #[must_use]
    pub fn with_sampling_rate(mut self, rate: f64) -> Self {
        self.sampling_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Set the log level
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set the output format
    #[must_use]
    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Enable the OpenTelemetry layer
    #[must_use]
    pub fn with_otel(mut self, enabled: bool) -> Self {
        self.otel_enabled = enabled;
        self
    }

    fn sampler(&self) -> Sampler {
        if self.sampling_rate >= 1.0 {
            Sampler::AlwaysOn
        } else if self.sampling_rate <= 0.0 {
            Sampler::AlwaysOff
        } else {
            Sampler::TraceIdRatioBased(self.sampling_rate)
        }
    }
}

/// Filter from `RUST_LOG`, falling back to `default_directive`
pub fn build_filter(default_directive: &str) -> Result<EnvFilter, TracingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => parse_filter(default_directive),
    }
}

/// Parse a filter directive such as `info,gateway_server=debug`
pub fn parse_filter(directive: &str) -> Result<EnvFilter, TracingError> {
    EnvFilter::try_new(directive).map_err(|e| TracingError::Filter(e.to_string()))
}

/// Initialize logging and tracing with the given configuration
///
/// # Errors
/// Returns error if the filter is invalid or a subscriber is already installed
pub fn init_tracing(config: &TracingConfig) -> Result<Option<TracerProvider>, TracingError> {
    let filter = build_filter(&config.log_level)?;

    let (json, pretty) = match config.log_format {
        LogFormat::Json => (
            Some(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            ),
            None,
        ),
        LogFormat::Pretty => (None, Some(fmt::layer().with_target(true))),
    };

    let provider = config.otel_enabled.then(|| {
        let resource = Resource::new(vec![
            opentelemetry::KeyValue::new("service.name", config.service_name.clone()),
            opentelemetry::KeyValue::new("service.version", config.service_version.clone()),
        ]);
        let tracer_config = Config::default()
            .with_sampler(config.sampler())
            .with_id_generator(RandomIdGenerator::default())
            .with_resource(resource);
        TracerProvider::builder().with_config(tracer_config).build()
    });
    let otel = provider.as_ref().map(|p| {
        tracing_opentelemetry::layer().with_tracer(p.tracer(config.service_name.clone()))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .with(otel)
        .try_init()
        .map_err(|e| TracingError::Init(e.to_string()))?;

    info!(
        service = %config.service_name,
        format = ?config.log_format,
        otel = config.otel_enabled,
        sampling_rate = config.sampling_rate,
        "Tracing initialized"
    );

    Ok(provider)
}

/// Shutdown tracing and flush remaining spans
pub fn shutdown_tracing(provider: Option<TracerProvider>) {
    if let Some(provider) = provider {
        drop(provider);
        info!("Tracing shutdown complete");
    }
}

/// Tracing initialization error
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    /// Failed to install the subscriber
    #[error("Failed to initialize tracing: {0}")]
    Init(String),
    /// Invalid filter directive
    #[error("Invalid log filter: {0}")]
    Filter(String),
}

/// Create a span for one gateway request
#[macro_export]
macro_rules! request_span {
    ($request_id:expr, $principal:expr, $model:expr) => {
        tracing::info_span!(
            "gateway_request",
            request_id = %$request_id,
            principal = %$principal,
            model = %$model,
            otel.kind = "server"
        )
    };
}
