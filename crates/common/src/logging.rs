//! Process-wide tracing setup: compact stdout output filtered by `RUST_LOG`,
//! plus an optional OTLP span exporter.

use std::env;

use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use tracing::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const OTLP_URL_ENVVAR: &str = "SYNC_COMMITTEE_OTLP_URL";
pub const SVC_LABEL_ENVVAR: &str = "SYNC_COMMITTEE_SVC_LABEL";

const TRACER_NAME: &str = "sync-committee";

#[derive(Clone, Debug)]
pub struct LoggerConfig {
    whoami: String,
    otlp_url: Option<String>,
}

impl LoggerConfig {
    pub fn new(whoami: String) -> Self {
        Self {
            whoami,
            otlp_url: None,
        }
    }

    /// Builds the whoami from `base`, tagged with [`SVC_LABEL_ENVVAR`] when set,
    /// and picks up the exporter url from [`OTLP_URL_ENVVAR`].
    pub fn with_base_name(base: &str) -> Self {
        let whoami = match env::var(SVC_LABEL_ENVVAR) {
            Ok(label) => format!("{base}%{label}"),
            Err(_) => base.to_owned(),
        };
        Self {
            whoami,
            otlp_url: env::var(OTLP_URL_ENVVAR).ok(),
        }
    }

    pub fn set_otlp_url(&mut self, url: String) {
        self.otlp_url = Some(url);
    }

    pub fn whoami(&self) -> &str {
        &self.whoami
    }

    pub fn otlp_url(&self) -> Option<&str> {
        self.otlp_url.as_deref()
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::with_base_name("sync-committee")
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LoggingInitError {
    #[error("failed to set up otlp exporter: {0}")]
    Otlp(String),

    #[error("failed to install subscriber: {0}")]
    Subscriber(String),
}

/// Installs the global subscriber. Fails if one is already installed.
///
/// With an OTLP url configured this must run inside a tokio runtime.
pub fn init(config: LoggerConfig) -> Result<(), LoggingInitError> {
    let stdout = tracing_subscriber::fmt::layer()
        .compact()
        .with_filter(EnvFilter::from_default_env());

    let otlp = config.otlp_url().map(otlp_layer).transpose()?;

    tracing_subscriber::registry()
        .with(stdout)
        .with(otlp)
        .try_init()
        .map_err(|e| LoggingInitError::Subscriber(e.to_string()))?;

    info!(whoami = %config.whoami, otlp = config.otlp_url.is_some(), "logging started");
    Ok(())
}

fn otlp_layer<S>(url: &str) -> Result<impl Layer<S>, LoggingInitError>
where
    S: Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    let exporter = opentelemetry_otlp::new_exporter().tonic().with_endpoint(url);
    let provider = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .install_batch(opentelemetry_sdk::runtime::TokioCurrentThread)
        .map_err(|e| LoggingInitError::Otlp(e.to_string()))?;

    Ok(tracing_opentelemetry::layer().with_tracer(provider.tracer(TRACER_NAME)))
}

/// Flushes pending spans to the exporter.
pub fn finalize() {
    info!("shutting down logging");
    opentelemetry::global::shutdown_tracer_provider();
}
