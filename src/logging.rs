//! # Structured Logging Module
//!
//! Environment-aware structured logging for step runs, chunk commits and
//! repository calls. Output goes to the console, human readable by default
//! and JSON when `STEPWISE_LOG_FORMAT=json`.

use crate::config::LoggingConfig;
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    init_with(None, use_json_format());
}

/// Initialize structured logging from the `[logging]` configuration section.
///
/// `RUST_LOG` and `STEPWISE_LOG_FORMAT=json` still take precedence.
pub fn init_from_config(config: &LoggingConfig) {
    let json = use_json_format() || config.format.eq_ignore_ascii_case("json");
    init_with(config.level.as_deref(), json);
}

fn init_with(level: Option<&str>, json: bool) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let default_level = level
            .map(str::to_string)
            .unwrap_or_else(|| get_log_level(&environment));
        let filter = std::env::var("RUST_LOG")
            .ok()
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new(default_level));

        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // A global subscriber may already be installed by the embedding application
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
pub(crate) fn get_environment() -> String {
    std::env::var("STEPWISE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

fn use_json_format() -> bool {
    std::env::var("STEPWISE_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log structured data for step lifecycle operations
pub fn log_step_operation(
    operation: &str,
    job_execution_id: Option<i64>,
    step_execution_id: Option<i64>,
    step_name: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        job_execution_id = job_execution_id,
        step_execution_id = step_execution_id,
        step_name = step_name,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🔧 STEP_OPERATION"
    );
}

/// Log structured data for chunk commits and rollbacks
pub fn log_chunk_operation(
    operation: &str,
    step_execution_id: i64,
    chunk_id: u64,
    status: &str,
    items: Option<u64>,
    details: Option<&str>,
) {
    tracing::debug!(
        operation = %operation,
        step_execution_id = step_execution_id,
        chunk_id = chunk_id,
        status = %status,
        items = items,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📦 CHUNK_OPERATION"
    );
}

/// Log structured data for execution-state repository operations
pub fn log_repository_operation(
    operation: &str,
    entity: &str,
    record_id: Option<i64>,
    status: &str,
    version: Option<i64>,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        entity = %entity,
        record_id = record_id,
        status = %status,
        version = version,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "💾 REPOSITORY_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
