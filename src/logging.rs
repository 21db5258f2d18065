//! # Structured Logging Module
//!
//! Environment-aware structured logging for deployment operations and remote requests.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
///
/// `CF_DEPLOY_LOG` overrides the filter directive; `CF_DEPLOY_LOG_FORMAT=json` switches the
/// console output to JSON lines. Safe to call more than once.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let directive =
            std::env::var("CF_DEPLOY_LOG").unwrap_or_else(|_| get_log_level(&environment));
        let json = std::env::var("CF_DEPLOY_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let console = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .with_filter(EnvFilter::new(&directive))
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_filter(EnvFilter::new(&directive))
                .boxed()
        };

        // An embedding host may already own the global subscriber
        if tracing_subscriber::registry().with(console).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            environment = %environment,
            filter = %directive,
            json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("CF_DEPLOY_ENV")
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

/// Log structured data for an orchestrated application operation
pub fn log_operation(operation: &str, application: Option<&str>, status: &str, details: Option<&str>) {
    tracing::info!(
        operation = %operation,
        application = application,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 APP_OPERATION"
    );
}

/// Log structured data for a single attempt of a remote request
pub fn log_request(request: &str, attempt: u32, status: &str, details: Option<&str>) {
    tracing::debug!(
        request = %request,
        attempt,
        status = %status,
        details = details,
        "🌐 REMOTE_REQUEST"
    );
}
