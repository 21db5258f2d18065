//! # Configuration
//!
//! Layered configuration for the orchestration core: compiled defaults, an optional file, then
//! `CF_DEPLOY_*` environment variables (nested keys separated by `__`, for example
//! `CF_DEPLOY_DEPLOYMENT__DEPLOYMENT_TIMEOUT_MS=300000`).

use crate::constants::{attempts, timeouts, REFRESH_EVENT_CAPACITY};
use crate::error::{DeployError, DeployResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub request: RequestConfig,
    pub deployment: DeploymentConfig,
    pub refresh: RefreshConfig,
    pub login: LoginConfig,
}

/// Retry budgets for remote requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub retry_interval_ms: u64,
    pub upload_timeout_ms: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: millis(timeouts::DEFAULT_CLIENT_REQUEST_TIMEOUT),
            retry_interval_ms: millis(timeouts::DEFAULT_INTERVAL),
            upload_timeout_ms: millis(timeouts::UPLOAD_TIMEOUT),
        }
    }
}

/// Start-up polling for deployments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    pub deployment_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub visibility_attempts: u32,
    pub visibility_interval_ms: u64,
    /// Domain used for the default route when the remote side offers none
    pub default_domain: Option<String>,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            deployment_timeout_ms: millis(timeouts::DEPLOYMENT_TIMEOUT),
            poll_interval_ms: millis(timeouts::ONE_SECOND_INTERVAL),
            visibility_attempts: attempts::APP_VISIBILITY_ATTEMPTS,
            visibility_interval_ms: millis(timeouts::ONE_SECOND_INTERVAL),
            default_domain: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub event_capacity: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: millis(timeouts::DEFAULT_REFRESH_INTERVAL),
            event_capacity: REFRESH_EVENT_CAPACITY,
        }
    }
}

/// Bounds for the one-shot re-login after an authentication failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    pub attempts: u32,
    pub interval_ms: u64,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            attempts: attempts::LOGIN_ATTEMPTS,
            interval_ms: millis(timeouts::LOGIN_INTERVAL),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl DeployConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> DeployResult<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&DeployConfig::default())?);

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading deployment configuration file");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CF_DEPLOY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: DeployConfig = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject settings that would make retries or polls degenerate
    pub fn validate(&self) -> DeployResult<()> {
        let checks = [
            (self.request.timeout_ms, "request.timeout_ms"),
            (self.request.retry_interval_ms, "request.retry_interval_ms"),
            (self.request.upload_timeout_ms, "request.upload_timeout_ms"),
            (self.deployment.deployment_timeout_ms, "deployment.deployment_timeout_ms"),
            (self.deployment.poll_interval_ms, "deployment.poll_interval_ms"),
            (self.deployment.visibility_interval_ms, "deployment.visibility_interval_ms"),
            (self.refresh.interval_ms, "refresh.interval_ms"),
            (self.login.interval_ms, "login.interval_ms"),
        ];
        for (value, name) in checks {
            if value == 0 {
                return Err(DeployError::Configuration(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        if self.login.attempts == 0 {
            return Err(DeployError::Configuration(
                "login.attempts must be greater than 0".to_string(),
            ));
        }
        if self.deployment.visibility_attempts == 0 {
            return Err(DeployError::Configuration(
                "deployment.visibility_attempts must be greater than 0".to_string(),
            ));
        }
        if self.refresh.event_capacity == 0 {
            return Err(DeployError::Configuration(
                "refresh.event_capacity must be greater than 0".to_string(),
            ));
        }
        if self.deployment.poll_interval_ms > self.deployment.deployment_timeout_ms {
            return Err(DeployError::Configuration(
                "deployment.poll_interval_ms must not exceed deployment.deployment_timeout_ms"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request.timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.request.retry_interval_ms)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.request.upload_timeout_ms)
    }

    pub fn deployment_timeout(&self) -> Duration {
        Duration::from_millis(self.deployment.deployment_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.deployment.poll_interval_ms)
    }

    /// Number of start polls that fit in the deployment timeout
    pub fn start_poll_attempts(&self) -> u32 {
        let attempts = self.deployment.deployment_timeout_ms / self.deployment.poll_interval_ms.max(1);
        u32::try_from(attempts).unwrap_or(u32::MAX).max(1)
    }

    pub fn visibility_interval(&self) -> Duration {
        Duration::from_millis(self.deployment.visibility_interval_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh.interval_ms)
    }

    pub fn login_interval(&self) -> Duration {
        Duration::from_millis(self.login.interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = DeployConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.deployment_timeout(), timeouts::DEPLOYMENT_TIMEOUT);
        assert_eq!(config.login.attempts, 2);
        assert_eq!(config.start_poll_attempts(), 600);
    }

    #[test]
    fn test_validation_rejects_zero_intervals() {
        let mut config = DeployConfig::default();
        config.request.retry_interval_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(DeployError::Configuration(msg)) if msg.contains("retry_interval_ms")
        ));

        let mut config = DeployConfig::default();
        config.login.attempts = 0;
        assert!(config.validate().is_err());

        let mut config = DeployConfig::default();
        config.deployment.poll_interval_ms = config.deployment.deployment_timeout_ms + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_merges_file_over_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "[deployment]\ndeployment_timeout_ms = 5000\ndefault_domain = \"apps.example.com\"\n\n[login]\nattempts = 3"
        )
        .unwrap();

        let config = DeployConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.deployment_timeout(), Duration::from_secs(5));
        assert_eq!(
            config.deployment.default_domain.as_deref(),
            Some("apps.example.com")
        );
        assert_eq!(config.login.attempts, 3);
        // Untouched sections keep their defaults
        assert_eq!(config.request, RequestConfig::default());
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "[refresh]\ninterval_ms = 0").unwrap();

        assert!(matches!(
            DeployConfig::load(Some(file.path())),
            Err(DeployError::Configuration(_))
        ));
    }

    #[test]
    fn test_load_accepts_json_files() {
        let file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .unwrap();
        serde_json::to_writer(
            file.as_file(),
            &serde_json::json!({
                "request": { "retry_interval_ms": 500 },
                "refresh": { "enabled": false }
            }),
        )
        .unwrap();

        let config = DeployConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.retry_interval(), Duration::from_millis(500));
        assert!(!config.refresh.enabled);
        assert_eq!(config.request.timeout_ms, RequestConfig::default().timeout_ms);
    }
}
