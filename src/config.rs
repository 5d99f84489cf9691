use std::net::SocketAddr;
use std::path::PathBuf;

use secrecy::SecretString;
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};
use snafu::ResultExt as _;

use crate::api::ApiKey;
use crate::error::{ApplicationError, ConfigLoadSnafu, OpenStoreSnafu};
use crate::lock::{FileLock, RetryPolicy};
use crate::store::ViewStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(rename = "host_address")]
    pub host: SocketAddr,
    #[serde(rename = "internal_api_key")]
    pub api_key: SecretString,
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(flatten)]
    pub store: StoreConfig,
}

impl Config {
    pub fn from_env() -> Result<Config, ApplicationError> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars(
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Config, ApplicationError> {
        envy::from_iter::<_, Config>(vars).context(ConfigLoadSnafu)
    }

    pub async fn store(&self) -> Result<ViewStore, ApplicationError> {
        let lock = FileLock::new(&self.store.lock.path).with_policy(self.store.lock.policy());

        ViewStore::open(&self.store.path, lock)
            .await
            .context(OpenStoreSnafu)
    }

    pub fn api_key(&self) -> ApiKey {
        ApiKey::new(self.api_key.clone())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(rename = "analytics_file", default = "default_store_path")]
    pub path: PathBuf,
    #[serde(flatten)]
    pub lock: LockConfig,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct LockConfig {
    #[serde(rename = "analytics_lock", default = "default_lock_path")]
    pub path: PathBuf,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(rename = "lock_attempts", default = "default_lock_attempts")]
    pub attempts: usize,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(rename = "lock_retry_interval", default = "default_lock_retry_interval")]
    pub retry_interval: humantime::Duration,
}

impl LockConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.attempts, *self.retry_interval)
    }
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/analytics.json")
}

fn default_lock_path() -> PathBuf {
    PathBuf::from("data/analytics.lock")
}

fn default_lock_attempts() -> usize {
    RetryPolicy::default().max_attempts
}

fn default_lock_retry_interval() -> humantime::Duration {
    RetryPolicy::default().interval.into()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use secrecy::ExposeSecret as _;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_to_optional_settings() {
        let config = Config::from_vars(vars(&[
            ("HOST_ADDRESS", "127.0.0.1:3000"),
            ("INTERNAL_API_KEY", "hunter2"),
        ]))
        .unwrap();

        assert_eq!(config.host, "127.0.0.1:3000".parse().unwrap());
        assert_eq!(config.api_key.expose_secret(), "hunter2");
        assert_eq!(config.public_dir, PathBuf::from("public"));
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.store.path, PathBuf::from("data/analytics.json"));
        assert_eq!(config.store.lock.path, PathBuf::from("data/analytics.lock"));
        assert_eq!(config.store.lock.policy(), RetryPolicy::default());
    }

    #[test]
    fn lock_policy_is_configurable() {
        let config = Config::from_vars(vars(&[
            ("HOST_ADDRESS", "0.0.0.0:8080"),
            ("INTERNAL_API_KEY", "hunter2"),
            ("ANALYTICS_FILE", "/var/lib/viewtally/views.json"),
            ("LOCK_ATTEMPTS", "25"),
            ("LOCK_RETRY_INTERVAL", "250ms"),
        ]))
        .unwrap();

        assert_eq!(config.store.path, PathBuf::from("/var/lib/viewtally/views.json"));
        assert_eq!(
            config.store.lock.policy(),
            RetryPolicy::new(25, Duration::from_millis(250))
        );
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let error = Config::from_vars(vars(&[("HOST_ADDRESS", "127.0.0.1:3000")])).unwrap_err();
        assert!(matches!(error, ApplicationError::ConfigLoad { .. }));
    }
}
