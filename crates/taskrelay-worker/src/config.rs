//! Environment configuration for the worker process.
//!
//! The three connection settings are required and checked before anything
//! connects; every tunable has a default. AWS credentials are not read
//! here, the SDK's provider chain owns those.

use std::time::Duration;

use thiserror::Error;

use taskrelay_core::WorkerConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    InvalidVar { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub aws_region: String,
    pub queue_url: String,
    pub database_url: String,
    pub max_messages: u16,
    pub wait_time: Duration,
    pub visibility_timeout: Duration,
    pub max_receive_count: u32,
    pub error_backoff: Duration,
    pub shutdown_grace: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Lookup-injected so tests never touch process environment.
    fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| -> Result<String, ConfigError> {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::MissingVar(name))
        };
        let number = |name: &'static str, default: u64| -> Result<u64, ConfigError> {
            match lookup(name) {
                None => Ok(default),
                Some(value) => value
                    .parse()
                    .map_err(|_| ConfigError::InvalidVar { name, value }),
            }
        };

        Ok(Self {
            aws_region: required("AWS_REGION")?,
            queue_url: required("AWS_SQS_QUEUE_URL")?,
            database_url: required("DATABASE_URL")?,
            max_messages: number("WORKER_MAX_MESSAGES", 1)? as u16,
            wait_time: Duration::from_secs(number("WORKER_WAIT_SECONDS", 20)?),
            visibility_timeout: Duration::from_secs(number("WORKER_VISIBILITY_SECONDS", 30)?),
            max_receive_count: number("WORKER_MAX_RECEIVE_COUNT", 5)? as u32,
            error_backoff: Duration::from_secs(number("WORKER_ERROR_BACKOFF_SECONDS", 5)?),
            shutdown_grace: Duration::from_secs(number("WORKER_SHUTDOWN_GRACE_SECONDS", 30)?),
        })
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            max_messages: self.max_messages,
            wait_time: self.wait_time,
            visibility_timeout: self.visibility_timeout,
            max_receive_count: self.max_receive_count,
            error_backoff: self.error_backoff,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&'static str, &str)]) -> HashMap<&'static str, String> {
        pairs
            .iter()
            .map(|(name, value)| (*name, value.to_string()))
            .collect()
    }

    fn full_env() -> HashMap<&'static str, String> {
        env(&[
            ("AWS_REGION", "us-east-1"),
            ("AWS_SQS_QUEUE_URL", "https://sqs.us-east-1.amazonaws.com/1/tasks"),
            ("DATABASE_URL", "postgres://worker@localhost:5432/tasks"),
        ])
    }

    #[test]
    fn all_required_present_uses_defaults_for_the_rest() {
        let vars = full_env();
        let config = Config::from_lookup(|name| vars.get(name).cloned()).unwrap();

        assert_eq!(config.aws_region, "us-east-1");
        assert_eq!(config.max_messages, 1);
        assert_eq!(config.wait_time, Duration::from_secs(20));
        assert_eq!(config.max_receive_count, 5);
        assert_eq!(config.shutdown_grace, Duration::from_secs(30));
    }

    #[test]
    fn missing_required_variable_is_named_in_the_error() {
        let mut vars = full_env();
        vars.remove("DATABASE_URL");

        let err = Config::from_lookup(|name| vars.get(name).cloned()).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn empty_required_variable_counts_as_missing() {
        let mut vars = full_env();
        vars.insert("AWS_SQS_QUEUE_URL", String::new());

        let err = Config::from_lookup(|name| vars.get(name).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar("AWS_SQS_QUEUE_URL")));
    }

    #[test]
    fn overridden_tunables_are_parsed() {
        let mut vars = full_env();
        vars.insert("WORKER_MAX_RECEIVE_COUNT", "2".into());
        vars.insert("WORKER_WAIT_SECONDS", "5".into());

        let config = Config::from_lookup(|name| vars.get(name).cloned()).unwrap();
        assert_eq!(config.max_receive_count, 2);
        assert_eq!(config.worker_config().wait_time, Duration::from_secs(5));
    }

    #[test]
    fn garbage_tunable_is_rejected() {
        let mut vars = full_env();
        vars.insert("WORKER_WAIT_SECONDS", "twenty".into());

        let err = Config::from_lookup(|name| vars.get(name).cloned()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidVar {
                name: "WORKER_WAIT_SECONDS",
                ..
            }
        ));
    }
}
