//! Server configuration
//!
//! Defines all configurable parameters for the service including the bind
//! address, the container runtime binary, the builder command line and the
//! cancellation grace period.

use std::time::Duration;

/// Server configuration
///
/// Everything is overridable from the environment to allow tuning for
/// different deployment scenarios (dev vs prod, wrapped builder binaries).
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP API binds to
    pub bind_addr: String,

    /// Container runtime binary used for inventory queries
    pub docker_bin: String,

    /// Builder program plus leading arguments
    pub builder_cmd: Vec<String>,

    /// How long a cancelled build may linger after SIGTERM before SIGKILL
    pub kill_grace: Duration,

    /// Maximum log lines retained per build record
    pub log_cap: usize,

    /// Memory ceiling applied when a build request does not set one
    pub default_memory: Option<String>,

    /// CPU ceiling applied when a build request does not set one
    pub default_cpu: Option<String>,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Recognized environment variables:
    /// - KILN_BIND_ADDR (default: 0.0.0.0:6789)
    /// - KILN_DOCKER_BIN (default: docker)
    /// - KILN_BUILDER_CMD (whitespace-separated, default: jupyter-repo2docker)
    /// - KILN_KILL_GRACE_SECS (default: 10)
    /// - KILN_LOG_CAP (default: 10000)
    /// - KILN_DEFAULT_MEMORY (unset by default)
    /// - KILN_DEFAULT_CPU (unset by default)
    pub fn from_env() -> Self {
        let builder_cmd = std::env::var("KILN_BUILDER_CMD")
            .unwrap_or_else(|_| "jupyter-repo2docker".to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect();

        Self {
            bind_addr: std::env::var("KILN_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:6789".to_string()),
            docker_bin: std::env::var("KILN_DOCKER_BIN").unwrap_or_else(|_| "docker".to_string()),
            builder_cmd,
            kill_grace: std::env::var("KILN_KILL_GRACE_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(10)),
            log_cap: std::env::var("KILN_LOG_CAP")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(10_000),
            default_memory: std::env::var("KILN_DEFAULT_MEMORY").ok(),
            default_cpu: std::env::var("KILN_DEFAULT_CPU").ok(),
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if self.docker_bin.is_empty() {
            anyhow::bail!("docker_bin cannot be empty");
        }

        if self.builder_cmd.is_empty() {
            anyhow::bail!("builder_cmd cannot be empty");
        }

        if self.kill_grace.is_zero() {
            anyhow::bail!("kill_grace must be greater than 0");
        }

        if self.log_cap == 0 {
            anyhow::bail!("log_cap must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:6789".to_string(),
            docker_bin: "docker".to_string(),
            builder_cmd: vec!["jupyter-repo2docker".to_string()],
            kill_grace: Duration::from_secs(10),
            log_cap: 10_000,
            default_memory: None,
            default_cpu: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bind_addr, "0.0.0.0:6789");
        assert_eq!(config.kill_grace, Duration::from_secs(10));
        assert_eq!(config.log_cap, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.builder_cmd = Vec::new();
        assert!(config.validate().is_err());

        config.builder_cmd = vec!["jupyter-repo2docker".to_string()];
        config.log_cap = 0;
        assert!(config.validate().is_err());

        config.log_cap = 100;
        config.kill_grace = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
