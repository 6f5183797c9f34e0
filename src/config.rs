//! Configuration for discovery runs

use crate::credentials::Scheme;
use crate::protocols::ManagementProtocol;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for discovery runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Per-protocol probe timeout in milliseconds
    pub probe_timeout: u64,

    /// Worker pool size (one in-flight host per worker)
    pub concurrency: usize,

    /// Protocols to probe; defaults to the full set
    pub protocols: Vec<ManagementProtocol>,

    /// Scheme used when a candidate does not dictate one
    pub scheme: Scheme,

    /// SSH service port
    pub ssh_port: u16,

    /// IPMI RMCP port
    pub ipmi_port: u16,

    /// Fetch manager firmware details when a manager listing is reachable
    pub fetch_manager_info: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            probe_timeout: 10_000,
            concurrency: default_concurrency(),
            protocols: ManagementProtocol::all().to_vec(),
            scheme: Scheme::Https,
            ssh_port: 22,
            ipmi_port: 623,
            fetch_manager_info: true,
        }
    }
}

/// Worker pool default: bounded so a laptop doesn't open hundreds of
/// sockets toward a management VLAN, scaled down on small machines.
fn default_concurrency() -> usize {
    (num_cpus::get() * 4).clamp(16, 32)
}

impl DiscoveryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probe_timeout(mut self, millis: u64) -> Self {
        self.probe_timeout = millis;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_protocols(mut self, protocols: Vec<ManagementProtocol>) -> Self {
        self.protocols = protocols;
        self
    }

    /// Get the probe timeout as a Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.probe_timeout)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| crate::DiscoveryError::ConfigError(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration from `~/.phalanx.toml`, falling back to defaults
    pub fn load_default_config() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let config_path = home_dir.join(".phalanx.toml");

        if config_path.exists() {
            if let Ok(config) = Self::from_toml_file(&config_path) {
                log::info!("Loaded config from {}", config_path.display());
                return config;
            }
            log::warn!("Ignoring unparseable config at {}", config_path.display());
        }

        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.probe_timeout == 0 {
            return Err(crate::DiscoveryError::ConfigError(
                "Probe timeout must be greater than 0".to_string(),
            ));
        }

        if self.concurrency == 0 {
            return Err(crate::DiscoveryError::ConfigError(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        if self.protocols.is_empty() {
            return Err(crate::DiscoveryError::ConfigError(
                "At least one protocol must be enabled".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = DiscoveryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.protocols.len(), 5);
        assert!(config.concurrency >= 16 && config.concurrency <= 32);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        assert!(DiscoveryConfig::default().with_probe_timeout(0).validate().is_err());
        assert!(DiscoveryConfig::default().with_concurrency(0).validate().is_err());
        assert!(DiscoveryConfig::default().with_protocols(vec![]).validate().is_err());
    }

    #[test]
    fn test_timeout_duration() {
        let config = DiscoveryConfig::default().with_probe_timeout(2500);
        assert_eq!(config.timeout_duration(), Duration::from_millis(2500));
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
probe_timeout = 4000
concurrency = 8
protocols = ["redfish", "ssh"]
scheme = "https"
ssh_port = 2222
ipmi_port = 623
fetch_manager_info = false
"#
        )
        .unwrap();

        let config = DiscoveryConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.probe_timeout, 4000);
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.protocols, vec![ManagementProtocol::Redfish, ManagementProtocol::Ssh]);
        assert_eq!(config.ssh_port, 2222);
        assert!(!config.fetch_manager_info);
    }
}
