//! Service configuration
//!
//! Read from `~/.config/compute/config.yaml` (or an explicit path). Every section
//! and field is optional; missing values fall back to the built-in defaults.
//!
//! ```yaml
//! database:
//!   path: /data/compute.db
//! limits:
//!   containers_per_user: 3
//! timeouts:
//!   provision: 2m
//!   poll_interval: 5s
//! cluster:
//!   storage_class: local-path
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Default container image
pub const DEFAULT_IMAGE: &str = "eddisonso/edd-compute-base:latest";
pub const DEFAULT_MEMORY_MB: u32 = 512;
pub const DEFAULT_STORAGE_GB: u32 = 5;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeConfig {
    pub database: DatabaseConfig,
    pub defaults: Defaults,
    pub limits: Limits,
    pub timeouts: Timeouts,
    pub cluster: ClusterConfig,
}

impl ComputeConfig {
    /// Load from the default location, or defaults if no file exists
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get default configuration path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| CoreError::InvalidConfig {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("compute").join("config.yaml"))
    }

    /// Reject values that would make the service unusable
    pub fn validate(&self) -> Result<()> {
        if self.defaults.image.trim().is_empty() {
            return Err(CoreError::InvalidConfig {
                message: "defaults.image must not be empty".to_string(),
            });
        }
        if self.defaults.memory_mb == 0 || self.defaults.storage_gb == 0 {
            return Err(CoreError::InvalidConfig {
                message: "defaults.memory_mb and defaults.storage_gb must be positive".to_string(),
            });
        }
        if self.timeouts.poll_interval.is_zero() {
            return Err(CoreError::InvalidConfig {
                message: "timeouts.poll_interval must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/data/compute.db"),
        }
    }
}

/// Values applied to new containers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub image: String,
    pub memory_mb: u32,
    pub storage_gb: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            memory_mb: DEFAULT_MEMORY_MB,
            storage_gb: DEFAULT_STORAGE_GB,
        }
    }
}

/// Per-user caps, checked against a live count at creation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub containers_per_user: usize,
    pub ssh_keys_per_user: usize,
    pub api_keys_per_user: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            containers_per_user: 3,
            ssh_keys_per_user: 10,
            api_keys_per_user: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Deadline for the whole provisioning sequence
    #[serde(with = "humantime_serde")]
    pub provision: Duration,

    /// Deadline for stop, start and delete
    #[serde(with = "humantime_serde")]
    pub operation: Duration,

    /// Deadline for the live queries made on read
    #[serde(with = "humantime_serde")]
    pub reconcile: Duration,

    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    #[serde(with = "humantime_serde")]
    pub poll_deadline: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            provision: Duration::from_secs(120),
            operation: Duration::from_secs(30),
            reconcile: Duration::from_secs(10),
            poll_interval: Duration::from_secs(5),
            poll_deadline: Duration::from_secs(300),
        }
    }
}

/// Cluster-side settings baked into the generated resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub storage_class: String,
    /// Egress to this range is blocked
    pub private_cidr: String,
    /// Where the volume claim is mounted inside the container
    pub home_mount_path: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            storage_class: "local-path".to_string(),
            private_cidr: "10.0.0.0/8".to_string(),
            home_mount_path: "/home/dev".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ComputeConfig::default();
        assert_eq!(config.limits.containers_per_user, 3);
        assert_eq!(config.limits.ssh_keys_per_user, 10);
        assert_eq!(config.limits.api_keys_per_user, 5);
        assert_eq!(config.defaults.memory_mb, 512);
        assert_eq!(config.defaults.storage_gb, 5);
        assert_eq!(config.timeouts.provision, Duration::from_secs(120));
        assert_eq!(config.timeouts.poll_deadline, Duration::from_secs(300));
        assert_eq!(config.cluster.private_cidr, "10.0.0.0/8");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
limits:
  containers_per_user: 7
timeouts:
  poll_interval: 2s
  provision: 3m
"#;
        let config: ComputeConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.limits.containers_per_user, 7);
        assert_eq!(config.limits.ssh_keys_per_user, 10);
        assert_eq!(config.timeouts.poll_interval, Duration::from_secs(2));
        assert_eq!(config.timeouts.provision, Duration::from_secs(180));
        assert_eq!(config.timeouts.operation, Duration::from_secs(30));
        assert_eq!(config.defaults.image, DEFAULT_IMAGE);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database:\n  path: /tmp/x.db\ncluster:\n  storage_class: ssd").unwrap();

        let config = ComputeConfig::load_from(file.path()).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.cluster.storage_class, "ssd");
        assert_eq!(config.cluster.home_mount_path, "/home/dev");
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "defaults:\n  image: \"\"").unwrap();

        let result = ComputeConfig::load_from(file.path());
        assert!(matches!(result, Err(CoreError::InvalidConfig { .. })));
    }

    #[test]
    fn test_load_rejects_malformed_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "limits: [1, 2").unwrap();

        let result = ComputeConfig::load_from(file.path());
        assert!(matches!(result, Err(CoreError::YamlParse(_))));
    }
}
