//! Config - VPC settings loaded from a JSON file
//!
//! ```json
//! {
//!   "name": "main",
//!   "region": "us-east-1",
//!   "cidrBlock": "10.0.0.0/16",
//!   "azCount": 2,
//!   "publicSubnets": 2,
//!   "privateSubnets": 2,
//!   "natPerPrivateSubnet": false,
//!   "tags": { "env": "dev" }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cidr::{CidrLayout, Ipv4Cidr};
use crate::topology::TopologyRequest;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

fn default_region() -> String {
    VpcConfig::DEFAULT_REGION.to_string()
}

/// Settings for one VPC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcConfig {
    /// VPC name, also the prefix of every resource name
    pub name: String,
    #[serde(default = "default_region")]
    pub region: String,
    pub cidr_block: String,
    pub az_count: usize,
    pub public_subnets: usize,
    pub private_subnets: usize,
    #[serde(default)]
    pub nat_per_private_subnet: bool,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub layout: CidrLayout,
}

impl VpcConfig {
    pub const DEFAULT_FILE: &'static str = "meridian.json";
    pub const DEFAULT_REGION: &'static str = "us-east-1";
    /// Environment variable overriding `region`
    pub const REGION_ENV: &'static str = "MERIDIAN_REGION";

    /// Load from a file, applying environment overrides
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_json(&content)?;
        config.override_region(std::env::var(Self::REGION_ENV).ok());
        log::debug!("Loaded config for VPC '{}' from {}", config.name, path.display());
        Ok(config)
    }

    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn override_region(&mut self, region: Option<String>) {
        if let Some(region) = region.filter(|r| !r.is_empty()) {
            log::debug!("Region overridden to {} by {}", region, Self::REGION_ENV);
            self.region = region;
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("name must not be empty".to_string()));
        }
        if self.region.trim().is_empty() {
            return Err(ConfigError::Invalid("region must not be empty".to_string()));
        }
        Ipv4Cidr::parse(&self.cidr_block).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }

    /// Build the planner request described by this config
    pub fn to_request(&self) -> TopologyRequest {
        TopologyRequest {
            cidr_block: self.cidr_block.clone(),
            az_count: self.az_count,
            public_subnet_count: self.public_subnets,
            private_subnet_count: self.private_subnets,
            nat_per_private_subnet: self.nat_per_private_subnet,
            tags: self.tags.clone(),
            layout: self.layout,
        }
    }
}
