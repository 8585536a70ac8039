//! CLI configuration: an optional TOML file overlaid with `VITALS_*`
//! environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use vitals_sdk::{BundleDescriptor, Priority, SessionConfig};

/// A bundle backed by a file on disk.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BundleConfig {
    pub name: String,
    pub priority: Priority,
    pub path: PathBuf,
}

impl BundleConfig {
    /// Loading the bundle reads the file; the module is its bytes.
    pub fn descriptor(&self) -> BundleDescriptor {
        let path = self.path.clone();
        BundleDescriptor::new(self.name.clone(), self.priority, move || {
            tokio::fs::read(path.clone())
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub session: SessionConfig,
    pub bundles: Vec<BundleConfig>,
}

impl CliConfig {
    /// Load from an optional file, then apply environment overrides
    /// such as `VITALS_SESSION__BATCHER__BATCH_SIZE=10`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix("VITALS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }
}
