//! Whole-file persistence of the tier pricing configuration.

use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::core::models::tier::TokenTierPricingConfig;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to access pricing snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse pricing snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

impl TokenTierPricingConfig {
    pub fn from_json(content: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a snapshot; a missing file is a disabled, empty configuration.
    pub fn load_from(path: &Path) -> Result<Self, SnapshotError> {
        if !path.exists() {
            debug!(path = %path.display(), "no pricing snapshot, using empty config");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        debug!(
            path = %path.display(),
            configs = config.model_configs.len(),
            "loaded pricing snapshot"
        );
        Ok(config)
    }

    /// Overwrite the snapshot file with this configuration.
    pub fn save_to(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json_pretty()?)?;
        debug!(path = %path.display(), "saved pricing snapshot");
        Ok(())
    }
}
