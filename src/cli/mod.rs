pub mod config_cmd;
pub mod convert_cmd;
pub mod output;
pub mod price_cmd;
pub mod renderer;
pub mod sync_cmd;
pub mod tier_cmd;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use tracing::debug;

use tierprice::core::config::AppConfig;
use tierprice::core::models::tier::TokenTierPricingConfig;

/// Loaded app config plus the paths commands read and write.
pub struct Context {
    pub app: AppConfig,
    pub config_path: PathBuf,
    pub pricing_path: PathBuf,
}

impl Context {
    /// Load the config file (defaults when absent). `--config` and
    /// `--pricing` override the default locations.
    pub fn load(config_override: Option<&Path>, pricing_override: Option<&Path>) -> Result<Self> {
        let config_path = Self::config_path(config_override);
        let app = AppConfig::load_from(&config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
        let pricing_path = Self::pricing_path(&app, &config_path, pricing_override);
        debug!(
            config = %config_path.display(),
            pricing = %pricing_path.display(),
            "resolved paths"
        );
        Ok(Self {
            app,
            config_path,
            pricing_path,
        })
    }

    pub fn config_path(config_override: Option<&Path>) -> PathBuf {
        config_override
            .map(Path::to_path_buf)
            .unwrap_or_else(AppConfig::config_path)
    }

    pub fn pricing_path(
        app: &AppConfig,
        config_path: &Path,
        pricing_override: Option<&Path>,
    ) -> PathBuf {
        pricing_override
            .map(Path::to_path_buf)
            .unwrap_or_else(|| app.pricing_path(config_path))
    }

    pub fn snapshot(&self) -> Result<TokenTierPricingConfig> {
        TokenTierPricingConfig::load_from(&self.pricing_path).with_context(|| {
            format!(
                "Failed to load tier pricing from {}",
                self.pricing_path.display()
            )
        })
    }

    pub fn save_snapshot(&self, snapshot: &TokenTierPricingConfig) -> Result<()> {
        snapshot.save_to(&self.pricing_path).with_context(|| {
            format!(
                "Failed to save tier pricing to {}",
                self.pricing_path.display()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pricing_snapshot_sits_next_to_custom_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "[settings]\ntoken_unit = \"K\"\n").unwrap();

        let ctx = Context::load(Some(&config_path), None).unwrap();
        assert_eq!(ctx.pricing_path, dir.path().join("pricing.json"));
        assert_eq!(ctx.config_path, config_path);
    }

    #[test]
    fn relative_pricing_file_resolves_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "[pricing]\nfile = \"snap.json\"\n").unwrap();

        let ctx = Context::load(Some(&config_path), None).unwrap();
        assert_eq!(ctx.pricing_path, dir.path().join("snap.json"));

        let explicit = dir.path().join("other.json");
        let ctx = Context::load(Some(&config_path), Some(&explicit)).unwrap();
        assert_eq!(ctx.pricing_path, explicit);
    }

    #[test]
    fn malformed_config_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "[settings\n").unwrap();

        assert!(Context::load(Some(&config_path), None).is_err());
    }
}
