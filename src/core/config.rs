use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::models::model::{GroupRatioTable, ModelPriceRecord, QuotaType};
use crate::core::pricing::units::{PriceBasis, TokenUnit, DEFAULT_QUOTA_PER_UNIT};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_format")]
    pub default_format: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub token_unit: TokenUnit,
    #[serde(default = "default_quota_per_unit")]
    pub quota_per_unit: u64,
}

fn default_format() -> String {
    "text".to_string()
}
fn default_color() -> String {
    "auto".to_string()
}
fn default_quota_per_unit() -> u64 {
    DEFAULT_QUOTA_PER_UNIT
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_format: default_format(),
            color: default_color(),
            token_unit: TokenUnit::default(),
            quota_per_unit: default_quota_per_unit(),
        }
    }
}

/// Where the tier pricing snapshot lives on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingSource {
    /// Defaults to `pricing.json` next to the config file; relative paths are
    /// resolved against the config file's directory.
    pub file: Option<PathBuf>,
}

/// Settings API the snapshot is pulled from and pushed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: Option<String>,
    /// Environment variable holding the access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Sent as `New-Api-User` when set.
    pub user_id: Option<u64>,
}

fn default_token_env() -> String {
    "TIERPRICE_ACCESS_TOKEN".to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token_env: default_token_env(),
            user_id: None,
        }
    }
}

fn default_group_ratios() -> GroupRatioTable {
    GroupRatioTable::from([("default".to_string(), 1.0)])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub pricing: PricingSource,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default = "default_group_ratios")]
    pub group_ratios: GroupRatioTable,
    #[serde(default)]
    pub models: Vec<ModelPriceRecord>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            pricing: PricingSource::default(),
            remote: RemoteConfig::default(),
            group_ratios: default_group_ratios(),
            models: vec![
                ModelPriceRecord {
                    model_name: "gpt-4o".into(),
                    quota_type: QuotaType::Metered,
                    model_ratio: 1.25,
                    completion_ratio: 4.0,
                    model_price: 0.0,
                    enable_groups: vec!["default".into()],
                },
                ModelPriceRecord {
                    model_name: "gpt-4o-mini".into(),
                    quota_type: QuotaType::Metered,
                    model_ratio: 0.075,
                    completion_ratio: 4.0,
                    model_price: 0.0,
                    enable_groups: vec!["default".into()],
                },
            ],
        }
    }
}

impl AppConfig {
    /// Directory holding the config file, respecting XDG_CONFIG_HOME
    pub fn config_dir() -> PathBuf {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("~"))
                    .join(".config")
            });
        config_dir.join("tierprice")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Path of the tier pricing snapshot file for a config loaded from
    /// `config_path`. The default and any relative `pricing.file` live in
    /// the config file's directory.
    pub fn pricing_path(&self, config_path: &Path) -> PathBuf {
        let base = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_dir);
        match &self.pricing.file {
            Some(file) => base.join(file),
            None => base.join("pricing.json"),
        }
    }

    pub fn basis(&self) -> PriceBasis {
        PriceBasis::new(self.settings.quota_per_unit)
    }

    pub fn find_model(&self, model_name: &str) -> Option<&ModelPriceRecord> {
        self.models.iter().find(|m| m.model_name == model_name)
    }

    /// Load config from the default path, falling back to defaults if not found
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Serialize and write this config to the config file path.
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path();
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the config
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if !["text", "json"].contains(&self.settings.default_format.as_str()) {
            issues.push(format!(
                "Invalid default_format: '{}' (must be 'text' or 'json')",
                self.settings.default_format
            ));
        }
        if !["auto", "always", "never"].contains(&self.settings.color.as_str()) {
            issues.push(format!(
                "Invalid color: '{}' (must be 'auto', 'always', or 'never')",
                self.settings.color
            ));
        }
        if self.settings.quota_per_unit == 0 {
            issues.push(format!(
                "quota_per_unit must be positive (0 falls back to {})",
                DEFAULT_QUOTA_PER_UNIT
            ));
        }
        for (group, ratio) in &self.group_ratios {
            if !ratio.is_finite() || *ratio < 0.0 {
                issues.push(format!("Group '{}': invalid ratio {}", group, ratio));
            }
        }

        let mut seen = HashSet::new();
        for model in &self.models {
            if model.model_name.trim().is_empty() {
                issues.push("Model with an empty model_name".to_string());
                continue;
            }
            if !seen.insert(model.model_name.as_str()) {
                issues.push(format!("Duplicate model: '{}'", model.model_name));
            }
            let numbers = [model.model_ratio, model.completion_ratio, model.model_price];
            if numbers.iter().any(|v| !v.is_finite() || *v < 0.0) {
                issues.push(format!(
                    "Model '{}': ratios and prices must be non-negative",
                    model.model_name
                ));
            }
            for group in &model.enable_groups {
                if !self.group_ratios.contains_key(group) && group != "auto" {
                    issues.push(format!(
                        "Model '{}': group '{}' has no ratio (billed at 1.0)",
                        model.model_name, group
                    ));
                }
            }
        }

        if let Some(url) = &self.remote.base_url {
            if let Err(e) = crate::core::remote::validate_endpoint(url) {
                issues.push(format!("Remote base_url: {}", e));
            }
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let config = AppConfig::default();
        let issues = config.validate();
        assert!(issues.is_empty(), "Default config should be valid, got: {:?}", issues);
    }

    #[test]
    fn default_format_is_text() {
        let settings = Settings::default();
        assert_eq!(settings.default_format, "text");
    }

    #[test]
    fn default_unit_and_basis() {
        let config = AppConfig::default();
        assert_eq!(config.settings.token_unit, TokenUnit::M);
        assert_eq!(config.basis().ratio_base_price(), 2.0);
    }

    #[test]
    fn validate_catches_invalid_color() {
        let mut config = AppConfig::default();
        config.settings.color = "blue".to_string();
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.contains("color")));
    }

    #[test]
    fn validate_catches_zero_quota_per_unit() {
        let mut config = AppConfig::default();
        config.settings.quota_per_unit = 0;
        assert!(config.validate().iter().any(|i| i.contains("quota_per_unit")));
        assert_eq!(config.basis(), PriceBasis::default());
    }

    #[test]
    fn validate_catches_bad_group_and_model() {
        let mut config = AppConfig::default();
        config.group_ratios.insert("vip".to_string(), -0.5);
        config.models.push(config.models[0].clone());
        config.models[1].enable_groups.push("svip".to_string());
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.contains("Group 'vip'")));
        assert!(issues.iter().any(|i| i.contains("Duplicate model")));
        assert!(issues.iter().any(|i| i.contains("'svip' has no ratio")));
    }

    #[test]
    fn validate_catches_plain_http_remote() {
        let mut config = AppConfig::default();
        config.remote.base_url = Some("http://billing.example.com".to_string());
        assert!(config.validate().iter().any(|i| i.contains("Remote")));
    }

    #[test]
    fn parse_minimal_toml() {
        let toml = r#"
[settings]
token_unit = "K"
quota_per_unit = 1000000

[group_ratios]
default = 1.0
vip = 0.8

[[models]]
model_name = "midjourney"
quota_type = 1
model_price = 0.1
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.settings.token_unit, TokenUnit::K);
        assert_eq!(config.settings.default_format, "text");
        assert_eq!(config.basis().ratio_base_price(), 1.0);
        assert_eq!(config.group_ratios["vip"], 0.8);
        assert_eq!(config.find_model("midjourney").unwrap().quota_type, QuotaType::PerCall);
    }

    #[test]
    fn parse_empty_toml_gives_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.settings.quota_per_unit, DEFAULT_QUOTA_PER_UNIT);
        assert_eq!(config.group_ratios["default"], 1.0);
        assert!(config.models.is_empty());
        assert_eq!(config.remote.token_env, "TIERPRICE_ACCESS_TOKEN");
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = AppConfig::default();
        config.settings.token_unit = TokenUnit::K;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.settings.token_unit, TokenUnit::K);
        assert_eq!(loaded.models.len(), 2);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.models.len(), 2);
    }

    #[test]
    fn explicit_pricing_file_is_used() {
        let mut config = AppConfig::default();
        config.pricing.file = Some(PathBuf::from("/srv/pricing.json"));
        assert_eq!(
            config.pricing_path(Path::new("/etc/tierprice/config.toml")),
            PathBuf::from("/srv/pricing.json")
        );
    }

    #[test]
    fn pricing_file_defaults_next_to_config() {
        let mut config = AppConfig::default();
        let config_path = Path::new("/srv/a/config.toml");
        assert_eq!(
            config.pricing_path(config_path),
            PathBuf::from("/srv/a/pricing.json")
        );

        config.pricing.file = Some(PathBuf::from("tiers/prod.json"));
        assert_eq!(
            config.pricing_path(config_path),
            PathBuf::from("/srv/a/tiers/prod.json")
        );
    }
}
