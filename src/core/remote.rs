//! Pull and push the tier pricing configuration through the gateway's
//! option settings API.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::core::config::RemoteConfig;
use crate::core::models::tier::TokenTierPricingConfig;

const OPTION_PATH: &str = "/api/option/";

pub const GLOBAL_ENABLED_KEY: &str = "token_tier_pricing.global_enabled";
pub const MODEL_CONFIGS_KEY: &str = "token_tier_pricing.model_configs";

#[derive(Debug, Clone, Deserialize)]
pub struct OptionEntry {
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Deserialize)]
struct OptionsResponse {
    success: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Vec<OptionEntry>,
}

#[derive(Deserialize)]
struct ApiAck {
    success: bool,
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
struct OptionUpdate<'a> {
    key: &'a str,
    value: String,
}

/// Validate that a settings endpoint uses HTTPS. Plain HTTP is accepted only
/// for loopback hosts.
pub fn validate_endpoint(url: &str) -> Result<()> {
    let parsed = reqwest::Url::parse(url).with_context(|| format!("invalid URL: {}", url))?;
    match parsed.scheme() {
        "https" => Ok(()),
        "http" => {
            let host = parsed.host_str().unwrap_or_default();
            if matches!(host, "localhost" | "127.0.0.1" | "[::1]" | "::1") {
                Ok(())
            } else {
                anyhow::bail!("endpoint must use HTTPS, got: {}", url)
            }
        }
        _ => anyhow::bail!("endpoint must use HTTPS, got: {}", url),
    }
}

fn parse_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Build a snapshot from the option entries returned by the settings API.
/// `model_configs` arrives as a JSON-encoded string; an empty value means no
/// configs.
pub fn config_from_options(entries: &[OptionEntry]) -> Result<TokenTierPricingConfig> {
    let mut config = TokenTierPricingConfig::default();
    for entry in entries {
        match entry.key.as_str() {
            GLOBAL_ENABLED_KEY => config.global_enabled = parse_bool(&entry.value),
            MODEL_CONFIGS_KEY => {
                config.model_configs = match &entry.value {
                    Value::String(s) if s.trim().is_empty() => Default::default(),
                    Value::String(s) => {
                        serde_json::from_str(s).context("Failed to parse model_configs option")?
                    }
                    Value::Null => Default::default(),
                    other => serde_json::from_value(other.clone())
                        .context("Failed to parse model_configs option")?,
                };
            }
            _ => {}
        }
    }
    Ok(config)
}

/// Client for the gateway's option settings endpoint.
pub struct SettingsClient {
    base_url: String,
    token: Option<String>,
    user_id: Option<u64>,
    http: reqwest::Client,
}

impl SettingsClient {
    pub fn new(base_url: &str, token: Option<String>, user_id: Option<u64>) -> Result<Self> {
        validate_endpoint(base_url)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            user_id,
            http: reqwest::Client::new(),
        })
    }

    /// Build a client from `[remote]`, reading the token from its env var.
    pub fn from_config(remote: &RemoteConfig) -> Result<Self> {
        let base_url = remote
            .base_url
            .as_deref()
            .context("remote.base_url is not set in the config file")?;
        let token = std::env::var(&remote.token_env).ok().filter(|t| !t.is_empty());
        if token.is_none() {
            debug!(env = %remote.token_env, "no access token in environment");
        }
        Self::new(base_url, token, remote.user_id)
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url, OPTION_PATH)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut request = request.header("Accept", "application/json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        if let Some(user_id) = self.user_id {
            request = request.header("New-Api-User", user_id.to_string());
        }
        request
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            anyhow::bail!("Unauthorized - check the access token");
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("HTTP {} from settings endpoint: {}", status.as_u16(), body);
        }
        Ok(response)
    }

    /// Fetch the current configuration.
    pub async fn pull(&self) -> Result<TokenTierPricingConfig> {
        debug!(url = %self.url(), "fetching options");
        let response = self
            .authorize(self.http.get(self.url()))
            .send()
            .await
            .context("Failed to send request to settings endpoint")?;
        let body: OptionsResponse = Self::check_status(response)
            .await?
            .json()
            .await
            .context("Failed to parse settings response")?;
        if !body.success {
            anyhow::bail!("Settings endpoint refused request: {}", body.message);
        }
        let config = config_from_options(&body.data)?;
        info!(configs = config.model_configs.len(), "pulled tier pricing config");
        Ok(config)
    }

    async fn put_option(&self, key: &str, value: String) -> Result<()> {
        let response = self
            .authorize(self.http.put(self.url()))
            .json(&OptionUpdate { key, value })
            .send()
            .await
            .with_context(|| format!("Failed to send update for {}", key))?;
        let ack: ApiAck = Self::check_status(response)
            .await?
            .json()
            .await
            .context("Failed to parse settings response")?;
        if !ack.success {
            anyhow::bail!("Failed to save {}: {}", key, ack.message);
        }
        Ok(())
    }

    /// Replace the remote configuration with `config`.
    pub async fn push(&self, config: &TokenTierPricingConfig) -> Result<()> {
        let model_configs = serde_json::to_string(&config.model_configs)
            .context("Failed to serialize model_configs")?;
        self.put_option(GLOBAL_ENABLED_KEY, config.global_enabled.to_string())
            .await?;
        self.put_option(MODEL_CONFIGS_KEY, model_configs).await?;
        info!(configs = config.model_configs.len(), "pushed tier pricing config");
        Ok(())
    }
}
