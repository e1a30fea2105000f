use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("Wildcard '*' is only supported at the end of a model pattern, got: '{0}'")]
    MisplacedWildcard(String),
}

/// One entry of a tier config's `models` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelPattern {
    Exact(String),
    Prefix(String),
}

impl ModelPattern {
    /// Parse a single trimmed pattern. Only a trailing `*` is accepted.
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        let raw = raw.trim();
        match raw.find('*') {
            None => Ok(Self::Exact(raw.to_string())),
            Some(idx) if idx + 1 == raw.len() => Ok(Self::Prefix(raw[..idx].to_string())),
            Some(_) => Err(PatternError::MisplacedWildcard(raw.to_string())),
        }
    }

    pub fn matches(&self, model_name: &str) -> bool {
        match self {
            Self::Exact(name) => name == model_name,
            Self::Prefix(prefix) => model_name.starts_with(prefix.as_str()),
        }
    }
}

impl fmt::Display for ModelPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(name) => write!(f, "{}", name),
            Self::Prefix(prefix) => write!(f, "{}*", prefix),
        }
    }
}

/// Parsed form of the comma-separated `models` field.
///
/// Parsing happens once, when the config is deserialized; serializing writes
/// the comma-joined string back so the persisted shape is unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Option<String>", into = "String")]
pub struct ModelPatterns(Vec<ModelPattern>);

impl ModelPatterns {
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        raw.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(ModelPattern::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// True if any pattern admits `model_name`.
    pub fn matches(&self, model_name: &str) -> bool {
        self.0.iter().any(|p| p.matches(model_name))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelPattern> {
        self.0.iter()
    }
}

impl TryFrom<Option<String>> for ModelPatterns {
    type Error = PatternError;

    fn try_from(raw: Option<String>) -> Result<Self, Self::Error> {
        match raw {
            Some(raw) => Self::parse(&raw),
            None => Ok(Self::default()),
        }
    }
}

impl From<ModelPatterns> for String {
    fn from(patterns: ModelPatterns) -> Self {
        patterns.to_string()
    }
}

impl fmt::Display for ModelPatterns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", joined.join(","))
    }
}

/// Token-count window of a rule. A bound of 0 means "no bound" on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBounds {
    pub min_input: u64,
    pub max_input: u64,
    pub min_output: u64,
    pub max_output: u64,
}

impl TokenBounds {
    pub fn admits(&self, input_tokens: u64, output_tokens: u64) -> bool {
        range_admits(self.min_input, self.max_input, input_tokens)
            && range_admits(self.min_output, self.max_output, output_tokens)
    }

    pub fn is_unbounded(&self) -> bool {
        *self == Self::default()
    }
}

fn range_admits(min: u64, max: u64, tokens: u64) -> bool {
    if max > 0 {
        tokens <= max && (min == 0 || tokens >= min)
    } else if min > 0 {
        tokens >= min
    } else {
        true
    }
}

/// How a rule prices tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RulePricing {
    /// Multipliers on the ratio base price. `output_ratio`, when present,
    /// overrides `input_ratio * completion_ratio`.
    Ratio {
        input_ratio: f64,
        completion_ratio: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        output_ratio: Option<f64>,
    },
    /// USD per 1M tokens.
    Absolute { input_price: f64, output_price: f64 },
}

impl RulePricing {
    pub fn ratio(input_ratio: f64, completion_ratio: f64) -> Self {
        Self::Ratio {
            input_ratio,
            completion_ratio,
            output_ratio: None,
        }
    }

    /// Output multiplier for ratio rules; `None` for absolute rules.
    pub fn effective_output_ratio(&self) -> Option<f64> {
        match *self {
            Self::Ratio {
                input_ratio,
                completion_ratio,
                output_ratio,
            } => Some(output_ratio.unwrap_or(input_ratio * completion_ratio)),
            Self::Absolute { .. } => None,
        }
    }
}

/// One segment of a tiered pricing schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "TierRuleRecord", into = "TierRuleRecord")]
pub struct TierRule {
    pub name: String,
    pub bounds: TokenBounds,
    pub pricing: RulePricing,
}

impl TierRule {
    pub fn is_price_mode(&self) -> bool {
        matches!(self.pricing, RulePricing::Absolute { .. })
    }
}

fn default_completion_ratio() -> f64 {
    1.0
}

/// Flat JSON shape of a rule as stored by the settings API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TierRuleRecord {
    #[serde(default)]
    name: String,
    #[serde(default)]
    min_input_tokens: u64,
    #[serde(default)]
    max_input_tokens: u64,
    #[serde(default)]
    min_output_tokens: u64,
    #[serde(default)]
    max_output_tokens: u64,
    #[serde(default)]
    input_ratio: f64,
    #[serde(default = "default_completion_ratio")]
    completion_ratio: f64,
    #[serde(default)]
    input_price: f64,
    #[serde(default)]
    output_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output_ratio: Option<f64>,
}

impl TierRuleRecord {
    fn is_price_mode(&self) -> bool {
        self.input_price != 0.0 || self.output_price != 0.0
    }
}

impl From<TierRuleRecord> for TierRule {
    fn from(record: TierRuleRecord) -> Self {
        let pricing = if record.is_price_mode() {
            RulePricing::Absolute {
                input_price: record.input_price,
                output_price: record.output_price,
            }
        } else {
            RulePricing::Ratio {
                input_ratio: record.input_ratio,
                completion_ratio: record.completion_ratio,
                output_ratio: record.output_ratio,
            }
        };
        Self {
            name: record.name,
            bounds: TokenBounds {
                min_input: record.min_input_tokens,
                max_input: record.max_input_tokens,
                min_output: record.min_output_tokens,
                max_output: record.max_output_tokens,
            },
            pricing,
        }
    }
}

impl From<TierRule> for TierRuleRecord {
    fn from(rule: TierRule) -> Self {
        let mut record = Self {
            name: rule.name,
            min_input_tokens: rule.bounds.min_input,
            max_input_tokens: rule.bounds.max_input,
            min_output_tokens: rule.bounds.min_output,
            max_output_tokens: rule.bounds.max_output,
            completion_ratio: default_completion_ratio(),
            ..Self::default()
        };
        match rule.pricing {
            RulePricing::Ratio {
                input_ratio,
                completion_ratio,
                output_ratio,
            } => {
                record.input_ratio = input_ratio;
                record.completion_ratio = completion_ratio;
                record.output_ratio = output_ratio;
            }
            RulePricing::Absolute {
                input_price,
                output_price,
            } => {
                record.input_price = input_price;
                record.output_price = output_price;
            }
        }
        record
    }
}

/// A named rule-set applied to the models its patterns admit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelTierConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub models: ModelPatterns,
    /// Larger values are tried first.
    #[serde(default)]
    pub priority: i64,
    /// Matched in order; the first rule whose bounds admit the request wins.
    #[serde(default)]
    pub rules: Vec<TierRule>,
}

/// Whole tiered pricing configuration, as persisted by the settings API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenTierPricingConfig {
    #[serde(default)]
    pub global_enabled: bool,
    #[serde(default)]
    pub model_configs: BTreeMap<String, ModelTierConfig>,
}

/// The four-segment ratio template offered for new configs.
pub fn default_tier_rules() -> Vec<TierRule> {
    let rule = |name: &str, bounds: TokenBounds, input_ratio: f64, completion_ratio: f64| TierRule {
        name: name.to_string(),
        bounds,
        pricing: RulePricing::ratio(input_ratio, completion_ratio),
    };
    vec![
        rule(
            "T1_input_le_32k_output_le_200",
            TokenBounds {
                min_input: 0,
                max_input: 32_000,
                min_output: 0,
                max_output: 200,
            },
            0.4,
            1.0,
        ),
        rule(
            "T2_input_le_32k_output_gt_200",
            TokenBounds {
                min_input: 0,
                max_input: 32_000,
                min_output: 201,
                max_output: 0,
            },
            0.4,
            1.5,
        ),
        rule(
            "T3_input_32k_to_128k",
            TokenBounds {
                min_input: 32_001,
                max_input: 128_000,
                ..TokenBounds::default()
            },
            0.6,
            1.0,
        ),
        rule(
            "T4_input_gt_128k",
            TokenBounds {
                min_input: 128_001,
                ..TokenBounds::default()
            },
            1.2,
            1.0,
        ),
    ]
}
