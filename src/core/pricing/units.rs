use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Quota units per unit of currency when none is configured.
pub const DEFAULT_QUOTA_PER_UNIT: u64 = 500_000;

const TOKENS_PER_MILLION: f64 = 1_000_000.0;

/// Token count prices are displayed per.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenUnit {
    #[serde(alias = "k")]
    K,
    #[default]
    #[serde(alias = "m")]
    M,
}

impl TokenUnit {
    /// Divisor applied to a per-1M price to get a per-unit price.
    pub fn price_divisor(&self) -> f64 {
        match self {
            Self::K => 1000.0,
            Self::M => 1.0,
        }
    }

    /// Number of tokens in one unit.
    pub fn tokens(&self) -> u64 {
        match self {
            Self::K => 1_000,
            Self::M => 1_000_000,
        }
    }

    /// "1K" or "1M".
    pub fn label(&self) -> &'static str {
        match self {
            Self::K => "1K",
            Self::M => "1M",
        }
    }
}

impl fmt::Display for TokenUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::K => write!(f, "K"),
            Self::M => write!(f, "M"),
        }
    }
}

impl FromStr for TokenUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "K" | "k" => Ok(Self::K),
            "M" | "m" => Ok(Self::M),
            other => Err(format!("invalid token unit '{}' (must be K or M)", other)),
        }
    }
}

/// Conversion basis between ratios, USD prices and quota units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceBasis {
    quota_per_unit: u64,
}

impl Default for PriceBasis {
    fn default() -> Self {
        Self {
            quota_per_unit: DEFAULT_QUOTA_PER_UNIT,
        }
    }
}

impl PriceBasis {
    /// A `quota_per_unit` of 0 means unset and selects the default.
    pub fn new(quota_per_unit: u64) -> Self {
        if quota_per_unit == 0 {
            return Self::default();
        }
        Self { quota_per_unit }
    }

    pub fn quota_per_unit(&self) -> u64 {
        self.quota_per_unit
    }

    /// USD per 1M tokens at ratio 1.0.
    pub fn ratio_base_price(&self) -> f64 {
        TOKENS_PER_MILLION / self.quota_per_unit as f64
    }

    /// USD per 1M tokens for `ratio`.
    pub fn price_from_ratio(&self, ratio: f64) -> f64 {
        ratio * self.ratio_base_price()
    }

    /// Ratio equivalent to `price` (USD per 1M tokens).
    pub fn ratio_from_price(&self, price: f64) -> f64 {
        checked_ratio(price, self.ratio_base_price())
    }
}

/// Completion ratio implied by a pair of prices; 0 when `input_price` is 0.
pub fn output_ratio_from_prices(input_price: f64, output_price: f64) -> f64 {
    checked_ratio(output_price, input_price)
}

fn checked_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }
    let value = numerator / denominator;
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
