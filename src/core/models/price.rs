use serde::Serialize;

use crate::core::formatter::format_price;
use crate::core::models::tier::RulePricing;

/// Token counts of one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenCounts {
    pub input: u64,
    pub output: u64,
}

impl TokenCounts {
    pub fn new(input: u64, output: u64) -> Self {
        Self { input, output }
    }

    pub fn is_empty(&self) -> bool {
        self.input == 0 && self.output == 0
    }
}

/// Input/output price in USD per display unit (1K or 1M tokens).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TierPrice {
    pub input: f64,
    pub output: f64,
}

impl TierPrice {
    pub fn formatted(&self) -> FormattedTierPrice {
        FormattedTierPrice {
            input_price: format_price(self.input),
            output_price: format_price(self.output),
        }
    }
}

/// Display strings such as `$0.8000`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattedTierPrice {
    pub input_price: String,
    pub output_price: String,
}

/// The tier rule that applies to a model and request size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierPriceResult {
    pub config_name: String,
    pub rule_name: String,
    pub pricing: RulePricing,
}

/// Price a model is displayed or billed at for one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EffectivePrice {
    Tiered {
        config: String,
        rule: String,
        input: f64,
        output: f64,
    },
    Metered {
        input: f64,
        output: f64,
    },
    PerCall {
        price: f64,
    },
}

/// One row of a model's per-group price table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupPriceRow {
    pub group: String,
    pub ratio: f64,
    pub price: EffectivePrice,
}
