use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Group name to price multiplier.
pub type GroupRatioTable = BTreeMap<String, f64>;

/// Multiplier for `group`; groups absent from the table pay the base price.
pub fn lookup_group_ratio(table: &GroupRatioTable, group: &str) -> f64 {
    table.get(group).copied().unwrap_or(1.0)
}

/// How a model is billed when no tier rule applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QuotaType {
    /// Charged by token (`quota_type = 0`).
    #[default]
    Metered,
    /// Fixed price per call (`quota_type = 1`).
    PerCall,
}

impl TryFrom<u8> for QuotaType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Metered),
            1 => Ok(Self::PerCall),
            other => Err(format!("unknown quota_type {} (expected 0 or 1)", other)),
        }
    }
}

impl From<QuotaType> for u8 {
    fn from(value: QuotaType) -> Self {
        match value {
            QuotaType::Metered => 0,
            QuotaType::PerCall => 1,
        }
    }
}

fn default_completion_ratio() -> f64 {
    1.0
}

/// Flat (non-tiered) pricing of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPriceRecord {
    pub model_name: String,
    #[serde(default)]
    pub quota_type: QuotaType,
    /// Input multiplier on the ratio base price (metered models).
    #[serde(default)]
    pub model_ratio: f64,
    /// Output-to-input multiplier (metered models).
    #[serde(default = "default_completion_ratio")]
    pub completion_ratio: f64,
    /// USD per call (per-call models).
    #[serde(default)]
    pub model_price: f64,
    #[serde(default)]
    pub enable_groups: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_group_falls_back_to_one() {
        let mut table = GroupRatioTable::new();
        table.insert("vip".to_string(), 0.8);
        assert_eq!(lookup_group_ratio(&table, "vip"), 0.8);
        assert_eq!(lookup_group_ratio(&table, "default"), 1.0);
    }

    #[test]
    fn explicit_zero_group_ratio_is_kept() {
        let mut table = GroupRatioTable::new();
        table.insert("free".to_string(), 0.0);
        assert_eq!(lookup_group_ratio(&table, "free"), 0.0);
    }

    #[test]
    fn quota_type_round_trips_as_integer() {
        let record: ModelPriceRecord =
            serde_json::from_str(r#"{"model_name": "mj", "quota_type": 1, "model_price": 0.1}"#)
                .unwrap();
        assert_eq!(record.quota_type, QuotaType::PerCall);
        assert_eq!(record.completion_ratio, 1.0);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["quota_type"], 1);
    }

    #[test]
    fn unknown_quota_type_is_rejected() {
        let err = serde_json::from_str::<ModelPriceRecord>(r#"{"model_name": "x", "quota_type": 7}"#)
            .unwrap_err();
        assert!(err.to_string().contains("quota_type"));
    }
}
