//! Edits to a tier pricing snapshot.
//!
//! Every operation leaves the receiver untouched and returns the edited
//! snapshot, which the caller persists wholesale.

use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

use crate::core::models::tier::{
    default_tier_rules, ModelPatterns, ModelTierConfig, PatternError, RulePricing, TierRule,
    TokenBounds, TokenTierPricingConfig,
};
use crate::core::pricing::units::{output_ratio_from_prices, PriceBasis};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditError {
    #[error("Config name must not be empty")]
    EmptyConfigName,
    #[error("Config '{0}' already exists")]
    DuplicateConfig(String),
    #[error("Config '{0}' not found")]
    UnknownConfig(String),
    #[error("Rule name must not be empty")]
    EmptyRuleName,
    #[error("Rule '{rule}' already exists in config '{config}'")]
    DuplicateRule { config: String, rule: String },
    #[error("Rule '{rule}' not found in config '{config}'")]
    UnknownRule { config: String, rule: String },
    #[error("Minimum {side} tokens ({min}) cannot exceed maximum ({max})")]
    InvertedBounds {
        side: &'static str,
        min: u64,
        max: u64,
    },
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// Which way to move a rule within its list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

/// Pricing as entered for a rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DraftPricing {
    /// `output_ratio`, when set, overrides `input_ratio * completion_ratio`.
    Ratio {
        input_ratio: f64,
        completion_ratio: f64,
        output_ratio: Option<f64>,
    },
    /// USD per 1M tokens. With `store_as_ratio` the prices are converted to
    /// an equivalent ratio rule before saving.
    Price {
        input_price: f64,
        output_price: f64,
        store_as_ratio: bool,
    },
}

/// A rule being created or replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDraft {
    pub name: String,
    pub bounds: TokenBounds,
    pub pricing: DraftPricing,
}

impl RuleDraft {
    fn check_bounds(&self) -> Result<(), EditError> {
        let b = &self.bounds;
        if b.max_input > 0 && b.min_input > b.max_input {
            return Err(EditError::InvertedBounds {
                side: "input",
                min: b.min_input,
                max: b.max_input,
            });
        }
        if b.max_output > 0 && b.min_output > b.max_output {
            return Err(EditError::InvertedBounds {
                side: "output",
                min: b.min_output,
                max: b.max_output,
            });
        }
        Ok(())
    }

    /// Validate the draft and turn it into a rule.
    pub fn into_rule(self, basis: PriceBasis) -> Result<TierRule, EditError> {
        if self.name.trim().is_empty() {
            return Err(EditError::EmptyRuleName);
        }
        self.check_bounds()?;

        let pricing = match self.pricing {
            DraftPricing::Ratio {
                input_ratio,
                completion_ratio,
                output_ratio,
            } => RulePricing::Ratio {
                input_ratio,
                completion_ratio,
                output_ratio,
            },
            DraftPricing::Price {
                input_price,
                output_price,
                store_as_ratio: true,
            } => {
                let input_ratio = if input_price > 0.0 {
                    basis.ratio_from_price(input_price)
                } else {
                    0.0
                };
                let completion_ratio = if input_price > 0.0 && output_price > 0.0 {
                    output_ratio_from_prices(input_price, output_price)
                } else {
                    1.0
                };
                RulePricing::ratio(input_ratio, completion_ratio)
            }
            DraftPricing::Price {
                input_price,
                output_price,
                store_as_ratio: false,
            } => {
                if input_price == 0.0 && output_price == 0.0 {
                    // Both prices at zero persist as a free ratio rule.
                    RulePricing::ratio(0.0, 1.0)
                } else {
                    RulePricing::Absolute {
                        input_price,
                        output_price,
                    }
                }
            }
        };

        Ok(TierRule {
            name: self.name.trim().to_string(),
            bounds: self.bounds,
            pricing,
        })
    }
}

/// Pre-fill a draft from an existing rule so it can be edited in place.
impl From<&TierRule> for RuleDraft {
    fn from(rule: &TierRule) -> Self {
        let pricing = match rule.pricing {
            RulePricing::Ratio {
                input_ratio,
                completion_ratio,
                output_ratio,
            } => DraftPricing::Ratio {
                input_ratio,
                completion_ratio,
                output_ratio,
            },
            RulePricing::Absolute {
                input_price,
                output_price,
            } => DraftPricing::Price {
                input_price,
                output_price,
                store_as_ratio: false,
            },
        };
        Self {
            name: rule.name.clone(),
            bounds: rule.bounds,
            pricing,
        }
    }
}

impl TokenTierPricingConfig {
    fn edit_config<F>(&self, name: &str, edit: F) -> Result<Self, EditError>
    where
        F: FnOnce(&mut ModelTierConfig) -> Result<(), EditError>,
    {
        let mut next = self.clone();
        let config = next
            .model_configs
            .get_mut(name)
            .ok_or_else(|| EditError::UnknownConfig(name.to_string()))?;
        edit(config)?;
        Ok(next)
    }

    fn rule_index(&self, config_name: &str, rule_name: &str) -> Result<usize, EditError> {
        let config = self
            .model_configs
            .get(config_name)
            .ok_or_else(|| EditError::UnknownConfig(config_name.to_string()))?;
        config
            .rules
            .iter()
            .position(|r| r.name == rule_name)
            .ok_or_else(|| EditError::UnknownRule {
                config: config_name.to_string(),
                rule: rule_name.to_string(),
            })
    }

    /// Priority given to a new config: one above the current maximum.
    pub fn next_priority(&self) -> i64 {
        self.model_configs
            .values()
            .map(|c| c.priority)
            .max()
            .unwrap_or(0)
            .max(0)
            + 1
    }

    pub fn with_global_enabled(&self, enabled: bool) -> Self {
        Self {
            global_enabled: enabled,
            ..self.clone()
        }
    }

    /// Add an enabled config that outranks every existing one. Without
    /// explicit rules it starts from the default four-tier template.
    pub fn with_added_config(
        &self,
        name: &str,
        models: &str,
        rules: Option<Vec<TierRule>>,
    ) -> Result<Self, EditError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EditError::EmptyConfigName);
        }
        if self.model_configs.contains_key(name) {
            return Err(EditError::DuplicateConfig(name.to_string()));
        }
        let config = ModelTierConfig {
            enabled: true,
            models: ModelPatterns::parse(models)?,
            priority: self.next_priority(),
            rules: rules.unwrap_or_else(default_tier_rules),
        };
        debug!(config = name, priority = config.priority, "adding tier config");
        let mut next = self.clone();
        next.model_configs.insert(name.to_string(), config);
        Ok(next)
    }

    /// Copy a config to `<name>_copy`, ranked above both the original and
    /// every other config. Returns the new snapshot and the copy's name.
    pub fn with_copied_config(&self, name: &str) -> Result<(Self, String), EditError> {
        let original = self
            .model_configs
            .get(name)
            .ok_or_else(|| EditError::UnknownConfig(name.to_string()))?;
        let copy_name = format!("{}_copy", name);
        if self.model_configs.contains_key(&copy_name) {
            return Err(EditError::DuplicateConfig(copy_name));
        }
        let copy = ModelTierConfig {
            priority: (original.priority + 1).max(self.next_priority()),
            ..original.clone()
        };
        let mut next = self.clone();
        next.model_configs.insert(copy_name.clone(), copy);
        Ok((next, copy_name))
    }

    pub fn without_config(&self, name: &str) -> Result<Self, EditError> {
        let mut next = self.clone();
        next.model_configs
            .remove(name)
            .ok_or_else(|| EditError::UnknownConfig(name.to_string()))?;
        Ok(next)
    }

    pub fn with_config_enabled(&self, name: &str, enabled: bool) -> Result<Self, EditError> {
        self.edit_config(name, |c| {
            c.enabled = enabled;
            Ok(())
        })
    }

    pub fn with_priority(&self, name: &str, priority: i64) -> Result<Self, EditError> {
        self.edit_config(name, |c| {
            c.priority = priority;
            Ok(())
        })
    }

    pub fn with_models(&self, name: &str, models: &str) -> Result<Self, EditError> {
        let patterns = ModelPatterns::parse(models)?;
        self.edit_config(name, |c| {
            c.models = patterns;
            Ok(())
        })
    }

    /// Append a rule (`index = None`) or replace the rule at `index`.
    /// Rule names stay unique within the config.
    pub fn with_rule(
        &self,
        config_name: &str,
        index: Option<usize>,
        draft: RuleDraft,
        basis: PriceBasis,
    ) -> Result<Self, EditError> {
        let rule = draft.into_rule(basis)?;
        self.edit_config(config_name, |c| {
            let clash = c
                .rules
                .iter()
                .enumerate()
                .any(|(i, r)| r.name == rule.name && Some(i) != index);
            if clash {
                return Err(EditError::DuplicateRule {
                    config: config_name.to_string(),
                    rule: rule.name.clone(),
                });
            }
            match index {
                Some(i) => match c.rules.get_mut(i) {
                    Some(slot) => *slot = rule,
                    None => {
                        return Err(EditError::UnknownRule {
                            config: config_name.to_string(),
                            rule: format!("#{}", i),
                        })
                    }
                },
                None => c.rules.push(rule),
            }
            Ok(())
        })
    }

    /// Replace the rule called `rule_name` with `draft`.
    pub fn with_rule_replaced(
        &self,
        config_name: &str,
        rule_name: &str,
        draft: RuleDraft,
        basis: PriceBasis,
    ) -> Result<Self, EditError> {
        let index = self.rule_index(config_name, rule_name)?;
        self.with_rule(config_name, Some(index), draft, basis)
    }

    pub fn without_rule(&self, config_name: &str, rule_name: &str) -> Result<Self, EditError> {
        let index = self.rule_index(config_name, rule_name)?;
        self.edit_config(config_name, |c| {
            c.rules.remove(index);
            Ok(())
        })
    }

    /// Swap a rule with its neighbour. Moving past either end is a no-op.
    pub fn with_rule_moved(
        &self,
        config_name: &str,
        rule_name: &str,
        direction: MoveDirection,
    ) -> Result<Self, EditError> {
        let index = self.rule_index(config_name, rule_name)?;
        self.edit_config(config_name, |c| {
            match direction {
                MoveDirection::Up if index > 0 => c.rules.swap(index - 1, index),
                MoveDirection::Down if index + 1 < c.rules.len() => c.rules.swap(index, index + 1),
                _ => {}
            }
            Ok(())
        })
    }

    pub fn with_default_rules(&self, config_name: &str) -> Result<Self, EditError> {
        self.edit_config(config_name, |c| {
            c.rules = default_tier_rules();
            Ok(())
        })
    }

    /// Problems worth fixing before saving. Resolution tolerates all of them.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        for (name, config) in &self.model_configs {
            if name.trim().is_empty() {
                issues.push("Config with an empty name".to_string());
            }
            if config.enabled && config.models.is_empty() {
                issues.push(format!("Config '{}': enabled but lists no models", name));
            }
            if config.rules.is_empty() {
                issues.push(format!("Config '{}': has no rules", name));
            }

            let mut seen = HashSet::new();
            for (i, rule) in config.rules.iter().enumerate() {
                let label = if rule.name.is_empty() {
                    format!("#{}", i + 1)
                } else {
                    rule.name.clone()
                };
                if rule.name.trim().is_empty() {
                    issues.push(format!("Config '{}': rule {} has no name", name, label));
                } else if !seen.insert(rule.name.as_str()) {
                    issues.push(format!("Config '{}': duplicate rule name '{}'", name, rule.name));
                }

                let draft = RuleDraft::from(rule);
                if let Err(e) = draft.check_bounds() {
                    issues.push(format!("Config '{}': rule {}: {}", name, label, e));
                }

                let values: Vec<f64> = match rule.pricing {
                    RulePricing::Ratio {
                        input_ratio,
                        completion_ratio,
                        output_ratio,
                    } => [Some(input_ratio), Some(completion_ratio), output_ratio]
                        .into_iter()
                        .flatten()
                        .collect(),
                    RulePricing::Absolute {
                        input_price,
                        output_price,
                    } => vec![input_price, output_price],
                };
                if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
                    issues.push(format!(
                        "Config '{}': rule {} has a negative or non-finite price",
                        name, label
                    ));
                }
            }
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratio_draft(name: &str, bounds: TokenBounds) -> RuleDraft {
        RuleDraft {
            name: name.to_string(),
            bounds,
            pricing: DraftPricing::Ratio {
                input_ratio: 1.0,
                completion_ratio: 2.0,
                output_ratio: None,
            },
        }
    }

    fn with_gpt() -> TokenTierPricingConfig {
        TokenTierPricingConfig::default()
            .with_added_config("gpt", "gpt-4o,gpt-5*", None)
            .unwrap()
    }

    fn rule_names(config: &TokenTierPricingConfig, name: &str) -> Vec<String> {
        config.model_configs[name]
            .rules
            .iter()
            .map(|r| r.name.clone())
            .collect()
    }

    #[test]
    fn add_config_uses_template_and_next_priority() {
        let config = with_gpt();
        let gpt = &config.model_configs["gpt"];
        assert!(gpt.enabled);
        assert_eq!(gpt.priority, 1);
        assert_eq!(gpt.rules.len(), 4);

        let config = config.with_added_config("claude", "claude-*", Some(vec![])).unwrap();
        assert_eq!(config.model_configs["claude"].priority, 2);
        assert!(config.model_configs["claude"].rules.is_empty());
    }

    #[test]
    fn add_config_rejects_duplicates_and_blank_names() {
        let config = with_gpt();
        assert_eq!(
            config.with_added_config("gpt", "x", None).unwrap_err(),
            EditError::DuplicateConfig("gpt".to_string())
        );
        assert_eq!(
            config.with_added_config("  ", "x", None).unwrap_err(),
            EditError::EmptyConfigName
        );
    }

    #[test]
    fn add_config_rejects_bad_pattern() {
        let err = TokenTierPricingConfig::default()
            .with_added_config("bad", "gpt-*-mini", None)
            .unwrap_err();
        assert!(matches!(err, EditError::Pattern(_)));
    }

    #[test]
    fn edits_leave_original_snapshot_untouched() {
        let original = with_gpt();
        let edited = original.with_config_enabled("gpt", false).unwrap();
        assert!(original.model_configs["gpt"].enabled);
        assert!(!edited.model_configs["gpt"].enabled);
    }

    #[test]
    fn copy_outranks_everything() {
        let config = with_gpt()
            .with_added_config("claude", "claude-*", None)
            .unwrap()
            .with_priority("claude", 10)
            .unwrap();
        let (copied, copy_name) = config.with_copied_config("gpt").unwrap();
        assert_eq!(copy_name, "gpt_copy");
        assert_eq!(copied.model_configs["gpt_copy"].priority, 11);
        assert_eq!(copied.model_configs["gpt_copy"].rules.len(), 4);

        let err = copied.with_copied_config("gpt").unwrap_err();
        assert_eq!(err, EditError::DuplicateConfig("gpt_copy".to_string()));
    }

    #[test]
    fn remove_unknown_config_errors() {
        let err = with_gpt().without_config("nope").unwrap_err();
        assert_eq!(err, EditError::UnknownConfig("nope".to_string()));
        assert!(with_gpt().without_config("gpt").unwrap().model_configs.is_empty());
    }

    #[test]
    fn append_rule_and_reject_duplicate_name() {
        let config = with_gpt()
            .with_rule("gpt", None, ratio_draft("T5", TokenBounds::default()), PriceBasis::default())
            .unwrap();
        assert_eq!(rule_names(&config, "gpt").last().unwrap(), "T5");

        let err = config
            .with_rule("gpt", None, ratio_draft("T5", TokenBounds::default()), PriceBasis::default())
            .unwrap_err();
        assert!(matches!(err, EditError::DuplicateRule { .. }));
    }

    #[test]
    fn replacing_rule_may_keep_its_own_name() {
        let config = with_gpt();
        let mut draft = RuleDraft::from(&config.model_configs["gpt"].rules[0]);
        draft.pricing = DraftPricing::Ratio {
            input_ratio: 0.1,
            completion_ratio: 1.0,
            output_ratio: None,
        };
        let edited = config
            .with_rule_replaced("gpt", "T1_input_le_32k_output_le_200", draft, PriceBasis::default())
            .unwrap();
        assert_eq!(
            edited.model_configs["gpt"].rules[0].pricing,
            RulePricing::ratio(0.1, 1.0)
        );
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let bounds = TokenBounds {
            min_input: 100,
            max_input: 10,
            ..TokenBounds::default()
        };
        let err = with_gpt()
            .with_rule("gpt", None, ratio_draft("bad", bounds), PriceBasis::default())
            .unwrap_err();
        assert_eq!(
            err,
            EditError::InvertedBounds {
                side: "input",
                min: 100,
                max: 10
            }
        );
    }

    #[test]
    fn min_without_max_is_allowed() {
        let bounds = TokenBounds {
            min_output: 500,
            ..TokenBounds::default()
        };
        assert!(with_gpt()
            .with_rule("gpt", None, ratio_draft("ok", bounds), PriceBasis::default())
            .is_ok());
    }

    #[test]
    fn blank_rule_name_is_rejected() {
        let err = with_gpt()
            .with_rule("gpt", None, ratio_draft(" ", TokenBounds::default()), PriceBasis::default())
            .unwrap_err();
        assert_eq!(err, EditError::EmptyRuleName);
    }

    #[test]
    fn price_draft_converted_to_ratio() {
        let draft = RuleDraft {
            name: "p".to_string(),
            bounds: TokenBounds::default(),
            pricing: DraftPricing::Price {
                input_price: 3.0,
                output_price: 12.0,
                store_as_ratio: true,
            },
        };
        let rule = draft.into_rule(PriceBasis::default()).unwrap();
        assert_eq!(rule.pricing, RulePricing::ratio(1.5, 4.0));
    }

    #[test]
    fn price_draft_without_input_price_gets_unit_completion() {
        let draft = RuleDraft {
            name: "p".to_string(),
            bounds: TokenBounds::default(),
            pricing: DraftPricing::Price {
                input_price: 0.0,
                output_price: 12.0,
                store_as_ratio: true,
            },
        };
        let rule = draft.into_rule(PriceBasis::default()).unwrap();
        assert_eq!(rule.pricing, RulePricing::ratio(0.0, 1.0));
    }

    #[test]
    fn price_draft_kept_absolute() {
        let draft = RuleDraft {
            name: "p".to_string(),
            bounds: TokenBounds::default(),
            pricing: DraftPricing::Price {
                input_price: 3.0,
                output_price: 12.0,
                store_as_ratio: false,
            },
        };
        assert!(draft.into_rule(PriceBasis::default()).unwrap().is_price_mode());
    }

    #[test]
    fn move_rules_and_stop_at_edges() {
        let config = with_gpt();
        let moved = config
            .with_rule_moved("gpt", "T2_input_le_32k_output_gt_200", MoveDirection::Up)
            .unwrap();
        assert_eq!(rule_names(&moved, "gpt")[0], "T2_input_le_32k_output_gt_200");

        let unchanged = moved
            .with_rule_moved("gpt", "T2_input_le_32k_output_gt_200", MoveDirection::Up)
            .unwrap();
        assert_eq!(rule_names(&unchanged, "gpt"), rule_names(&moved, "gpt"));

        let last = config
            .with_rule_moved("gpt", "T4_input_gt_128k", MoveDirection::Down)
            .unwrap();
        assert_eq!(rule_names(&last, "gpt"), rule_names(&config, "gpt"));
    }

    #[test]
    fn remove_rule_and_restore_defaults() {
        let config = with_gpt().without_rule("gpt", "T3_input_32k_to_128k").unwrap();
        assert_eq!(config.model_configs["gpt"].rules.len(), 3);
        let restored = config.with_default_rules("gpt").unwrap();
        assert_eq!(restored.model_configs["gpt"].rules.len(), 4);
    }

    #[test]
    fn editing_bounds_keeps_output_ratio_override() {
        let rule: TierRule = serde_json::from_str(
            r#"{"name": "long", "input_ratio": 1.0, "completion_ratio": 4.0, "output_ratio": 0.5}"#,
        )
        .unwrap();
        let config = with_gpt()
            .with_rule("gpt", None, RuleDraft::from(&rule), PriceBasis::default())
            .unwrap();

        let mut draft = RuleDraft::from(&rule);
        draft.bounds.max_input = 64_000;
        let edited = config
            .with_rule_replaced("gpt", "long", draft, PriceBasis::default())
            .unwrap();

        let saved = edited.model_configs["gpt"].rules.last().unwrap();
        assert_eq!(saved.bounds.max_input, 64_000);
        assert_eq!(saved.pricing.effective_output_ratio(), Some(0.5));
        assert_eq!(saved.pricing, rule.pricing);
    }

    #[test]
    fn validate_default_template_is_clean() {
        assert!(with_gpt().validate().is_empty());
    }

    #[test]
    fn validate_reports_problems() {
        let json = r#"{
            "global_enabled": true,
            "model_configs": {
                "broken": {
                    "enabled": true,
                    "models": "",
                    "rules": [
                        {"name": "a", "min_input_tokens": 10, "max_input_tokens": 5},
                        {"name": "a", "input_price": -1}
                    ]
                }
            }
        }"#;
        let config: TokenTierPricingConfig = serde_json::from_str(json).unwrap();
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.contains("lists no models")));
        assert!(issues.iter().any(|i| i.contains("duplicate rule name")));
        assert!(issues.iter().any(|i| i.contains("cannot exceed")));
        assert!(issues.iter().any(|i| i.contains("negative")));
    }
}
