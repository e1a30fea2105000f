use crate::core::models::tier::{ModelTierConfig, TierRule, TokenTierPricingConfig};

/// A tier config selected for a model, with its name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchedConfig<'a> {
    pub name: &'a str,
    pub config: &'a ModelTierConfig,
}

/// Enabled configs in the order they are tried: descending priority, then
/// ascending name for equal priorities.
pub fn candidate_configs(config: &TokenTierPricingConfig) -> Vec<MatchedConfig<'_>> {
    let mut candidates: Vec<MatchedConfig<'_>> = config
        .model_configs
        .iter()
        .filter(|(_, c)| c.enabled)
        .map(|(name, c)| MatchedConfig {
            name: name.as_str(),
            config: c,
        })
        .collect();
    // Stable sort keeps the map's name order among equal priorities.
    candidates.sort_by(|a, b| b.config.priority.cmp(&a.config.priority));
    candidates
}

/// Find the tier config that applies to `model_name`.
///
/// Returns `None` when tiered pricing is globally disabled, the name is
/// empty, or no enabled config lists the model.
pub fn find_matching_config<'a>(
    model_name: &str,
    config: &'a TokenTierPricingConfig,
) -> Option<MatchedConfig<'a>> {
    if !config.global_enabled || model_name.is_empty() {
        return None;
    }
    candidate_configs(config)
        .into_iter()
        .find(|candidate| candidate.config.models.matches(model_name))
}

/// First rule, in list order, whose bounds admit the token counts.
pub fn find_matching_rule(
    rules: &[TierRule],
    input_tokens: u64,
    output_tokens: u64,
) -> Option<&TierRule> {
    rules
        .iter()
        .find(|rule| rule.bounds.admits(input_tokens, output_tokens))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::tier::{ModelPatterns, RulePricing, TokenBounds};
    use proptest::prelude::*;

    fn tier_config(models: &str, priority: i64, enabled: bool) -> ModelTierConfig {
        ModelTierConfig {
            enabled,
            models: ModelPatterns::parse(models).unwrap(),
            priority,
            rules: vec![],
        }
    }

    fn snapshot(entries: Vec<(&str, ModelTierConfig)>) -> TokenTierPricingConfig {
        TokenTierPricingConfig {
            global_enabled: true,
            model_configs: entries
                .into_iter()
                .map(|(name, c)| (name.to_string(), c))
                .collect(),
        }
    }

    fn rule(name: &str, bounds: TokenBounds) -> TierRule {
        TierRule {
            name: name.to_string(),
            bounds,
            pricing: RulePricing::ratio(1.0, 1.0),
        }
    }

    #[test]
    fn higher_priority_value_wins() {
        let config = snapshot(vec![
            ("low", tier_config("gpt-4o", 1, true)),
            ("high", tier_config("gpt-4*", 5, true)),
        ]);
        let matched = find_matching_config("gpt-4o", &config).unwrap();
        assert_eq!(matched.name, "high");
    }

    #[test]
    fn equal_priority_breaks_tie_by_name() {
        let config = snapshot(vec![
            ("zeta", tier_config("gpt-4o", 2, true)),
            ("alpha", tier_config("gpt-*", 2, true)),
        ]);
        assert_eq!(find_matching_config("gpt-4o", &config).unwrap().name, "alpha");
    }

    #[test]
    fn disabled_configs_are_skipped() {
        let config = snapshot(vec![
            ("off", tier_config("gpt-4o", 9, false)),
            ("on", tier_config("gpt-4o", 1, true)),
        ]);
        assert_eq!(find_matching_config("gpt-4o", &config).unwrap().name, "on");
    }

    #[test]
    fn global_switch_off_matches_nothing() {
        let mut config = snapshot(vec![("on", tier_config("gpt-4o", 1, true))]);
        config.global_enabled = false;
        assert!(find_matching_config("gpt-4o", &config).is_none());
    }

    #[test]
    fn empty_model_name_matches_nothing() {
        let config = snapshot(vec![("all", tier_config("*", 1, true))]);
        assert!(find_matching_config("", &config).is_none());
    }

    #[test]
    fn unlisted_model_matches_nothing() {
        let config = snapshot(vec![("gpt", tier_config("gpt-4o", 1, true))]);
        assert!(find_matching_config("gpt-4o-mini", &config).is_none());
    }

    #[test]
    fn candidates_sorted_descending() {
        let config = snapshot(vec![
            ("a", tier_config("x", 1, true)),
            ("b", tier_config("x", 7, true)),
            ("c", tier_config("x", 3, true)),
        ]);
        let order: Vec<&str> = candidate_configs(&config).iter().map(|c| c.name).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn rule_split_at_32k_picks_second() {
        let rules = vec![
            rule(
                "short",
                TokenBounds {
                    max_input: 32_000,
                    ..TokenBounds::default()
                },
            ),
            rule(
                "long",
                TokenBounds {
                    min_input: 32_001,
                    ..TokenBounds::default()
                },
            ),
        ];
        assert_eq!(find_matching_rule(&rules, 50_000, 0).unwrap().name, "long");
        assert_eq!(find_matching_rule(&rules, 32_000, 0).unwrap().name, "short");
    }

    #[test]
    fn no_rule_matches_returns_none() {
        let rules = vec![rule(
            "small",
            TokenBounds {
                max_input: 10,
                ..TokenBounds::default()
            },
        )];
        assert!(find_matching_rule(&rules, 11, 0).is_none());
        assert!(find_matching_rule(&[], 0, 0).is_none());
    }

    #[test]
    fn output_bounds_are_checked() {
        let rules = crate::core::models::tier::default_tier_rules();
        assert_eq!(
            find_matching_rule(&rules, 1000, 150).unwrap().name,
            "T1_input_le_32k_output_le_200"
        );
        assert_eq!(
            find_matching_rule(&rules, 1000, 201).unwrap().name,
            "T2_input_le_32k_output_gt_200"
        );
        assert_eq!(
            find_matching_rule(&rules, 200_000, 5000).unwrap().name,
            "T4_input_gt_128k"
        );
    }

    proptest! {
        #[test]
        fn first_admitting_rule_wins(input in 0u64..200_000, output in 0u64..5_000) {
            let rules = vec![
                rule("narrow", TokenBounds { max_input: 100_000, max_output: 2_000, ..TokenBounds::default() }),
                rule("catch_all", TokenBounds::default()),
            ];
            let matched = find_matching_rule(&rules, input, output).unwrap();
            let first = rules.iter().position(|r| r.bounds.admits(input, output)).unwrap();
            prop_assert_eq!(&matched.name, &rules[first].name);
        }

        #[test]
        fn unbounded_rule_matches_everything(input in any::<u64>(), output in any::<u64>()) {
            let rules = vec![rule("default", TokenBounds::default())];
            prop_assert!(find_matching_rule(&rules, input, output).is_some());
        }
    }
}
