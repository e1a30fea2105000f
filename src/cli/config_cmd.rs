use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::Serialize;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::cli::Context;
use tierprice::core::config::AppConfig;
use tierprice::core::models::tier::TokenTierPricingConfig;

#[derive(Serialize)]
struct CheckReport<'a> {
    config_path: String,
    pricing_path: String,
    config_issues: &'a [String],
    pricing_issues: &'a [String],
}

pub fn init(ctx: &Context, _opts: &OutputOptions) -> Result<()> {
    let path = &ctx.config_path;
    if path.exists() {
        eprintln!("Config file already exists at {}", path.display());
        eprintln!("Remove it first if you want to regenerate.");
        return Ok(());
    }

    AppConfig::default()
        .save_to(path)
        .with_context(|| format!("Failed to generate config at {}", path.display()))?;
    println!("Generated config at {}", path.display());
    println!("  Tier pricing snapshot: {}", ctx.pricing_path.display());
    Ok(())
}

/// Paths and issues found by `config check`.
struct CheckOutcome {
    config_path: PathBuf,
    pricing_path: PathBuf,
    config_issues: Vec<String>,
    pricing_issues: Vec<String>,
}

/// Load and validate both files. Load failures are reported as issues so a
/// broken config can still be checked.
fn inspect(config_override: Option<&Path>, pricing_override: Option<&Path>) -> CheckOutcome {
    let config_path = Context::config_path(config_override);
    let (app, config_issues) = match AppConfig::load_from(&config_path) {
        Ok(app) => {
            let issues = app.validate();
            (app, issues)
        }
        Err(e) => (
            AppConfig::default(),
            vec![format!("Failed to load config: {}", e)],
        ),
    };
    let pricing_path = Context::pricing_path(&app, &config_path, pricing_override);
    let pricing_issues = match TokenTierPricingConfig::load_from(&pricing_path) {
        Ok(snapshot) => snapshot.validate(),
        Err(e) => vec![format!("Failed to load tier pricing: {}", e)],
    };
    CheckOutcome {
        config_path,
        pricing_path,
        config_issues,
        pricing_issues,
    }
}

pub fn check(
    config_override: Option<&Path>,
    pricing_override: Option<&Path>,
    opts: &OutputOptions,
) -> Result<()> {
    let outcome = inspect(config_override, pricing_override);
    if !outcome.config_path.exists() {
        eprintln!("No config file found at {}", outcome.config_path.display());
        eprintln!("Run `tierprice config init` to create one.");
    }

    let config_path = outcome.config_path.display().to_string();
    let pricing_path = outcome.pricing_path.display().to_string();
    match opts.format {
        OutputFormat::Json => opts.print_json(&CheckReport {
            config_path,
            pricing_path,
            config_issues: &outcome.config_issues,
            pricing_issues: &outcome.pricing_issues,
        })?,
        OutputFormat::Text => {
            report("Config", &config_path, &outcome.config_issues);
            report("Tier pricing", &pricing_path, &outcome.pricing_issues);
        }
    }

    if !outcome.config_issues.is_empty() || !outcome.pricing_issues.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

fn report(label: &str, path: &str, issues: &[String]) {
    if issues.is_empty() {
        println!("{} is valid: {}", label, path);
    } else {
        eprintln!("{} issues found in {}:", label, path);
        for issue in issues {
            eprintln!("  - {}", issue);
        }
    }
}

/// Print the effective config, defaults included.
pub fn show(ctx: &Context, opts: &OutputOptions) -> Result<()> {
    match opts.format {
        OutputFormat::Json => opts.print_json(&ctx.app)?,
        OutputFormat::Text => {
            let content =
                toml::to_string_pretty(&ctx.app).context("Failed to serialize config")?;
            println!("# {}", ctx.config_path.display());
            print!("{}", content);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broken_config_is_reported_as_an_issue() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "[settings\ncolor = \"auto\"\n").unwrap();

        let outcome = inspect(Some(&config_path), None);
        assert_eq!(outcome.config_issues.len(), 1);
        assert!(outcome.config_issues[0].starts_with("Failed to load config"));
        assert_eq!(outcome.pricing_path, dir.path().join("pricing.json"));
        assert!(outcome.pricing_issues.is_empty());
    }

    #[test]
    fn valid_files_have_no_issues() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        AppConfig::default().save_to(&config_path).unwrap();

        let outcome = inspect(Some(&config_path), None);
        assert!(outcome.config_issues.is_empty());
        assert!(outcome.pricing_issues.is_empty());
    }

    #[test]
    fn malformed_snapshot_is_reported_as_an_issue() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(dir.path().join("pricing.json"), "{not json").unwrap();

        let outcome = inspect(Some(&config_path), None);
        assert!(outcome.config_issues.is_empty());
        assert_eq!(outcome.pricing_issues.len(), 1);
    }
}
