use std::io::IsTerminal;

use anyhow::Result;
use serde::Serialize;

use tierprice::core::config::Settings;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format: OutputFormat,
    pub pretty: bool,
    pub use_color: bool,
    pub verbose: bool,
}

impl OutputOptions {
    /// Combine command-line flags with the `[settings]` defaults. Flags win.
    pub fn resolve(
        format_flag: Option<&str>,
        json: bool,
        pretty: bool,
        no_color: bool,
        verbose: bool,
        settings: &Settings,
    ) -> Self {
        let format = if json {
            OutputFormat::Json
        } else {
            match format_flag.unwrap_or(settings.default_format.as_str()) {
                "json" => OutputFormat::Json,
                _ => OutputFormat::Text,
            }
        };
        let use_color = match settings.color.as_str() {
            _ if no_color => false,
            "never" => false,
            "always" => true,
            _ => detect_color(true),
        };
        Self {
            format,
            pretty,
            use_color,
            verbose,
        }
    }

    /// Print `value` as JSON honouring `--pretty`.
    pub fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        println!("{}", json);
        Ok(())
    }
}

pub fn detect_color(color_flag: bool) -> bool {
    if !color_flag {
        return false;
    }
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    std::io::stdout().is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_beats_settings() {
        let settings = Settings::default();
        let opts = OutputOptions::resolve(None, true, false, true, false, &settings);
        assert_eq!(opts.format, OutputFormat::Json);
    }

    #[test]
    fn settings_default_format_applies_without_flags() {
        let settings = Settings {
            default_format: "json".to_string(),
            ..Settings::default()
        };
        let opts = OutputOptions::resolve(None, false, false, true, false, &settings);
        assert_eq!(opts.format, OutputFormat::Json);

        let opts = OutputOptions::resolve(Some("text"), false, false, true, false, &settings);
        assert_eq!(opts.format, OutputFormat::Text);
    }

    #[test]
    fn no_color_flag_overrides_always() {
        let settings = Settings {
            color: "always".to_string(),
            ..Settings::default()
        };
        assert!(OutputOptions::resolve(None, false, false, false, false, &settings).use_color);
        assert!(!OutputOptions::resolve(None, false, false, true, false, &settings).use_color);
    }

    #[test]
    fn detect_color_respects_flag() {
        assert!(!detect_color(false));
    }
}
