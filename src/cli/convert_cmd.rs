use anyhow::{bail, Result};
use clap::Subcommand;
use serde::Serialize;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::cli::Context;
use tierprice::core::formatter::{format_ratio, format_unit_price};
use tierprice::core::pricing::units::{output_ratio_from_prices, PriceBasis, TokenUnit};

#[derive(Subcommand, Debug)]
pub enum ConvertAction {
    /// Convert a ratio (and optional completion ratio) to USD per 1M tokens
    ToPrice {
        ratio: f64,
        /// Output-to-input multiplier
        #[arg(short, long, default_value_t = 1.0)]
        completion: f64,
    },
    /// Convert USD per 1M tokens to an input ratio and completion ratio
    ToRatio {
        input_price: f64,
        /// Output price, used to derive the completion ratio
        #[arg(short, long)]
        output_price: Option<f64>,
    },
}

#[derive(Debug, Serialize, PartialEq)]
struct Conversion {
    quota_per_unit: u64,
    input_ratio: f64,
    completion_ratio: f64,
    input_price: f64,
    output_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

fn to_price(basis: PriceBasis, ratio: f64, completion: f64) -> Conversion {
    let input_price = basis.price_from_ratio(ratio);
    Conversion {
        quota_per_unit: basis.quota_per_unit(),
        input_ratio: ratio,
        completion_ratio: completion,
        input_price,
        output_price: input_price * completion,
        note: None,
    }
}

/// `output_price` is what the derived ratios actually bill, which differs
/// from the requested one when a zero price forces a 1.0 completion ratio.
fn to_ratio(basis: PriceBasis, input_price: f64, output_price: Option<f64>) -> Conversion {
    let requested = output_price.unwrap_or(input_price);
    let derivable = input_price > 0.0 && requested > 0.0;
    let completion_ratio = if derivable {
        output_ratio_from_prices(input_price, requested)
    } else {
        1.0
    };
    let billed = if derivable { requested } else { input_price };
    let note = (billed != requested).then(|| {
        format!(
            "a completion ratio cannot express output {} with input {}; output bills at {}",
            format_unit_price(requested, TokenUnit::M),
            format_unit_price(input_price, TokenUnit::M),
            format_unit_price(billed, TokenUnit::M)
        )
    });
    Conversion {
        quota_per_unit: basis.quota_per_unit(),
        input_ratio: basis.ratio_from_price(input_price),
        completion_ratio,
        input_price,
        output_price: billed,
        note,
    }
}

fn check_amount(label: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        bail!("{} must be a non-negative number, got {}", label, value);
    }
    Ok(())
}

pub fn run(ctx: &Context, action: &ConvertAction, opts: &OutputOptions) -> Result<()> {
    let basis = ctx.app.basis();
    let conversion = match *action {
        ConvertAction::ToPrice { ratio, completion } => {
            check_amount("ratio", ratio)?;
            check_amount("completion ratio", completion)?;
            to_price(basis, ratio, completion)
        }
        ConvertAction::ToRatio {
            input_price,
            output_price,
        } => {
            check_amount("input price", input_price)?;
            if let Some(output_price) = output_price {
                check_amount("output price", output_price)?;
            }
            to_ratio(basis, input_price, output_price)
        }
    };

    match opts.format {
        OutputFormat::Text => {
            println!(
                "ratio {} (completion {})  =  input {}, output {}",
                format_ratio(conversion.input_ratio),
                format_ratio(conversion.completion_ratio),
                format_unit_price(conversion.input_price, TokenUnit::M),
                format_unit_price(conversion.output_price, TokenUnit::M)
            );
            if let Some(note) = &conversion.note {
                eprintln!("note: {}", note);
            }
            if opts.verbose {
                eprintln!("quota_per_unit = {}", conversion.quota_per_unit);
            }
        }
        OutputFormat::Json => opts.print_json(&conversion)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_to_price_uses_basis() {
        let c = to_price(PriceBasis::default(), 0.4, 1.5);
        assert_eq!(c.input_price, 0.8);
        assert!((c.output_price - 1.2).abs() < 1e-12);

        let c = to_price(PriceBasis::new(1_000_000), 1.0, 1.0);
        assert_eq!(c.input_price, 1.0);
    }

    #[test]
    fn price_to_ratio_derives_completion() {
        let c = to_ratio(PriceBasis::default(), 1.0, Some(3.0));
        assert_eq!(c.input_ratio, 0.5);
        assert_eq!(c.completion_ratio, 3.0);
    }

    #[test]
    fn price_to_ratio_without_output_or_with_zero() {
        let c = to_ratio(PriceBasis::default(), 2.0, None);
        assert_eq!(c.completion_ratio, 1.0);
        assert_eq!(c.output_price, 2.0);

        assert!(c.note.is_none());

        let c = to_ratio(PriceBasis::default(), 0.0, Some(5.0));
        assert_eq!(c.input_ratio, 0.0);
        assert_eq!(c.completion_ratio, 1.0);
        assert_eq!(c.output_price, 0.0);
        assert!(c.note.is_some());
    }

    #[test]
    fn zero_output_price_reports_what_the_ratios_bill() {
        let c = to_ratio(PriceBasis::default(), 3.0, Some(0.0));
        assert_eq!(c.completion_ratio, 1.0);
        assert_eq!(c.output_price, 3.0);
        assert!(c.note.unwrap().contains("$3.000000"));

        let c = to_ratio(PriceBasis::default(), 1.0, Some(3.0));
        assert_eq!(c.output_price, 3.0);
        assert!(c.note.is_none());
    }

    #[test]
    fn negative_amounts_are_rejected() {
        assert!(check_amount("ratio", -1.0).is_err());
        assert!(check_amount("ratio", f64::NAN).is_err());
        assert!(check_amount("ratio", 0.0).is_ok());
    }
}
