//! Per-token pricing for known models.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// (input, output) USD cost per token for a model, matched by prefix.
///
/// Longer prefixes are listed first so `gpt-4o-mini` does not match `gpt-4o`.
pub fn model_cost(model: &str) -> Option<(Decimal, Decimal)> {
    const PER_MILLION: Decimal = dec!(1000000);

    let (input, output) = if model.starts_with("gpt-4o-mini") {
        (dec!(0.15), dec!(0.60))
    } else if model.starts_with("gpt-4o") {
        (dec!(2.50), dec!(10.00))
    } else if model.starts_with("gpt-4-turbo") {
        (dec!(10.00), dec!(30.00))
    } else if model.starts_with("gpt-4") {
        (dec!(30.00), dec!(60.00))
    } else if model.starts_with("gpt-3.5-turbo") {
        (dec!(0.50), dec!(1.50))
    } else if model.starts_with("claude-3-5-haiku") {
        (dec!(0.80), dec!(4.00))
    } else if model.starts_with("claude-sonnet-4") || model.starts_with("claude-3-5-sonnet") {
        (dec!(3.00), dec!(15.00))
    } else if model.starts_with("text-embedding-ada-002") {
        (dec!(0.10), Decimal::ZERO)
    } else if model.starts_with("text-embedding-3-small") {
        (dec!(0.02), Decimal::ZERO)
    } else {
        return None;
    };

    Some((input / PER_MILLION, output / PER_MILLION))
}

/// Estimated USD cost of a call, or zero for unknown models.
pub fn estimate_cost(model: &str, input_tokens: u32, output_tokens: u32) -> Decimal {
    match model_cost(model) {
        Some((input, output)) => {
            input * Decimal::from(input_tokens) + output * Decimal::from(output_tokens)
        }
        None => Decimal::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mini_is_not_priced_as_full_model() {
        let (mini_in, _) = model_cost("gpt-4o-mini-2024-07-18").unwrap();
        let (full_in, _) = model_cost("gpt-4o").unwrap();
        assert!(mini_in < full_in);
    }

    #[test]
    fn unknown_model_costs_nothing() {
        assert!(model_cost("local-llama").is_none());
        assert_eq!(estimate_cost("local-llama", 1000, 1000), Decimal::ZERO);
    }

    #[test]
    fn estimate_scales_with_tokens() {
        assert_eq!(estimate_cost("gpt-4", 1_000_000, 0), dec!(30));
        assert_eq!(estimate_cost("gpt-4", 0, 500_000), dec!(30));
    }
}
