use tracing::warn;

/// USD per one million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelRate {
    pub input: f64,
    pub output: f64,
}

const TOKENS_PER_UNIT: f64 = 1_000_000.0;

// LLM provider list prices
const RATES: &[(&str, ModelRate)] = &[
    ("claude-sonnet-4-20250514", ModelRate { input: 3.0, output: 15.0 }),
    ("claude-sonnet-4-5-20250929", ModelRate { input: 3.0, output: 15.0 }),
    ("claude-3-5-sonnet-20241022", ModelRate { input: 3.0, output: 15.0 }),
    ("claude-3-opus-20240229", ModelRate { input: 15.0, output: 75.0 }),
    ("claude-3-haiku-20240307", ModelRate { input: 0.25, output: 1.25 }),
    ("claude-haiku-4-5-20251001", ModelRate { input: 1.0, output: 5.0 }),
];

pub fn rate_for(model: &str) -> Option<ModelRate> {
    RATES.iter().find(|(name, _)| *name == model).map(|(_, rate)| *rate)
}

/// Cost of one usage item. Unknown models are free, with a warning.
pub fn token_cost(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    match rate_for(model) {
        Some(rate) => {
            input_tokens as f64 / TOKENS_PER_UNIT * rate.input
                + output_tokens as f64 / TOKENS_PER_UNIT * rate.output
        }
        None => {
            warn!("No pricing found for model: {}", model);
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_model_cost() {
        // 2M in at $3, 100k out at $15
        let cost = token_cost("claude-sonnet-4-20250514", 2_000_000, 100_000);
        assert!((cost - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_model_is_free() {
        assert_eq!(token_cost("gpt-9000", 5_000_000, 5_000_000), 0.0);
        assert!(rate_for("gpt-9000").is_none());
    }

    #[test]
    fn test_haiku_rate() {
        let rate = rate_for("claude-3-haiku-20240307").unwrap();
        assert_eq!(rate.input, 0.25);
        assert_eq!(rate.output, 1.25);
    }
}
