// src/application/context_budget.rs
use serde::Serialize;
use std::fmt;

/// Rough characters per token, conservative for most models.
pub const CHARS_PER_TOKEN: usize = 4;

/// Output tokens reserved per requested card.
pub const OUTPUT_TOKENS_PER_CARD: usize = 60;

/// Context window assumed when the model does not report one.
pub const DEFAULT_CONTEXT_LENGTH: usize = 8192;

pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / CHARS_PER_TOKEN
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContextFit {
    Ok,
    Tight,
    VeryTight,
    Overflow,
}

impl fmt::Display for ContextFit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ContextFit::Ok => "OK",
            ContextFit::Tight => "Tight",
            ContextFit::VeryTight => "Very tight",
            ContextFit::Overflow => "OVERFLOW",
        };
        write!(f, "{}", label)
    }
}

/// Estimated share of a model's context window one generation request takes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextUsage {
    pub unit_name: String,
    pub prompt_tokens: usize,
    pub output_reserve: usize,
    pub context_length: usize,
    /// Markdown was cut to fit the prompt content limit.
    pub truncated: bool,
}

impl ContextUsage {
    pub fn new(
        unit_name: &str,
        prompt: &str,
        target_cards: u32,
        context_length: usize,
        truncated: bool,
    ) -> Self {
        Self {
            unit_name: unit_name.to_string(),
            prompt_tokens: estimate_tokens(prompt),
            output_reserve: target_cards as usize * OUTPUT_TOKENS_PER_CARD,
            context_length,
            truncated,
        }
    }

    pub fn total(&self) -> usize {
        self.prompt_tokens + self.output_reserve
    }

    pub fn utilization_percent(&self) -> f64 {
        if self.context_length == 0 {
            return f64::INFINITY;
        }
        self.total() as f64 * 100.0 / self.context_length as f64
    }

    pub fn overflow_tokens(&self) -> usize {
        self.total().saturating_sub(self.context_length)
    }

    pub fn fit(&self) -> ContextFit {
        let util = self.utilization_percent();
        if self.overflow_tokens() > 0 {
            ContextFit::Overflow
        } else if util < 70.0 {
            ContextFit::Ok
        } else if util < 90.0 {
            ContextFit::Tight
        } else {
            ContextFit::VeryTight
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_text_when_estimating_tokens_then_four_chars_each() {
        assert_eq!(estimate_tokens(&"a".repeat(401)), 100);
        assert_eq!(estimate_tokens("äöüß"), 1);
    }

    #[test]
    fn given_small_prompt_when_measuring_then_ok() {
        let usage = ContextUsage::new("unit_1", &"x".repeat(4000), 10, 8192, false);

        assert_eq!(usage.prompt_tokens, 1000);
        assert_eq!(usage.output_reserve, 600);
        assert_eq!(usage.total(), 1600);
        assert_eq!(usage.fit(), ContextFit::Ok);
    }

    #[test]
    fn given_utilization_thresholds_when_measuring_then_tight_bands() {
        let tight = ContextUsage::new("u", &"x".repeat(4 * 800), 0, 1000, false);
        let very_tight = ContextUsage::new("u", &"x".repeat(4 * 950), 0, 1000, false);
        let full = ContextUsage::new("u", &"x".repeat(4 * 1000), 0, 1000, false);

        assert_eq!(tight.fit(), ContextFit::Tight);
        assert_eq!(very_tight.fit(), ContextFit::VeryTight);
        assert_eq!(full.fit(), ContextFit::VeryTight);
    }

    #[test]
    fn given_prompt_beyond_window_when_measuring_then_overflow_counted() {
        let usage = ContextUsage::new("unit_1", &"x".repeat(4 * 8000), 10, 8192, true);

        assert_eq!(usage.fit(), ContextFit::Overflow);
        assert_eq!(usage.overflow_tokens(), 8600 - 8192);
    }
}
