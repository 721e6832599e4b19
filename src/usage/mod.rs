//! Token accounting.
//!
//! A [`UsageEntry`] captures what one agent call (or one whole operation)
//! consumed. Cost is taken from the agent when it reports one, otherwise it is
//! derived from token counts with per-million [`Rates`].

pub mod ledger;

use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign};

pub use ledger::{LedgerEntry, LedgerFilter, UsageLedger};

/// USD per million input tokens when no rate is configured.
pub const DEFAULT_INPUT_RATE: f64 = 3.0;
/// USD per million output tokens when no rate is configured.
pub const DEFAULT_OUTPUT_RATE: f64 = 15.0;

/// Per-token-type pricing, in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rates {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Default for Rates {
    fn default() -> Self {
        Self {
            input_per_million: DEFAULT_INPUT_RATE,
            output_per_million: DEFAULT_OUTPUT_RATE,
        }
    }
}

impl Rates {
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_per_million
            + output_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

/// Tokens and cost consumed by a call or an operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageEntry {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default, alias = "cost")]
    pub estimated_cost: f64,
}

impl UsageEntry {
    /// Build an entry from agent-reported numbers; `reported_cost` wins over
    /// the rate-derived estimate when present.
    pub fn from_tokens(
        input_tokens: u64,
        output_tokens: u64,
        reported_cost: Option<f64>,
        rates: &Rates,
    ) -> Self {
        let estimated_cost = reported_cost
            .filter(|c| c.is_finite() && *c >= 0.0)
            .unwrap_or_else(|| rates.cost(input_tokens, output_tokens));
        Self {
            input_tokens,
            output_tokens,
            estimated_cost,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn is_zero(&self) -> bool {
        self.total_tokens() == 0 && self.estimated_cost == 0.0
    }
}

impl Add for UsageEntry {
    type Output = UsageEntry;

    fn add(self, rhs: UsageEntry) -> UsageEntry {
        UsageEntry {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
            estimated_cost: self.estimated_cost + rhs.estimated_cost,
        }
    }
}

impl AddAssign for UsageEntry {
    fn add_assign(&mut self, rhs: UsageEntry) {
        *self = *self + rhs;
    }
}

impl Sum for UsageEntry {
    fn sum<I: Iterator<Item = UsageEntry>>(iter: I) -> Self {
        iter.fold(UsageEntry::default(), Add::add)
    }
}

impl<'a> Sum<&'a UsageEntry> for UsageEntry {
    fn sum<I: Iterator<Item = &'a UsageEntry>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// Format a USD amount with precision that suits its magnitude.
pub fn format_cost(cost: f64) -> String {
    if cost >= 1.0 {
        format!("${:.2}", cost)
    } else if cost >= 0.01 {
        format!("${:.3}", cost)
    } else {
        format!("${:.4}", cost)
    }
}

/// Format a token count with thousands separators.
pub fn format_tokens(tokens: u64) -> String {
    let digits = tokens.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_default_cost() {
        let rates = Rates::default();
        let cost = rates.cost(1_000_000, 1_000_000);
        assert!((cost - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_tokens_prefers_reported_cost() {
        let rates = Rates::default();
        let entry = UsageEntry::from_tokens(1000, 500, Some(0.42), &rates);
        assert_eq!(entry.estimated_cost, 0.42);

        let derived = UsageEntry::from_tokens(1000, 500, None, &rates);
        assert!((derived.estimated_cost - 0.0105).abs() < 1e-12);
    }

    #[test]
    fn test_from_tokens_ignores_nonsense_reported_cost() {
        let rates = Rates::default();
        let entry = UsageEntry::from_tokens(1000, 0, Some(-1.0), &rates);
        assert!((entry.estimated_cost - 0.003).abs() < 1e-12);
    }

    #[test]
    fn test_sum_adds_fields() {
        let a = UsageEntry {
            input_tokens: 10,
            output_tokens: 5,
            estimated_cost: 0.5,
        };
        let b = UsageEntry {
            input_tokens: 1,
            output_tokens: 2,
            estimated_cost: 0.25,
        };
        let total: UsageEntry = [a, b].iter().sum();
        assert_eq!(total.input_tokens, 11);
        assert_eq!(total.output_tokens, 7);
        assert_eq!(total.estimated_cost, 0.75);
        assert_eq!(total.total_tokens(), 18);
    }

    #[test]
    fn test_deserialize_legacy_cost_key() {
        let entry: UsageEntry =
            serde_json::from_str(r#"{"input_tokens": 12, "cost": 0.5}"#).unwrap();
        assert_eq!(entry.input_tokens, 12);
        assert_eq!(entry.output_tokens, 0);
        assert_eq!(entry.estimated_cost, 0.5);
    }

    #[test]
    fn test_format_cost() {
        assert_eq!(format_cost(1.234), "$1.23");
        assert_eq!(format_cost(0.1234), "$0.123");
        assert_eq!(format_cost(0.00123), "$0.0012");
    }

    #[test]
    fn test_format_tokens() {
        assert_eq!(format_tokens(0), "0");
        assert_eq!(format_tokens(999), "999");
        assert_eq!(format_tokens(1234567), "1,234,567");
    }
}
