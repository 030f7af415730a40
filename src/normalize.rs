//! Metric normalization: scaling and sentinel filtering.

use rust_decimal::{Decimal, RoundingStrategy};

/// Raw value reported by BDCOM OLTs when an optical level is not available.
pub const EPON_NO_SIGNAL: Decimal = Decimal::from_parts(65535, 0, 0, true, 0);

/// `raw * rate`, or `None` if the product overflows.
pub fn scale(raw: Decimal, rate: Decimal) -> Option<Decimal> {
    raw.checked_mul(rate)
}

/// Round half away from zero to an integer.
pub fn round_storage(value: Decimal) -> Decimal {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}

/// Storage text of a scaled value: zero fractional digits.
pub fn storage_text(value: Decimal) -> String {
    round_storage(value).to_string()
}

/// Scales raw samples and drops sentinel markers.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    sentinels: Vec<Decimal>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `value` as "no data".
    pub fn sentinel(mut self, value: Decimal) -> Self {
        self.sentinels.push(value);
        self
    }

    pub fn is_sentinel(&self, raw: Decimal) -> bool {
        self.sentinels.contains(&raw)
    }

    /// Scaled and rounded value, or `None` for sentinels and overflow.
    pub fn normalize(&self, raw: Decimal, rate: Decimal) -> Option<Decimal> {
        if self.is_sentinel(raw) {
            return None;
        }
        let scaled = scale(raw, rate);
        if scaled.is_none() {
            tracing::warn!(%raw, %rate, "Scaled value overflows, dropping");
        }
        scaled.map(round_storage)
    }

    /// Like [`normalize`](Self::normalize) but keeps the fractional part.
    pub fn normalize_exact(&self, raw: Decimal, rate: Decimal) -> Option<Decimal> {
        if self.is_sentinel(raw) {
            return None;
        }
        scale(raw, rate)
    }
}
