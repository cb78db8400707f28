//! Per-model pricing table backing the Quota Ledger's cost formula (spec
//! §4.7). Resolution order (first match wins): per-channel model override,
//! per-channel wildcard override, global per-model table, global default
//! rate. The table itself only carries prices; the resolution walk lives in
//! `ledger::resolve_pricing`.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_price_per_million: f64,
    pub output_price_per_million: f64,
    pub cached_input_price_per_million: Option<f64>,
    pub cache_write_5m_price_per_million: Option<f64>,
    pub cache_write_1h_price_per_million: Option<f64>,
}

impl ModelPricing {
    pub const fn new(input: f64, output: f64) -> Self {
        Self {
            input_price_per_million: input,
            output_price_per_million: output,
            cached_input_price_per_million: None,
            cache_write_5m_price_per_million: None,
            cache_write_1h_price_per_million: None,
        }
    }

    pub const fn with_cache(
        mut self,
        cached_input: f64,
        write_5m: f64,
        write_1h: f64,
    ) -> Self {
        self.cached_input_price_per_million = Some(cached_input);
        self.cache_write_5m_price_per_million = Some(write_5m);
        self.cache_write_1h_price_per_million = Some(write_1h);
        self
    }
}

/// Built-in fallback table covering the common frontier models, used when
/// neither a channel override nor an admin-configured global entry applies.
/// Prices are USD per million tokens and are illustrative defaults — real
/// deployments are expected to override them via the global pricing map.
pub fn builtin_table() -> HashMap<&'static str, ModelPricing> {
    let mut m = HashMap::new();
    m.insert(
        "claude-3-5-sonnet",
        ModelPricing::new(3.0, 15.0).with_cache(0.3, 3.75, 6.0),
    );
    m.insert(
        "claude-3-opus",
        ModelPricing::new(15.0, 75.0).with_cache(1.5, 18.75, 30.0),
    );
    m.insert(
        "claude-3-haiku",
        ModelPricing::new(0.25, 1.25).with_cache(0.03, 0.3, 0.5),
    );
    m.insert("gpt-4o", ModelPricing::new(2.5, 10.0).with_cache(1.25, 2.5, 2.5));
    m.insert("gpt-4o-mini", ModelPricing::new(0.15, 0.6).with_cache(0.075, 0.15, 0.15));
    m.insert("gpt-4-turbo", ModelPricing::new(10.0, 30.0));
    m.insert("gemini-1.5-pro", ModelPricing::new(1.25, 5.0));
    m.insert("gemini-1.5-flash", ModelPricing::new(0.075, 0.3));
    m
}

/// Used when no table entry, override, or global default applies. Chosen
/// deliberately high so an unpriced model fails loud in usage reports rather
/// than relaying for free.
pub const UNPRICED_FALLBACK: ModelPricing = ModelPricing::new(10.0, 30.0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_has_cache_tiers_for_claude() {
        let table = builtin_table();
        let sonnet = table.get("claude-3-5-sonnet").unwrap();
        assert!(sonnet.cached_input_price_per_million.is_some());
        assert!(sonnet.cache_write_5m_price_per_million.is_some());
        assert!(sonnet.cache_write_1h_price_per_million.is_some());
    }

    #[test]
    fn gemini_entries_have_no_cache_pricing() {
        let table = builtin_table();
        let flash = table.get("gemini-1.5-flash").unwrap();
        assert!(flash.cached_input_price_per_million.is_none());
    }
}
