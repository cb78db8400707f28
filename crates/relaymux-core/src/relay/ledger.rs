//! Quota Ledger: the three-phase pre-consume / settle / refund lifecycle
//! around every billable relay (spec §4.7), plus the pricing-resolution walk
//! and cost formula it relies on.
//!
//! The ledger is expressed against a small `QuotaStore` trait so the
//! arithmetic and invariant checks are unit-testable without a database; the
//! real implementation backs onto `relaymux-storage`'s per-row atomic
//! updates.

use super::pricing::{ModelPricing, UNPRICED_FALLBACK};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaSubject {
    Token(i64),
    User(i64),
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("quota-exceeded")]
    QuotaExceeded,
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Backing store for quota balances. `unlimited` subjects skip deduction but
/// the attempt is still logged by the caller.
#[async_trait::async_trait]
pub trait QuotaStore: Send + Sync {
    async fn is_unlimited(&self, subject: QuotaSubject) -> anyhow::Result<bool>;

    /// Atomically deducts `amount` (in USD-equivalent quota units) from the
    /// subject's remaining balance. Returns `Err(QuotaExceeded)` without
    /// mutating state if the balance would go negative.
    async fn try_deduct(&self, subject: QuotaSubject, amount: f64) -> Result<(), LedgerError>;

    /// Applies `delta` (positive or negative) to both the remaining and
    /// used-quota counters unconditionally — used by settle/refund, which
    /// must not fail the request even if it drives the balance negative
    /// (e.g. underestimated pre-consume).
    async fn apply_delta(&self, subject: QuotaSubject, delta: f64) -> anyhow::Result<()>;
}

/// Pricing overrides attached to the chosen channel for a given model, and
/// the adapter's own declared pricing, per the four-layer resolution order.
#[derive(Debug, Clone, Default)]
pub struct PricingContext<'a> {
    pub channel_override: Option<ModelPricing>,
    pub adapter_declared: Option<ModelPricing>,
    pub global_map: Option<&'a std::collections::HashMap<&'static str, ModelPricing>>,
    pub model: &'a str,
}

/// Resolves the pricing to use for one relay, first-match-wins across the
/// four layers named in spec §4.7.
pub fn resolve_pricing(ctx: &PricingContext<'_>) -> ModelPricing {
    if let Some(p) = ctx.channel_override {
        return p;
    }
    if let Some(p) = ctx.adapter_declared {
        return p;
    }
    if let Some(map) = ctx.global_map {
        if let Some(p) = map.get(ctx.model) {
            return *p;
        }
    }
    UNPRICED_FALLBACK
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UsageTokens {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_read: u64,
    pub cache_write_5m: u64,
    pub cache_write_1h: u64,
}

/// Implements the cost formula from spec §4.7, including the clamp on
/// `normal_input` and the structured-output surcharge.
pub fn compute_cost(
    usage: &UsageTokens,
    pricing: &ModelPricing,
    group_multiplier: f64,
    structured_output: bool,
) -> f64 {
    let per_token = |price_per_million: f64| price_per_million / 1_000_000.0;

    let cache_consumed = usage
        .cached_read
        .saturating_add(usage.cache_write_5m)
        .saturating_add(usage.cache_write_1h);
    let normal_input = usage.prompt_tokens.saturating_sub(cache_consumed);

    let cached_input_rate = pricing
        .cached_input_price_per_million
        .unwrap_or(pricing.input_price_per_million);
    let write_5m_rate = pricing
        .cache_write_5m_price_per_million
        .unwrap_or(pricing.input_price_per_million);
    let write_1h_rate = pricing
        .cache_write_1h_price_per_million
        .unwrap_or(pricing.input_price_per_million);

    let base = normal_input as f64 * per_token(pricing.input_price_per_million)
        + usage.cached_read as f64 * per_token(cached_input_rate)
        + usage.completion_tokens as f64 * per_token(pricing.output_price_per_million)
        + usage.cache_write_5m as f64 * per_token(write_5m_rate)
        + usage.cache_write_1h as f64 * per_token(write_1h_rate);

    let mut cost = base + group_multiplier * base;

    if structured_output {
        let tools_cost =
            (usage.completion_tokens as f64 * 0.25 * per_token(pricing.input_price_per_million))
                .ceil();
        cost += tools_cost;
    }

    cost
}

/// A conservative pre-consume estimate: prompt tokens at the full input
/// rate, with no caching or output credit — the true cost at settlement is
/// always `<=` this for well-behaved responses, but settlement makes up the
/// difference either way.
pub fn estimate_preconsume(prompt_tokens: u64, pricing: &ModelPricing) -> f64 {
    prompt_tokens as f64 * pricing.input_price_per_million / 1_000_000.0
}

pub struct QuotaLedger<S: QuotaStore> {
    store: S,
}

#[derive(Debug, Clone, Copy)]
pub struct Reservation {
    pub subject: QuotaSubject,
    pub preconsumed: f64,
}

impl<S: QuotaStore> QuotaLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Phase 1. Returns `None` when the subject is unlimited (attempt still
    /// proceeds, no reservation to settle/refund against later) — callers
    /// must still log the attempt themselves.
    pub async fn pre_consume(
        &self,
        subject: QuotaSubject,
        prompt_tokens: u64,
        pricing: &ModelPricing,
    ) -> Result<Option<Reservation>, LedgerError> {
        if self.store.is_unlimited(subject).await? {
            return Ok(None);
        }
        let amount = estimate_preconsume(prompt_tokens, pricing);
        self.store.try_deduct(subject, amount).await?;
        Ok(Some(Reservation {
            subject,
            preconsumed: amount,
        }))
    }

    /// Phase 2. `reservation` is `None` for unlimited subjects, in which case
    /// settlement is a no-op (nothing was reserved to true up).
    pub async fn settle(
        &self,
        reservation: Option<Reservation>,
        usage: &UsageTokens,
        pricing: &ModelPricing,
        group_multiplier: f64,
        structured_output: bool,
    ) -> anyhow::Result<f64> {
        let Some(reservation) = reservation else {
            return Ok(0.0);
        };
        let actual = compute_cost(usage, pricing, group_multiplier, structured_output);
        let delta = actual - reservation.preconsumed;
        self.store.apply_delta(reservation.subject, delta).await?;
        Ok(actual)
    }

    /// Phase 3. No-op for unlimited subjects.
    pub async fn refund(&self, reservation: Option<Reservation>) -> anyhow::Result<()> {
        let Some(reservation) = reservation else {
            return Ok(());
        };
        self.store
            .apply_delta(reservation.subject, -reservation.preconsumed)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeStore {
        balance: Mutex<f64>,
        used: Mutex<f64>,
        unlimited: bool,
    }

    #[async_trait::async_trait]
    impl QuotaStore for FakeStore {
        async fn is_unlimited(&self, _subject: QuotaSubject) -> anyhow::Result<bool> {
            Ok(self.unlimited)
        }

        async fn try_deduct(&self, _subject: QuotaSubject, amount: f64) -> Result<(), LedgerError> {
            let mut balance = self.balance.lock().unwrap();
            if *balance < amount {
                return Err(LedgerError::QuotaExceeded);
            }
            *balance -= amount;
            *self.used.lock().unwrap() += amount;
            Ok(())
        }

        async fn apply_delta(&self, _subject: QuotaSubject, delta: f64) -> anyhow::Result<()> {
            *self.balance.lock().unwrap() -= delta;
            *self.used.lock().unwrap() += delta;
            Ok(())
        }
    }

    fn pricing() -> ModelPricing {
        ModelPricing::new(3.0, 15.0).with_cache(0.3, 3.75, 6.0)
    }

    #[test]
    fn cost_formula_clamps_normal_input_to_zero() {
        let usage = UsageTokens {
            prompt_tokens: 100,
            completion_tokens: 0,
            cached_read: 60,
            cache_write_5m: 50,
            cache_write_1h: 0,
        };
        // cached_read + cache_write_5m (110) exceeds prompt_tokens (100):
        // normal_input must clamp to 0, not underflow.
        let cost = compute_cost(&usage, &pricing(), 0.0, false);
        assert!(cost.is_finite());
        assert!(cost > 0.0);
    }

    #[test]
    fn structured_output_adds_tools_surcharge() {
        let usage = UsageTokens {
            prompt_tokens: 1000,
            completion_tokens: 400,
            ..Default::default()
        };
        let p = pricing();
        let without = compute_cost(&usage, &p, 0.0, false);
        let with = compute_cost(&usage, &p, 0.0, true);
        assert!(with > without);
    }

    #[test]
    fn group_multiplier_scales_cost() {
        let usage = UsageTokens {
            prompt_tokens: 1000,
            completion_tokens: 100,
            ..Default::default()
        };
        let p = pricing();
        let base = compute_cost(&usage, &p, 0.0, false);
        let doubled = compute_cost(&usage, &p, 1.0, false);
        assert!((doubled - 2.0 * base).abs() < 1e-9);
    }

    #[tokio::test]
    async fn conservation_invariant_holds_across_settle() {
        let store = FakeStore {
            balance: Mutex::new(10.0),
            used: Mutex::new(0.0),
            unlimited: false,
        };
        let ledger = QuotaLedger::new(store);
        let p = pricing();
        let reservation = ledger
            .pre_consume(QuotaSubject::Token(1), 1_000_000, &p)
            .await
            .unwrap();
        let balance_after_preconsume = *ledger.store.balance.lock().unwrap();
        assert!((balance_after_preconsume - 7.0).abs() < 1e-9);

        let usage = UsageTokens {
            prompt_tokens: 1_000_000,
            completion_tokens: 100_000,
            ..Default::default()
        };
        let actual = ledger
            .settle(reservation, &usage, &p, 0.0, false)
            .await
            .unwrap();
        let balance_after_settle = *ledger.store.balance.lock().unwrap();
        // remaining_initial(10) - actual == remaining_final
        assert!((10.0 - actual - balance_after_settle).abs() < 1e-6);
    }

    #[tokio::test]
    async fn refund_restores_preconsumed_amount_exactly() {
        let store = FakeStore {
            balance: Mutex::new(5.0),
            used: Mutex::new(0.0),
            unlimited: false,
        };
        let ledger = QuotaLedger::new(store);
        let p = pricing();
        let reservation = ledger
            .pre_consume(QuotaSubject::Token(1), 500_000, &p)
            .await
            .unwrap();
        ledger.refund(reservation).await.unwrap();
        assert!((*ledger.store.balance.lock().unwrap() - 5.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn quota_exceeded_rejects_before_transport() {
        let store = FakeStore {
            balance: Mutex::new(0.01),
            used: Mutex::new(0.0),
            unlimited: false,
        };
        let ledger = QuotaLedger::new(store);
        let result = ledger
            .pre_consume(QuotaSubject::Token(1), 1_000_000, &pricing())
            .await;
        assert!(matches!(result, Err(LedgerError::QuotaExceeded)));
    }

    #[tokio::test]
    async fn unlimited_subjects_skip_deduction() {
        let store = FakeStore {
            balance: Mutex::new(0.0),
            used: Mutex::new(0.0),
            unlimited: true,
        };
        let ledger = QuotaLedger::new(store);
        let reservation = ledger
            .pre_consume(QuotaSubject::Token(1), 1_000_000, &pricing())
            .await
            .unwrap();
        assert!(reservation.is_none());
    }

    #[test]
    fn pricing_resolution_prefers_channel_override() {
        let global = std::collections::HashMap::from([("gpt-4o", ModelPricing::new(1.0, 1.0))]);
        let ctx = PricingContext {
            channel_override: Some(ModelPricing::new(99.0, 99.0)),
            adapter_declared: Some(ModelPricing::new(2.0, 2.0)),
            global_map: Some(&global),
            model: "gpt-4o",
        };
        assert_eq!(resolve_pricing(&ctx).input_price_per_million, 99.0);
    }

    #[test]
    fn pricing_resolution_falls_through_to_global_default() {
        let ctx = PricingContext {
            channel_override: None,
            adapter_declared: None,
            global_map: None,
            model: "unknown-model",
        };
        assert_eq!(resolve_pricing(&ctx), UNPRICED_FALLBACK);
    }
}
