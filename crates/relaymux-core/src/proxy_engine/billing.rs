//! Threads the Quota Ledger's three-phase lifecycle through the handlers
//! that produce (or fail to produce) usage for a generate relay. Exactly one
//! of `settle`/`refund` runs per request that reached `pre_consume` — every
//! terminal branch in `proxy_engine` must call one or the other.

use std::sync::Arc;

use relaymux_provider_core::UsageSummary;

use crate::proxy_engine::relay_adapters::LiveQuotaStore;
use crate::relay::ledger::{QuotaLedger, Reservation, UsageTokens};
use crate::relay::pricing::ModelPricing;

#[derive(Clone)]
pub struct BillingContext {
    pub ledger: Arc<QuotaLedger<LiveQuotaStore>>,
    pub reservation: Option<Reservation>,
    pub pricing: ModelPricing,
    pub group_multiplier: f64,
}

fn usage_tokens(usage: &UsageSummary) -> UsageTokens {
    UsageTokens {
        prompt_tokens: usage.input_tokens.unwrap_or(0) as u64,
        completion_tokens: usage.output_tokens.unwrap_or(0) as u64,
        cached_read: usage.cache_read_input_tokens.unwrap_or(0) as u64,
        cache_write_5m: usage.cache_creation_input_tokens.unwrap_or(0) as u64,
        cache_write_1h: 0,
    }
}

/// Settles against known usage, or refunds the reservation if usage could
/// not be determined (e.g. the stream closed before any usage event).
pub async fn settle_or_refund(billing: Option<BillingContext>, usage: Option<&UsageSummary>) {
    let Some(billing) = billing else {
        return;
    };
    let result = match usage {
        Some(usage) => {
            let tokens = usage_tokens(usage);
            billing
                .ledger
                .settle(
                    billing.reservation,
                    &tokens,
                    &billing.pricing,
                    billing.group_multiplier,
                    false,
                )
                .await
                .map(|_| ())
        }
        None => billing.ledger.refund(billing.reservation).await,
    };
    if let Err(err) = result {
        tracing::warn!(error = %err, "quota ledger settle/refund failed");
    }
}

/// Refunds a pre-consumed reservation on a failure path where no attempt
/// reached the transport stage, or the terminal failure carries no usage.
pub async fn refund(billing: Option<BillingContext>) {
    let Some(billing) = billing else {
        return;
    };
    if let Err(err) = billing.ledger.refund(billing.reservation).await {
        tracing::warn!(error = %err, "quota ledger refund failed");
    }
}
