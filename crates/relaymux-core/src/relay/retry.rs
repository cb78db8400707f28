//! Retry Driver: the attempt-loop state machine described in spec §4.4,
//! expressed as explicit states with a transition function driven by
//! classified errors (rather than ad-hoc conditionals scattered through the
//! orchestrator).
//!
//! The driver is transport-agnostic: callers supply an `attempt` closure
//! that performs one transport round given a chosen channel id and returns
//! `Ok(T)` on success or `Err(ClassifiedError)` on failure. This keeps the
//! state machine itself pure and unit-testable without a real upstream.

use std::collections::HashSet;

use super::classify::{ClassifiedError, ErrorClass};
use super::selector::{Candidate, ChannelId, NoCandidates, SelectionStrategy, select};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Success,
    NoCandidates,
    AttemptsExhausted,
    NonRetriable,
}

#[derive(Debug, Clone)]
pub struct RetryState {
    pub attempts_remaining: u32,
    pub exclusion: HashSet<ChannelId>,
    pub last_error: Option<ClassifiedError>,
    pub current_strategy: SelectionStrategy,
    pub last_failed_channel: Option<ChannelId>,
    pub last_failed_max_tokens: Option<u32>,
}

impl RetryState {
    pub(crate) fn initial(default_budget: u32) -> Self {
        Self {
            attempts_remaining: default_budget,
            exclusion: HashSet::new(),
            last_error: None,
            current_strategy: SelectionStrategy::TopPriority,
            last_failed_channel: None,
            last_failed_max_tokens: None,
        }
    }
}

/// Per-class budget/strategy transition, per the spec's §4.4 table.
/// `candidate_count` is the number of candidates still in the pool after the
/// failing attempt (used by the capacity budget, which ignores `R`).
pub(crate) fn transition(
    error: &ClassifiedError,
    r: u32,
    candidate_count: usize,
) -> (u32, SelectionStrategy) {
    match error.class {
        ErrorClass::RateLimit => (
            if r > 0 { 2 * r } else { 0 },
            SelectionStrategy::LowerTierFirst,
        ),
        ErrorClass::Capacity => (
            candidate_count.saturating_sub(1).max(1) as u32,
            SelectionStrategy::DifferentCapacity,
        ),
        ErrorClass::Transient => (r, SelectionStrategy::DifferentAbility),
        ErrorClass::AuthTransient => (r, SelectionStrategy::TopPriority),
        ErrorClass::AuthFatal | ErrorClass::ClientRequest => (0, SelectionStrategy::TopPriority),
    }
}

pub struct AttemptRecord {
    pub attempt_no: u32,
    pub channel_id: Option<ChannelId>,
    pub strategy: SelectionStrategy,
    pub error: Option<ClassifiedError>,
}

pub struct RetryDriverResult<T> {
    pub outcome: RelayOutcome,
    pub success: Option<T>,
    pub final_error: Option<ClassifiedError>,
    pub attempts: Vec<AttemptRecord>,
    pub exclusion: HashSet<ChannelId>,
}

/// Drives the attempt loop.
///
/// * `default_budget` is `R` (from `RETRY_TIMES`); the initial attempt is
///   always made regardless of budget (budget only gates *retries*).
/// * `pinned` forces `attempts = 0` always (caller opted into a specific
///   channel) per §4.4.
/// * `candidates` is a snapshot from the Ability Index; it must not change
///   across the loop (selection strategies read `candidates.len()`).
/// * `on_failure` is invoked once per failed attempt with the classified
///   error and chosen channel, to apply off-path side effects (suspension,
///   possible auto-disable) — it must not block the retry (spec §4.8).
pub async fn drive<T, F, Fut, S>(
    candidates: &[Candidate],
    default_budget: u32,
    pinned: Option<ChannelId>,
    mut attempt: F,
    mut on_failure: S,
) -> RetryDriverResult<T>
where
    F: FnMut(ChannelId) -> Fut,
    Fut: std::future::Future<Output = Result<T, ClassifiedError>>,
    S: FnMut(ChannelId, &ClassifiedError),
{
    let mut state = RetryState::initial(if pinned.is_some() { 0 } else { default_budget });
    let mut attempts: Vec<AttemptRecord> = Vec::new();
    let mut attempt_no: u32 = 0;

    loop {
        attempt_no += 1;
        let channel_id = if let Some(pin) = pinned {
            Ok(pin)
        } else {
            select(
                candidates,
                &state.exclusion,
                state.current_strategy,
                state.last_failed_channel,
                Some(state.last_failed_max_tokens),
            )
        };

        let channel_id = match channel_id {
            Ok(id) => id,
            Err(NoCandidates) => {
                attempts.push(AttemptRecord {
                    attempt_no,
                    channel_id: None,
                    strategy: state.current_strategy,
                    error: None,
                });
                return RetryDriverResult {
                    outcome: RelayOutcome::NoCandidates,
                    success: None,
                    final_error: state.last_error,
                    attempts,
                    exclusion: state.exclusion,
                };
            }
        };

        match attempt(channel_id).await {
            Ok(value) => {
                attempts.push(AttemptRecord {
                    attempt_no,
                    channel_id: Some(channel_id),
                    strategy: state.current_strategy,
                    error: None,
                });
                return RetryDriverResult {
                    outcome: RelayOutcome::Success,
                    success: Some(value),
                    final_error: None,
                    attempts,
                    exclusion: state.exclusion,
                };
            }
            Err(err) => {
                on_failure(channel_id, &err);
                state.exclusion.insert(channel_id);
                state.last_failed_channel = Some(channel_id);
                state.last_failed_max_tokens = candidates
                    .iter()
                    .find(|c| c.channel_id == channel_id)
                    .and_then(|c| c.max_output_tokens);
                attempts.push(AttemptRecord {
                    attempt_no,
                    channel_id: Some(channel_id),
                    strategy: state.current_strategy,
                    error: Some(err.clone()),
                });

                if !err.class.is_retriable() {
                    state.last_error = Some(err.clone());
                    return RetryDriverResult {
                        outcome: RelayOutcome::NonRetriable,
                        success: None,
                        final_error: Some(err),
                        attempts,
                        exclusion: state.exclusion,
                    };
                }

                let remaining_candidates = candidates
                    .iter()
                    .filter(|c| !state.exclusion.contains(&c.channel_id))
                    .count();
                let (budget, strategy) = transition(&err, default_budget, remaining_candidates);
                state.attempts_remaining = budget;
                state.current_strategy = strategy;
                state.last_error = Some(err.clone());

                if pinned.is_some() || state.attempts_remaining == 0 {
                    return RetryDriverResult {
                        outcome: RelayOutcome::AttemptsExhausted,
                        success: None,
                        final_error: Some(err),
                        attempts,
                        exclusion: state.exclusion,
                    };
                }
                state.attempts_remaining -= 1;
            }
        }
    }
}

/// Rewrites the final rate-limit error into a caller-actionable message that
/// distinguishes "all channels throttled" from "single-channel saturation".
pub fn rate_limit_exhaustion_message(total_candidates: usize, excluded: usize) -> String {
    if excluded >= total_candidates && total_candidates > 0 {
        "all channels for this model are currently rate-limited; retry later".to_string()
    } else {
        "the selected channel is rate-limited; other channels remain available but were not \
         reached within the retry budget"
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn cands(n: usize) -> Vec<Candidate> {
        (1..=n as i64)
            .map(|id| Candidate {
                channel_id: id,
                priority: if id == 1 { 10 } else { 5 },
                max_output_tokens: None,
            })
            .collect()
    }

    fn err(class: ErrorClass) -> ClassifiedError {
        ClassifiedError {
            class,
            status: None,
            message: "boom".into(),
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let result = drive::<(), _, _, _>(
            &cands(3),
            0,
            None,
            |_ch| async { Ok(()) },
            |_ch, _e| {},
        )
        .await;
        assert_eq!(result.outcome, RelayOutcome::Success);
        assert_eq!(result.attempts.len(), 1);
    }

    #[tokio::test]
    async fn client_request_error_does_not_retry() {
        let result = drive::<(), _, _, _>(
            &cands(3),
            5,
            None,
            |_ch| async { Err(err(ErrorClass::ClientRequest)) },
            |_ch, _e| {},
        )
        .await;
        assert_eq!(result.outcome, RelayOutcome::NonRetriable);
        assert_eq!(result.attempts.len(), 1);
    }

    #[tokio::test]
    async fn auth_fatal_does_not_retry() {
        let result = drive::<(), _, _, _>(
            &cands(3),
            5,
            None,
            |_ch| async { Err(err(ErrorClass::AuthFatal)) },
            |_ch, _e| {},
        )
        .await;
        assert_eq!(result.outcome, RelayOutcome::NonRetriable);
        assert_eq!(result.attempts.len(), 1);
    }

    #[tokio::test]
    async fn rate_limit_retries_with_2r_budget_and_succeeds_on_lower_tier() {
        let calls = AtomicU32::new(0);
        let result = drive(
            &cands(3),
            1,
            None,
            |ch| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(err(ErrorClass::RateLimit))
                    } else {
                        Ok(ch)
                    }
                }
            },
            |_ch, _e| {},
        )
        .await;
        assert_eq!(result.outcome, RelayOutcome::Success);
        assert_eq!(result.attempts.len(), 2);
        // second attempt must target the lower-priority tier (channel != 1)
        assert_ne!(result.success.unwrap(), 1);
    }

    #[tokio::test]
    async fn capacity_budget_ignores_r_and_uses_other_channel_count() {
        let result = drive::<(), _, _, _>(
            &cands(4),
            0,
            None,
            |_ch| async { Err(err(ErrorClass::Capacity)) },
            |_ch, _e| {},
        )
        .await;
        // budget = len(candidates)-1 = 3, so initial + 3 retries = 4 attempts,
        // at which point candidates (4) are exhausted -> NoCandidates.
        assert_eq!(result.outcome, RelayOutcome::NoCandidates);
        assert_eq!(result.attempts.len(), 5);
    }

    #[tokio::test]
    async fn pinned_channel_never_retries() {
        let result = drive::<(), _, _, _>(
            &cands(3),
            5,
            Some(2),
            |_ch| async { Err(err(ErrorClass::Transient)) },
            |_ch, _e| {},
        )
        .await;
        assert_eq!(result.outcome, RelayOutcome::AttemptsExhausted);
        assert_eq!(result.attempts.len(), 1);
    }

    #[tokio::test]
    async fn failed_channel_is_excluded_from_subsequent_attempts() {
        let result = drive::<(), _, _, _>(
            &cands(3),
            2,
            None,
            |_ch| async { Err(err(ErrorClass::Transient)) },
            |_ch, _e| {},
        )
        .await;
        let channels: HashSet<_> = result
            .attempts
            .iter()
            .filter_map(|a| a.channel_id)
            .collect();
        // every distinct channel tried appears in the final exclusion set
        for ch in &channels {
            assert!(result.exclusion.contains(ch));
        }
    }

    #[tokio::test]
    async fn exhaustion_message_distinguishes_all_vs_single_channel() {
        assert!(rate_limit_exhaustion_message(3, 3).contains("all channels"));
        assert!(!rate_limit_exhaustion_message(3, 1).contains("all channels"));
    }
}
