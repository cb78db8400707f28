//! Channel Selector: picks a channel id out of an ordered candidate list.
//!
//! Pure — candidates are supplied by the caller (normally a snapshot from the
//! Ability Index, already sorted by priority descending) together with the
//! per-request exclusion set. Tie-breaking within a priority tier is uniform
//! random, matching the source behaviour called out in the spec's open
//! questions (fairness over a load window is explicitly not guaranteed).

use std::collections::HashSet;

use rand::Rng;
use rand::seq::IndexedRandom;

pub type ChannelId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionStrategy {
    TopPriority,
    MinMaxTokensWithinTop,
    LowerTierFirst,
    DifferentCapacity,
    DifferentAbility,
}

#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub channel_id: ChannelId,
    pub priority: i32,
    /// Configured per-model max output tokens; `None` means unlimited.
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoCandidates;

/// Groups candidates into priority tiers, highest first, each tier already
/// filtered against the exclusion set by the caller of [`select`].
fn tiers(candidates: &[Candidate]) -> Vec<Vec<Candidate>> {
    let mut sorted = candidates.to_vec();
    sorted.sort_by(|a, b| b.priority.cmp(&a.priority));
    let mut out: Vec<Vec<Candidate>> = Vec::new();
    for c in sorted {
        match out.last_mut() {
            Some(tier) if tier[0].priority == c.priority => tier.push(c),
            _ => out.push(vec![c]),
        }
    }
    out
}

fn pick_random(tier: &[Candidate], rng: &mut impl Rng) -> ChannelId {
    tier.choose(rng)
        .expect("tier is never empty by construction")
        .channel_id
}

/// Select a channel among `candidates`, honoring `exclusion` and `strategy`.
/// `failed_channel` and `failed_max_tokens` describe the most recently failed
/// attempt, used by `DifferentCapacity` and `DifferentAbility`.
pub fn select(
    candidates: &[Candidate],
    exclusion: &HashSet<ChannelId>,
    strategy: SelectionStrategy,
    failed_channel: Option<ChannelId>,
    failed_max_tokens: Option<Option<u32>>,
) -> Result<ChannelId, NoCandidates> {
    select_with_rng(
        candidates,
        exclusion,
        strategy,
        failed_channel,
        failed_max_tokens,
        &mut rand::rng(),
    )
}

pub fn select_with_rng(
    candidates: &[Candidate],
    exclusion: &HashSet<ChannelId>,
    strategy: SelectionStrategy,
    failed_channel: Option<ChannelId>,
    failed_max_tokens: Option<Option<u32>>,
    rng: &mut impl Rng,
) -> Result<ChannelId, NoCandidates> {
    let remaining: Vec<Candidate> = candidates
        .iter()
        .copied()
        .filter(|c| !exclusion.contains(&c.channel_id))
        .collect();
    if remaining.is_empty() {
        return Err(NoCandidates);
    }
    let tiers = tiers(&remaining);

    match strategy {
        SelectionStrategy::TopPriority => Ok(pick_random(&tiers[0], rng)),

        SelectionStrategy::MinMaxTokensWithinTop => {
            let top = &tiers[0];
            let min = top
                .iter()
                .map(|c| c.max_output_tokens.unwrap_or(u32::MAX))
                .min()
                .unwrap_or(u32::MAX);
            let narrowed: Vec<Candidate> = top
                .iter()
                .copied()
                .filter(|c| c.max_output_tokens.unwrap_or(u32::MAX) == min)
                .collect();
            Ok(pick_random(&narrowed, rng))
        }

        SelectionStrategy::LowerTierFirst => {
            if tiers.len() > 1 {
                Ok(pick_random(&tiers[1], rng))
            } else {
                Ok(pick_random(&tiers[0], rng))
            }
        }

        SelectionStrategy::DifferentCapacity => {
            let failed_tokens = failed_max_tokens.unwrap_or(None);
            let mut preferred: Vec<Candidate> = remaining
                .iter()
                .copied()
                .filter(|c| c.max_output_tokens.is_none() || c.max_output_tokens != failed_tokens)
                .collect();
            if preferred.is_empty() {
                preferred = remaining.clone();
            }
            preferred.sort_by(|a, b| b.priority.cmp(&a.priority));
            let top_priority = preferred[0].priority;
            let top: Vec<Candidate> = preferred
                .into_iter()
                .filter(|c| c.priority == top_priority)
                .collect();
            Ok(pick_random(&top, rng))
        }

        SelectionStrategy::DifferentAbility => {
            let others: Vec<Candidate> = remaining
                .iter()
                .copied()
                .filter(|c| Some(c.channel_id) != failed_channel)
                .collect();
            if !others.is_empty() {
                let tiers = tiers(&others);
                Ok(pick_random(&tiers[0], rng))
            } else {
                Ok(pick_random(&tiers[0], rng))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn cands() -> Vec<Candidate> {
        vec![
            Candidate {
                channel_id: 1,
                priority: 10,
                max_output_tokens: Some(4096),
            },
            Candidate {
                channel_id: 2,
                priority: 10,
                max_output_tokens: Some(8192),
            },
            Candidate {
                channel_id: 3,
                priority: 5,
                max_output_tokens: None,
            },
        ]
    }

    #[test]
    fn top_priority_picks_among_highest_tier_only() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            let chosen = select_with_rng(
                &cands(),
                &HashSet::new(),
                SelectionStrategy::TopPriority,
                None,
                None,
                &mut rng,
            )
            .unwrap();
            assert!(chosen == 1 || chosen == 2);
        }
    }

    #[test]
    fn lower_tier_first_skips_top_tier_when_available() {
        let mut rng = StdRng::seed_from_u64(2);
        let chosen = select_with_rng(
            &cands(),
            &HashSet::new(),
            SelectionStrategy::LowerTierFirst,
            None,
            None,
            &mut rng,
        )
        .unwrap();
        assert_eq!(chosen, 3);
    }

    #[test]
    fn lower_tier_first_falls_back_to_top_when_no_lower_tier() {
        let single_tier = vec![Candidate {
            channel_id: 9,
            priority: 1,
            max_output_tokens: None,
        }];
        let mut rng = StdRng::seed_from_u64(3);
        let chosen = select_with_rng(
            &single_tier,
            &HashSet::new(),
            SelectionStrategy::LowerTierFirst,
            None,
            None,
            &mut rng,
        )
        .unwrap();
        assert_eq!(chosen, 9);
    }

    #[test]
    fn min_max_tokens_prefers_smallest_within_top_tier() {
        let mut rng = StdRng::seed_from_u64(4);
        let chosen = select_with_rng(
            &cands(),
            &HashSet::new(),
            SelectionStrategy::MinMaxTokensWithinTop,
            None,
            None,
            &mut rng,
        )
        .unwrap();
        assert_eq!(chosen, 1);
    }

    #[test]
    fn different_capacity_avoids_matching_max_tokens() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..20 {
            let chosen = select_with_rng(
                &cands(),
                &HashSet::new(),
                SelectionStrategy::DifferentCapacity,
                Some(1),
                Some(Some(4096)),
                &mut rng,
            )
            .unwrap();
            assert_ne!(chosen, 1);
        }
    }

    #[test]
    fn different_ability_excludes_failed_channel_first() {
        let mut rng = StdRng::seed_from_u64(6);
        for _ in 0..20 {
            let chosen = select_with_rng(
                &cands(),
                &HashSet::new(),
                SelectionStrategy::DifferentAbility,
                Some(1),
                None,
                &mut rng,
            )
            .unwrap();
            assert_ne!(chosen, 1);
        }
    }

    #[test]
    fn exhausted_candidates_yield_no_candidates_error() {
        let mut exclusion = HashSet::new();
        exclusion.insert(1);
        exclusion.insert(2);
        exclusion.insert(3);
        let err = select(&cands(), &exclusion, SelectionStrategy::TopPriority, None, None);
        assert_eq!(err, Err(NoCandidates));
    }
}
