//! Ability Index: an in-memory, read-mostly cache over `(group, model) ->
//! ordered channel list`, rebuilt periodically from the persistent ability
//! store. Readers take a snapshot reference (`ArcSwap`); writers swap in a
//! freshly built map on rebuild. The cache is allowed to be stale between
//! rebuilds — the orchestrator's per-request exclusion set covers
//! intra-request correctness (see `relay::retry`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use time::OffsetDateTime;

use super::selector::{Candidate, ChannelId};

#[derive(Debug, Clone)]
pub struct AbilityRow {
    pub group: String,
    pub model: String,
    pub channel_id: ChannelId,
    pub channel_enabled: bool,
    pub ability_enabled: bool,
    pub priority: i32,
    pub max_output_tokens: Option<u32>,
    pub suspend_until: Option<OffsetDateTime>,
}

impl AbilityRow {
    fn is_selectable(&self, now: OffsetDateTime) -> bool {
        self.channel_enabled
            && self.ability_enabled
            && self.suspend_until.is_none_or(|until| until <= now)
    }
}

/// Read access to the persistent ability store, backing the in-memory index.
/// Implemented by `relaymux-storage` in the real process; a test double can
/// hold rows in memory.
#[async_trait::async_trait]
pub trait AbilityStore: Send + Sync {
    async fn load_abilities(&self) -> anyhow::Result<Vec<AbilityRow>>;

    /// Persists `suspend_until` for one ability row. Does not need to touch
    /// the in-memory cache — the index is eventually consistent by design.
    async fn suspend_ability(
        &self,
        group: &str,
        model: &str,
        channel_id: ChannelId,
        until: OffsetDateTime,
    ) -> anyhow::Result<()>;
}

type GroupModelKey = (String, String);

#[derive(Default)]
struct AbilitySnapshot {
    candidates: HashMap<GroupModelKey, Vec<Candidate>>,
}

pub struct AbilityIndex {
    store: Arc<dyn AbilityStore>,
    snapshot: ArcSwap<AbilitySnapshot>,
}

impl AbilityIndex {
    pub fn new(store: Arc<dyn AbilityStore>) -> Self {
        Self {
            store,
            snapshot: ArcSwap::from_pointee(AbilitySnapshot::default()),
        }
    }

    /// Rebuilds the cache from the persistent store. Called at bootstrap, on
    /// the configured `SYNC_FREQUENCY` interval, and on explicit invalidation
    /// after a channel/ability mutation.
    pub async fn rebuild(&self) -> anyhow::Result<()> {
        let rows = self.store.load_abilities().await?;
        let now = OffsetDateTime::now_utc();
        let mut by_key: HashMap<GroupModelKey, Vec<Candidate>> = HashMap::new();
        for row in rows {
            if !row.is_selectable(now) {
                continue;
            }
            by_key
                .entry((row.group.clone(), row.model.clone()))
                .or_default()
                .push(Candidate {
                    channel_id: row.channel_id,
                    priority: row.priority,
                    max_output_tokens: row.max_output_tokens,
                });
        }
        for candidates in by_key.values_mut() {
            candidates.sort_by(|a, b| b.priority.cmp(&a.priority));
        }
        self.snapshot.store(Arc::new(AbilitySnapshot { candidates: by_key }));
        Ok(())
    }

    /// Returns a snapshot of candidates for `(group, model)`. Callers must
    /// not mutate it; empty if no channel applies.
    pub fn candidates(&self, group: &str, model: &str) -> Vec<Candidate> {
        self.snapshot
            .load()
            .candidates
            .get(&(group.to_string(), model.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Writes `suspend_until = now + duration` to the persistent store. Does
    /// NOT update the in-memory cache immediately — see module docs.
    pub async fn suspend(
        &self,
        group: &str,
        model: &str,
        channel_id: ChannelId,
        duration: Duration,
    ) -> anyhow::Result<OffsetDateTime> {
        let until = OffsetDateTime::now_utc()
            + time::Duration::try_from(duration).unwrap_or(time::Duration::ZERO);
        self.store
            .suspend_ability(group, model, channel_id, until)
            .await?;
        Ok(until)
    }

    /// Forces a rebuild on the next call by swapping in an empty snapshot is
    /// wrong (that would make the index appear empty); instead this simply
    /// triggers `rebuild` eagerly. Kept as a distinct method so callers read
    /// as "invalidate-then-rebuild" the way the spec names it.
    pub async fn invalidate(&self) -> anyhow::Result<()> {
        self.rebuild().await
    }

    /// Periodically rebuilds the index every `interval`. Intended to be
    /// spawned once at bootstrap; exits only if the store itself panics.
    pub async fn run_periodic_rebuild(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.rebuild().await {
                tracing::warn!(error = %err, "ability index rebuild failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeStore {
        rows: Mutex<Vec<AbilityRow>>,
    }

    #[async_trait::async_trait]
    impl AbilityStore for FakeStore {
        async fn load_abilities(&self) -> anyhow::Result<Vec<AbilityRow>> {
            Ok(self.rows.lock().unwrap().clone())
        }

        async fn suspend_ability(
            &self,
            group: &str,
            model: &str,
            channel_id: ChannelId,
            until: OffsetDateTime,
        ) -> anyhow::Result<()> {
            let mut rows = self.rows.lock().unwrap();
            if let Some(row) = rows
                .iter_mut()
                .find(|r| r.group == group && r.model == model && r.channel_id == channel_id)
            {
                row.suspend_until = Some(until);
            }
            Ok(())
        }
    }

    fn row(channel_id: ChannelId, priority: i32) -> AbilityRow {
        AbilityRow {
            group: "default".into(),
            model: "gpt-4o".into(),
            channel_id,
            channel_enabled: true,
            ability_enabled: true,
            priority,
            max_output_tokens: None,
            suspend_until: None,
        }
    }

    #[tokio::test]
    async fn candidates_sorted_by_priority_descending() {
        let store = Arc::new(FakeStore {
            rows: Mutex::new(vec![row(1, 5), row(2, 10), row(3, 1)]),
        });
        let index = AbilityIndex::new(store);
        index.rebuild().await.unwrap();
        let candidates = index.candidates("default", "gpt-4o");
        assert_eq!(
            candidates.iter().map(|c| c.channel_id).collect::<Vec<_>>(),
            vec![2, 1, 3]
        );
    }

    #[tokio::test]
    async fn suspended_or_disabled_rows_are_excluded() {
        let mut suspended = row(1, 10);
        suspended.suspend_until = Some(OffsetDateTime::now_utc() + time::Duration::hours(1));
        let mut disabled = row(2, 9);
        disabled.ability_enabled = false;
        let active = row(3, 8);
        let store = Arc::new(FakeStore {
            rows: Mutex::new(vec![suspended, disabled, active]),
        });
        let index = AbilityIndex::new(store);
        index.rebuild().await.unwrap();
        let candidates = index.candidates("default", "gpt-4o");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].channel_id, 3);
    }

    #[tokio::test]
    async fn empty_when_no_channel_applies() {
        let store = Arc::new(FakeStore {
            rows: Mutex::new(vec![]),
        });
        let index = AbilityIndex::new(store);
        index.rebuild().await.unwrap();
        assert!(index.candidates("default", "gpt-4o").is_empty());
    }

    #[tokio::test]
    async fn suspend_writes_through_without_touching_cache() {
        let store = Arc::new(FakeStore {
            rows: Mutex::new(vec![row(1, 10)]),
        });
        let index = AbilityIndex::new(store);
        index.rebuild().await.unwrap();
        assert_eq!(index.candidates("default", "gpt-4o").len(), 1);

        index
            .suspend("default", "gpt-4o", 1, Duration::from_secs(60))
            .await
            .unwrap();
        // Cache is stale until the next rebuild.
        assert_eq!(index.candidates("default", "gpt-4o").len(), 1);

        index.rebuild().await.unwrap();
        assert!(index.candidates("default", "gpt-4o").is_empty());
    }
}
