//! Adapters binding the spec's relay pipeline (`crate::relay`) onto this
//! process's actual state: the in-memory snapshot for reads, and
//! `relaymux-storage` for the writes that must survive a restart.
//!
//! `SnapshotAbilityStore` synthesizes one ability row per enabled credential
//! (this schema partitions credentials per-provider, not per-model, so every
//! credential under a provider is bucketed under `(group="default",
//! model=<provider_name>)`). `LiveQuotaStore` keeps a write-through cache of
//! per-user-key quota balances seeded from `user_keys.settings`.

use std::collections::HashMap;
use std::sync::Arc;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::RwLock;

use crate::relay::ability::{AbilityRow, AbilityStore};
use crate::relay::ledger::{LedgerError, QuotaStore, QuotaSubject};
use crate::relay::selector::ChannelId;
use crate::state::AppState;

pub struct SnapshotAbilityStore {
    state: Arc<AppState>,
    storage: Arc<dyn relaymux_storage::Storage>,
}

impl SnapshotAbilityStore {
    pub fn new(state: Arc<AppState>, storage: Arc<dyn relaymux_storage::Storage>) -> Self {
        Self { state, storage }
    }
}

#[async_trait::async_trait]
impl AbilityStore for SnapshotAbilityStore {
    async fn load_abilities(&self) -> anyhow::Result<Vec<AbilityRow>> {
        let snap = self.state.snapshot.load();
        let provider_names: HashMap<i64, String> = snap
            .providers
            .iter()
            .map(|p| (p.id, p.name.clone()))
            .collect();

        let mut rows = Vec::with_capacity(snap.credentials.len());
        for cred in snap.credentials.iter() {
            if !cred.enabled {
                continue;
            }
            let Some(provider_name) = provider_names.get(&cred.provider_id) else {
                continue;
            };
            let priority = cred
                .settings_json
                .get("priority")
                .and_then(|v| v.as_i64())
                .unwrap_or(0) as i32;
            let max_output_tokens = cred
                .settings_json
                .get("max_output_tokens")
                .and_then(|v| v.as_u64())
                .map(|v| v as u32);
            let suspend_until = cred
                .settings_json
                .get("suspend_until")
                .and_then(|v| v.as_str())
                .and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok());
            rows.push(AbilityRow {
                group: "default".to_string(),
                model: provider_name.clone(),
                channel_id: cred.id,
                channel_enabled: true,
                ability_enabled: true,
                priority,
                max_output_tokens,
                suspend_until,
            });
        }
        Ok(rows)
    }

    async fn suspend_ability(
        &self,
        _group: &str,
        _model: &str,
        channel_id: ChannelId,
        until: OffsetDateTime,
    ) -> anyhow::Result<()> {
        let snap = self.state.snapshot.load();
        let Some(row) = snap.credentials.iter().find(|c| c.id == channel_id) else {
            return Ok(());
        };
        let mut settings = row.settings_json.clone();
        let until_str = until
            .format(&Rfc3339)
            .unwrap_or_else(|_| until.unix_timestamp().to_string());
        match settings.as_object_mut() {
            Some(obj) => {
                obj.insert("suspend_until".to_string(), serde_json::json!(until_str));
            }
            None => {
                settings = serde_json::json!({ "suspend_until": until_str });
            }
        }
        let name = row.name.clone();
        let secret_json = row.secret_json.clone();
        self.storage
            .update_credential(channel_id, name.as_deref(), &settings, &secret_json)
            .await?;
        self.state
            .apply_credential_update(channel_id, name, settings, secret_json)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct QuotaCacheEntry {
    unlimited: bool,
    remaining: f64,
    used: f64,
}

pub struct LiveQuotaStore {
    state: Arc<AppState>,
    storage: Arc<dyn relaymux_storage::Storage>,
    cache: RwLock<HashMap<i64, QuotaCacheEntry>>,
}

impl LiveQuotaStore {
    pub fn new(state: Arc<AppState>, storage: Arc<dyn relaymux_storage::Storage>) -> Self {
        let mut cache = HashMap::new();
        for key in state.snapshot.load().user_keys.iter() {
            cache.insert(key.id, Self::entry_from_settings(&key.settings_json));
        }
        Self {
            state,
            storage,
            cache: RwLock::new(cache),
        }
    }

    fn entry_from_settings(settings: &serde_json::Value) -> QuotaCacheEntry {
        let unlimited = settings
            .get("unlimited")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        let remaining = settings
            .get("quota_remaining")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        let used = settings
            .get("quota_used")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        QuotaCacheEntry {
            unlimited,
            remaining,
            used,
        }
    }

    fn settings_from_entry(entry: &QuotaCacheEntry) -> serde_json::Value {
        serde_json::json!({
            "unlimited": entry.unlimited,
            "quota_remaining": entry.remaining,
            "quota_used": entry.used,
        })
    }

    fn subject_key(subject: QuotaSubject) -> i64 {
        match subject {
            QuotaSubject::Token(id) | QuotaSubject::User(id) => id,
        }
    }

    async fn write_through(&self, user_key_id: i64, entry: QuotaCacheEntry) -> anyhow::Result<()> {
        let settings = Self::settings_from_entry(&entry);
        self.storage
            .update_user_key_settings(user_key_id, &settings)
            .await?;
        self.state.apply_user_key_settings(user_key_id, settings);
        Ok(())
    }
}

#[async_trait::async_trait]
impl QuotaStore for LiveQuotaStore {
    async fn is_unlimited(&self, subject: QuotaSubject) -> anyhow::Result<bool> {
        let key = Self::subject_key(subject);
        let cache = self.cache.read().await;
        Ok(cache.get(&key).is_none_or(|e| e.unlimited))
    }

    async fn try_deduct(&self, subject: QuotaSubject, amount: f64) -> Result<(), LedgerError> {
        let key = Self::subject_key(subject);
        let entry = {
            let mut cache = self.cache.write().await;
            let entry = cache.entry(key).or_insert(QuotaCacheEntry {
                unlimited: true,
                remaining: 0.0,
                used: 0.0,
            });
            if entry.unlimited {
                return Ok(());
            }
            if entry.remaining < amount {
                return Err(LedgerError::QuotaExceeded);
            }
            entry.remaining -= amount;
            entry.used += amount;
            *entry
        };
        self.write_through(key, entry).await?;
        Ok(())
    }

    async fn apply_delta(&self, subject: QuotaSubject, delta: f64) -> anyhow::Result<()> {
        let key = Self::subject_key(subject);
        let entry = {
            let mut cache = self.cache.write().await;
            let entry = cache.entry(key).or_insert(QuotaCacheEntry {
                unlimited: true,
                remaining: 0.0,
                used: 0.0,
            });
            if entry.unlimited {
                return Ok(());
            }
            entry.remaining -= delta;
            entry.used += delta;
            *entry
        };
        self.write_through(key, entry).await?;
        Ok(())
    }
}
