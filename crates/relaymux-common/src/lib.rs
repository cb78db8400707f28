use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum GlobalConfigError {
    #[error("missing required global config field: {0}")]
    MissingField(&'static str),
}

/// Final, merged global configuration used by the running process.
///
/// Merge order (after DB connection): CLI > ENV > DB, then persist back to DB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub host: String,
    pub port: u16,
    /// Stored as a hash (not plaintext).
    pub admin_key_hash: String,
    /// Optional outbound proxy (for upstream egress).
    pub proxy: Option<String>,
    /// Database DSN used for this process.
    pub dsn: String,
    /// Whether to redact sensitive fields in emitted events.
    pub event_redact_sensitive: bool,
    /// Relay pipeline tuning: retry budgets, suspension windows, ledger
    /// multipliers. Kept on the same hot-swappable snapshot as the rest of
    /// the process configuration.
    pub relay: RelayConfig,
}

/// Tuning knobs for the relay pipeline (Ability Index, Retry Driver, Quota
/// Ledger). All are read from environment variables at bootstrap and carried
/// on `GlobalConfig` so the relay components can read them off the same
/// `ArcSwap` snapshot as everything else.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// `RETRY_TIMES` — base retry budget `R`.
    pub retry_times: u32,
    /// `CHANNEL_SUSPEND_SECONDS_FOR_429`.
    pub channel_suspend_seconds_for_429: u64,
    /// `CHANNEL_SUSPEND_SECONDS_FOR_5XX`.
    pub channel_suspend_seconds_for_5xx: u64,
    /// `CHANNEL_SUSPEND_SECONDS_FOR_AUTH`.
    pub channel_suspend_seconds_for_auth: u64,
    /// `MEMORY_CACHE_ENABLED` — enable the Ability Index in-memory cache.
    pub memory_cache_enabled: bool,
    /// `SYNC_FREQUENCY` — Ability Index rebuild interval, in seconds.
    pub sync_frequency_seconds: u64,
    /// `AUTOMATIC_DISABLE_CHANNEL_ENABLED`.
    pub automatic_disable_channel_enabled: bool,
    /// `DEFAULT_USE_MIN_MAX_TOKENS_MODEL`.
    pub default_use_min_max_tokens_model: bool,
    /// `QUOTA_GROUP_MULTIPLIER_DEFAULT` — applied when a group has no
    /// explicit multiplier override.
    pub quota_group_multiplier_default: f64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            retry_times: 0,
            channel_suspend_seconds_for_429: 60,
            channel_suspend_seconds_for_5xx: 30,
            channel_suspend_seconds_for_auth: 300,
            memory_cache_enabled: true,
            sync_frequency_seconds: 600,
            automatic_disable_channel_enabled: false,
            default_use_min_max_tokens_model: false,
            quota_group_multiplier_default: 1.0,
        }
    }
}

/// Optional layer used for merging global config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub admin_key_hash: Option<String>,
    pub proxy: Option<String>,
    pub dsn: Option<String>,
    pub event_redact_sensitive: Option<bool>,
    pub retry_times: Option<u32>,
    pub channel_suspend_seconds_for_429: Option<u64>,
    pub channel_suspend_seconds_for_5xx: Option<u64>,
    pub channel_suspend_seconds_for_auth: Option<u64>,
    pub memory_cache_enabled: Option<bool>,
    pub sync_frequency_seconds: Option<u64>,
    pub automatic_disable_channel_enabled: Option<bool>,
    pub default_use_min_max_tokens_model: Option<bool>,
    pub quota_group_multiplier_default: Option<f64>,
}

impl GlobalConfigPatch {
    pub fn overlay(&mut self, other: GlobalConfigPatch) {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.admin_key_hash.is_some() {
            self.admin_key_hash = other.admin_key_hash;
        }
        if other.proxy.is_some() {
            self.proxy = other.proxy;
        }
        if other.dsn.is_some() {
            self.dsn = other.dsn;
        }
        if other.event_redact_sensitive.is_some() {
            self.event_redact_sensitive = other.event_redact_sensitive;
        }
        if other.retry_times.is_some() {
            self.retry_times = other.retry_times;
        }
        if other.channel_suspend_seconds_for_429.is_some() {
            self.channel_suspend_seconds_for_429 = other.channel_suspend_seconds_for_429;
        }
        if other.channel_suspend_seconds_for_5xx.is_some() {
            self.channel_suspend_seconds_for_5xx = other.channel_suspend_seconds_for_5xx;
        }
        if other.channel_suspend_seconds_for_auth.is_some() {
            self.channel_suspend_seconds_for_auth = other.channel_suspend_seconds_for_auth;
        }
        if other.memory_cache_enabled.is_some() {
            self.memory_cache_enabled = other.memory_cache_enabled;
        }
        if other.sync_frequency_seconds.is_some() {
            self.sync_frequency_seconds = other.sync_frequency_seconds;
        }
        if other.automatic_disable_channel_enabled.is_some() {
            self.automatic_disable_channel_enabled = other.automatic_disable_channel_enabled;
        }
        if other.default_use_min_max_tokens_model.is_some() {
            self.default_use_min_max_tokens_model = other.default_use_min_max_tokens_model;
        }
        if other.quota_group_multiplier_default.is_some() {
            self.quota_group_multiplier_default = other.quota_group_multiplier_default;
        }
    }

    pub fn into_config(self) -> Result<GlobalConfig, GlobalConfigError> {
        let defaults = RelayConfig::default();
        Ok(GlobalConfig {
            host: self.host.unwrap_or_else(|| "0.0.0.0".to_string()),
            port: self.port.unwrap_or(8787),
            admin_key_hash: self
                .admin_key_hash
                .ok_or(GlobalConfigError::MissingField("admin_key_hash"))?,
            proxy: self.proxy,
            dsn: self.dsn.ok_or(GlobalConfigError::MissingField("dsn"))?,
            event_redact_sensitive: self.event_redact_sensitive.unwrap_or(true),
            relay: RelayConfig {
                retry_times: self.retry_times.unwrap_or(defaults.retry_times),
                channel_suspend_seconds_for_429: self
                    .channel_suspend_seconds_for_429
                    .unwrap_or(defaults.channel_suspend_seconds_for_429),
                channel_suspend_seconds_for_5xx: self
                    .channel_suspend_seconds_for_5xx
                    .unwrap_or(defaults.channel_suspend_seconds_for_5xx),
                channel_suspend_seconds_for_auth: self
                    .channel_suspend_seconds_for_auth
                    .unwrap_or(defaults.channel_suspend_seconds_for_auth),
                memory_cache_enabled: self
                    .memory_cache_enabled
                    .unwrap_or(defaults.memory_cache_enabled),
                sync_frequency_seconds: self
                    .sync_frequency_seconds
                    .unwrap_or(defaults.sync_frequency_seconds),
                automatic_disable_channel_enabled: self
                    .automatic_disable_channel_enabled
                    .unwrap_or(defaults.automatic_disable_channel_enabled),
                default_use_min_max_tokens_model: self
                    .default_use_min_max_tokens_model
                    .unwrap_or(defaults.default_use_min_max_tokens_model),
                quota_group_multiplier_default: self
                    .quota_group_multiplier_default
                    .unwrap_or(defaults.quota_group_multiplier_default),
            },
        })
    }
}

impl From<GlobalConfig> for GlobalConfigPatch {
    fn from(value: GlobalConfig) -> Self {
        Self {
            host: Some(value.host),
            port: Some(value.port),
            admin_key_hash: Some(value.admin_key_hash),
            proxy: value.proxy,
            dsn: Some(value.dsn),
            event_redact_sensitive: Some(value.event_redact_sensitive),
            retry_times: Some(value.relay.retry_times),
            channel_suspend_seconds_for_429: Some(value.relay.channel_suspend_seconds_for_429),
            channel_suspend_seconds_for_5xx: Some(value.relay.channel_suspend_seconds_for_5xx),
            channel_suspend_seconds_for_auth: Some(value.relay.channel_suspend_seconds_for_auth),
            memory_cache_enabled: Some(value.relay.memory_cache_enabled),
            sync_frequency_seconds: Some(value.relay.sync_frequency_seconds),
            automatic_disable_channel_enabled: Some(
                value.relay.automatic_disable_channel_enabled,
            ),
            default_use_min_max_tokens_model: Some(value.relay.default_use_min_max_tokens_model),
            quota_group_multiplier_default: Some(value.relay.quota_group_multiplier_default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_config_defaults_match_spec() {
        let defaults = RelayConfig::default();
        assert_eq!(defaults.retry_times, 0);
        assert_eq!(defaults.channel_suspend_seconds_for_429, 60);
        assert_eq!(defaults.channel_suspend_seconds_for_5xx, 30);
        assert_eq!(defaults.channel_suspend_seconds_for_auth, 300);
        assert_eq!(defaults.sync_frequency_seconds, 600);
        assert!(!defaults.automatic_disable_channel_enabled);
        assert!(!defaults.default_use_min_max_tokens_model);
    }

    #[test]
    fn patch_into_config_fills_relay_defaults_when_unset() {
        let patch = GlobalConfigPatch {
            admin_key_hash: Some("hash".to_string()),
            dsn: Some("sqlite://test.db".to_string()),
            ..Default::default()
        };
        let config = patch.into_config().expect("minimal patch should resolve");
        assert_eq!(config.relay, RelayConfig::default());
    }
}
