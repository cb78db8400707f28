//! Default channel configs seeded into storage on first boot.
//!
//! `custom` is deliberately absent here: it only exists once an admin
//! defines one, so there is no sensible default to seed.

use serde_json::{Value, json};

pub struct BuiltinProviderSeed {
    pub name: &'static str,
    pub config_json: Value,
    pub enabled: bool,
}

pub fn builtin_provider_seeds() -> Vec<BuiltinProviderSeed> {
    vec![
        BuiltinProviderSeed {
            name: "openai",
            config_json: json!({
                "kind": "openai",
                "channel_settings": {
                    "base_url": "https://api.openai.com",
                }
            }),
            enabled: false,
        },
        BuiltinProviderSeed {
            name: "claude",
            config_json: json!({
                "kind": "claude",
                "channel_settings": {
                    "base_url": "https://api.anthropic.com",
                }
            }),
            enabled: false,
        },
        BuiltinProviderSeed {
            name: "claudecode",
            config_json: json!({
                "kind": "claudecode",
                "channel_settings": {
                    "base_url": "https://api.anthropic.com",
                    "claude_ai_base_url": "https://claude.ai",
                    "platform_base_url": "https://platform.claude.com",
                    "prelude_text": "claude_code_system",
                }
            }),
            enabled: false,
        },
        BuiltinProviderSeed {
            name: "codex",
            config_json: json!({
                "kind": "codex",
                "channel_settings": {
                    "base_url": "https://chatgpt.com/backend-api/codex",
                }
            }),
            enabled: false,
        },
        BuiltinProviderSeed {
            name: "antigravity",
            config_json: json!({
                "kind": "antigravity",
                "channel_settings": {
                    "base_url": "https://daily-cloudcode-pa.sandbox.googleapis.com",
                }
            }),
            enabled: false,
        },
        BuiltinProviderSeed {
            name: "aistudio",
            config_json: json!({
                "kind": "aistudio",
                "channel_settings": {
                    "base_url": "https://generativelanguage.googleapis.com",
                }
            }),
            enabled: false,
        },
        BuiltinProviderSeed {
            name: "vertexexpress",
            config_json: json!({
                "kind": "vertexexpress",
                "channel_settings": {
                    "base_url": "https://aiplatform.googleapis.com",
                }
            }),
            enabled: false,
        },
        BuiltinProviderSeed {
            name: "vertex",
            config_json: json!({
                "kind": "vertex",
                "channel_settings": {
                    "base_url": "https://aiplatform.googleapis.com",
                    "location": "us-central1",
                    "token_uri": "https://oauth2.googleapis.com/token",
                }
            }),
            enabled: false,
        },
        BuiltinProviderSeed {
            name: "geminicli",
            config_json: json!({
                "kind": "geminicli",
                "channel_settings": {
                    "base_url": "https://cloudcode-pa.googleapis.com",
                }
            }),
            enabled: false,
        },
        BuiltinProviderSeed {
            name: "nvidia",
            config_json: json!({
                "kind": "nvidia",
                "channel_settings": {
                    "base_url": "https://integrate.api.nvidia.com",
                    "hf_url": "https://huggingface.co",
                }
            }),
            enabled: false,
        },
        BuiltinProviderSeed {
            name: "deepseek",
            config_json: json!({
                "kind": "deepseek",
                "channel_settings": {
                    "base_url": "https://api.deepseek.com",
                }
            }),
            enabled: false,
        },
    ]
}
