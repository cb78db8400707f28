//! Error Classifier: maps an upstream failure to one of six retry classes.
//!
//! Pure and deterministic — no I/O, no side effects. The Retry Driver
//! consults this to pick the next selection strategy; the credential pool's
//! `default_decide_unavailable` (provider-core) separately decides
//! suspension durations. The two are intentionally independent: a briefly
//! stale suspension is tolerated (see the Ability Index), but the retry
//! budget/strategy decision must be exact per attempt.

use relaymux_provider_core::provider::{UpstreamFailure, UpstreamTransportErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    ClientRequest,
    RateLimit,
    Capacity,
    Transient,
    AuthTransient,
    AuthFatal,
}

impl ErrorClass {
    pub fn is_retriable(self) -> bool {
        !matches!(self, ErrorClass::ClientRequest | ErrorClass::AuthFatal)
    }
}

#[derive(Debug, Clone)]
pub struct ClassifiedError {
    pub class: ErrorClass,
    pub status: Option<u16>,
    pub message: String,
}

// Vendor strings that unambiguously mean "this key is dead", in English and
// Chinese (mirrors the vendor error copy seen in the wild across OpenAI,
// Anthropic and Chinese-market resellers).
const AUTH_FATAL_NEEDLES: &[&str] = &[
    "invalid api key",
    "invalid_api_key",
    "incorrect api key",
    "account deactivated",
    "account has been disabled",
    "account is disabled",
    "api key has been revoked",
    "key has expired",
    "unauthorized_client",
    "billing_not_active",
    "has been banned",
    "违规",
    "账号已被封",
    "余额不足",
    "密钥无效",
    "api_key无效",
    "账号被禁用",
];

const CAPACITY_NEEDLES: &[&str] = &[
    "context_length_exceeded",
    "context too long",
    "context window",
    "maximum context length",
    "reduce the length",
    "max_tokens",
    "too many tokens",
    "request too large",
];

const RATE_LIMIT_NEEDLES: &[&str] = &["rate_limit", "rate limit", "too many requests", "限流"];

const CLIENT_REQUEST_NEEDLES: &[&str] = &["invalid_request_error", "invalid request"];

fn body_lower(body: &[u8]) -> String {
    String::from_utf8_lossy(body).to_lowercase()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Classify an upstream failure. `body` is the raw (already-read) response
/// body when the failure carries one; pass `&[]` when only a transport error
/// is available.
pub fn classify(failure: &UpstreamFailure) -> ClassifiedError {
    match failure {
        UpstreamFailure::Transport { kind, message } => ClassifiedError {
            class: match kind {
                UpstreamTransportErrorKind::Timeout
                | UpstreamTransportErrorKind::ReadTimeout
                | UpstreamTransportErrorKind::Connect
                | UpstreamTransportErrorKind::Dns
                | UpstreamTransportErrorKind::Tls
                | UpstreamTransportErrorKind::Other => ErrorClass::Transient,
            },
            status: None,
            message: message.clone(),
        },
        UpstreamFailure::Http { status, body, .. } => {
            let text = body_lower(body);
            let class = classify_http(*status, &text);
            ClassifiedError {
                class,
                status: Some(*status),
                message: first_line(&text),
            }
        }
    }
}

fn classify_http(status: u16, body_lower: &str) -> ErrorClass {
    if status == 400 || contains_any(body_lower, CLIENT_REQUEST_NEEDLES) {
        return ErrorClass::ClientRequest;
    }
    if status == 413 || contains_any(body_lower, CAPACITY_NEEDLES) {
        return ErrorClass::Capacity;
    }
    if status == 429 || contains_any(body_lower, RATE_LIMIT_NEEDLES) {
        return ErrorClass::RateLimit;
    }
    if status == 401 || status == 403 {
        if contains_any(body_lower, AUTH_FATAL_NEEDLES) {
            return ErrorClass::AuthFatal;
        }
        return ErrorClass::AuthTransient;
    }
    if (500..600).contains(&status) {
        return ErrorClass::Transient;
    }
    // Unrecognised 4xx: treat conservatively as client-request (not retriable)
    // rather than burning attempts against a persistently broken request.
    if (400..500).contains(&status) {
        return ErrorClass::ClientRequest;
    }
    ErrorClass::Transient
}

fn first_line(s: &str) -> String {
    s.lines().next().unwrap_or_default().chars().take(256).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn http(status: u16, body: &str) -> UpstreamFailure {
        UpstreamFailure::Http {
            status,
            headers: Vec::new(),
            body: Bytes::copy_from_slice(body.as_bytes()),
        }
    }

    #[test]
    fn classifies_rate_limit_by_status() {
        assert_eq!(classify(&http(429, "{}")).class, ErrorClass::RateLimit);
    }

    #[test]
    fn classifies_capacity_by_status_and_body() {
        assert_eq!(classify(&http(413, "{}")).class, ErrorClass::Capacity);
        assert_eq!(
            classify(&http(400, "{\"error\":\"context_length_exceeded\"}")).class,
            ErrorClass::Capacity
        );
    }

    #[test]
    fn distinguishes_auth_fatal_from_auth_transient() {
        assert_eq!(
            classify(&http(401, "{\"error\":\"invalid api key\"}")).class,
            ErrorClass::AuthFatal
        );
        assert_eq!(
            classify(&http(401, "{\"error\":\"organization throttled\"}")).class,
            ErrorClass::AuthTransient
        );
    }

    #[test]
    fn classifies_client_request_as_non_retriable() {
        let c = classify(&http(400, "{\"type\":\"invalid_request_error\"}"));
        assert_eq!(c.class, ErrorClass::ClientRequest);
        assert!(!c.class.is_retriable());
    }

    #[test]
    fn classifies_5xx_and_transport_as_transient() {
        assert_eq!(classify(&http(502, "")).class, ErrorClass::Transient);
        assert_eq!(
            classify(&UpstreamFailure::Transport {
                kind: UpstreamTransportErrorKind::ReadTimeout,
                message: "read timed out".into(),
            })
            .class,
            ErrorClass::Transient
        );
    }

    #[test]
    fn auth_fatal_is_not_retriable_but_auth_transient_is() {
        assert!(!ErrorClass::AuthFatal.is_retriable());
        assert!(ErrorClass::AuthTransient.is_retriable());
    }
}
