//! Google OAuth2 (authorization code + PKCE, loopback redirect) for the
//! GeminiCli provider — the same flow the `gemini` CLI itself uses against
//! `accounts.google.com`/`oauth2.googleapis.com`. Distinct from Vertex's
//! service-account JWT exchange (`vertex::oauth`): GeminiCli credentials are
//! always a user-consented refresh token, never a signed JWT assertion.

use super::*;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use base64::Engine;
use sha2::Digest;

use crate::providers::http_client::{SharedClientKind, client_for_ctx};
use crate::providers::oauth_common::{parse_query_value, resolve_manual_code_and_state};

const DEFAULT_REDIRECT_URI: &str = "http://localhost:8085/oauth2callback";

struct PendingAuth {
    code_verifier: String,
    redirect_uri: String,
    created_at: Instant,
}

static PENDING: OnceLock<Mutex<HashMap<String, PendingAuth>>> = OnceLock::new();

fn pending() -> &'static Mutex<HashMap<String, PendingAuth>> {
    PENDING.get_or_init(|| Mutex::new(HashMap::new()))
}

fn prune_pending(states: &mut HashMap<String, PendingAuth>) {
    let now = Instant::now();
    states.retain(|_, entry| now.duration_since(entry.created_at) <= Duration::from_secs(OAUTH_STATE_TTL_SECS));
}

pub(super) fn oauth_start(
    _ctx: &UpstreamCtx,
    _config: &ProviderConfig,
    req: &OAuthStartRequest,
) -> ProviderResult<UpstreamHttpResponse> {
    let state_id = generate_oauth_state();
    let code_verifier = generate_code_verifier();
    let code_challenge = generate_code_challenge(&code_verifier);
    let redirect_uri = parse_query_value(req.query.as_deref(), "redirect_uri")
        .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());
    let scope = parse_query_value(req.query.as_deref(), "scope")
        .unwrap_or_else(|| OAUTH_SCOPE.to_string());

    let mut guard = pending()
        .lock()
        .map_err(|_| ProviderError::Other("oauth state lock failed".to_string()))?;
    prune_pending(&mut guard);
    guard.insert(
        state_id.clone(),
        PendingAuth {
            code_verifier,
            redirect_uri: redirect_uri.clone(),
            created_at: Instant::now(),
        },
    );

    let auth_url = build_authorize_url(&redirect_uri, &scope, &code_challenge, &state_id);
    Ok(json_response(serde_json::json!({
        "auth_url": auth_url,
        "state": state_id,
        "redirect_uri": redirect_uri,
        "scope": scope,
        "instructions": "Open auth_url, then call /oauth/callback with code/state (or callback_url).",
    })))
}

pub(super) fn oauth_callback(
    ctx: &UpstreamCtx,
    _config: &ProviderConfig,
    req: &OAuthCallbackRequest,
) -> ProviderResult<OAuthCallbackResult> {
    if let Some(error) = parse_query_value(req.query.as_deref(), "error") {
        let detail = parse_query_value(req.query.as_deref(), "error_description").unwrap_or(error);
        return Ok(OAuthCallbackResult {
            response: json_error(400, &detail),
            credential: None,
        });
    }

    let (code, state) = match resolve_manual_code_and_state(req.query.as_deref()) {
        Ok(value) => value,
        Err(message) => {
            return Ok(OAuthCallbackResult {
                response: json_error(400, message),
                credential: None,
            });
        }
    };

    let pending_auth = {
        let mut guard = pending()
            .lock()
            .map_err(|_| ProviderError::Other("oauth state lock failed".to_string()))?;
        prune_pending(&mut guard);
        match state.as_deref() {
            Some(state_id) => guard.remove(state_id),
            None if guard.len() == 1 => {
                let key = guard.keys().next().cloned();
                key.and_then(|state_id| guard.remove(&state_id))
            }
            None => None,
        }
    };
    let Some(pending_auth) = pending_auth else {
        return Ok(OAuthCallbackResult {
            response: json_error(400, "missing_or_expired_state"),
            credential: None,
        });
    };

    let tokens = exchange_code_for_tokens(
        ctx,
        &pending_auth.redirect_uri,
        &pending_auth.code_verifier,
        &code,
    )?;
    let Some(refresh_token) = tokens.refresh_token.clone() else {
        return Ok(OAuthCallbackResult {
            response: json_error(400, "missing_refresh_token"),
            credential: None,
        });
    };

    let email = fetch_user_email(ctx, &tokens.access_token).ok().flatten();
    let expires_at = chrono_now() + tokens.expires_in.unwrap_or(3600);
    let credential = OAuthCredential {
        name: email.clone().or_else(|| Some("geminicli".to_string())),
        settings_json: None,
        credential: Credential::GeminiCli(relaymux_provider_core::credential::GeminiCliCredential {
            access_token: tokens.access_token.clone(),
            refresh_token: refresh_token.clone(),
            expires_at,
            project_id: String::new(),
            client_id: CLIENT_ID.to_string(),
            client_secret: CLIENT_SECRET.to_string(),
            user_email: email.clone(),
        }),
    };

    Ok(OAuthCallbackResult {
        response: json_response(serde_json::json!({
            "access_token": tokens.access_token,
            "refresh_token": refresh_token,
            "email": email,
        })),
        credential: Some(credential),
    })
}

pub(super) fn on_auth_failure<'a>(
    ctx: &'a UpstreamCtx,
    _config: &'a ProviderConfig,
    credential: &'a Credential,
    _req: &'a Request,
    _failure: &'a relaymux_provider_core::provider::UpstreamFailure,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ProviderResult<AuthRetryAction>> + Send + 'a>>
{
    Box::pin(async move {
        let Credential::GeminiCli(cred) = credential else {
            return Ok(AuthRetryAction::None);
        };
        let tokens = refresh_access_token(ctx, &cred.refresh_token).await?;
        let mut updated = credential.clone();
        if let Credential::GeminiCli(cred_mut) = &mut updated {
            cred_mut.access_token = tokens.access_token.clone();
            if let Some(refresh_token) = tokens.refresh_token.clone() {
                cred_mut.refresh_token = refresh_token;
            }
            cred_mut.expires_at = chrono_now() + tokens.expires_in.unwrap_or(3600);
            return Ok(AuthRetryAction::UpdateCredential(Box::new(updated)));
        }
        Ok(AuthRetryAction::None)
    })
}

pub(super) async fn enrich_credential_profile_if_missing(
    _config: &ProviderConfig,
    credential: &Credential,
) -> ProviderResult<Option<Credential>> {
    let Credential::GeminiCli(cred) = credential else {
        return Ok(None);
    };
    let email_missing = cred
        .user_email
        .as_ref()
        .map(|value| value.trim().is_empty())
        .unwrap_or(true);
    if !email_missing {
        return Ok(None);
    }
    let Ok(Some(email)) = fetch_user_email_blocking(&cred.access_token) else {
        return Ok(None);
    };
    let mut updated = cred.clone();
    updated.user_email = Some(email);
    Ok(Some(Credential::GeminiCli(updated)))
}

fn generate_code_verifier() -> String {
    let mut bytes = [0u8; 64];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn generate_code_challenge(code_verifier: &str) -> String {
    let digest = sha2::Sha256::digest(code_verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

fn generate_oauth_state() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn build_authorize_url(redirect_uri: &str, scope: &str, code_challenge: &str, state: &str) -> String {
    let query = [
        ("response_type", "code"),
        ("client_id", CLIENT_ID),
        ("redirect_uri", redirect_uri),
        ("scope", scope),
        ("code_challenge", code_challenge),
        ("code_challenge_method", "S256"),
        ("access_type", "offline"),
        ("prompt", "consent"),
        ("state", state),
    ];
    let qs = query
        .into_iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{DEFAULT_AUTH_URL}?{qs}")
}

fn exchange_code_for_tokens(
    ctx: &UpstreamCtx,
    redirect_uri: &str,
    code_verifier: &str,
    code: &str,
) -> ProviderResult<TokenResponse> {
    let body = format!(
        "grant_type=authorization_code&code={}&redirect_uri={}&client_id={}&client_secret={}&code_verifier={}",
        urlencoding::encode(code),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(CLIENT_ID),
        urlencoding::encode(CLIENT_SECRET),
        urlencoding::encode(code_verifier),
    );
    crate::providers::oauth_common::block_on(async move {
        let client = client_for_ctx(ctx, SharedClientKind::Global)?;
        let resp = client
            .post(DEFAULT_TOKEN_URL)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|err| ProviderError::Other(err.to_string()))?;
        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|err| ProviderError::Other(err.to_string()))?;
        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes);
            return Err(ProviderError::Other(format!(
                "oauth_token_failed: {status} {text}"
            )));
        }
        serde_json::from_slice::<TokenResponse>(&bytes)
            .map_err(|err| ProviderError::Other(err.to_string()))
    })
}

async fn refresh_access_token(ctx: &UpstreamCtx, refresh_token: &str) -> ProviderResult<TokenResponse> {
    let body = format!(
        "grant_type=refresh_token&refresh_token={}&client_id={}&client_secret={}",
        urlencoding::encode(refresh_token),
        urlencoding::encode(CLIENT_ID),
        urlencoding::encode(CLIENT_SECRET),
    );
    let client = client_for_ctx(ctx, SharedClientKind::Global)?;
    let resp = client
        .post(DEFAULT_TOKEN_URL)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(body)
        .send()
        .await
        .map_err(|err| ProviderError::Other(err.to_string()))?;
    let status = resp.status();
    let bytes = resp
        .bytes()
        .await
        .map_err(|err| ProviderError::Other(err.to_string()))?;
    if !status.is_success() {
        let text = String::from_utf8_lossy(&bytes);
        return Err(ProviderError::Other(format!(
            "refresh_token_failed: {status} {text}"
        )));
    }
    serde_json::from_slice::<TokenResponse>(&bytes)
        .map_err(|err| ProviderError::Other(err.to_string()))
}

fn fetch_user_email_blocking(access_token: &str) -> ProviderResult<Option<String>> {
    crate::providers::oauth_common::block_on(fetch_user_email_async(access_token.to_string()))
}

fn fetch_user_email(_ctx: &UpstreamCtx, access_token: &str) -> ProviderResult<Option<String>> {
    fetch_user_email_blocking(access_token)
}

async fn fetch_user_email_async(access_token: String) -> ProviderResult<Option<String>> {
    let client = wreq::Client::builder()
        .build()
        .map_err(|err| ProviderError::Other(err.to_string()))?;
    let resp = client
        .get("https://www.googleapis.com/oauth2/v2/userinfo")
        .header("Authorization", format!("Bearer {access_token}"))
        .send()
        .await
        .map_err(|err| ProviderError::Other(err.to_string()))?;
    if !resp.status().is_success() {
        return Ok(None);
    }
    let body: serde_json::Value = resp
        .json()
        .await
        .map_err(|err| ProviderError::Other(err.to_string()))?;
    Ok(body
        .get("email")
        .and_then(|value| value.as_str())
        .map(|value| value.to_string()))
}
