//! Usage: Identity backend collaborator (trait + hosted HTTP implementation).
//!
//! The backend owns the provider handshake and the member profile store; this
//! crate only drives it. Components receive the backend as an injected trait
//! object, never through ambient global state.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::config::AuthConfig;
use crate::domain::session::{ProfileRecord, UserSession, ROLE_NEW_USER};
use crate::shared::error::{codes, AppError, AppResult};
use crate::shared::security::mask_secret;
use crate::shared::time::now_unix_seconds;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Identity authenticated by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthIdentity {
    pub id: String,
    pub email: String,
    pub full_name: String,
}

/// Token material minted by the backend alongside an identity.
#[derive(Debug, Clone)]
pub struct BackendSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
}

/// Result of exchanging an authorization code (or password credentials).
#[derive(Debug, Clone)]
pub struct ExchangedSession {
    pub identity: AuthIdentity,
    pub session: BackendSession,
}

/// Operations the hosted identity backend exposes to this subsystem.
///
/// Object-safe so the coordinator and the callback server can share one
/// `Arc<dyn IdentityBackend>`; tests substitute an in-memory double.
pub trait IdentityBackend: Send + Sync {
    /// Provider authorization URL the browser should be sent to.
    fn request_oauth_url<'a>(
        &'a self,
        provider: &'a str,
        redirect_to: &'a str,
    ) -> BoxFuture<'a, AppResult<String>>;

    /// Exchanges a one-time authorization code for an identity + session.
    fn exchange_code_for_session<'a>(
        &'a self,
        code: &'a str,
    ) -> BoxFuture<'a, AppResult<ExchangedSession>>;

    /// Password sign-in; same result shape as the code exchange.
    fn sign_in_with_password<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, AppResult<ExchangedSession>>;

    fn get_profile<'a>(
        &'a self,
        identity_id: &'a str,
    ) -> BoxFuture<'a, AppResult<Option<ProfileRecord>>>;

    fn create_profile<'a>(
        &'a self,
        identity_id: &'a str,
        email: &'a str,
        full_name: &'a str,
        role: &'a str,
    ) -> BoxFuture<'a, AppResult<ProfileRecord>>;
}

/// Maps an authenticated identity to the session the UI receives.
///
/// No profile row yet means a provisional `NEW_USER` row is created; an
/// inactive row is a locked account and never becomes a session.
pub(crate) async fn resolve_member_session(
    backend: &dyn IdentityBackend,
    identity: &AuthIdentity,
) -> AppResult<UserSession> {
    match backend.get_profile(&identity.id).await? {
        Some(profile) if !profile.is_active => {
            Err(AppError::new(codes::AUTH_LOCKED, "account is locked"))
        }
        Some(profile) => Ok(UserSession::from_profile(&profile)),
        None => {
            let created = backend
                .create_profile(&identity.id, &identity.email, &identity.full_name, ROLE_NEW_USER)
                .await?;
            tracing::info!(user_id = %identity.id, "created provisional NEW_USER profile");
            Ok(UserSession::from_profile(&created))
        }
    }
}

/// Reqwest-backed client for the hosted auth + profile HTTP API.
pub struct HostedIdentityBackend {
    client: reqwest::Client,
    base_url: String,
    publishable_key: String,
}

impl HostedIdentityBackend {
    pub fn new(config: &AuthConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("uniondesk-auth/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| format!("SYSTEM_ERROR: backend client init failed: {e}"))?;

        Ok(Self {
            client,
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            publishable_key: config.backend_publishable_key.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_auth_json(&self, path: &str, body: Value, failure_code: &str) -> AppResult<Value> {
        let response = self
            .client
            .post(self.endpoint(path))
            .header("apikey", &self.publishable_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("SYSTEM_ERROR: backend request failed: {e}"))?;

        read_json_response(response, failure_code).await
    }

    async fn exchange_grant(&self, grant_type: &str, body: Value) -> AppResult<ExchangedSession> {
        let value = self
            .post_auth_json(
                &format!("/auth/v1/token?grant_type={grant_type}"),
                body,
                codes::AUTH_EXCHANGE,
            )
            .await?;
        parse_exchanged_session(&value)
    }
}

impl IdentityBackend for HostedIdentityBackend {
    fn request_oauth_url<'a>(
        &'a self,
        provider: &'a str,
        redirect_to: &'a str,
    ) -> BoxFuture<'a, AppResult<String>> {
        Box::pin(async move {
            let value = self
                .post_auth_json(
                    "/auth/v1/oauth/url",
                    serde_json::json!({ "provider": provider, "redirect_to": redirect_to }),
                    codes::SYSTEM_ERROR,
                )
                .await?;

            value
                .get("url")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    "SYSTEM_ERROR: backend oauth url response missing url"
                        .to_string()
                        .into()
                })
        })
    }

    fn exchange_code_for_session<'a>(
        &'a self,
        code: &'a str,
    ) -> BoxFuture<'a, AppResult<ExchangedSession>> {
        Box::pin(async move {
            tracing::debug!(code = %mask_secret(code), "exchanging authorization code");
            self.exchange_grant(
                "authorization_code",
                serde_json::json!({ "auth_code": code.trim() }),
            )
            .await
        })
    }

    fn sign_in_with_password<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, AppResult<ExchangedSession>> {
        Box::pin(async move {
            self.exchange_grant(
                "password",
                serde_json::json!({ "email": email.trim(), "password": password }),
            )
            .await
        })
    }

    fn get_profile<'a>(
        &'a self,
        identity_id: &'a str,
    ) -> BoxFuture<'a, AppResult<Option<ProfileRecord>>> {
        Box::pin(async move {
            let id_filter = format!("eq.{identity_id}");
            let response = self
                .client
                .get(self.endpoint("/rest/v1/profiles"))
                .query(&[("select", "*"), ("identity_id", id_filter.as_str())])
                .header("apikey", &self.publishable_key)
                .send()
                .await
                .map_err(|e| format!("SYSTEM_ERROR: backend request failed: {e}"))?;

            let value = read_json_response(response, codes::SYSTEM_ERROR).await?;
            let rows = value
                .as_array()
                .ok_or_else(|| "SYSTEM_ERROR: profile query returned non-array".to_string())?;
            match rows.first() {
                Some(row) => Ok(Some(parse_profile_row(row)?)),
                None => Ok(None),
            }
        })
    }

    fn create_profile<'a>(
        &'a self,
        identity_id: &'a str,
        email: &'a str,
        full_name: &'a str,
        role: &'a str,
    ) -> BoxFuture<'a, AppResult<ProfileRecord>> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.endpoint("/rest/v1/profiles"))
                .header("apikey", &self.publishable_key)
                .header("Prefer", "return=representation")
                .json(&serde_json::json!({
                    "identity_id": identity_id,
                    "email": email,
                    "full_name": full_name,
                    "role": role,
                    "is_active": true,
                }))
                .send()
                .await
                .map_err(|e| format!("SYSTEM_ERROR: backend request failed: {e}"))?;

            let value = read_json_response(response, codes::SYSTEM_ERROR).await?;
            // return=representation yields a one-element array.
            let row = value
                .as_array()
                .and_then(|rows| rows.first())
                .unwrap_or(&value);
            parse_profile_row(row)
        })
    }
}

async fn read_json_response(response: reqwest::Response, failure_code: &str) -> AppResult<Value> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("SYSTEM_ERROR: backend response read failed: {e}"))?;

    if !status.is_success() {
        let detail = extract_error_detail(&body)
            .unwrap_or_else(|| sanitize_error_snippet(&body));
        return Err(AppError::new(
            failure_code,
            format!("backend returned status={} {detail}", status.as_u16()),
        ));
    }

    serde_json::from_str(&body)
        .map_err(|e| format!("SYSTEM_ERROR: backend response json invalid: {e}").into())
}

fn parse_exchanged_session(value: &Value) -> AppResult<ExchangedSession> {
    let access_token = value
        .get("access_token")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| "AUTH_EXCHANGE: backend response missing access_token".to_string())?
        .to_string();

    let refresh_token = value
        .get("refresh_token")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let expires_at = value
        .get("expires_in")
        .and_then(Value::as_i64)
        .filter(|v| *v > 0)
        .map(|v| now_unix_seconds().saturating_add(v));

    let user = value
        .get("user")
        .ok_or_else(|| "AUTH_EXCHANGE: backend response missing user".to_string())?;
    let id = user
        .get("id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| "AUTH_EXCHANGE: backend response missing user id".to_string())?
        .to_string();
    let email = user
        .get("email")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();
    let full_name = user
        .get("user_metadata")
        .and_then(|m| m.get("full_name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    Ok(ExchangedSession {
        identity: AuthIdentity {
            id,
            email,
            full_name,
        },
        session: BackendSession {
            access_token,
            refresh_token,
            expires_at,
        },
    })
}

fn parse_profile_row(row: &Value) -> AppResult<ProfileRecord> {
    let identity_id = row
        .get("identity_id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| "SYSTEM_ERROR: profile row missing identity_id".to_string())?
        .to_string();

    Ok(ProfileRecord {
        identity_id,
        email: row
            .get("email")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        full_name: row
            .get("full_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        role: row
            .get("role")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(ROLE_NEW_USER)
            .to_string(),
        is_active: row.get("is_active").and_then(Value::as_bool).unwrap_or(true),
    })
}

/// Pulls the human-readable detail out of a backend error body.
fn extract_error_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;

    let direct = value
        .get("error_description")
        .or_else(|| value.get("msg"))
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(detail) = direct {
        return Some(detail.chars().take(240).collect());
    }

    match value.get("error") {
        Some(Value::String(s)) if !s.trim().is_empty() => {
            Some(s.trim().chars().take(240).collect())
        }
        Some(Value::Object(obj)) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| v.chars().take(240).collect()),
        _ => None,
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lc = key.trim().to_ascii_lowercase();
    key_lc.contains("token") || key_lc.contains("secret") || key_lc.contains("password")
}

fn redact_sensitive_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                if is_sensitive_key(key) {
                    if let Some(raw) = nested.as_str() {
                        *nested = Value::String(mask_secret(raw));
                        continue;
                    }
                }
                redact_sensitive_fields(nested);
            }
        }
        Value::Array(items) => {
            for nested in items {
                redact_sensitive_fields(nested);
            }
        }
        _ => {}
    }
}

fn sanitize_error_snippet(body: &str) -> String {
    if let Ok(mut value) = serde_json::from_str::<Value>(body) {
        redact_sensitive_fields(&mut value);
        if let Ok(encoded) = serde_json::to_string(&value) {
            return encoded.chars().take(500).collect();
        }
    }
    body.chars().take(500).collect()
}
