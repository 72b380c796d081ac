//! Usage: Drives one external (OAuth) login round-trip to a user session or a
//! typed failure.
//!
//! Expected negative outcomes (rejected code, locked account, timeout) come
//! back as [`LoginFailure`] values so the UI can render a message; the
//! coordinator only errors when the environment is broken, e.g. the callback
//! port cannot be bound.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::oneshot;

use crate::auth::backend::{resolve_member_session, IdentityBackend};
use crate::auth::browser::open_browser;
use crate::auth::callback_server::{self, LoginResolution};
use crate::config::AuthConfig;
use crate::domain::session::UserSession;
use crate::retry::{with_retry, RetryPolicy};
use crate::shared::error::{codes, AppError, AppResult};

/// Expected negative outcome of a login attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoginFailure {
    #[error("authentication failed: {0}")]
    AuthExchange(String),
    #[error("account is locked")]
    LockedAccount,
    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),
    #[error("sign-in timed out; please try again")]
    TimedOut,
    #[error("sign-in was cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Session(UserSession),
    Failed(LoginFailure),
}

type BrowserOpener = Box<dyn Fn(&str) -> AppResult<()> + Send + Sync>;

pub struct LoginCoordinator {
    backend: Arc<dyn IdentityBackend>,
    config: AuthConfig,
    opener: BrowserOpener,
}

impl LoginCoordinator {
    pub fn new(backend: Arc<dyn IdentityBackend>, config: AuthConfig) -> Self {
        Self {
            backend,
            config,
            opener: Box::new(|url| open_browser(url)),
        }
    }

    /// Replaces the default-browser launcher; tests use this to observe the
    /// authorization URL instead of spawning a browser.
    pub fn with_browser_opener(
        mut self,
        opener: impl Fn(&str) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.opener = Box::new(opener);
        self
    }

    /// Full external login round-trip with the default deadline behavior.
    pub async fn login_with_oauth(&self, provider: &str) -> AppResult<LoginOutcome> {
        self.login_with_oauth_cancellable(provider, None).await
    }

    /// Like [`login_with_oauth`](Self::login_with_oauth), but an in-flight
    /// wait can also be aborted through `cancel` (e.g. when the application
    /// window closes); the port is freed before returning either way.
    pub async fn login_with_oauth_cancellable(
        &self,
        provider: &str,
        cancel: Option<oneshot::Receiver<()>>,
    ) -> AppResult<LoginOutcome> {
        let attempt_token = new_attempt_token();
        let redirect_to = append_attempt_param(&self.config.redirect_url(), &attempt_token);

        let auth_url = with_retry(RetryPolicy::standard(), || {
            self.backend.request_oauth_url(provider, &redirect_to)
        })
        .await?;

        let (server, outcome_rx) =
            callback_server::start(self.backend.clone(), &self.config, attempt_token).await?;
        tracing::info!(provider, port = server.port(), "external login started");

        if let Err(err) = (self.opener)(&auth_url) {
            server.shutdown().await;
            tracing::warn!(error = %err, "browser launch failed; aborting login");
            return Ok(LoginOutcome::Failed(LoginFailure::BrowserLaunch(
                err.message().to_string(),
            )));
        }

        let outcome: AppResult<LoginOutcome> = tokio::select! {
            resolution = outcome_rx => match resolution {
                Ok(LoginResolution::Session(session)) => {
                    tracing::info!(user_id = %session.user_id, role = %session.role, "external login succeeded");
                    Ok(LoginOutcome::Session(session))
                }
                Ok(LoginResolution::Error(err)) => {
                    tracing::warn!(error = %err, "external login resolved to an error");
                    Ok(LoginOutcome::Failed(resolution_failure(err)))
                }
                Err(_) => Err(AppError::new(
                    codes::SYSTEM_ERROR,
                    "callback listener terminated unexpectedly",
                )),
            },
            _ = tokio::time::sleep(self.config.login_timeout()) => {
                tracing::warn!(provider, timeout_secs = self.config.login_timeout_secs, "external login timed out");
                Ok(LoginOutcome::Failed(LoginFailure::TimedOut))
            }
            _ = wait_cancelled(cancel) => {
                tracing::info!(provider, "external login cancelled by caller");
                Ok(LoginOutcome::Failed(LoginFailure::Cancelled))
            }
        };

        // Every path above funnels through this single shutdown; the port is
        // bindable again once we return.
        server.shutdown().await;
        outcome
    }

    /// Password sign-in wrapped by the same retry framework and the same
    /// profile resolution rules as the external path.
    pub async fn login_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> AppResult<LoginOutcome> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AppError::new(
                codes::SEC_INVALID_INPUT,
                "email and password are required",
            ));
        }

        let exchanged = match with_retry(RetryPolicy::standard(), || {
            self.backend.sign_in_with_password(email, password)
        })
        .await
        {
            Ok(exchanged) => exchanged,
            Err(err) if err.code() == codes::AUTH_EXCHANGE => {
                return Ok(LoginOutcome::Failed(LoginFailure::AuthExchange(
                    err.message().to_string(),
                )));
            }
            Err(err) => return Err(err),
        };

        match resolve_member_session(self.backend.as_ref(), &exchanged.identity).await {
            Ok(session) => Ok(LoginOutcome::Session(session)),
            Err(err) if err.code() == codes::AUTH_LOCKED => {
                Ok(LoginOutcome::Failed(LoginFailure::LockedAccount))
            }
            Err(err) => Err(err),
        }
    }
}

fn resolution_failure(err: AppError) -> LoginFailure {
    if err.code() == codes::AUTH_LOCKED {
        LoginFailure::LockedAccount
    } else {
        LoginFailure::AuthExchange(err.message().to_string())
    }
}

async fn wait_cancelled(cancel: Option<oneshot::Receiver<()>>) {
    match cancel {
        Some(rx) => {
            if rx.await.is_ok() {
                return;
            }
            // A dropped cancel handle means "no cancellation", not "cancel".
            std::future::pending::<()>().await
        }
        None => std::future::pending::<()>().await,
    }
}

/// Per-attempt state token: 32 bytes of OS randomness, base64-url encoded.
fn new_attempt_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn append_attempt_param(redirect_url: &str, attempt_token: &str) -> String {
    let separator = if redirect_url.contains('?') { '&' } else { '?' };
    format!("{redirect_url}{separator}attempt={attempt_token}")
}
