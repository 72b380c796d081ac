//! Usage: Ephemeral localhost listener that turns one browser redirect into a
//! resolved login outcome.
//!
//! The browser lands on the relay page with the provider's `code`; the page
//! forwards it to `/token`, whose handler performs the backend exchange and
//! deposits the result in a one-shot outcome slot. The token endpoint always
//! answers 200: the coordinator reads the slot, the browser only gets a
//! generic status page.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::rejection::JsonRejection,
    extract::State,
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::auth::backend::{resolve_member_session, IdentityBackend};
use crate::config::AuthConfig;
use crate::domain::session::UserSession;
use crate::shared::error::{AppError, AppResult};
use crate::shared::security::constant_time_eq;

pub(crate) const TOKEN_ENDPOINT_PATH: &str = "/token";

/// How long a graceful shutdown may take before the serve task is aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Final result of one login attempt, deposited by the token handler.
#[derive(Debug, Clone)]
pub enum LoginResolution {
    Session(UserSession),
    Error(AppError),
}

enum SlotState {
    Pending(oneshot::Sender<LoginResolution>),
    Resolved,
}

/// One-shot slot: the first resolution wins, later writes are dropped.
pub(crate) struct OutcomeSlot {
    state: Mutex<SlotState>,
}

impl OutcomeSlot {
    fn new() -> (Arc<Self>, oneshot::Receiver<LoginResolution>) {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Self {
            state: Mutex::new(SlotState::Pending(tx)),
        });
        (slot, rx)
    }

    pub(crate) fn is_resolved(&self) -> bool {
        matches!(*self.state.lock().expect("slot lock"), SlotState::Resolved)
    }

    /// Returns false when the slot was already resolved.
    pub(crate) fn resolve(&self, resolution: LoginResolution) -> bool {
        let mut state = self.state.lock().expect("slot lock");
        match std::mem::replace(&mut *state, SlotState::Resolved) {
            SlotState::Pending(tx) => {
                // The coordinator may already have stopped waiting; the slot
                // still counts as resolved either way.
                let _ = tx.send(resolution);
                true
            }
            SlotState::Resolved => false,
        }
    }
}

#[derive(Clone)]
struct CallbackState {
    backend: Arc<dyn IdentityBackend>,
    slot: Arc<OutcomeSlot>,
    attempt_token: Arc<str>,
}

/// Running listener; shut down exactly once via [`CallbackServer::shutdown`].
#[derive(Debug)]
pub struct CallbackServer {
    port: u16,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl CallbackServer {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stops accepting, waits briefly for in-flight requests, and guarantees
    /// the port is released before returning. Callable from any task.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut self.task)
            .await
            .is_err()
        {
            self.task.abort();
            let _ = (&mut self.task).await;
        }
    }
}

/// Binds the configured local port and starts serving the relay page and the
/// token endpoint on a background task.
///
/// A port that is already bound fails immediately; a second concurrent login
/// attempt is never queued behind the first.
pub async fn start(
    backend: Arc<dyn IdentityBackend>,
    config: &AuthConfig,
    attempt_token: String,
) -> AppResult<(CallbackServer, oneshot::Receiver<LoginResolution>)> {
    config.validate()?;

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", config.callback_port))
        .await
        .map_err(|e| {
            format!(
                "PORT_UNAVAILABLE: callback server unavailable: cannot bind 127.0.0.1:{} ({e})",
                config.callback_port
            )
        })?;
    let port = listener
        .local_addr()
        .map(|addr| addr.port())
        .unwrap_or(config.callback_port);

    let (slot, outcome_rx) = OutcomeSlot::new();
    let state = CallbackState {
        backend,
        slot,
        attempt_token: attempt_token.into(),
    };
    let router = Router::new()
        .route(&config.callback_path, get(relay_page))
        .route(TOKEN_ENDPOINT_PATH, post(receive_token))
        .with_state(state);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });

        if let Err(err) = serve.await {
            tracing::error!(port, "callback server error: {err}");
        }
    });

    Ok((
        CallbackServer {
            port,
            shutdown: Some(shutdown_tx),
            task,
        },
        outcome_rx,
    ))
}

async fn relay_page() -> Html<&'static str> {
    Html(CALLBACK_PAGE_HTML)
}

async fn receive_token(
    State(state): State<CallbackState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> StatusCode {
    let Ok(Json(body)) = payload else {
        tracing::warn!("token endpoint received a non-JSON body; ignoring");
        return StatusCode::OK;
    };

    let code = body
        .get("code")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let attempt = body.get("attempt").and_then(Value::as_str).unwrap_or("");

    let Some(code) = code else {
        tracing::warn!("token endpoint received no authorization code; ignoring");
        return StatusCode::OK;
    };
    if !constant_time_eq(attempt.as_bytes(), state.attempt_token.as_bytes()) {
        tracing::warn!("token endpoint received a stale or foreign attempt token; ignoring");
        return StatusCode::OK;
    }
    if state.slot.is_resolved() {
        tracing::debug!("login outcome already resolved; ignoring duplicate post");
        return StatusCode::OK;
    }

    let resolution = match state.backend.exchange_code_for_session(code).await {
        Ok(exchanged) => {
            match resolve_member_session(state.backend.as_ref(), &exchanged.identity).await {
                Ok(session) => LoginResolution::Session(session),
                Err(err) => LoginResolution::Error(err),
            }
        }
        Err(err) => LoginResolution::Error(err),
    };

    if !state.slot.resolve(resolution) {
        tracing::debug!("login outcome already resolved; dropping late exchange result");
    }
    StatusCode::OK
}

const CALLBACK_PAGE_HTML: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>UnionDesk sign-in</title></head>
<body>
<h1 id="status">Completing sign-in&hellip;</h1>
<p id="detail"></p>
<script>
(function () {
  var params = new URLSearchParams(window.location.search);
  var code = params.get("code");
  var attempt = params.get("attempt") || "";
  var status = document.getElementById("status");
  var detail = document.getElementById("detail");
  if (!code) {
    status.textContent = "Sign-in failed";
    detail.textContent = "The provider did not return an authorization code. You may close this window and retry.";
    return;
  }
  fetch("/token", {
    method: "POST",
    headers: { "Content-Type": "application/json" },
    body: JSON.stringify({ code: code, attempt: attempt })
  }).then(function () {
    status.textContent = "Sign-in complete";
    detail.textContent = "You may close this window and return to UnionDesk.";
  }).catch(function () {
    status.textContent = "Sign-in failed";
    detail.textContent = "Could not reach UnionDesk. You may close this window and retry.";
  });
})();
</script>
</body>
</html>
"#;
