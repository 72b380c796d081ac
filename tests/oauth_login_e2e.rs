mod support;

use std::sync::Arc;
use std::time::{Duration, Instant};

use support::{attempt_param, identity, MockBackend};
use uniondesk_auth::{AuthConfig, LoginCoordinator, LoginFailure, LoginOutcome, ProfileRecord};

const GOOGLE_AUTH_URL: &str =
    "https://accounts.google.com/o/oauth2/v2/auth?client_id=uniondesk&response_type=code";

fn test_config(port: u16, timeout_secs: u64) -> AuthConfig {
    AuthConfig {
        callback_port: port,
        login_timeout_secs: timeout_secs,
        ..AuthConfig::default()
    }
}

/// Browser stand-in: does what the relay page's script would do after the
/// provider redirect, reading the attempt token from the registered redirect
/// URL and posting the code to the token endpoint.
fn simulated_browser(backend: Arc<MockBackend>, port: u16, code: &'static str) -> impl Fn(&str) -> uniondesk_auth::AppResult<()> + Send + Sync {
    move |_auth_url| {
        let backend = backend.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let redirect = backend.last_redirect().expect("redirect registered");
            let attempt = attempt_param(&redirect);
            let _ = reqwest::Client::new()
                .post(format!("http://127.0.0.1:{port}/token"))
                .json(&serde_json::json!({ "code": code, "attempt": attempt }))
                .send()
                .await;
        });
        Ok(())
    }
}

#[tokio::test]
async fn google_first_login_yields_a_new_user_session() {
    let backend = Arc::new(
        MockBackend::new(GOOGLE_AUTH_URL).with_code("abc123", identity("u1", "a@b.com", "")),
    );
    let coordinator = LoginCoordinator::new(backend.clone(), test_config(8741, 60))
        .with_browser_opener(simulated_browser(backend.clone(), 8741, "abc123"));

    let outcome = coordinator
        .login_with_oauth("google")
        .await
        .expect("login completes");

    match outcome {
        LoginOutcome::Session(session) => {
            assert_eq!(session.user_id, "u1");
            assert_eq!(session.email, "a@b.com");
            assert_eq!(session.role, "NEW_USER");
            assert_eq!(session.full_name, "");
        }
        other => panic!("expected a session, got {other:?}"),
    }

    assert_eq!(backend.last_provider().as_deref(), Some("google"));
    let redirect = backend.last_redirect().expect("redirect registered");
    assert!(redirect.starts_with("http://localhost:8741/auth/callback?attempt="));

    // The listener is gone once the coordinator returns.
    tokio::net::TcpListener::bind(("127.0.0.1", 8741))
        .await
        .expect("port released");
}

#[tokio::test]
async fn no_callback_times_out_and_frees_the_port() {
    let backend = Arc::new(MockBackend::new(GOOGLE_AUTH_URL));
    let coordinator = LoginCoordinator::new(backend, test_config(8742, 1))
        .with_browser_opener(|_url| Ok(()));

    let started = Instant::now();
    let outcome = coordinator
        .login_with_oauth("google")
        .await
        .expect("login completes");

    assert_eq!(outcome, LoginOutcome::Failed(LoginFailure::TimedOut));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(1), "returned before the deadline");
    assert!(elapsed < Duration::from_secs(5), "deadline overshot far too long");

    tokio::net::TcpListener::bind(("127.0.0.1", 8742))
        .await
        .expect("port released");
}

#[tokio::test]
async fn cancellation_aborts_the_wait_and_frees_the_port() {
    let backend = Arc::new(MockBackend::new(GOOGLE_AUTH_URL));
    let coordinator = LoginCoordinator::new(backend, test_config(8743, 60))
        .with_browser_opener(|_url| Ok(()));

    let (cancel_tx, cancel_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = cancel_tx.send(());
    });

    let started = Instant::now();
    let outcome = coordinator
        .login_with_oauth_cancellable("google", Some(cancel_rx))
        .await
        .expect("login completes");

    assert_eq!(outcome, LoginOutcome::Failed(LoginFailure::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));

    tokio::net::TcpListener::bind(("127.0.0.1", 8743))
        .await
        .expect("port released");
}

#[tokio::test]
async fn browser_launch_failure_shuts_the_server_down() {
    let backend = Arc::new(MockBackend::new(GOOGLE_AUTH_URL));
    let coordinator = LoginCoordinator::new(backend, test_config(8744, 60))
        .with_browser_opener(|_url| Err("BROWSER_LAUNCH: no display available".into()));

    let outcome = coordinator
        .login_with_oauth("google")
        .await
        .expect("login completes");

    match outcome {
        LoginOutcome::Failed(LoginFailure::BrowserLaunch(message)) => {
            assert!(message.contains("no display available"));
        }
        other => panic!("expected a browser launch failure, got {other:?}"),
    }

    tokio::net::TcpListener::bind(("127.0.0.1", 8744))
        .await
        .expect("port released");
}

#[tokio::test]
async fn locked_account_fails_the_login_end_to_end() {
    let backend = Arc::new(
        MockBackend::new(GOOGLE_AUTH_URL)
            .with_code("abc123", identity("u7", "locked@union.example", "Lo Cked"))
            .with_profile(ProfileRecord {
                identity_id: "u7".to_string(),
                email: "locked@union.example".to_string(),
                full_name: "Lo Cked".to_string(),
                role: "MEMBER".to_string(),
                is_active: false,
            }),
    );
    let coordinator = LoginCoordinator::new(backend.clone(), test_config(8745, 60))
        .with_browser_opener(simulated_browser(backend.clone(), 8745, "abc123"));

    let outcome = coordinator
        .login_with_oauth("google")
        .await
        .expect("login completes");

    assert_eq!(outcome, LoginOutcome::Failed(LoginFailure::LockedAccount));

    tokio::net::TcpListener::bind(("127.0.0.1", 8745))
        .await
        .expect("port released");
}

#[tokio::test]
async fn password_login_uses_the_stored_profile_role() {
    let backend = Arc::new(
        MockBackend::new(GOOGLE_AUTH_URL)
            .with_password_user("board@union.example", "hunter2", identity("u3", "board@union.example", "Board Member"))
            .with_profile(ProfileRecord {
                identity_id: "u3".to_string(),
                email: "board@union.example".to_string(),
                full_name: "Board Member".to_string(),
                role: "BOARD".to_string(),
                is_active: true,
            }),
    );
    let coordinator = LoginCoordinator::new(backend, test_config(8746, 60));

    let outcome = coordinator
        .login_with_password("board@union.example", "hunter2")
        .await
        .expect("login completes");

    match outcome {
        LoginOutcome::Session(session) => {
            assert_eq!(session.user_id, "u3");
            assert_eq!(session.role, "BOARD");
        }
        other => panic!("expected a session, got {other:?}"),
    }
}

#[tokio::test]
async fn password_login_rejection_is_a_failure_value_not_an_error() {
    let backend = Arc::new(MockBackend::new(GOOGLE_AUTH_URL));
    let coordinator = LoginCoordinator::new(backend, test_config(8747, 60));

    let outcome = coordinator
        .login_with_password("nobody@union.example", "wrong")
        .await
        .expect("call completes");

    match outcome {
        LoginOutcome::Failed(LoginFailure::AuthExchange(message)) => {
            assert!(message.contains("invalid login credentials"));
        }
        other => panic!("expected an auth failure, got {other:?}"),
    }
}

#[tokio::test]
async fn password_first_login_creates_a_provisional_profile() {
    let backend = Arc::new(MockBackend::new(GOOGLE_AUTH_URL).with_password_user(
        "fresh@union.example",
        "s3cret",
        identity("u9", "fresh@union.example", "Fresh Member"),
    ));
    let coordinator = LoginCoordinator::new(backend.clone(), test_config(8748, 60));

    let outcome = coordinator
        .login_with_password("fresh@union.example", "s3cret")
        .await
        .expect("login completes");

    match outcome {
        LoginOutcome::Session(session) => {
            assert_eq!(session.role, "NEW_USER");
            assert_eq!(session.full_name, "Fresh Member");
        }
        other => panic!("expected a session, got {other:?}"),
    }
    assert_eq!(backend.created_profiles().len(), 1);
}
