#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use uniondesk_auth::auth::backend::BoxFuture;
use uniondesk_auth::{
    AppError, AppResult, AuthIdentity, BackendSession, ExchangedSession, IdentityBackend,
    ProfileRecord,
};

/// In-memory identity backend double used by the integration tests.
pub struct MockBackend {
    authorization_url: String,
    oauth_requests: Mutex<Vec<(String, String)>>,
    identities: Mutex<HashMap<String, AuthIdentity>>,
    profiles: Mutex<HashMap<String, ProfileRecord>>,
    created_profiles: Mutex<Vec<ProfileRecord>>,
    password_user: Mutex<Option<(String, String, AuthIdentity)>>,
    exchange_calls: AtomicU32,
}

impl MockBackend {
    pub fn new(authorization_url: &str) -> Self {
        Self {
            authorization_url: authorization_url.to_string(),
            oauth_requests: Mutex::new(Vec::new()),
            identities: Mutex::new(HashMap::new()),
            profiles: Mutex::new(HashMap::new()),
            created_profiles: Mutex::new(Vec::new()),
            password_user: Mutex::new(None),
            exchange_calls: AtomicU32::new(0),
        }
    }

    /// Registers an authorization code the backend will accept.
    pub fn with_code(self, code: &str, identity: AuthIdentity) -> Self {
        self.identities
            .lock()
            .unwrap()
            .insert(code.to_string(), identity);
        self
    }

    pub fn with_profile(self, profile: ProfileRecord) -> Self {
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.identity_id.clone(), profile);
        self
    }

    pub fn with_password_user(self, email: &str, password: &str, identity: AuthIdentity) -> Self {
        *self.password_user.lock().unwrap() =
            Some((email.to_string(), password.to_string(), identity));
        self
    }

    /// The redirect URL registered by the most recent authorization request.
    pub fn last_redirect(&self) -> Option<String> {
        self.oauth_requests
            .lock()
            .unwrap()
            .last()
            .map(|(_, redirect)| redirect.clone())
    }

    pub fn last_provider(&self) -> Option<String> {
        self.oauth_requests
            .lock()
            .unwrap()
            .last()
            .map(|(provider, _)| provider.clone())
    }

    pub fn exchange_calls(&self) -> u32 {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn created_profiles(&self) -> Vec<ProfileRecord> {
        self.created_profiles.lock().unwrap().clone()
    }
}

pub fn identity(id: &str, email: &str, full_name: &str) -> AuthIdentity {
    AuthIdentity {
        id: id.to_string(),
        email: email.to_string(),
        full_name: full_name.to_string(),
    }
}

fn stub_session() -> BackendSession {
    BackendSession {
        access_token: "test-access-token".to_string(),
        refresh_token: Some("test-refresh-token".to_string()),
        expires_at: None,
    }
}

impl IdentityBackend for MockBackend {
    fn request_oauth_url<'a>(
        &'a self,
        provider: &'a str,
        redirect_to: &'a str,
    ) -> BoxFuture<'a, AppResult<String>> {
        self.oauth_requests
            .lock()
            .unwrap()
            .push((provider.to_string(), redirect_to.to_string()));
        let url = self.authorization_url.clone();
        Box::pin(async move { Ok(url) })
    }

    fn exchange_code_for_session<'a>(
        &'a self,
        code: &'a str,
    ) -> BoxFuture<'a, AppResult<ExchangedSession>> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        let found = self.identities.lock().unwrap().get(code).cloned();
        Box::pin(async move {
            match found {
                Some(identity) => Ok(ExchangedSession {
                    identity,
                    session: stub_session(),
                }),
                None => Err(AppError::new(
                    "AUTH_EXCHANGE",
                    "invalid authorization code",
                )),
            }
        })
    }

    fn sign_in_with_password<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, AppResult<ExchangedSession>> {
        let found = self.password_user.lock().unwrap().clone();
        let email = email.to_string();
        let password = password.to_string();
        Box::pin(async move {
            match found {
                Some((e, p, identity)) if e == email && p == password => Ok(ExchangedSession {
                    identity,
                    session: stub_session(),
                }),
                _ => Err(AppError::new("AUTH_EXCHANGE", "invalid login credentials")),
            }
        })
    }

    fn get_profile<'a>(
        &'a self,
        identity_id: &'a str,
    ) -> BoxFuture<'a, AppResult<Option<ProfileRecord>>> {
        let found = self.profiles.lock().unwrap().get(identity_id).cloned();
        Box::pin(async move { Ok(found) })
    }

    fn create_profile<'a>(
        &'a self,
        identity_id: &'a str,
        email: &'a str,
        full_name: &'a str,
        role: &'a str,
    ) -> BoxFuture<'a, AppResult<ProfileRecord>> {
        let profile = ProfileRecord {
            identity_id: identity_id.to_string(),
            email: email.to_string(),
            full_name: full_name.to_string(),
            role: role.to_string(),
            is_active: true,
        };
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.identity_id.clone(), profile.clone());
        self.created_profiles.lock().unwrap().push(profile.clone());
        Box::pin(async move { Ok(profile) })
    }
}

/// Extracts the per-attempt token from a captured redirect URL.
pub fn attempt_param(redirect_url: &str) -> String {
    redirect_url
        .split_once("attempt=")
        .map(|(_, tail)| tail.split('&').next().unwrap_or(tail).to_string())
        .expect("redirect URL carries an attempt token")
}
