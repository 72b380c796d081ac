//! Usage: Auth subsystem configuration (schema + TOML file loader).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::error::{codes, AppError, AppResult};

pub const DEFAULT_CALLBACK_PORT: u16 = 8000;
pub const DEFAULT_CALLBACK_PATH: &str = "/auth/callback";
pub const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Origin of the hosted identity backend, e.g. `https://auth.union.example`.
    pub backend_url: String,
    /// Publishable API key sent with every backend request.
    pub backend_publishable_key: String,
    pub callback_port: u16,
    pub callback_path: String,
    pub login_timeout_secs: u64,
    /// Overrides the derived redirect URL registered with the provider.
    pub redirect_url_override: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            backend_publishable_key: String::new(),
            callback_port: DEFAULT_CALLBACK_PORT,
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            login_timeout_secs: DEFAULT_LOGIN_TIMEOUT_SECS,
            redirect_url_override: None,
        }
    }
}

impl AuthConfig {
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                codes::CONFIG_ERROR,
                format!("cannot read {}: {e}", path.display()),
            )
        })?;
        let config: Self = toml::from_str(&raw).map_err(|e| {
            AppError::new(
                codes::CONFIG_ERROR,
                format!("invalid config {}: {e}", path.display()),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> AppResult<()> {
        if !self.callback_path.starts_with('/') {
            return Err(AppError::new(
                codes::SEC_INVALID_INPUT,
                "callback_path must start with '/'",
            ));
        }
        if self.callback_port == 0 {
            return Err(AppError::new(
                codes::SEC_INVALID_INPUT,
                "callback_port must be > 0",
            ));
        }
        Ok(())
    }

    /// Redirect URL registered with the provider; default
    /// `http://localhost:8000/auth/callback`.
    pub fn redirect_url(&self) -> String {
        match self.redirect_url_override.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => format!(
                "http://localhost:{}{}",
                self.callback_port, self.callback_path
            ),
        }
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }
}
