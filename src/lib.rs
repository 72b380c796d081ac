//! Authentication and resilient-operation subsystem of the UnionDesk member
//! administration tool.
//!
//! Two pieces live here: a generic retry-with-backoff executor for transient
//! backend failures, and the external (OAuth) login handshake that binds an
//! ephemeral localhost listener, launches the browser, and races the callback
//! against a deadline.

pub mod auth;
pub mod config;
pub mod domain;
pub mod logging;
pub mod retry;
pub mod shared;

pub use auth::backend::{
    AuthIdentity, BackendSession, ExchangedSession, HostedIdentityBackend, IdentityBackend,
};
pub use auth::coordinator::{LoginCoordinator, LoginFailure, LoginOutcome};
pub use config::AuthConfig;
pub use domain::session::{ProfileRecord, UserSession, ROLE_NEW_USER};
pub use retry::batch::{run_batched, run_batched_collecting};
pub use retry::{with_retry, RetryPolicy};
pub use shared::error::{AppError, AppResult};
