//! Usage: User session and member profile domain types.

use serde::{Deserialize, Serialize};

/// Provisional role for an identity authenticated for the first time,
/// pending administrator approval.
pub const ROLE_NEW_USER: &str = "NEW_USER";

/// The authenticated session handed back to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub user_id: String,
    pub email: String,
    pub role: String,
    pub full_name: String,
}

/// A member's profile row as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub identity_id: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub is_active: bool,
}

impl UserSession {
    /// Builds the session for an identity with an existing profile row.
    pub(crate) fn from_profile(profile: &ProfileRecord) -> Self {
        Self {
            user_id: profile.identity_id.clone(),
            email: profile.email.clone(),
            role: profile.role.clone(),
            full_name: profile.full_name.clone(),
        }
    }
}
