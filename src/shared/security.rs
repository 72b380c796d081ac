//! Usage: Security-sensitive helpers (secret masking and constant-time equality).

use subtle::ConstantTimeEq;

const MASK_PREFIX_LEN: usize = 6;
const MASK_SUFFIX_LEN: usize = 4;

/// Masks an authorization code or token so it can appear in logs.
pub(crate) fn mask_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let len = trimmed.len();
    if len <= MASK_PREFIX_LEN + MASK_SUFFIX_LEN {
        return "*".repeat(len.min(8));
    }

    let prefix = &trimmed[..MASK_PREFIX_LEN];
    let suffix = &trimmed[len - MASK_SUFFIX_LEN..];
    format!("{prefix}...{suffix}")
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
