//! Normalization of the self-asserted voter display name.

use std::fmt;

use thiserror::Error;

/// Longest accepted display name, counted after trimming.
pub const MAX_IDENTITY_LEN: usize = 20;

/// Reasons a display name is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// Nothing left after trimming.
    #[error("name must not be empty")]
    EmptyIdentity,
    /// More than [`MAX_IDENTITY_LEN`] characters.
    #[error("name must be at most {MAX_IDENTITY_LEN} characters")]
    IdentityTooLong,
    /// Anything outside `[A-Za-z0-9]`.
    #[error("name may only contain letters and digits")]
    InvalidIdentityChars,
}

/// Case-insensitive voter identity.
///
/// Two identities compare equal when their lower-cased forms match; the name as
/// typed is kept only for display.
#[derive(Debug, Clone)]
pub struct VoterIdentity {
    key: String,
    display: String,
}

impl VoterIdentity {
    /// Trim, check and lower-case a raw display name.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IdentityError::EmptyIdentity);
        }
        if trimmed.chars().count() > MAX_IDENTITY_LEN {
            return Err(IdentityError::IdentityTooLong);
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(IdentityError::InvalidIdentityChars);
        }

        Ok(Self {
            key: trimmed.to_ascii_lowercase(),
            display: trimmed.to_owned(),
        })
    }

    /// Normalized key used for uniqueness and rate limiting.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Name as the voter typed it (trimmed).
    pub fn display_name(&self) -> &str {
        &self.display
    }
}

impl PartialEq for VoterIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for VoterIdentity {}

impl fmt::Display for VoterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}
