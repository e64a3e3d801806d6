//! Record ownership

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel owner for records created before the first successful sync.
const LOCAL_OWNER: &str = "local";

/// The user identity a record belongs to.
///
/// Records created while signed out carry the `local` sentinel until a
/// reconciliation pass re-owns them to the authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    /// Create an owner id from an authenticated user identity.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The sentinel owner for never-synced records.
    #[must_use]
    pub fn local() -> Self {
        Self(LOCAL_OWNER.to_string())
    }

    /// Whether this is the local-only sentinel rather than a real user.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.0 == LOCAL_OWNER
    }

    /// The raw identity string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::local()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
