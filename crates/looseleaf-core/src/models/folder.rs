//! Folder model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{OwnerId, Record, RecordKind};
use crate::util::now_millis;

/// A unique identifier for a folder, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderId(Uuid);

impl FolderId {
    /// Create a new unique folder ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }

    /// The underlying UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for FolderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FolderId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A folder grouping notes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    /// Unique identifier, assigned once at creation
    pub id: FolderId,
    /// Owning user, or the local sentinel before the first sync
    pub owner: OwnerId,
    pub name: String,
    /// Display path derived from the name; recomputed on rename
    pub path: String,
    pub color: Option<String>,
    pub icon: Option<String>,
    /// Soft-delete timestamp (Unix ms); cascades to contained notes
    pub deleted_at: Option<i64>,
    pub created_at: i64,
    /// Last update timestamp (Unix ms); determines merge precedence
    pub updated_at: i64,
}

impl Folder {
    /// Create a new local folder with the given name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let now = now_millis();
        Self {
            id: FolderId::new(),
            owner: OwnerId::local(),
            path: Self::derive_path(&name),
            name,
            color: None,
            icon: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Display path for a folder name
    #[must_use]
    pub fn derive_path(name: &str) -> String {
        format!("/{}", name.trim())
    }

    /// Whether the folder is in the trash
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl Record for Folder {
    const KIND: RecordKind = RecordKind::Folder;

    fn record_id(&self) -> Uuid {
        self.id.as_uuid()
    }

    fn owner(&self) -> &OwnerId {
        &self.owner
    }

    fn set_owner(&mut self, owner: OwnerId) {
        self.owner = owner;
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn deleted_at(&self) -> Option<i64> {
        self.deleted_at
    }

    fn index_text(&self) -> String {
        self.name.clone()
    }
}
