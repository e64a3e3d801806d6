//! The record contract shared by every synced kind

use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use uuid::Uuid;

use super::OwnerId;

/// The two record kinds the engine synchronizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Note,
    Folder,
}

impl RecordKind {
    /// Stable storage key for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Folder => "folder",
        }
    }

    /// Plural collection name used by the remote API.
    #[must_use]
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Note => "notes",
            Self::Folder => "folders",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle contract every synced record satisfies.
///
/// Notes and folders are structurally identical as far as storage and
/// reconciliation are concerned: an id assigned once at creation, a single
/// owner, a monotonically advancing `updated_at` that fully determines merge
/// precedence, and an optional soft-delete timestamp.
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    const KIND: RecordKind;

    /// The stable id shared across replicas.
    fn record_id(&self) -> Uuid;

    fn owner(&self) -> &OwnerId;

    fn set_owner(&mut self, owner: OwnerId);

    /// Unix-ms timestamp of the last mutation; greater wins a merge.
    fn updated_at(&self) -> i64;

    /// Soft-delete marker. A deleted record stays in storage and keeps
    /// syncing; views filter it out.
    fn deleted_at(&self) -> Option<i64>;

    /// Text the local store feeds to the search index.
    fn index_text(&self) -> String;
}
