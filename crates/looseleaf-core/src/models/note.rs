//! Note model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{FolderId, OwnerId, Record, RecordKind};
use crate::util::now_millis;

/// A unique identifier for a note, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteId(Uuid);

impl NoteId {
    /// Create a new unique note ID using UUID v7
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

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A note in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Unique identifier, assigned once at creation
    pub id: NoteId,
    /// Owning user, or the local sentinel before the first sync
    pub owner: OwnerId,
    /// Short display title
    pub title: String,
    /// Markdown body
    pub body: String,
    /// Containing folder, if any
    pub folder: Option<FolderId>,
    /// Pinned notes sort ahead of the rest
    pub pinned: bool,
    pub archived: bool,
    /// Soft-delete timestamp (Unix ms); the record stays in storage
    pub deleted_at: Option<i64>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms); determines merge precedence
    pub updated_at: i64,
}

impl Note {
    /// Create a new local note with the given title and body
    #[must_use]
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: NoteId::new(),
            owner: OwnerId::local(),
            title: title.into(),
            body: body.into(),
            folder: None,
            pinned: false,
            archived: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the note is in the trash
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Check if the note has no content (whitespace-only counts as empty)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty() && self.body.trim().is_empty()
    }
}

impl Record for Note {
    const KIND: RecordKind = RecordKind::Note;

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
        format!("{}\n{}", self.title, self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_note_id_unique() {
        let id1 = NoteId::new();
        let id2 = NoteId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_note_id_parse() {
        let id = NoteId::new();
        let parsed: NoteId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_note_new() {
        let note = Note::new("Groceries", "milk, eggs");
        assert_eq!(note.title, "Groceries");
        assert_eq!(note.body, "milk, eggs");
        assert!(note.owner.is_local());
        assert!(!note.is_deleted());
        assert!(note.created_at > 0);
        assert_eq!(note.created_at, note.updated_at);
    }

    #[test]
    fn test_is_empty() {
        let empty = Note::new("   ", "\n");
        assert!(empty.is_empty());

        let not_empty = Note::new("", "hello");
        assert!(!not_empty.is_empty());
    }

    #[test]
    fn test_serde_roundtrip_preserves_id() {
        let note = Note::new("a", "b");
        let json = serde_json::to_string(&note).unwrap();
        let back: Note = serde_json::from_str(&json).unwrap();
        assert_eq!(note, back);
    }
}
