//! Data models for Looseleaf

mod folder;
mod note;
mod owner;
mod record;

pub use folder::{Folder, FolderId};
pub use note::{Note, NoteId};
pub use owner::OwnerId;
pub use record::{Record, RecordKind};
