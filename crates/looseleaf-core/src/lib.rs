//! looseleaf-core - Core library for Looseleaf
//!
//! This crate contains the record models shared by every replica and the
//! pure merge algorithm that reconciles a local snapshot with a remote one.
//! It performs no I/O; the stores and the sync engine live in
//! `looseleaf-sync`.

pub mod merge;
pub mod models;
pub mod state;
pub mod util;

pub use merge::{merge, Merge};
pub use models::{Folder, FolderId, Note, NoteId, OwnerId, Record, RecordKind};
pub use state::SyncState;
