//! Whole-record last-writer-wins reconciliation.
//!
//! [`merge`] takes a local and a remote snapshot of one record kind and
//! produces a unified snapshot plus the one-sided deltas: records that only
//! exist locally (to upload) and records where the local copy is newer (to
//! push). It is a pure function with no I/O so the same inputs always
//! produce the same outputs, and running it twice changes nothing.

use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{OwnerId, Record};

/// Outcome of reconciling one record kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merge<T> {
    /// The full reconciled record set, newest first.
    pub unified: Vec<T>,
    /// Local-only records the remote store has never seen.
    pub to_upload: Vec<T>,
    /// Records where the local copy supersedes the remote one.
    pub to_push: Vec<T>,
}

/// Reconcile a local snapshot against a remote one.
///
/// The remote store is authoritative for ownership: every remote record is
/// re-stamped to `owner`, and local-only records are re-owned as they are
/// promoted for upload. Precedence between two copies of the same id is
/// decided entirely by `updated_at`, with equal timestamps going to the
/// remote copy so repeated merges never flip a decision. Soft-deletions are
/// ordinary field changes here: a locally deleted record with a newer stamp
/// is pushed as a deletion, and a newer remote deletion surfaces locally.
pub fn merge<T: Record>(local: Vec<T>, remote: Vec<T>, owner: &OwnerId) -> Merge<T> {
    let mut unified: HashMap<Uuid, T> = remote
        .into_iter()
        .map(|mut record| {
            record.set_owner(owner.clone());
            (record.record_id(), record)
        })
        .collect();

    let mut to_upload = Vec::new();
    let mut to_push = Vec::new();

    for mut record in local {
        let id = record.record_id();
        match unified.get(&id) {
            None => {
                record.set_owner(owner.clone());
                to_upload.push(record.clone());
                unified.insert(id, record);
            }
            Some(remote_copy) if record.updated_at() > remote_copy.updated_at() => {
                record.set_owner(owner.clone());
                to_push.push(record.clone());
                unified.insert(id, record);
            }
            // Remote wins, ties included.
            Some(_) => {}
        }
    }

    let mut unified: Vec<T> = unified.into_values().collect();
    // Presentation order only; the id tie-break keeps repeated merges
    // byte-identical.
    unified.sort_by(|a, b| {
        b.updated_at()
            .cmp(&a.updated_at())
            .then_with(|| a.record_id().cmp(&b.record_id()))
    });

    Merge {
        unified,
        to_upload,
        to_push,
    }
}
