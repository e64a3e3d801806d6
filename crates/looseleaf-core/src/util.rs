//! Shared utility functions used across multiple modules.

/// Current Unix timestamp in milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Next `updated_at` for a record whose previous value is `previous`.
///
/// Clock skew or same-millisecond edits must never produce a stamp that
/// fails to advance, since merge precedence rides entirely on this field.
#[must_use]
pub fn next_timestamp(previous: i64) -> i64 {
    now_millis().max(previous + 1)
}
