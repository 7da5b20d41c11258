//! Collision handling shared by the accumulator managers
//!
//! Every accumulated entry has a logical key (env var name, mount path,
//! volume name, ...). When a second write hits an existing key, the caller's
//! [`MergePolicy`] decides what survives. Without a policy the first writer
//! wins and the collision is logged.

use tracing::warn;

use crate::{FeatureError, Result};

/// Separator inserted by [`MergePolicy::AppendToValue`]
pub const APPEND_SEPARATOR: &str = " ";

/// What to do when an entry with the same key already exists
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergePolicy {
    /// Keep the existing entry and drop the new one
    IgnoreNew,
    /// Concatenate the new value onto the existing one
    AppendToValue,
    /// Replace the existing entry
    Override,
}

/// An entry that can be accumulated with a merge policy
pub(crate) trait Mergeable: Clone + PartialEq {
    /// Entry kind, for logs and errors
    const KIND: &'static str;

    /// Logical key identifying collisions
    fn merge_key(&self) -> String;

    /// Append `other`'s value onto this entry's value
    fn append_value(&mut self, other: &Self) -> Result<()> {
        Err(FeatureError::merge(
            Self::KIND,
            other.merge_key(),
            "append-to-value needs a textual value",
        ))
    }
}

/// Concatenate two textual values with [`APPEND_SEPARATOR`]
pub(crate) fn append_text(existing: &str, new: &str) -> String {
    if existing.is_empty() {
        new.to_string()
    } else if new.is_empty() {
        existing.to_string()
    } else {
        format!("{existing}{APPEND_SEPARATOR}{new}")
    }
}

/// Insert `entry` into `entries`, resolving a key collision with `policy`
pub(crate) fn merge_entry<T: Mergeable>(
    entries: &mut Vec<T>,
    entry: T,
    policy: Option<MergePolicy>,
    scope: &str,
) -> Result<()> {
    let key = entry.merge_key();
    let Some(pos) = entries.iter().position(|e| e.merge_key() == key) else {
        entries.push(entry);
        return Ok(());
    };

    match policy {
        None => {
            if entries[pos] != entry {
                log_default_collision(T::KIND, &key, scope);
            }
        }
        Some(MergePolicy::IgnoreNew) => {}
        Some(MergePolicy::Override) => entries[pos] = entry,
        Some(MergePolicy::AppendToValue) => entries[pos].append_value(&entry)?,
    }
    Ok(())
}

/// Resolve a collision on a plain string value in place
pub(crate) fn merge_text(
    existing: &mut String,
    new: &str,
    policy: Option<MergePolicy>,
    kind: &'static str,
    key: &str,
    scope: &str,
) {
    match policy {
        None => {
            if existing != new {
                log_default_collision(kind, key, scope);
            }
        }
        Some(MergePolicy::IgnoreNew) => {}
        Some(MergePolicy::Override) => *existing = new.to_string(),
        Some(MergePolicy::AppendToValue) => *existing = append_text(existing, new),
    }
}

fn log_default_collision(kind: &'static str, key: &str, scope: &str) {
    warn!(
        kind,
        key,
        scope,
        "conflicting write without merge policy, keeping first value"
    );
}
