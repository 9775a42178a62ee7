//! Staleness rule: stored status + live folder metadata → reported status.
//!
//! Only an `indexed` record needs a live lookup. Callers first ask
//! [`stored_verdict`]; when it returns [`Verdict::CheckLive`] they fetch the
//! folder's metadata from the storage provider and finish with
//! [`compare_with_live`].

use chrono::{DateTime, Utc};

use crate::models::{FolderIndexRecord, IndexStatus};

/// Outcome of inspecting the stored record alone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// The status is final without consulting the provider.
    Final(IndexStatus),
    /// The record says `indexed`; compare against live metadata.
    CheckLive {
        last_indexed_at: Option<DateTime<Utc>>,
    },
}

/// Result of the live metadata lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LiveMetadata {
    /// Folder exists; modification time in seconds since the Unix epoch.
    Modified(f64),
    /// The provider reports no such folder.
    Missing,
    /// The provider call itself failed.
    LookupFailed,
}

pub fn stored_verdict(record: Option<&FolderIndexRecord>) -> Verdict {
    match record {
        None => Verdict::Final(IndexStatus::NotIndexed),
        Some(r) if r.status != IndexStatus::Indexed => Verdict::Final(r.status),
        Some(r) => Verdict::CheckLive {
            last_indexed_at: r.last_indexed_at,
        },
    }
}

/// Finish the check for an `indexed` record.
///
/// A failed lookup reports `indexed`: a provider outage must not make every
/// folder look stale.
pub fn compare_with_live(last_indexed_at: Option<DateTime<Utc>>, live: LiveMetadata) -> IndexStatus {
    match live {
        LiveMetadata::Missing => IndexStatus::NotIndexed,
        LiveMetadata::LookupFailed => IndexStatus::Indexed,
        LiveMetadata::Modified(modified) => match last_indexed_at {
            None => IndexStatus::Outdated,
            Some(indexed_at) if modified > epoch_seconds(indexed_at) => IndexStatus::Outdated,
            Some(_) => IndexStatus::Indexed,
        },
    }
}

fn epoch_seconds(ts: DateTime<Utc>) -> f64 {
    ts.timestamp_micros() as f64 / 1_000_000.0
}
