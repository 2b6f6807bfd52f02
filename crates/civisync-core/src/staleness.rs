//! Staleness decision between a cached version record and a fresh fetch.
//!
//! Deliberately fails open: any missing or unreadable side of the
//! comparison means "needs update", so the catalog re-fetches rather than
//! silently going stale.

use crate::civitai::types::VersionResponse;
use crate::sidecar::StoredRecord;

/// Whether the locally persisted record must be refreshed.
///
/// The remote `updatedAt` is compared verbatim for exact equality; any
/// mismatch, absence, or failed fresh fetch counts as stale.
pub fn needs_update(
    cached: Option<&StoredRecord<VersionResponse>>,
    fresh: Option<&VersionResponse>,
) -> bool {
    let Some(cached) = cached else {
        return true;
    };
    let Some(cached_at) = cached.data.updated_at.as_deref() else {
        return true;
    };
    let Some(fresh) = fresh else {
        return true;
    };
    let Some(fresh_at) = fresh.updated_at.as_deref() else {
        return true;
    };
    cached_at != fresh_at
}
