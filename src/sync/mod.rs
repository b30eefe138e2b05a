//! Tenant bundle synchronization.
//!
//! A background scheduler keeps the local mirror in step with the remote
//! bundle bucket: it lists objects, downloads the ones whose etag changed,
//! unpacks them into a staging area, and publishes each tenant tree with a
//! single atomic swap so readers never observe a partial site.

pub mod bundle;
pub mod scheduler;
pub mod tags;
pub mod unpack;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Everything that can go wrong while syncing bundles. None of these are
/// fatal to the process: each aborts the affected bundle (or cycle) and the
/// next scheduled cycle retries, since the tag is only advanced on success.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote listing could not be enumerated; aborts the whole cycle.
    #[error("listing remote bundles failed: {0}")]
    Listing(#[source] anyhow::Error),

    /// Network or read failure while downloading one bundle.
    #[error("fetching bundle {name} failed: {source}")]
    Fetch {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// An archive entry would resolve outside the extraction root.
    #[error("archive entry {entry:?} escapes the extraction root")]
    PathTraversal { entry: String },

    /// Disk I/O or archive decode failure during extraction or publish.
    #[error("unpacking bundle {name} failed: {source}")]
    Unpack {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// The mirror was replaced but the new tag could not be persisted. The
    /// previous tag is retained, so the next cycle redownloads and reconciles.
    #[error("persisting tag for {name} failed: {source}")]
    TagPersist {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

// ---------------------------------------------------------------------------
// Per-bundle outcome
// ---------------------------------------------------------------------------

/// Result of syncing one bundle within a cycle.
#[derive(Debug)]
pub enum SyncOutcome {
    /// Stored tag matched the remote etag; no network transfer happened.
    Skipped,
    /// The tenant tree was replaced and the tag advanced.
    Updated,
    /// The bundle could not be synced; mirror and tag are untouched
    /// (except [`SyncError::TagPersist`], where only the tag lags).
    Failed(SyncError),
}
