//! Object store abstraction.
//!
//! Provides the [`ObjectStore`] trait that encapsulates everything the sync
//! engine needs from the remote bundle store: a full listing and a byte fetch.
//! The sync scheduler and health checks dispatch through this trait so that
//! no S3-specific request construction leaks outside this module, and tests
//! can substitute an in-memory store.

pub mod s3;

use anyhow::Result;
use bytes::Bytes;

/// Archive suffix that marks an object as a tenant site bundle.
pub const ARCHIVE_SUFFIX: &str = ".zip";

// ---------------------------------------------------------------------------
// Remote bundle
// ---------------------------------------------------------------------------

/// One tenant's packaged site as reported by the object-store listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBundle {
    /// Object name, e.g. `example.com.zip`.
    pub name: String,
    /// Opaque version marker assigned by the store.
    pub etag: String,
    /// Object size in bytes.
    pub size: i64,
}

impl RemoteBundle {
    /// Whether this object is a candidate for syncing: a non-empty zip.
    pub fn is_site_archive(&self) -> bool {
        self.size > 0 && self.name.ends_with(ARCHIVE_SUFFIX)
    }

    /// Tenant identifier derived from the object name with the archive
    /// suffix stripped, e.g. `example.com.zip` -> `example.com`.
    pub fn tenant_id(&self) -> &str {
        self.name.strip_suffix(ARCHIVE_SUFFIX).unwrap_or(&self.name)
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Abstraction over the remote bundle store.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Enumerate every object in the bundle bucket. Implementations must
    /// paginate internally; callers see the complete listing.
    async fn list(&self) -> Result<Vec<RemoteBundle>>;

    /// Fetch the full payload of one object.
    async fn fetch(&self, name: &str) -> Result<Bytes>;
}
