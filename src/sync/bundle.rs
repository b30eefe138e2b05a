//! Per-bundle synchronizer.
//!
//! Decides whether a remote bundle needs fetching (etag vs stored tag),
//! downloads it, hands it to the unpacker, and advances the tag only after
//! the tenant tree has been fully replaced.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, instrument};

use super::tags::TagStore;
use super::{unpack, SyncError, SyncOutcome};
use crate::storage::{ObjectStore, RemoteBundle};

pub struct Synchronizer {
    site_dir: PathBuf,
    tags: TagStore,
    store: Arc<dyn ObjectStore>,
}

impl Synchronizer {
    pub fn new(site_dir: impl Into<PathBuf>, store: Arc<dyn ObjectStore>) -> Self {
        let site_dir = site_dir.into();
        Self {
            tags: TagStore::new(&site_dir),
            site_dir,
            store,
        }
    }

    /// Bring one tenant's local tree in step with the remote bundle.
    ///
    /// An up-to-date tag short-circuits without any network transfer. On
    /// failure the previously visible tree and tag are untouched, so the
    /// next cycle retries from the same starting point.
    #[instrument(skip(self, bundle), fields(bundle = %bundle.name, etag = %bundle.etag))]
    pub async fn sync(&self, bundle: &RemoteBundle) -> SyncOutcome {
        if self.tags.read(&bundle.name).as_deref() == Some(bundle.etag.as_str()) {
            debug!("bundle unchanged");
            return SyncOutcome::Skipped;
        }

        let payload = match self.store.fetch(&bundle.name).await {
            Ok(payload) => payload,
            Err(e) => {
                return SyncOutcome::Failed(SyncError::Fetch {
                    name: bundle.name.clone(),
                    source: e,
                })
            }
        };

        if let Err(e) = unpack::unpack_and_publish(&self.site_dir, bundle, payload).await {
            return SyncOutcome::Failed(e);
        }

        if let Err(e) = self.tags.write(&bundle.name, &bundle.etag) {
            return SyncOutcome::Failed(SyncError::TagPersist {
                name: bundle.name.clone(),
                source: e,
            });
        }

        SyncOutcome::Updated
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::FakeObjectStore;
    use super::*;
    use std::io::Write;

    use bytes::Bytes;
    use zip::write::SimpleFileOptions;

    fn zip_payload(entries: &[(&str, &str)]) -> Bytes {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, contents) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        Bytes::from(writer.finish().unwrap().into_inner())
    }

    fn remote(name: &str, etag: &str) -> RemoteBundle {
        RemoteBundle {
            name: name.to_string(),
            etag: etag.to_string(),
            size: 1,
        }
    }

    #[tokio::test]
    async fn matching_tag_skips_without_network_transfer() {
        let site = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeObjectStore::with_bundle(
            "example.com.zip",
            "e1",
            zip_payload(&[("index.html", "v1")]),
        ));
        let sync = Synchronizer::new(site.path(), store.clone());
        TagStore::new(site.path())
            .write("example.com.zip", "e1")
            .unwrap();

        let outcome = sync.sync(&remote("example.com.zip", "e1")).await;

        assert!(matches!(outcome, SyncOutcome::Skipped));
        assert_eq!(store.fetch_count(), 0);
    }

    #[tokio::test]
    async fn changed_etag_downloads_and_advances_tag() {
        let site = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeObjectStore::with_bundle(
            "example.com.zip",
            "e2",
            zip_payload(&[("index.html", "v2")]),
        ));
        let sync = Synchronizer::new(site.path(), store.clone());
        TagStore::new(site.path())
            .write("example.com.zip", "e1")
            .unwrap();

        let outcome = sync.sync(&remote("example.com.zip", "e2")).await;

        assert!(matches!(outcome, SyncOutcome::Updated));
        assert_eq!(store.fetch_count(), 1);
        assert_eq!(
            TagStore::new(site.path()).read("example.com.zip").as_deref(),
            Some("e2")
        );
        assert_eq!(
            std::fs::read_to_string(site.path().join("example.com/index.html")).unwrap(),
            "v2"
        );
    }

    #[tokio::test]
    async fn missing_tag_triggers_initial_download() {
        let site = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeObjectStore::with_bundle(
            "example.com.zip",
            "e1",
            zip_payload(&[("index.html", "v1")]),
        ));
        let sync = Synchronizer::new(site.path(), store.clone());

        let outcome = sync.sync(&remote("example.com.zip", "e1")).await;

        assert!(matches!(outcome, SyncOutcome::Updated));
        assert_eq!(
            TagStore::new(site.path()).read("example.com.zip").as_deref(),
            Some("e1")
        );
    }

    #[tokio::test]
    async fn fetch_failure_leaves_tag_and_mirror_untouched() {
        let site = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeObjectStore::default());
        let sync = Synchronizer::new(site.path(), store);

        let outcome = sync.sync(&remote("example.com.zip", "e1")).await;

        assert!(matches!(
            outcome,
            SyncOutcome::Failed(SyncError::Fetch { .. })
        ));
        assert_eq!(TagStore::new(site.path()).read("example.com.zip"), None);
        assert!(!site.path().join("example.com").exists());
    }

    #[tokio::test]
    async fn traversal_archive_fails_and_keeps_previous_state() {
        let site = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeObjectStore::with_bundle(
            "example.com.zip",
            "e1",
            zip_payload(&[("index.html", "v1")]),
        ));
        let sync = Synchronizer::new(site.path(), store.clone());
        assert!(matches!(
            sync.sync(&remote("example.com.zip", "e1")).await,
            SyncOutcome::Updated
        ));

        store
            .payloads
            .lock()
            .unwrap()
            .insert(
                "example.com.zip".to_string(),
                zip_payload(&[("../evil.txt", "pwned")]),
            );

        let outcome = sync.sync(&remote("example.com.zip", "e2")).await;

        assert!(matches!(
            outcome,
            SyncOutcome::Failed(SyncError::PathTraversal { .. })
        ));
        // Previous tree and tag both survive, so the next cycle retries.
        assert_eq!(
            TagStore::new(site.path()).read("example.com.zip").as_deref(),
            Some("e1")
        );
        assert_eq!(
            std::fs::read_to_string(site.path().join("example.com/index.html")).unwrap(),
            "v1"
        );
    }
}
