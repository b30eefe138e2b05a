//! Per-bundle change tags.
//!
//! One small text file per bundle (`<bundleName>.tag` next to the tenant
//! directories) records the etag of the last successful sync. A tag is only
//! written after the tenant tree has been fully replaced, so its presence is
//! the signal that the mirrored content is complete.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::storage::ARCHIVE_SUFFIX;

#[derive(Debug, Clone)]
pub struct TagStore {
    root: PathBuf,
}

impl TagStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn tag_path(&self, bundle_name: &str) -> PathBuf {
        self.root.join(format!("{bundle_name}.tag"))
    }

    /// Read the stored tag for a bundle. Absence or unreadable content both
    /// mean "no prior successful sync" and trigger a fresh download.
    pub fn read(&self, bundle_name: &str) -> Option<String> {
        let contents = std::fs::read_to_string(self.tag_path(bundle_name)).ok()?;
        let tag = contents.trim();
        if tag.is_empty() {
            None
        } else {
            Some(tag.to_string())
        }
    }

    /// Persist a new tag. Written to a temp file first and renamed into
    /// place, so a failed write leaves any previous tag intact.
    pub fn write(&self, bundle_name: &str, tag: &str) -> Result<()> {
        let path = self.tag_path(bundle_name);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)
            .with_context(|| format!("create temp tag file in {}", self.root.display()))?;
        tmp.write_all(tag.as_bytes())
            .context("write tag contents")?;
        tmp.persist(&path)
            .with_context(|| format!("persist tag file {}", path.display()))?;
        Ok(())
    }

    /// Enumerate tenant identifiers known to the mirror, derived from the
    /// tag files of completed syncs.
    pub fn tenants(&self) -> Vec<String> {
        let suffix = format!("{ARCHIVE_SUFFIX}.tag");
        let mut tenants = Vec::new();

        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return tenants;
        };
        for entry in entries.flatten() {
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(tenant) = name.strip_suffix(&suffix) {
                if !tenant.is_empty() {
                    tenants.push(tenant.to_string());
                }
            }
        }

        tenants.sort();
        tenants
    }
}
