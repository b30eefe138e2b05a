//! Archive extraction and atomic publish.
//!
//! Bundles are extracted into `<site_dir>/.stage/`, moved to an immutable
//! build directory under `<site_dir>/.builds/`, and made visible by renaming
//! a symlink over `<site_dir>/<tenant>`. The rename is the only step a
//! concurrent reader can observe, so the tenant path always resolves to
//! either the complete previous tree or the complete new one.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use tracing::{debug, warn};

use super::SyncError;
use crate::storage::RemoteBundle;

/// Staging area for in-progress extractions. Never read by the server.
const STAGE_DIR: &str = ".stage";
/// Immutable extracted trees, one per (tenant, version). The live tenant
/// symlink points at one of these.
const BUILDS_DIR: &str = ".builds";

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Extract `payload` and atomically publish it as the live tree for the
/// bundle's tenant. On any error the currently visible tree is untouched.
pub async fn unpack_and_publish(
    site_dir: &Path,
    bundle: &RemoteBundle,
    payload: Bytes,
) -> Result<(), SyncError> {
    let site_dir = site_dir.to_path_buf();
    let name = bundle.name.clone();
    let tenant = bundle.tenant_id().to_string();
    let version = version_component(&bundle.etag);

    tokio::task::spawn_blocking(move || {
        unpack_and_publish_blocking(&site_dir, &name, &tenant, &version, &payload)
    })
    .await
    .map_err(|e| SyncError::Unpack {
        name: bundle.name.clone(),
        source: anyhow!("extraction task panicked: {e}"),
    })?
}

/// Remove leftover staging entries from interrupted runs. Build directories
/// are kept: the live symlinks may still point at them.
pub fn prune_stage(site_dir: &Path) {
    let stage_root = site_dir.join(STAGE_DIR);
    let Ok(entries) = fs::read_dir(&stage_root) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        debug!(path = %path.display(), "removing stale staging entry");
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "failed to remove stale staging entry");
        }
    }
}

// ---------------------------------------------------------------------------
// Blocking implementation
// ---------------------------------------------------------------------------

fn unpack_and_publish_blocking(
    site_dir: &Path,
    name: &str,
    tenant: &str,
    version: &str,
    payload: &[u8],
) -> Result<(), SyncError> {
    let stage_root = site_dir.join(STAGE_DIR);
    let builds_root = site_dir.join(BUILDS_DIR);
    let unpack_err = |source: anyhow::Error| SyncError::Unpack {
        name: name.to_string(),
        source,
    };

    fs::create_dir_all(&stage_root)
        .with_context(|| format!("create staging root {}", stage_root.display()))
        .map_err(unpack_err)?;
    fs::create_dir_all(&builds_root)
        .with_context(|| format!("create builds root {}", builds_root.display()))
        .map_err(unpack_err)?;

    let build_name = format!("{tenant}@{version}");

    let stage = stage_root.join(&build_name);
    if stage.exists() {
        let _ = fs::remove_dir_all(&stage);
    }
    fs::create_dir_all(&stage)
        .with_context(|| format!("create staging dir {}", stage.display()))
        .map_err(unpack_err)?;

    if let Err(e) = extract_zip(name, payload, &stage) {
        let _ = fs::remove_dir_all(&stage);
        return Err(e);
    }

    // Stale build with the same version can linger after a failed tag write.
    let build = builds_root.join(&build_name);
    if build.exists() {
        let _ = fs::remove_dir_all(&build);
    }
    fs::rename(&stage, &build)
        .with_context(|| format!("move staged tree to {}", build.display()))
        .map_err(unpack_err)?;

    if let Err(e) = swap_live(site_dir, tenant, &build_name) {
        let _ = fs::remove_dir_all(&build);
        return Err(unpack_err(e));
    }

    Ok(())
}

/// Extract all archive entries into `dest`, rejecting any entry whose
/// resolved path would escape it.
fn extract_zip(name: &str, payload: &[u8], dest: &Path) -> Result<(), SyncError> {
    let unpack_err = |source: anyhow::Error| SyncError::Unpack {
        name: name.to_string(),
        source,
    };

    let mut archive = zip::ZipArchive::new(io::Cursor::new(payload))
        .context("open zip archive")
        .map_err(unpack_err)?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("read archive entry {i}"))
            .map_err(unpack_err)?;

        let raw_name = entry.name().to_string();
        let Some(rel) = entry.enclosed_name() else {
            return Err(SyncError::PathTraversal { entry: raw_name });
        };
        let out = dest.join(rel);

        if entry.is_dir() {
            fs::create_dir_all(&out)
                .with_context(|| format!("create directory {}", out.display()))
                .map_err(unpack_err)?;
            continue;
        }

        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create parent directory {}", parent.display()))
                .map_err(unpack_err)?;
        }

        let mut file = fs::File::create(&out)
            .with_context(|| format!("create file {}", out.display()))
            .map_err(unpack_err)?;
        io::copy(&mut entry, &mut file)
            .with_context(|| format!("write file {}", out.display()))
            .map_err(unpack_err)?;

        if let Some(mode) = entry.unix_mode() {
            fs::set_permissions(&out, fs::Permissions::from_mode(mode))
                .with_context(|| format!("set permissions on {}", out.display()))
                .map_err(unpack_err)?;
        }
    }

    Ok(())
}

/// Point the live tenant path at `build_name` with a single atomic rename of
/// a freshly created symlink, then drop the previous build tree.
fn swap_live(site_dir: &Path, tenant: &str, build_name: &str) -> Result<()> {
    let live = site_dir.join(tenant);
    // Relative target so the mirror survives being relocated.
    let target = Path::new(BUILDS_DIR).join(build_name);

    let link_tmp = site_dir.join(STAGE_DIR).join(format!("{tenant}.link"));
    let _ = fs::remove_file(&link_tmp);
    std::os::unix::fs::symlink(&target, &link_tmp)
        .with_context(|| format!("create symlink {}", link_tmp.display()))?;

    let previous = fs::read_link(&live).ok();

    match fs::symlink_metadata(&live) {
        Ok(meta) if !meta.file_type().is_symlink() => {
            // Layout migration: the live path is a plain directory from an
            // older deployment. Move it aside so the rename can land; this
            // happens at most once per tenant.
            let aside = site_dir.join(STAGE_DIR).join(format!("{tenant}.old"));
            let _ = fs::remove_dir_all(&aside);
            fs::rename(&live, &aside)
                .with_context(|| format!("move aside legacy tree {}", live.display()))?;
            fs::rename(&link_tmp, &live)
                .with_context(|| format!("publish symlink {}", live.display()))?;
            let _ = fs::remove_dir_all(&aside);
        }
        _ => {
            fs::rename(&link_tmp, &live)
                .with_context(|| format!("publish symlink {}", live.display()))?;
        }
    }

    if let Some(prev) = previous {
        let prev_abs = resolve_in(site_dir, &prev);
        if prev_abs != site_dir.join(BUILDS_DIR).join(build_name) {
            let _ = fs::remove_dir_all(&prev_abs);
        }
    }

    debug!(tenant, build = build_name, "published tenant tree");
    Ok(())
}

fn resolve_in(site_dir: &Path, link_target: &Path) -> PathBuf {
    if link_target.is_absolute() {
        link_target.to_path_buf()
    } else {
        site_dir.join(link_target)
    }
}

/// Filesystem-safe rendition of an etag for use in build directory names.
fn version_component(etag: &str) -> String {
    etag.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}
