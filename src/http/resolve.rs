//! Request-to-file resolution.
//!
//! Maps a Host header and URL path to a candidate file inside the tenant's
//! mirror subtree: the port suffix is stripped from the host, the query
//! string never reaches us (axum separates it), and a trailing `/` expands
//! to the default document.

use std::path::{Path, PathBuf};

/// Default document served for directory-style paths.
pub const DEFAULT_DOCUMENT: &str = "index.html";

/// Strip any port suffix from a Host header value. Handles bracketed IPv6
/// literals (`[::1]:8080`).
pub fn normalize_host(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return &rest[..end];
        }
    }
    host.split(':').next().unwrap_or(host)
}

/// Expand a request path to the concrete document path: a trailing `/`
/// (including the bare root) becomes the default document.
pub fn normalize_path(path: &str) -> String {
    if path.ends_with('/') {
        format!("{path}{DEFAULT_DOCUMENT}")
    } else {
        path.to_string()
    }
}

/// Reject request paths that could reach outside the tenant subtree before
/// any filesystem access happens.
pub fn is_safe_path(path: &str) -> bool {
    !path.contains('\0') && !path.split('/').any(|segment| segment == "..")
}

/// Candidate file for a request: `<site_dir>/<tenant>/<path>`.
pub fn tenant_file_path(site_dir: &Path, tenant: &str, path: &str) -> PathBuf {
    site_dir.join(tenant).join(path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_port_is_stripped() {
        assert_eq!(normalize_host("example.com:3000"), "example.com");
        assert_eq!(normalize_host("example.com"), "example.com");
    }

    #[test]
    fn ipv6_host_keeps_address() {
        assert_eq!(normalize_host("[::1]:8080"), "::1");
        assert_eq!(normalize_host("[2001:db8::1]"), "2001:db8::1");
    }

    #[test]
    fn root_expands_to_default_document() {
        assert_eq!(normalize_path("/"), "/index.html");
    }

    #[test]
    fn trailing_slash_expands_to_default_document() {
        assert_eq!(normalize_path("/docs/"), "/docs/index.html");
    }

    #[test]
    fn file_paths_pass_through() {
        assert_eq!(normalize_path("/docs/guide.html"), "/docs/guide.html");
    }

    #[test]
    fn traversal_segments_are_unsafe() {
        assert!(!is_safe_path("/../secrets.txt"));
        assert!(!is_safe_path("/docs/../../etc/passwd"));
        assert!(!is_safe_path("/a\0b"));
        assert!(is_safe_path("/docs/guide.html"));
        assert!(is_safe_path("/docs/..hidden"));
    }

    #[test]
    fn file_path_lands_inside_tenant_subtree() {
        let path = tenant_file_path(Path::new("/srv/sites"), "example.com", "/index.html");
        assert_eq!(path, PathBuf::from("/srv/sites/example.com/index.html"));
    }
}
