//! Content-type resolution for served files.
//!
//! Byte sniffing catches binary formats regardless of file naming; text
//! formats all sniff as the same generic catch-all, so those are refined by
//! extension into their canonical media types.

use std::path::Path;

const GENERIC_TEXT: &str = "text/plain; charset=utf-8";

/// Resolve the content type for a file from its leading bytes, falling back
/// to the extension table when sniffing yields no specific type.
pub fn resolve_content_type(path: &Path, head: &[u8]) -> String {
    match infer::get(head) {
        Some(kind) => kind.mime_type().to_string(),
        None => refine_text_type(path).to_string(),
    }
}

/// Extension-based refinement for files that sniff as generic text.
fn refine_text_type(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return GENERIC_TEXT;
    };
    match ext.to_ascii_lowercase().as_str() {
        "css" => "text/css; charset=utf-8",
        "js" => "text/javascript; charset=utf-8",
        "html" | "htm" => "text/html; charset=utf-8",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "ico" => "image/vnd.microsoft.icon",
        _ => GENERIC_TEXT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stylesheet_is_refined_from_generic_text() {
        let resolved = resolve_content_type(Path::new("style.css"), b"body { margin: 0; }");
        assert_eq!(resolved, "text/css; charset=utf-8");
    }

    #[test]
    fn script_and_markup_get_canonical_types() {
        assert_eq!(
            resolve_content_type(Path::new("app.js"), b"console.log(1)"),
            "text/javascript; charset=utf-8"
        );
        assert_eq!(
            resolve_content_type(Path::new("index.html"), b"<!doctype html>"),
            "text/html; charset=utf-8"
        );
    }

    #[test]
    fn sniffed_binary_type_is_used_verbatim() {
        // PNG magic bytes beat the (lying) extension.
        let png_head = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
        assert_eq!(
            resolve_content_type(Path::new("picture.txt"), &png_head),
            "image/png"
        );
    }

    #[test]
    fn fonts_are_refined_by_extension() {
        assert_eq!(
            resolve_content_type(Path::new("font.woff2"), b"not-sniffable"),
            "font/woff2"
        );
    }

    #[test]
    fn unknown_text_falls_back_to_plain() {
        assert_eq!(
            resolve_content_type(Path::new("notes.txt"), b"hello"),
            "text/plain; charset=utf-8"
        );
        assert_eq!(
            resolve_content_type(Path::new("LICENSE"), b"MIT"),
            "text/plain; charset=utf-8"
        );
    }
}
