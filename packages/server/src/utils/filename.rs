use std::path::Path;

/// Sanitizes an upload filename: the base is reduced to
/// `[A-Za-z0-9_-]` with whitespace runs collapsed to `_`, the original
/// extension is preserved. Falls back to "file" for degenerate names.
pub fn sanitize_upload_name(original: &str) -> String {
    let path = Path::new(original);
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();

    let mut base = String::with_capacity(stem.len());
    let mut last_was_space = false;
    for c in stem.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                base.push('_');
            }
            last_was_space = true;
        } else if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            base.push(c);
            last_was_space = false;
        } else {
            last_was_space = false;
        }
    }

    if base.is_empty() {
        base.push_str("file");
    }
    format!("{base}{ext}")
}

/// Builds a safe download filename from an asset title plus a mime-derived
/// extension.
pub fn download_name(title: &str, extension: Option<&str>) -> String {
    let base: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let base = base.trim_matches('_');
    let base = if base.is_empty() { "asset" } else { base };
    match extension {
        Some(ext) => format!("{base}.{ext}"),
        None => base.to_string(),
    }
}
