use ignore::WalkBuilder;
use log::debug;
use path_clean::PathClean;
use std::path::{Component, Path, PathBuf};

/// Walks the documents root and returns every file as a `/`-delimited
/// relative path, in natural order. Hidden files are skipped; the root is
/// plain data storage, so the walker's git-aware filters are disabled.
pub fn list_documents(root: &Path) -> Result<Vec<String>, String> {
    debug!("Listing documents under: {}", root.display());
    let walker = WalkBuilder::new(root)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .ignore(false)
        .parents(false)
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| format!("Failed to read directory entry: {}", e))?;
        if !entry.file_type().map_or(false, |ft| ft.is_file()) {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| format!("Failed to relativize path: {}", e))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push(name);
    }

    files.sort_by(|a, b| natord::compare(a, b));
    Ok(files)
}

/// Resolves a client-supplied relative path against the documents root.
/// The check is purely lexical: absolute paths and paths that still point
/// above the root after cleaning are refused. Existence is the caller's
/// concern.
pub fn resolve_document(root: &Path, requested: &str) -> Result<PathBuf, String> {
    if requested.is_empty() {
        return Err("Empty document path.".to_string());
    }
    let path = Path::new(requested);
    if path.is_absolute() || path.components().any(|c| matches!(c, Component::Prefix(_))) {
        return Err(format!("Absolute paths are not allowed: {}", requested));
    }
    let cleaned = path.clean();
    if cleaned.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(format!("Path escapes the documents root: {}", requested));
    }
    Ok(root.join(cleaned))
}
