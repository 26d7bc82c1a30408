//! Deterministic tree hashing for built artifacts
//!
//! Two builds from identical inputs must produce the same artifact tree;
//! the digest makes that observable without unpacking tarballs.

use std::fs;
use std::path::Path;

use anyhow::Context;
use walkdir::WalkDir;

/// Compute a deterministic digest of a directory tree
///
/// # Algorithm
/// - Entries visited in lexicographic relative-path order
/// - Directory: `path || 0xFF`
/// - File: `path || 0x00 || exec-bit || content`
/// - Output: blake3 hex string
///
/// Symlinks are rejected; artifacts never contain them.
pub fn hash_tree(path: &Path) -> anyhow::Result<String> {
    let meta =
        fs::metadata(path).with_context(|| format!("Failed to stat: {}", path.display()))?;
    if !meta.is_dir() {
        anyhow::bail!("Not a directory: {}", path.display());
    }

    let mut hasher = blake3::Hasher::new();
    for entry in WalkDir::new(path)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry =
            entry.with_context(|| format!("Failed to walk directory: {}", path.display()))?;
        let rel = entry
            .path()
            .strip_prefix(path)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        let ty = entry.file_type();

        if ty.is_dir() {
            hasher.update(rel.as_bytes());
            hasher.update(&[0xFF]);
        } else if ty.is_file() {
            hasher.update(rel.as_bytes());
            hasher.update(&[0x00]);
            hasher.update(&[u8::from(is_executable(entry.path())?)]);
            let content = fs::read(entry.path())
                .with_context(|| format!("Failed to read file: {}", entry.path().display()))?;
            hasher.update(&content);
        } else {
            anyhow::bail!("Unsupported entry in artifact: {}", entry.path().display());
        }
    }

    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> anyhow::Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    let mode = fs::metadata(path)
        .with_context(|| format!("Failed to stat file: {}", path.display()))?
        .permissions()
        .mode();
    Ok(mode & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> anyhow::Result<bool> {
    Ok(false)
}
