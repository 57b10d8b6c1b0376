use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use super::CacheError;

/// Directories whose contents never affect a fingerprint.
pub const NOISE_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    ".direnv",
    "dist",
    "build",
    ".next",
    ".cache",
];

fn is_noise(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && NOISE_DIRS.contains(&entry.file_name().to_string_lossy().as_ref())
}

/// Fingerprint with the canonical path it was computed over
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub hash: String,
    pub canonical_path: PathBuf,
    pub files: usize,
}

/// Hash a tree's file paths and modification times.
///
/// The canonical absolute path is hashed first, so identical trees in two
/// places never share a fingerprint.
pub fn fingerprint(path: &Path) -> Result<Fingerprint, CacheError> {
    let canonical_path = path
        .canonicalize()
        .map_err(|source| CacheError::io(path, source))?;

    let mut lines: Vec<String> = Vec::new();
    let walker = WalkDir::new(&canonical_path)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_noise(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "Skipping unreadable entry while fingerprinting");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let mtime_nanos = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let relative = entry
            .path()
            .strip_prefix(&canonical_path)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        lines.push(format!("{relative}\t{mtime_nanos}\n"));
    }
    lines.sort();

    let mut hasher = Sha256::new();
    hasher.update(canonical_path.to_string_lossy().as_bytes());
    hasher.update(b"\n");
    for line in &lines {
        hasher.update(line.as_bytes());
    }

    Ok(Fingerprint {
        hash: format!("{:x}", hasher.finalize()),
        canonical_path,
        files: lines.len(),
    })
}

/// True for strings that could have come out of [`fingerprint`].
pub fn is_valid_hash(candidate: &str) -> bool {
    candidate.len() == 64 && candidate.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
