//! Filesystem primitives shared by the state store and the context cache.
//!
//! Every durable write in the crate goes through [`write_atomic`]: the bytes
//! land in a uniquely named sibling temp file, are synced, and the temp file
//! is renamed over the destination. Readers therefore see either the old
//! file or the new one, never a torn write, even when the writer is killed
//! half way through.
//!
//! Read-modify-write sequences that must not interleave across processes
//! are wrapped in [`with_exclusive_lock`], an advisory `fd-lock` on a
//! dedicated lock file.

use fd_lock::RwLock;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Atomically replace `path` with `contents`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    ensure_parent(path)?;
    let temp = temp_path_for(path);

    let result = write_synced(&temp, contents).and_then(|_| fs::rename(&temp, path));
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let serialized = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &serialized)
}

/// Atomically create `path` only if it does not exist yet.
///
/// Returns `Ok(true)` when this call created the file and `Ok(false)` when
/// another writer got there first. The file is never observed half written.
pub fn create_new_atomic(path: &Path, contents: &[u8]) -> io::Result<bool> {
    ensure_parent(path)?;
    let temp = temp_path_for(path);

    let result = write_synced(&temp, contents).and_then(|_| match fs::hard_link(&temp, path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    });
    let _ = fs::remove_file(&temp);
    result
}

/// Read a file to a string, mapping "not found" to `None`.
pub fn read_optional(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Run `f` while holding an exclusive advisory lock on `lock_path`.
///
/// If the lock file cannot be opened or locked, `f` still runs: a broken
/// lock must never stop the caller, so the failure is logged and the
/// critical section proceeds unserialized.
pub fn with_exclusive_lock<T>(lock_path: &Path, f: impl FnOnce() -> T) -> T {
    let file = match open_lock_file(lock_path) {
        Ok(file) => file,
        Err(e) => {
            warn!(lock = ?lock_path, error = %e, "Failed to open lock file, continuing unlocked");
            return f();
        }
    };

    let mut lock = RwLock::new(file);
    let result = match lock.write() {
        Ok(_guard) => {
            debug!(lock = ?lock_path, "Acquired exclusive lock");
            f()
        }
        Err(e) => {
            warn!(lock = ?lock_path, error = %e, "Failed to acquire lock, continuing unlocked");
            f()
        }
    };
    result
}

fn open_lock_file(lock_path: &Path) -> io::Result<File> {
    ensure_parent(lock_path)?;
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)
}

fn write_synced(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string());
    path.with_file_name(format!(
        ".{file_name}.{}.{}.tmp",
        std::process::id(),
        Uuid::new_v4().simple()
    ))
}
