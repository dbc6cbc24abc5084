//! Versioned on-disk cache of native libraries.
//!
//! Layout:
//! ```text
//! <cache_root>/
//!   <engine>/
//!     <version>-<flavor>-<classifier>/
//!       <native library>         (marks a complete entry)
//!       <other libraries>
//!       <api version>-<bridge library>
//!     <version>-<flavor>-<classifier>.integrity.json
//! ```
//!
//! Entries are assembled in a temporary sibling directory and renamed into
//! place, so a partially written entry never contains the native library.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use crate::error::{NativeError, Result};

/// Name prefix of in-progress entries.
const TEMP_PREFIX: &str = "tmp";

#[derive(Debug, Clone)]
pub struct EngineCache {
    root: PathBuf,
}

/// Information about one cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub engine: String,
    /// `{version}-{flavor}-{classifier}`
    pub key: String,
    pub path: PathBuf,
    pub files: usize,
    pub size_bytes: u64,
}

/// SHA-256 digests of the files in an entry, keyed by file name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityRecord {
    pub files: BTreeMap<String, String>,
}

impl EngineCache {
    pub fn new(root: PathBuf) -> Self {
        EngineCache { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn engine_dir(&self, engine: &str) -> PathBuf {
        self.root.join(engine)
    }

    pub fn entry_key(version: &str, flavor: &str, classifier: &str) -> String {
        format!("{version}-{flavor}-{classifier}")
    }

    pub fn entry_dir(&self, engine: &str, version: &str, flavor: &str, classifier: &str) -> PathBuf {
        self.engine_dir(engine)
            .join(Self::entry_key(version, flavor, classifier))
    }

    /// Whether `dir` holds `native_lib`, the sole completeness signal.
    pub fn is_complete(dir: &Path, native_lib: &str) -> bool {
        dir.join(native_lib).is_file()
    }

    /// Delete whatever an interrupted run left at `dir`.
    pub fn remove_stale(&self, dir: &Path) -> Result<()> {
        if dir.exists() {
            log::debug!("removing stale cache entry {}", dir.display());
            std::fs::remove_dir_all(dir).map_err(|e| NativeError::CacheError {
                path: dir.to_path_buf(),
                detail: format!("removing stale entry: {e}"),
            })?;
        }
        remove_file_if_exists(&integrity_path(dir))
    }

    /// A fresh temporary directory next to the entries of `engine`.
    ///
    /// The directory is deleted when the guard drops unless it was renamed
    /// into place by [`EngineCache::commit`].
    pub fn temp_dir(&self, engine: &str) -> Result<TempDir> {
        let parent = self.engine_dir(engine);
        std::fs::create_dir_all(&parent).map_err(|e| NativeError::CacheError {
            path: parent.clone(),
            detail: format!("creating cache dir: {e}"),
        })?;
        tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempdir_in(&parent)
            .map_err(|e| NativeError::CacheError {
                path: parent,
                detail: format!("creating temp dir: {e}"),
            })
    }

    /// Rename a fully populated temp directory to `dir` and record digests.
    ///
    /// If another process completed `dir` first, its entry is kept and the
    /// temp directory is discarded.
    pub fn commit(&self, tmp: TempDir, dir: &Path, native_lib: &str) -> Result<()> {
        if let Err(e) = std::fs::rename(tmp.path(), dir) {
            if Self::is_complete(dir, native_lib) {
                log::debug!("cache entry {} completed concurrently", dir.display());
                return Ok(());
            }
            return Err(NativeError::CacheError {
                path: dir.to_path_buf(),
                detail: format!("moving {} into place: {e}", tmp.path().display()),
            });
        }
        self.write_integrity(dir)
    }

    pub fn write_integrity(&self, dir: &Path) -> Result<()> {
        let mut record = IntegrityRecord::default();
        for (name, path) in entry_files(dir)? {
            let data = std::fs::read(&path)?;
            record.files.insert(name, sha256_hex(&data));
        }
        let path = integrity_path(dir);
        std::fs::write(&path, serde_json::to_string_pretty(&record)?).map_err(|e| {
            NativeError::CacheError {
                path,
                detail: format!("writing integrity: {e}"),
            }
        })
    }

    /// Compare the files of `dir` against its recorded digests.
    ///
    /// Returns `Ok(false)` when there is no record. Files added after the
    /// record was written, such as the bridge library, are not checked.
    pub fn verify_integrity(&self, dir: &Path) -> Result<bool> {
        let path = integrity_path(dir);
        if !path.is_file() {
            return Ok(false);
        }
        let text = std::fs::read_to_string(&path).map_err(|e| NativeError::CacheError {
            path: path.clone(),
            detail: format!("reading integrity: {e}"),
        })?;
        let record: IntegrityRecord = serde_json::from_str(&text)?;
        for (name, expected) in &record.files {
            let file = dir.join(name);
            let Ok(data) = std::fs::read(&file) else {
                return Ok(false);
            };
            if sha256_hex(&data) != *expected {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Engines that have a cache directory.
    pub fn engines(&self) -> Result<Vec<String>> {
        let mut engines: Vec<String> = list_dirs(&self.root)?
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        engines.sort();
        Ok(engines)
    }

    /// Complete and incomplete entries of `engine`, excluding temp dirs.
    pub fn list(&self, engine: &str) -> Result<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        for (key, path) in list_dirs(&self.engine_dir(engine))? {
            if key.starts_with(TEMP_PREFIX) {
                continue;
            }
            let files = entry_files(&path)?;
            let mut size_bytes = 0;
            for (_, file) in &files {
                size_bytes += std::fs::metadata(file)?.len();
            }
            entries.push(CacheEntry {
                engine: engine.to_string(),
                key,
                path,
                files: files.len(),
                size_bytes,
            });
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Remove one entry. Returns whether it existed.
    pub fn remove(&self, engine: &str, key: &str) -> Result<bool> {
        let dir = self.engine_dir(engine).join(key);
        if !dir.is_dir() {
            return Ok(false);
        }
        self.remove_stale(&dir)?;
        Ok(true)
    }

    /// Remove every entry of `engine`, including leftover temp dirs.
    pub fn clear(&self, engine: &str) -> Result<usize> {
        let dir = self.engine_dir(engine);
        let count = list_dirs(&dir)?.len();
        if dir.is_dir() {
            std::fs::remove_dir_all(&dir).map_err(|e| NativeError::CacheError {
                path: dir,
                detail: format!("clearing cache: {e}"),
            })?;
        }
        Ok(count)
    }
}

fn integrity_path(dir: &Path) -> PathBuf {
    let mut name = dir.file_name().unwrap_or_default().to_os_string();
    name.push(".integrity.json");
    dir.with_file_name(name)
}

fn remove_file_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(NativeError::CacheError {
            path: path.to_path_buf(),
            detail: format!("removing file: {e}"),
        }),
        _ => Ok(()),
    }
}

fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Subdirectories of `dir` by name; empty if `dir` does not exist.
fn list_dirs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| NativeError::CacheError {
        path: dir.to_path_buf(),
        detail: format!("listing entries: {e}"),
    })? {
        let entry = entry?;
        if entry.path().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                out.push((name.to_string(), entry.path()));
            }
        }
    }
    Ok(out)
}

/// Regular files directly inside `dir`, sorted by name.
fn entry_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() {
            out.push((entry.file_name().to_string_lossy().into_owned(), path));
        }
    }
    out.sort();
    Ok(out)
}
