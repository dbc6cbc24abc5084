//! Native engine error types.

use std::path::PathBuf;

/// Errors raised while resolving, fetching, or loading an engine.
#[derive(Debug, thiserror::Error)]
pub enum NativeError {
    /// A version string does not have the published engine version shape.
    #[error("invalid version format: {version}")]
    InvalidVersionFormat { version: String },

    /// No artifact exists for this platform under any fallback flavor.
    #[error("no {engine} native library matches this platform: {platform}")]
    UnsupportedPlatform { engine: String, platform: String },

    /// The manifest or an artifact could not be read from the repository.
    #[error("download failed for {url}: {detail}")]
    DownloadFailed { url: String, detail: String },

    /// A remote fetch was needed while offline mode is on.
    #[error("offline mode forbids fetching {url}")]
    Offline { url: String },

    /// The platform linker rejected a library, or the load hook did.
    #[error("failed to load {path}: {detail}")]
    LoadFailed { path: PathBuf, detail: String },

    /// The cache directory could not be created, committed or verified.
    #[error("cache error at {path}: {detail}")]
    CacheError { path: PathBuf, detail: String },

    /// Bundled libraries or records are missing or unreadable.
    #[error("invalid bundle at {path}: {detail}")]
    InvalidBundle { path: PathBuf, detail: String },

    /// The engine name matches no known descriptor.
    #[error("unknown engine: {name}")]
    UnknownEngine { name: String },

    /// A platform record or property file is not valid TOML.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// An integrity record could not be read or written.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Linker messages that mean a dependency of the library is missing from
/// the host rather than the library itself being broken.
const MISSING_DEPENDENCY_MARKERS: &[&str] = &[
    "cannot open shared object file",
    "Library not loaded",
    "image not found",
    "The specified module could not be found",
    "os error 126",
];

impl NativeError {
    /// Whether this is a load failure caused by a missing host shared library.
    ///
    /// Diagnostics may report these as skips instead of hard failures.
    pub fn is_missing_dependency(&self) -> bool {
        match self {
            NativeError::LoadFailed { detail, .. } => MISSING_DEPENDENCY_MARKERS
                .iter()
                .any(|marker| detail.contains(marker)),
            _ => false,
        }
    }
}

/// Result type alias for native library operations.
pub type Result<T> = std::result::Result<T, NativeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_dependency_classification() {
        let err = NativeError::LoadFailed {
            path: PathBuf::from("/cache/libtorch.so"),
            detail: "libgomp.so.1: cannot open shared object file: No such file or directory"
                .to_string(),
        };
        assert!(err.is_missing_dependency());

        let err = NativeError::LoadFailed {
            path: PathBuf::from("/cache/libtorch.so"),
            detail: "invalid ELF header".to_string(),
        };
        assert!(!err.is_missing_dependency());

        let err = NativeError::DownloadFailed {
            url: "x".to_string(),
            detail: "cannot open shared object file".to_string(),
        };
        assert!(!err.is_missing_dependency());
    }
}
