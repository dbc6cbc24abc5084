//! Artifact repositories and downloads.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::GzDecoder;

use crate::error::{NativeError, Result};
use crate::manifest::Manifest;

/// A repository of published engine artifacts.
///
/// Paths are relative to the repository root and use `/` separators, e.g.
/// `2.1.1/files.txt`.
pub trait ArtifactSource: Send + Sync + fmt::Debug {
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>>;

    /// Display form of `path` for logs and errors.
    fn url(&self, path: &str) -> String;

    /// Whether reads go over the network.
    fn is_remote(&self) -> bool;
}

impl<T: ArtifactSource + ?Sized> ArtifactSource for Arc<T> {
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        (**self).open(path)
    }

    fn url(&self, path: &str) -> String {
        (**self).url(path)
    }

    fn is_remote(&self) -> bool {
        (**self).is_remote()
    }
}

/// A repository laid out as a local directory tree.
#[derive(Debug, Clone)]
pub struct LocalMirror {
    root: PathBuf,
}

impl LocalMirror {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        path.split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |acc, segment| acc.join(segment))
    }
}

impl ArtifactSource for LocalMirror {
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let file = File::open(self.resolve(path)).map_err(|e| NativeError::DownloadFailed {
            url: self.url(path),
            detail: e.to_string(),
        })?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn url(&self, path: &str) -> String {
        self.resolve(path).display().to_string()
    }

    fn is_remote(&self) -> bool {
        false
    }
}

/// A repository served over HTTP(S).
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpMirror {
    base: String,
    agent: ureq::Agent,
}

#[cfg(feature = "http")]
impl HttpMirror {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            agent: ureq::AgentBuilder::new().build(),
        }
    }
}

#[cfg(feature = "http")]
impl ArtifactSource for HttpMirror {
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let url = self.url(path);
        let response = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| NativeError::DownloadFailed {
                url: url.clone(),
                detail: e.to_string(),
            })?;
        Ok(Box::new(response.into_reader()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    fn is_remote(&self) -> bool {
        true
    }
}

/// Open a mirror from a URL or a local directory (optionally `file://`).
pub fn open_mirror(location: &str) -> Result<Arc<dyn ArtifactSource>> {
    if location.starts_with("http://") || location.starts_with("https://") {
        #[cfg(feature = "http")]
        return Ok(Arc::new(HttpMirror::new(location)));
        #[cfg(not(feature = "http"))]
        return Err(NativeError::DownloadFailed {
            url: location.to_string(),
            detail: "built without the `http` feature".to_string(),
        });
    }
    let root = location.strip_prefix("file://").unwrap_or(location);
    Ok(Arc::new(LocalMirror::new(root)))
}

/// Reads manifests and artifacts from one source.
#[derive(Debug, Clone)]
pub struct Fetcher {
    source: Arc<dyn ArtifactSource>,
    offline: bool,
}

impl Fetcher {
    pub fn new(source: Arc<dyn ArtifactSource>, offline: bool) -> Self {
        Self { source, offline }
    }

    pub fn source(&self) -> &dyn ArtifactSource {
        self.source.as_ref()
    }

    pub fn url(&self, path: &str) -> String {
        self.source.url(path)
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        if self.offline && self.source.is_remote() {
            return Err(NativeError::Offline {
                url: self.source.url(path),
            });
        }
        self.source.open(path)
    }

    /// Fetch `{version}/files.txt`.
    pub fn manifest(&self, version: &str) -> Result<Manifest> {
        let path = format!("{version}/files.txt");
        let mut text = String::new();
        self.open(&path)?
            .read_to_string(&mut text)
            .map_err(|e| self.failed(&path, e))?;
        Ok(Manifest::parse(&text))
    }

    /// Download a gzip artifact, decompressing it into `dest`.
    pub fn download_gz(&self, path: &str, dest: &Path) -> Result<()> {
        log::info!("Downloading {} ...", self.url(path));
        let mut reader = GzDecoder::new(self.open(path)?);
        self.copy_to(path, &mut reader, dest)
    }

    /// Download an artifact into `dest` unchanged.
    pub fn download(&self, path: &str, dest: &Path) -> Result<()> {
        log::info!("Downloading {} ...", self.url(path));
        let mut reader = self.open(path)?;
        self.copy_to(path, &mut reader, dest)
    }

    fn copy_to(&self, path: &str, reader: &mut dyn Read, dest: &Path) -> Result<()> {
        let mut file = File::create(dest)?;
        io::copy(reader, &mut file).map_err(|e| self.failed(path, e))?;
        Ok(())
    }

    fn failed(&self, path: &str, e: io::Error) -> NativeError {
        NativeError::DownloadFailed {
            url: self.url(path),
            detail: e.to_string(),
        }
    }
}
