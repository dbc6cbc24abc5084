#![allow(dead_code)]

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use kiln_native::config::Properties;
use kiln_native::{ArtifactSource, EngineConfig, EngineSpec, Host, HostOs, LocalMirror, StaticProbe};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A local artifact repository laid out like the published one.
pub struct Mirror {
    pub root: tempfile::TempDir,
}

impl Mirror {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Write `{version}/files.txt` listing `entries`.
    pub fn manifest(&self, version: &str, entries: &[&str]) {
        let dir = self.path().join(version);
        std::fs::create_dir_all(&dir).unwrap();
        let mut text = String::from("# published artifacts\n");
        for e in entries {
            text.push_str(e);
            text.push('\n');
        }
        std::fs::write(dir.join("files.txt"), text).unwrap();
    }

    /// Write a gzip artifact at `{version}/{entry}` holding `body`.
    pub fn artifact(&self, version: &str, entry: &str, body: &[u8]) {
        let path = self.path().join(version).join(entry);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(body).unwrap();
        std::fs::write(path, enc.finish().unwrap()).unwrap();
    }

    /// Manifest plus artifacts, each artifact holding its own entry name.
    pub fn publish(&self, version: &str, entries: &[&str]) {
        self.manifest(version, entries);
        for e in entries {
            self.artifact(version, e, e.as_bytes());
        }
    }

    /// An uncompressed file at `{path}`.
    pub fn raw(&self, path: &str, body: &[u8]) {
        let path = self.path().join(path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }
}

/// Wraps a mirror and counts every artifact opened through it.
#[derive(Debug, Clone)]
pub struct CountingSource {
    inner: LocalMirror,
    opened: Arc<AtomicUsize>,
}

impl CountingSource {
    pub fn new(root: &Path) -> Self {
        Self {
            inner: LocalMirror::new(root),
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl ArtifactSource for CountingSource {
    fn open(&self, path: &str) -> kiln_native::Result<Box<dyn Read + Send>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.inner.open(path)
    }

    fn url(&self, path: &str) -> String {
        self.inner.url(path)
    }

    fn is_remote(&self) -> bool {
        false
    }
}

/// A linux x86_64 configuration isolated from the environment.
pub fn config(cache: &Path, props: Properties) -> EngineConfig {
    EngineConfig::isolated(EngineSpec::pytorch(), props)
        .with_host(Host::new(HostOs::Linux, "x86_64"))
        .with_gpu_probe(StaticProbe::none())
        .with_cache_root(cache)
}

/// Names of the entries directly under `dir`, sorted.
pub fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

pub fn entry(cache: &Path, key: &str) -> PathBuf {
    cache.join("pytorch").join(key)
}
