//! Host and platform detection.
//!
//! A [`PlatformDescriptor`] says which build of an engine this process
//! should use. It comes either from a bundled platform record shipped next
//! to the binary or, when no record exists, from a placeholder built from
//! the engine defaults and the resolved flavor. Placeholders always take
//! the download path.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{NativeError, Result};
use crate::flavor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOs {
    Linux,
    MacOs,
    Windows,
}

impl HostOs {
    pub fn current() -> Result<Self> {
        Self::from_name(std::env::consts::OS).ok_or_else(|| NativeError::UnsupportedPlatform {
            engine: "any".to_string(),
            platform: std::env::consts::OS.to_string(),
        })
    }

    /// Accepts Rust target OS names as well as classifier prefixes.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "linux" => Some(HostOs::Linux),
            "macos" | "osx" => Some(HostOs::MacOs),
            "windows" | "win" => Some(HostOs::Windows),
            _ => None,
        }
    }

    /// Classifier prefix: `linux`, `osx` or `win`.
    pub fn prefix(self) -> &'static str {
        match self {
            HostOs::Linux => "linux",
            HostOs::MacOs => "osx",
            HostOs::Windows => "win",
        }
    }

    /// Platform file name of a shared library, e.g. `torch` → `libtorch.so`.
    pub fn map_library_name(self, name: &str) -> String {
        match self {
            HostOs::Linux => format!("lib{name}.so"),
            HostOs::MacOs => format!("lib{name}.dylib"),
            HostOs::Windows => format!("{name}.dll"),
        }
    }
}

/// Operating system and CPU architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub os: HostOs,
    pub arch: String,
}

impl Host {
    pub fn new(os: HostOs, arch: impl Into<String>) -> Self {
        Self {
            os,
            arch: arch.into(),
        }
    }

    pub fn detect() -> Result<Self> {
        Ok(Self::new(HostOs::current()?, std::env::consts::ARCH))
    }

    /// `{os_prefix}-{arch}`, e.g. `linux-x86_64`.
    pub fn classifier(&self) -> String {
        format!("{}-{}", self.os.prefix(), self.arch)
    }
}

/// A bundled platform record (`native/lib/{engine}.toml` in the bundle).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformRecord {
    pub version: String,
    #[serde(default = "default_flavor")]
    pub flavor: String,
    pub classifier: String,
    #[serde(default)]
    pub libraries: Vec<String>,
    #[serde(default)]
    pub placeholder: bool,
}

fn default_flavor() -> String {
    "cpu".to_string()
}

impl PlatformRecord {
    pub fn path_in(bundle: &Path, engine: &str) -> PathBuf {
        bundle.join("native").join("lib").join(format!("{engine}.toml"))
    }

    /// Read the record for `engine` from `bundle`, if one is present.
    pub fn read(bundle: &Path, engine: &str) -> Result<Option<Self>> {
        let path = Self::path_in(bundle, engine);
        if !path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)?;
        let record = toml::from_str(&text).map_err(|e| NativeError::InvalidBundle {
            path,
            detail: e.to_string(),
        })?;
        Ok(Some(record))
    }
}

/// The engine build selected for this host. Immutable once detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDescriptor {
    engine: String,
    host: Host,
    version: String,
    flavor: String,
    classifier: String,
    api_version: String,
    libraries: Vec<String>,
    placeholder: bool,
}

impl PlatformDescriptor {
    /// Detect the platform from the bundle record, or build a placeholder.
    pub fn detect(config: &EngineConfig) -> Result<Self> {
        let host = config.host()?;
        let record = match config.bundle_dir() {
            Some(bundle) => PlatformRecord::read(bundle, config.spec().name)?,
            None => None,
        };
        match record {
            Some(record) if !record.placeholder => {
                if record.classifier != host.classifier() {
                    return Err(NativeError::UnsupportedPlatform {
                        engine: config.spec().name.to_string(),
                        platform: format!(
                            "bundle is built for {}, host is {}",
                            record.classifier,
                            host.classifier()
                        ),
                    });
                }
                let flavor = flavor::flavor_override(config).unwrap_or(record.flavor);
                Ok(Self {
                    engine: config.spec().name.to_string(),
                    classifier: record.classifier,
                    host,
                    version: record.version,
                    flavor,
                    api_version: config.spec().api_version.to_string(),
                    libraries: record.libraries,
                    placeholder: false,
                })
            }
            Some(record) => Self::placeholder(config, &record.version),
            None => Self::placeholder(config, config.spec().default_version),
        }
    }

    /// A placeholder descriptor for an explicit version.
    pub fn placeholder(config: &EngineConfig, version: &str) -> Result<Self> {
        let host = config.host()?;
        Ok(Self {
            engine: config.spec().name.to_string(),
            classifier: host.classifier(),
            host,
            version: version.to_string(),
            flavor: flavor::resolve_flavor(config),
            api_version: config.spec().api_version.to_string(),
            libraries: Vec::new(),
            placeholder: true,
        })
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn os(&self) -> HostOs {
        self.host.os
    }

    pub fn os_prefix(&self) -> &'static str {
        self.host.os.prefix()
    }

    pub fn os_arch(&self) -> &str {
        &self.host.arch
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn flavor(&self) -> &str {
        &self.flavor
    }

    pub fn classifier(&self) -> &str {
        &self.classifier
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Library files in the bundle, empty for placeholders.
    pub fn libraries(&self) -> &[String] {
        &self.libraries
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }
}

impl fmt::Display for PlatformDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}-{}-{}",
            self.engine, self.version, self.flavor, self.classifier
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Properties;
    use crate::engine::EngineSpec;
    use crate::flavor::StaticProbe;

    fn config(bundle: Option<&Path>) -> EngineConfig {
        let mut config = EngineConfig::isolated(EngineSpec::pytorch(), Properties::new())
            .with_host(Host::new(HostOs::Linux, "x86_64"))
            .with_gpu_probe(StaticProbe::none());
        if let Some(bundle) = bundle {
            config = config.with_bundle_dir(bundle);
        }
        config
    }

    fn write_record(bundle: &Path, text: &str) {
        let path = PlatformRecord::path_in(bundle, "pytorch");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    #[test]
    fn library_names_per_os() {
        assert_eq!(HostOs::Linux.map_library_name("torch"), "libtorch.so");
        assert_eq!(HostOs::MacOs.map_library_name("torch"), "libtorch.dylib");
        assert_eq!(HostOs::Windows.map_library_name("torch"), "torch.dll");
        assert_eq!(Host::new(HostOs::MacOs, "aarch64").classifier(), "osx-aarch64");
    }

    #[test]
    fn no_bundle_gives_placeholder() {
        let platform = PlatformDescriptor::detect(&config(None)).unwrap();
        assert!(platform.is_placeholder());
        assert_eq!(platform.version(), EngineSpec::pytorch().default_version);
        assert_eq!(platform.flavor(), "cpu");
        assert_eq!(platform.classifier(), "linux-x86_64");
        assert!(platform.libraries().is_empty());
    }

    #[test]
    fn bundle_record_is_used() {
        let dir = tempfile::tempdir().unwrap();
        write_record(
            dir.path(),
            r#"
version = "1.9.1"
flavor = "cpu"
classifier = "linux-x86_64"
libraries = ["libtorch.so", "libc10.so", "libstdc++.so.6"]
"#,
        );
        let platform = PlatformDescriptor::detect(&config(Some(dir.path()))).unwrap();
        assert!(!platform.is_placeholder());
        assert_eq!(platform.version(), "1.9.1");
        assert_eq!(platform.libraries().len(), 3);
        assert_eq!(platform.to_string(), "pytorch 1.9.1-cpu-linux-x86_64");
    }

    #[test]
    fn placeholder_record_keeps_its_version() {
        let dir = tempfile::tempdir().unwrap();
        write_record(
            dir.path(),
            "version = \"2.0.1\"\nclassifier = \"linux-x86_64\"\nplaceholder = true\n",
        );
        let platform = PlatformDescriptor::detect(&config(Some(dir.path()))).unwrap();
        assert!(platform.is_placeholder());
        assert_eq!(platform.version(), "2.0.1");
    }

    #[test]
    fn foreign_bundle_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_record(
            dir.path(),
            "version = \"2.0.1\"\nclassifier = \"win-x86_64\"\n",
        );
        assert!(matches!(
            PlatformDescriptor::detect(&config(Some(dir.path()))),
            Err(NativeError::UnsupportedPlatform { .. })
        ));
    }

    #[test]
    fn malformed_record_is_invalid_bundle() {
        let dir = tempfile::tempdir().unwrap();
        write_record(dir.path(), "version = [");
        assert!(matches!(
            PlatformDescriptor::detect(&config(Some(dir.path()))),
            Err(NativeError::InvalidBundle { .. })
        ));
    }
}
