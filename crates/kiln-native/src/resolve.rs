//! Locating a usable native library directory.
//!
//! Search order:
//! 1. `{ENGINE}_LIBRARY_PATH`, then `library.path`: an existing install.
//! 2. A `{ENGINE}_VERSION` override that the detected platform does not
//!    satisfy: download that version.
//! 3. A placeholder platform: download.
//! 4. A bundled platform: copy the bundled libraries into the cache.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::cache::EngineCache;
use crate::config::{EngineConfig, LIBRARY_PATH_KEY};
use crate::error::{NativeError, Result};
use crate::flavor;
use crate::platform::{HostOs, PlatformDescriptor};
use crate::version::{canonical_version, EngineVersion};

/// How a library directory was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryOrigin {
    /// Found through a library path override.
    Override,
    /// Already present in the cache.
    Cache,
    /// Copied from the bundle directory.
    Bundle,
    /// Downloaded from the artifact repository.
    Download,
}

impl fmt::Display for LibraryOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LibraryOrigin::Override => "override",
            LibraryOrigin::Cache => "cache",
            LibraryOrigin::Bundle => "bundle",
            LibraryOrigin::Download => "download",
        };
        f.write_str(s)
    }
}

/// A directory holding a complete set of engine libraries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLibrary {
    pub dir: PathBuf,
    pub version: String,
    pub flavor: String,
    pub classifier: String,
    pub api_version: String,
    pub os: HostOs,
    pub origin: LibraryOrigin,
}

impl ResolvedLibrary {
    fn new(
        dir: PathBuf,
        platform: &PlatformDescriptor,
        flavor: String,
        origin: LibraryOrigin,
    ) -> Self {
        Self {
            dir,
            version: platform.version().to_string(),
            flavor,
            classifier: platform.classifier().to_string(),
            api_version: platform.api_version().to_string(),
            os: platform.os(),
            origin,
        }
    }
}

/// What [`find_library`] would use, computed without touching the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub version: String,
    pub flavor: String,
    pub classifier: String,
    pub dir: PathBuf,
    /// Whether `dir` already holds the native library.
    pub cached: bool,
    /// `Override` for existing installs, otherwise how a miss would be filled.
    pub origin: LibraryOrigin,
}

/// Locate the engine libraries, fetching them into the cache if needed.
pub fn find_library(config: &EngineConfig) -> Result<ResolvedLibrary> {
    if let Some(lib) = find_override_library(config)? {
        return Ok(lib);
    }
    find_native_library(config)
}

/// Describe the directory [`find_library`] would settle on.
///
/// CUDA flavors are reported as requested; a fetch may still fall back to
/// another CUDA minor version or to CPU.
pub fn resolve(config: &EngineConfig) -> Result<Resolution> {
    if let Some(lib) = find_override_library(config)? {
        return Ok(Resolution {
            version: lib.version,
            flavor: lib.flavor,
            classifier: lib.classifier,
            dir: lib.dir,
            cached: true,
            origin: LibraryOrigin::Override,
        });
    }
    let (platform, download) = select_platform(config)?;
    let suffix = if download {
        flavor::abi_suffix(config, platform.host())
    } else {
        flavor::bundle_abi_suffix(platform.libraries())
    };
    let flavor = flavor::with_abi_suffix(platform.flavor(), suffix);
    let dir = config.cache()?.entry_dir(
        config.spec().name,
        platform.version(),
        &flavor,
        platform.classifier(),
    );
    let native = config.spec().native_lib_file(platform.os());
    Ok(Resolution {
        version: platform.version().to_string(),
        flavor,
        classifier: platform.classifier().to_string(),
        cached: EngineCache::is_complete(&dir, &native),
        dir,
        origin: if download {
            LibraryOrigin::Download
        } else {
            LibraryOrigin::Bundle
        },
    })
}

/// Search the library path overrides for an existing install.
pub fn find_override_library(config: &EngineConfig) -> Result<Option<ResolvedLibrary>> {
    let spec = config.spec();
    let host = config.host()?;
    let native = spec.native_lib_file(host.os);
    for key in [spec.key("LIBRARY_PATH"), LIBRARY_PATH_KEY.to_string()] {
        let Some(paths) = config.overrides().non_empty(&key) else {
            continue;
        };
        if let Some(dir) = search_path_list(&paths, &native) {
            log::info!("Using {} from {} ({key})", spec.name, dir.display());
            let platform = PlatformDescriptor::detect(config)?;
            let version = config
                .overrides()
                .non_empty(&spec.key("VERSION"))
                .unwrap_or_else(|| platform.version().to_string());
            let flavor = flavor::install_flavor(config);
            return Ok(Some(ResolvedLibrary {
                dir,
                version,
                flavor,
                classifier: host.classifier(),
                api_version: spec.api_version.to_string(),
                os: host.os,
                origin: LibraryOrigin::Override,
            }));
        }
    }
    Ok(None)
}

/// First entry of `list` that is `native` itself or a directory holding it.
fn search_path_list(list: &str, native: &str) -> Option<PathBuf> {
    for path in std::env::split_paths(list) {
        if !path.exists() {
            continue;
        }
        if path.is_file() && path.file_name() == Some(OsStr::new(native)) {
            return path.parent().map(absolute);
        }
        if path.join(native).is_file() {
            return Some(absolute(&path));
        }
    }
    None
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// The platform to use and whether it must be downloaded.
fn select_platform(config: &EngineConfig) -> Result<(PlatformDescriptor, bool)> {
    let spec = config.spec();
    let platform = PlatformDescriptor::detect(config)?;
    if let Some(version) = config.overrides().non_empty(&spec.key("VERSION")) {
        if !platform.version().starts_with(version.as_str()) {
            log::warn!("Override {} version: {version}.", spec.name);
            return Ok((PlatformDescriptor::placeholder(config, &version)?, true));
        }
    }
    let download = platform.is_placeholder();
    Ok((platform, download))
}

fn find_native_library(config: &EngineConfig) -> Result<ResolvedLibrary> {
    let (platform, download) = select_platform(config)?;
    if download {
        download_native(config, &platform)
    } else {
        copy_from_bundle(config, &platform)
    }
}

/// Copy the bundled libraries of `platform` into the cache.
fn copy_from_bundle(config: &EngineConfig, platform: &PlatformDescriptor) -> Result<ResolvedLibrary> {
    let spec = config.spec();
    let suffix = flavor::bundle_abi_suffix(platform.libraries());
    let flavor = flavor::with_abi_suffix(platform.flavor(), suffix);
    let classifier = platform.classifier();
    let native = spec.native_lib_file(platform.os());

    let cache = config.cache()?;
    log::debug!("Using cache dir: {}", cache.root().display());
    let dir = cache.entry_dir(spec.name, platform.version(), &flavor, classifier);
    if EngineCache::is_complete(&dir, &native) {
        return Ok(ResolvedLibrary::new(dir, platform, flavor, LibraryOrigin::Cache));
    }
    cache.remove_stale(&dir)?;

    let bundle = config.bundle_dir().ok_or_else(|| NativeError::InvalidBundle {
        path: PathBuf::new(),
        detail: "platform record without a bundle directory".to_string(),
    })?;
    let version = EngineVersion::parse(platform.version())?;
    let prefix = if version.uses_engine_path_prefix() {
        bundle.join(spec.name).join(&flavor).join(classifier)
    } else {
        bundle.join("native").join("lib")
    };

    let tmp = cache.temp_dir(spec.name)?;
    for file in platform.libraries() {
        let src = prefix.join(file);
        log::info!("Extracting {} to cache ...", src.display());
        std::fs::copy(&src, tmp.path().join(file)).map_err(|e| NativeError::InvalidBundle {
            path: src.clone(),
            detail: e.to_string(),
        })?;
    }
    cache.commit(tmp, &dir, &native)?;
    Ok(ResolvedLibrary::new(dir, platform, flavor, LibraryOrigin::Bundle))
}

/// Download the libraries of `platform` listed in the repository manifest.
fn download_native(config: &EngineConfig, platform: &PlatformDescriptor) -> Result<ResolvedLibrary> {
    let spec = config.spec();
    let suffix = flavor::abi_suffix(config, platform.host());
    let mut flavor = flavor::with_abi_suffix(platform.flavor(), suffix);
    let classifier = platform.classifier();
    let native = spec.native_lib_file(platform.os());

    let cache = config.cache()?;
    let mut dir = cache.entry_dir(spec.name, platform.version(), &flavor, classifier);
    if EngineCache::is_complete(&dir, &native) {
        log::debug!("Using cache dir: {}", dir.display());
        return Ok(ResolvedLibrary::new(dir, platform, flavor, LibraryOrigin::Cache));
    }

    let version = canonical_version(platform.version())?;
    let fetcher = config.fetcher()?;
    let manifest = fetcher.manifest(&version)?;

    if flavor.starts_with("cu") {
        match manifest.match_cuda_flavor(&flavor, suffix, classifier, &native) {
            Some(matched) => flavor = matched,
            None => {
                log::warn!("No matching cuda flavor for {classifier} found: {flavor}.");
                flavor = format!("cpu{suffix}");
            }
        }
        dir = cache.entry_dir(spec.name, platform.version(), &flavor, classifier);
        if EngineCache::is_complete(&dir, &native) {
            return Ok(ResolvedLibrary::new(dir, platform, flavor, LibraryOrigin::Cache));
        }
    }

    log::debug!("Using cache dir: {}", dir.display());
    cache.remove_stale(&dir)?;

    let entries = manifest.entries_for(&flavor, classifier);
    if entries.is_empty() {
        return Err(NativeError::UnsupportedPlatform {
            engine: spec.name.to_string(),
            platform: format!("{version}-{flavor}-{classifier}"),
        });
    }

    let tmp = cache.temp_dir(spec.name)?;
    for line in entries {
        let file_name = crate::manifest::artifact_file_name(line)?;
        fetcher.download_gz(&format!("{version}/{line}"), &tmp.path().join(file_name))?;
    }
    cache.commit(tmp, &dir, &native)?;
    Ok(ResolvedLibrary::new(dir, platform, flavor, LibraryOrigin::Download))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Properties;
    use crate::engine::EngineSpec;
    use crate::flavor::StaticProbe;
    use crate::platform::Host;

    fn config(props: Properties, cache: &Path) -> EngineConfig {
        EngineConfig::isolated(EngineSpec::pytorch(), props)
            .with_host(Host::new(HostOs::Linux, "x86_64"))
            .with_gpu_probe(StaticProbe::none())
            .with_cache_root(cache)
    }

    #[test]
    fn override_path_accepts_file_or_directory() {
        let install = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let lib = install.path().join("libtorch.so");
        std::fs::write(&lib, b"").unwrap();

        let by_dir = config(
            Properties::new().with("PYTORCH_LIBRARY_PATH", install.path().display().to_string()),
            cache.path(),
        );
        let found = find_override_library(&by_dir).unwrap().unwrap();
        assert_eq!(found.dir, absolute(install.path()));
        assert_eq!(found.origin, LibraryOrigin::Override);
        assert_eq!(found.flavor, "cpu-precxx11");

        let by_file = config(
            Properties::new()
                .with(LIBRARY_PATH_KEY, lib.display().to_string())
                .with("PYTORCH_VERSION", "1.13.1"),
            cache.path(),
        );
        let found = find_override_library(&by_file).unwrap().unwrap();
        assert_eq!(found.dir, absolute(install.path()));
        assert_eq!(found.version, "1.13.1");
    }

    #[test]
    fn override_install_keeps_explicit_flavor() {
        let install = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        std::fs::write(install.path().join("libtorch.so"), b"").unwrap();
        let config = config(
            Properties::new()
                .with("PYTORCH_LIBRARY_PATH", install.path().display().to_string())
                .with("PYTORCH_FLAVOR", "cu118"),
            cache.path(),
        );
        let found = find_override_library(&config).unwrap().unwrap();
        assert_eq!(found.flavor, "cu118");
    }

    #[test]
    fn override_path_skips_unrelated_entries() {
        let empty = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let list = std::env::join_paths([empty.path(), Path::new("/does/not/exist")]).unwrap();
        let config = config(
            Properties::new().with("PYTORCH_LIBRARY_PATH", list.to_string_lossy()),
            cache.path(),
        );
        assert!(find_override_library(&config).unwrap().is_none());
    }

    #[test]
    fn resolution_without_network() {
        let cache = tempfile::tempdir().unwrap();
        let config = config(Properties::new().with("PYTORCH_VERSION", "1.13.1"), cache.path());
        let r = resolve(&config).unwrap();
        assert_eq!(r.version, "1.13.1");
        assert_eq!(r.flavor, "cpu");
        assert_eq!(r.origin, LibraryOrigin::Download);
        assert!(!r.cached);
        assert_eq!(r.dir, cache.path().join("pytorch/1.13.1-cpu-linux-x86_64"));
    }

    #[test]
    fn aarch64_linux_resolves_precxx11() {
        let cache = tempfile::tempdir().unwrap();
        let config = config(Properties::new(), cache.path())
            .with_host(Host::new(HostOs::Linux, "aarch64"));
        assert_eq!(resolve(&config).unwrap().flavor, "cpu-precxx11");
    }
}
