//! Bridge library resolution.
//!
//! The bridge library sits between Kiln and the engine and is versioned by
//! both. It is cached next to the engine libraries as
//! `{api_version}-{bridge file}`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::EngineConfig;
use crate::error::{NativeError, Result};
use crate::resolve::ResolvedLibrary;
use crate::version::canonical_version;

/// Key of the bundled bridge record holding `{engine version}-{api version}`.
pub const BRIDGE_VERSION_KEY: &str = "jni_version";

/// Locate the bridge library for `lib`, copying or downloading it on a miss.
pub fn find_bridge_library(config: &EngineConfig, lib: &ResolvedLibrary) -> Result<PathBuf> {
    let spec = config.spec();
    let file_name = spec.bridge_lib_file(lib.os);
    let dir = config
        .cache()?
        .entry_dir(spec.name, &lib.version, &lib.flavor, &lib.classifier);
    let path = dir.join(format!("{}-{file_name}", lib.api_version));
    if path.is_file() {
        log::debug!("Using bridge library {}", path.display());
        return Ok(path);
    }

    let version = canonical_version(&lib.version)?;
    let bundled = match config.bundle_dir() {
        Some(bundle) => read_bridge_version(bundle, spec.name)?.map(|v| (bundle, v)),
        None => None,
    };
    match bundled {
        Some((bundle, bundled_version))
            if bundled_version.starts_with(&format!("{version}-{}", lib.api_version)) =>
        {
            let src = bundle
                .join("jnilib")
                .join(&lib.classifier)
                .join(&lib.flavor)
                .join(&file_name);
            log::info!("Extracting {} to cache ...", src.display());
            install(&dir, &path, |tmp| {
                std::fs::copy(&src, tmp)
                    .map(drop)
                    .map_err(|e| NativeError::InvalidBundle {
                        path: src.clone(),
                        detail: e.to_string(),
                    })
            })?;
        }
        Some((_, bundled_version)) => {
            log::warn!(
                "Bridge library version {bundled_version} does not match engine {version}-{}, downloading.",
                lib.api_version
            );
            download_bridge(config, lib, &version, &file_name, &dir, &path)?;
        }
        None => download_bridge(config, lib, &version, &file_name, &dir, &path)?,
    }
    Ok(path)
}

fn download_bridge(
    config: &EngineConfig,
    lib: &ResolvedLibrary,
    version: &str,
    file_name: &str,
    dir: &Path,
    path: &Path,
) -> Result<()> {
    let fetcher = config.fetcher()?;
    let remote = format!(
        "{version}/jnilib/{}/{}/{}/{file_name}",
        lib.api_version, lib.classifier, lib.flavor
    );
    install(dir, path, |tmp| fetcher.download(&remote, tmp))
}

/// Write `path` through a temp file in `dir` that is persisted on success.
fn install(dir: &Path, path: &Path, fill: impl FnOnce(&Path) -> Result<()>) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| NativeError::CacheError {
        path: dir.to_path_buf(),
        detail: format!("creating cache dir: {e}"),
    })?;
    let tmp = tempfile::Builder::new()
        .prefix("tmp")
        .tempfile_in(dir)
        .map_err(|e| NativeError::CacheError {
            path: dir.to_path_buf(),
            detail: format!("creating temp file: {e}"),
        })?;
    fill(tmp.path())?;
    tmp.persist(path).map_err(|e| NativeError::CacheError {
        path: path.to_path_buf(),
        detail: e.error.to_string(),
    })?;
    Ok(())
}

/// The bundled bridge version, if the bundle has a record for `engine`.
pub fn read_bridge_version(bundle: &Path, engine: &str) -> Result<Option<String>> {
    let path = bundle.join("jnilib").join(format!("{engine}.properties"));
    if !path.is_file() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path)?;
    match parse_properties(&text).remove(BRIDGE_VERSION_KEY) {
        Some(version) => Ok(Some(version)),
        None => Err(NativeError::InvalidBundle {
            path,
            detail: format!("missing {BRIDGE_VERSION_KEY}"),
        }),
    }
}

/// `key=value` / `key: value` lines; `#` and `!` start comments.
fn parse_properties(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('!'))
        .filter_map(|l| {
            let (key, value) = l.split_once(['=', ':'])?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_syntax() {
        let props = parse_properties("# comment\n! also\n\njni_version = 2.1.1-0.25.0\nother: x\n");
        assert_eq!(props.get("jni_version").map(String::as_str), Some("2.1.1-0.25.0"));
        assert_eq!(props.get("other").map(String::as_str), Some("x"));
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn bridge_record_lookup() {
        let bundle = tempfile::tempdir().unwrap();
        assert_eq!(read_bridge_version(bundle.path(), "pytorch").unwrap(), None);

        std::fs::create_dir_all(bundle.path().join("jnilib")).unwrap();
        let record = bundle.path().join("jnilib/pytorch.properties");
        std::fs::write(&record, "jni_version=2.1.1-0.25.0\n").unwrap();
        assert_eq!(
            read_bridge_version(bundle.path(), "pytorch").unwrap().as_deref(),
            Some("2.1.1-0.25.0")
        );

        std::fs::write(&record, "version=2.1.1\n").unwrap();
        assert!(matches!(
            read_bridge_version(bundle.path(), "pytorch"),
            Err(NativeError::InvalidBundle { .. })
        ));
    }

    #[test]
    fn install_leaves_no_temp_file_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("0.25.0-libdjl_torch.so");
        let err = install(dir.path(), &target, |_| {
            Err(NativeError::DownloadFailed {
                url: "x".into(),
                detail: "boom".into(),
            })
        });
        assert!(err.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        install(dir.path(), &target, |tmp| Ok(std::fs::write(tmp, b"lib")?)).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"lib");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
