//! Bridge library lookup, copy and download.

mod common;

use std::path::Path;

use common::{config, entry, init_logging, CountingSource, Mirror};
use kiln_native::bridge::find_bridge_library;
use kiln_native::config::Properties;
use kiln_native::{find_library, NativeError};

const BRIDGE_PATH: &str = "2.1.1/jnilib/0.25.0/linux-x86_64/cpu/libdjl_torch.so";

fn warm_entry(cache: &Path) {
    let dir = entry(cache, "2.1.1-cpu-linux-x86_64");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("libtorch.so"), b"").unwrap();
}

fn bundle_with_record(record: &str) -> tempfile::TempDir {
    let bundle = tempfile::tempdir().unwrap();
    let jnilib = bundle.path().join("jnilib");
    std::fs::create_dir_all(jnilib.join("linux-x86_64/cpu")).unwrap();
    std::fs::write(jnilib.join("pytorch.properties"), record).unwrap();
    std::fs::write(jnilib.join("linux-x86_64/cpu/libdjl_torch.so"), b"bundled").unwrap();
    bundle
}

#[test]
fn downloads_bridge_without_bundle_record() {
    init_logging();
    let cache = tempfile::tempdir().unwrap();
    warm_entry(cache.path());
    let mirror = Mirror::new();
    mirror.raw(BRIDGE_PATH, b"remote");
    let source = CountingSource::new(mirror.path());

    let config = config(cache.path(), Properties::new()).with_source(source.clone());
    let lib = find_library(&config).unwrap();
    let bridge = find_bridge_library(&config, &lib).unwrap();
    assert_eq!(bridge, lib.dir.join("0.25.0-libdjl_torch.so"));
    assert_eq!(std::fs::read(&bridge).unwrap(), b"remote");
    assert_eq!(source.opened(), 1);

    // Present now, so nothing more is fetched.
    assert_eq!(find_bridge_library(&config, &lib).unwrap(), bridge);
    assert_eq!(source.opened(), 1);
}

#[test]
fn matching_bundle_record_copies_bundled_bridge() {
    let cache = tempfile::tempdir().unwrap();
    warm_entry(cache.path());
    let bundle = bundle_with_record("jni_version=2.1.1-0.25.0\n");
    let mirror = Mirror::new();
    let source = CountingSource::new(mirror.path());

    let config = config(cache.path(), Properties::new())
        .with_bundle_dir(bundle.path())
        .with_source(source.clone());
    let lib = find_library(&config).unwrap();
    let bridge = find_bridge_library(&config, &lib).unwrap();
    assert_eq!(std::fs::read(&bridge).unwrap(), b"bundled");
    assert_eq!(source.opened(), 0);
}

#[test]
fn mismatched_bundle_record_downloads() {
    let cache = tempfile::tempdir().unwrap();
    warm_entry(cache.path());
    let bundle = bundle_with_record("jni_version=1.13.1-0.24.0\n");
    let mirror = Mirror::new();
    mirror.raw(BRIDGE_PATH, b"remote");
    let source = CountingSource::new(mirror.path());

    let config = config(cache.path(), Properties::new())
        .with_bundle_dir(bundle.path())
        .with_source(source.clone());
    let lib = find_library(&config).unwrap();
    let bridge = find_bridge_library(&config, &lib).unwrap();
    assert_eq!(std::fs::read(&bridge).unwrap(), b"remote");
    assert_eq!(source.opened(), 1);
}

#[test]
fn missing_remote_bridge_leaves_no_file() {
    let cache = tempfile::tempdir().unwrap();
    warm_entry(cache.path());
    let mirror = Mirror::new();
    let config = config(cache.path(), Properties::new()).with_source(CountingSource::new(mirror.path()));
    let lib = find_library(&config).unwrap();
    let err = find_bridge_library(&config, &lib).unwrap_err();
    assert!(matches!(err, NativeError::DownloadFailed { .. }), "{err}");
    assert_eq!(common::listing(&lib.dir), ["libtorch.so"]);
}
