//! End-to-end initialization through the engine context.

mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::{config, entry, init_logging, CountingSource, Mirror};
use kiln_native::config::Properties;
use kiln_native::{EngineContext, Host, HostOs, LibraryLoader, LibraryOrigin, NativeError};

#[derive(Default)]
struct Recorder {
    loaded: Vec<PathBuf>,
}

impl LibraryLoader for Recorder {
    fn load(&mut self, path: &Path) -> kiln_native::Result<()> {
        self.loaded.push(path.to_path_buf());
        Ok(())
    }
}

impl Recorder {
    fn names(&self) -> Vec<String> {
        self.loaded
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }
}

fn publish(mirror: &Mirror) {
    mirror.publish(
        "2.1.1",
        &[
            "cpu/linux-x86_64/native/lib/libtorch.so.gz",
            "cpu/linux-x86_64/native/lib/libtorch_cpu.so.gz",
            "cpu/linux-x86_64/native/lib/libc10.so.gz",
            "cpu/linux-x86_64/native/lib/libgomp-a34b3233.so.1.gz",
        ],
    );
    mirror.raw(
        "2.1.1/jnilib/0.25.0/linux-x86_64/cpu/libdjl_torch.so",
        b"bridge",
    );
}

#[test]
fn fetches_and_loads_in_dependency_order() {
    init_logging();
    let mirror = Mirror::new();
    publish(&mirror);
    let cache = tempfile::tempdir().unwrap();
    let source = CountingSource::new(mirror.path());
    let config = config(cache.path(), Properties::new()).with_source(source.clone());

    let context = EngineContext::new();
    let mut recorder = Recorder::default();
    let engine = context.initialize_with(&config, &mut recorder).unwrap();

    assert_eq!(engine.origin, LibraryOrigin::Download);
    assert_eq!(engine.flavor, "cpu");
    assert_eq!(engine.loaded, 5);
    assert_eq!(
        recorder.names(),
        [
            "libc10.so",
            "libgomp-a34b3233.so.1",
            "libtorch_cpu.so",
            "libtorch.so",
            "0.25.0-libdjl_torch.so",
        ]
    );
    let fetched = source.opened();

    // A second context in the same process reuses the cache.
    let other = EngineContext::new();
    let mut recorder = Recorder::default();
    let engine = other.initialize_with(&config, &mut recorder).unwrap();
    assert_eq!(engine.origin, LibraryOrigin::Cache);
    assert_eq!(source.opened(), fetched);
}

#[test]
fn dynamic_loader_rejects_non_libraries() {
    let mirror = Mirror::new();
    publish(&mirror);
    let cache = tempfile::tempdir().unwrap();
    let config = config(cache.path(), Properties::new()).with_source(CountingSource::new(mirror.path()));

    let context = EngineContext::new();
    let err = context.initialize(&config).unwrap_err();
    assert!(matches!(err, NativeError::LoadFailed { .. }), "{err}");
    assert!(context.get("pytorch").is_none());
}

#[test]
fn offline_mode_refuses_remote_mirror() {
    let cache = tempfile::tempdir().unwrap();
    let props = Properties::new()
        .with("KILN_OFFLINE", "true")
        .with("PYTORCH_MIRROR", "https://mirror.invalid/pytorch");
    let config = config(cache.path(), props);
    let err = EngineContext::new()
        .initialize_with(&config, &mut Recorder::default())
        .unwrap_err();
    match err {
        NativeError::Offline { url } => {
            assert!(url.starts_with("https://mirror.invalid/pytorch/"), "{url}")
        }
        other => panic!("expected Offline, got {other}"),
    }
}

#[test]
fn concurrent_initialization_fetches_and_loads_once() {
    let baseline = {
        let mirror = Mirror::new();
        publish(&mirror);
        let cache = tempfile::tempdir().unwrap();
        let source = CountingSource::new(mirror.path());
        let config = config(cache.path(), Properties::new()).with_source(source.clone());
        EngineContext::new()
            .initialize_with(&config, &mut Recorder::default())
            .unwrap();
        source.opened()
    };

    let mirror = Mirror::new();
    publish(&mirror);
    let cache = tempfile::tempdir().unwrap();
    let source = CountingSource::new(mirror.path());
    let config = config(cache.path(), Properties::new()).with_source(source.clone());
    let context = EngineContext::new();

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    let mut recorder = Recorder::default();
                    let engine = context.initialize_with(&config, &mut recorder).unwrap();
                    (engine, recorder.loaded.len())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(source.opened(), baseline);
    let loads: Vec<usize> = results.iter().map(|(_, n)| *n).filter(|&n| n > 0).collect();
    assert_eq!(loads, [5]);
    let first = &results[0].0;
    assert!(results.iter().all(|(engine, _)| Arc::ptr_eq(engine, first)));
}

#[test]
fn snapshot_of_aggregate_version_loads_only_bridge() {
    let cache = tempfile::tempdir().unwrap();
    let dir = entry(cache.path(), "1.8.1-20210421-cpu-osx-aarch64");
    std::fs::create_dir_all(&dir).unwrap();
    for f in ["libtorch.dylib", "libc10.dylib", "0.25.0-libdjl_torch.dylib"] {
        std::fs::write(dir.join(f), b"").unwrap();
    }
    let mirror = Mirror::new();
    let source = CountingSource::new(mirror.path());
    let props = Properties::new().with("PYTORCH_VERSION", "1.8.1-20210421");
    let config = config(cache.path(), props)
        .with_host(Host::new(HostOs::MacOs, "aarch64"))
        .with_source(source.clone());

    let mut recorder = Recorder::default();
    let engine = EngineContext::new()
        .initialize_with(&config, &mut recorder)
        .unwrap();
    assert_eq!(engine.origin, LibraryOrigin::Cache);
    assert_eq!(recorder.names(), ["0.25.0-libdjl_torch.dylib"]);
    assert_eq!(source.opened(), 0);
}
