//! Ordered loading of native libraries.
//!
//! Engine libraries depend on each other, and some platforms resolve those
//! dependencies only against libraries that are already loaded. A
//! [`LoadPlan`] loads standalone libraries first, then the cuDNN group, then
//! the engine's own libraries in dependency order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use libloading::Library;

use crate::engine::EngineSpec;
use crate::error::{NativeError, Result};
use crate::platform::HostOs;

/// Runs before each library is loaded, e.g. to register the path with a
/// host runtime. An `Err` aborts the load.
pub type LoadHook = fn(&Path) -> std::result::Result<(), String>;

/// cuDNN 8 split libraries, in load order.
const CUDNN_V8: &[&str] = &[
    "cudnn64_8.dll",
    "cudnn_ops_infer64_8.dll",
    "cudnn_ops_train64_8.dll",
    "cudnn_cnn_infer64_8.dll",
    "cudnn_cnn_train64_8.dll",
    "cudnn_adv_infer64_8.dll",
    "cudnn_adv_train64_8.dll",
];

const CUDNN_V7: &str = "cudnn64_7.dll";

/// CUDA runtime pieces that CPU builds must not load.
const CUDA_RUNTIME_PATTERNS: &[&str] = &["nvrtc", "cudart", "nvToolsExt"];

/// Something that can load a shared library.
pub trait LibraryLoader {
    fn load(&mut self, path: &Path) -> Result<()>;
}

/// Loads libraries with the platform linker and keeps them loaded.
#[derive(Debug, Default)]
pub struct DynamicLoader {
    hook: Option<LoadHook>,
    libraries: Vec<(PathBuf, Library)>,
}

impl DynamicLoader {
    pub fn new(hook: Option<LoadHook>) -> Self {
        Self {
            hook,
            libraries: Vec::new(),
        }
    }

    /// Paths loaded so far, in load order.
    pub fn loaded(&self) -> impl Iterator<Item = &Path> {
        self.libraries.iter().map(|(path, _)| path.as_path())
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }
}

impl LibraryLoader for DynamicLoader {
    fn load(&mut self, path: &Path) -> Result<()> {
        if self.libraries.iter().any(|(p, _)| p == path) {
            return Ok(());
        }
        if let Some(hook) = self.hook {
            hook(path).map_err(|detail| NativeError::LoadFailed {
                path: path.to_path_buf(),
                detail,
            })?;
        }
        log::debug!("Loading native library: {}", path.display());
        // SAFETY: the library comes from a resolved engine directory; its
        // initializers are the engine's own.
        let library = unsafe { Library::new(path) }.map_err(|e| NativeError::LoadFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        self.libraries.push((path.to_path_buf(), library));
        Ok(())
    }
}

/// The libraries of one engine directory in load order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPlan {
    dir: PathBuf,
    steps: Vec<PathBuf>,
}

impl LoadPlan {
    /// Plan the loading of every library in `dir`.
    ///
    /// Eager libraries (sorted by file name) come first. Deferred engine
    /// libraries, engine components, the bridge library and cuDNN are
    /// excluded from the eager set; CPU builds also skip CUDA runtime
    /// pieces. Then comes the cuDNN group, then the deferred list for the
    /// build kind, skipping files that are absent.
    pub fn build(dir: &Path, spec: &EngineSpec, flavor: &str, version: &str, os: HostOs) -> Result<Self> {
        if !dir.is_dir() {
            return Err(NativeError::LoadFailed {
                path: dir.to_path_buf(),
                detail: "library directory does not exist".to_string(),
            });
        }
        if spec.requires_aggregate_load(version, os) {
            log::debug!("{} {version} is loaded as a whole on this platform", spec.name);
            return Ok(Self {
                dir: dir.to_path_buf(),
                steps: Vec::new(),
            });
        }

        let is_cuda = flavor.contains("cu");
        let deferred_set: HashSet<String> = spec
            .deferred_cuda
            .iter()
            .chain(spec.deferred_cpu)
            .map(|name| os.map_library_name(name))
            .collect();
        let bridge = spec.bridge_lib_file(os);

        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();

        let mut steps: Vec<PathBuf> = names
            .into_iter()
            .filter(|name| {
                !deferred_set.contains(name)
                    && !name.ends_with(&bridge)
                    && !spec.component_patterns.iter().any(|p| name.contains(p))
                    && !name.starts_with("cudnn")
                    && (is_cuda || !CUDA_RUNTIME_PATTERNS.iter().any(|p| name.contains(p)))
            })
            .map(|name| dir.join(name))
            .collect();

        if dir.join(CUDNN_V8[0]).exists() {
            steps.extend(CUDNN_V8.iter().map(|name| dir.join(name)));
        } else if dir.join(CUDNN_V7).exists() {
            steps.push(dir.join(CUDNN_V7));
        }

        let deferred = if is_cuda {
            spec.deferred_cuda
        } else {
            spec.deferred_cpu
        };
        steps.extend(
            deferred
                .iter()
                .map(|name| dir.join(os.map_library_name(name)))
                .filter(|path| path.exists()),
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            steps,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn steps(&self) -> &[PathBuf] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Load every step in order, stopping at the first failure.
    pub fn execute(&self, loader: &mut dyn LibraryLoader) -> Result<()> {
        for path in &self.steps {
            loader.load(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(plan: &LoadPlan) -> Vec<String> {
        plan.steps()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    fn populate(dir: &Path, files: &[&str]) {
        for f in files {
            std::fs::write(dir.join(f), b"").unwrap();
        }
    }

    #[test]
    fn cpu_plan_order() {
        let dir = tempfile::tempdir().unwrap();
        populate(
            dir.path(),
            &[
                "libtorch.so",
                "libtorch_cpu.so",
                "libc10.so",
                "libgomp.so.1",
                "libfbgemm.so",
                "libnvrtc.so",
                "libcaffe2_detectron_ops.so",
                "0.25.0-libdjl_torch.so",
            ],
        );
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let plan = LoadPlan::build(dir.path(), &EngineSpec::pytorch(), "cpu", "2.1.1", HostOs::Linux).unwrap();
        assert_eq!(
            names(&plan),
            ["libc10.so", "libgomp.so.1", "libfbgemm.so", "libtorch_cpu.so", "libtorch.so"]
        );
    }

    #[test]
    fn cuda_plan_keeps_runtime_and_orders_deferred() {
        let dir = tempfile::tempdir().unwrap();
        populate(
            dir.path(),
            &[
                "libtorch.so",
                "libtorch_cuda.so",
                "libtorch_cpu.so",
                "libc10_cuda.so",
                "libc10.so",
                "libcudart-abc.so.11.0",
                "libnvrtc-builtins.so",
            ],
        );
        let plan = LoadPlan::build(dir.path(), &EngineSpec::pytorch(), "cu118", "2.1.1", HostOs::Linux).unwrap();
        assert_eq!(
            names(&plan),
            [
                "libc10.so",
                "libcudart-abc.so.11.0",
                "libnvrtc-builtins.so",
                "libtorch_cpu.so",
                "libc10_cuda.so",
                "libtorch_cuda.so",
                "libtorch.so",
            ]
        );
    }

    #[test]
    fn cudnn_v8_group_follows_eager_libraries() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path(), &["torch.dll", "c10.dll", "cudnn64_8.dll", "cudnn_ops_infer64_8.dll"]);
        let plan = LoadPlan::build(dir.path(), &EngineSpec::pytorch(), "cu118", "2.1.1", HostOs::Windows).unwrap();
        let names = names(&plan);
        assert_eq!(names[0], "c10.dll");
        assert_eq!(&names[1..8], CUDNN_V8);
        assert_eq!(names[8], "torch.dll");
    }

    #[test]
    fn cudnn_v7_fallback() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path(), &["torch.dll", "cudnn64_7.dll"]);
        let plan = LoadPlan::build(dir.path(), &EngineSpec::pytorch(), "cu102", "1.13.1", HostOs::Windows).unwrap();
        assert_eq!(names(&plan), ["cudnn64_7.dll", "torch.dll"]);
    }

    #[test]
    fn aggregate_load_yields_empty_plan() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path(), &["libtorch.dylib", "libc10.dylib"]);
        let plan = LoadPlan::build(dir.path(), &EngineSpec::pytorch(), "cpu", "1.8.1", HostOs::MacOs).unwrap();
        assert!(plan.is_empty());

        for snapshot in ["1.8.1-20210421", "1.8.1-SNAPSHOT"] {
            let plan = LoadPlan::build(dir.path(), &EngineSpec::pytorch(), "cpu", snapshot, HostOs::MacOs).unwrap();
            assert!(plan.is_empty(), "{snapshot}");
        }

        let plan = LoadPlan::build(dir.path(), &EngineSpec::pytorch(), "cpu", "1.9.0", HostOs::MacOs).unwrap();
        assert_eq!(names(&plan), ["libc10.dylib", "libtorch.dylib"]);
    }

    #[test]
    fn missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = LoadPlan::build(
            &dir.path().join("absent"),
            &EngineSpec::pytorch(),
            "cpu",
            "2.1.1",
            HostOs::Linux,
        )
        .unwrap_err();
        assert!(matches!(err, NativeError::LoadFailed { .. }));
    }

    #[test]
    fn hook_failure_aborts_load() {
        fn reject(_: &Path) -> std::result::Result<(), String> {
            Err("rejected".to_string())
        }
        let mut loader = DynamicLoader::new(Some(reject));
        let err = loader.load(Path::new("/nowhere/libx.so")).unwrap_err();
        assert!(matches!(err, NativeError::LoadFailed { ref detail, .. } if detail == "rejected"));
        assert!(loader.is_empty());
    }

    #[test]
    fn invalid_library_is_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libbroken.so");
        std::fs::write(&path, b"not a library").unwrap();
        let err = DynamicLoader::new(None).load(&path).unwrap_err();
        assert!(matches!(err, NativeError::LoadFailed { .. }));
        assert!(!err.is_missing_dependency());
    }
}
