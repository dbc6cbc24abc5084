//! Static descriptions of the engines Kiln knows how to load.

use crate::error::{NativeError, Result};
use crate::platform::HostOs;
use crate::version::canonical_version;

/// Everything that differs between engines when locating and loading
/// their native libraries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSpec {
    /// Cache directory and manifest name, e.g. `pytorch`.
    pub name: &'static str,
    /// Prefix of override keys, e.g. `PYTORCH` in `PYTORCH_VERSION`.
    pub env_prefix: &'static str,
    /// Base name of the primary native library.
    pub native_lib: &'static str,
    /// Base name of the bridge library.
    pub bridge_lib: &'static str,
    /// Libraries with dependents, in load order, for accelerator builds.
    pub deferred_cuda: &'static [&'static str],
    /// Libraries with dependents, in load order, for CPU builds.
    pub deferred_cpu: &'static [&'static str],
    /// File-name fragments of components that are only loaded through the
    /// deferred lists.
    pub component_patterns: &'static [&'static str],
    /// Version and OS pairs whose libraries must not be loaded one by one.
    pub aggregate_load: &'static [(&'static str, HostOs)],
    pub default_version: &'static str,
    /// Version of the bridge library API.
    pub api_version: &'static str,
    pub default_mirror: &'static str,
}

impl EngineSpec {
    pub fn pytorch() -> Self {
        Self {
            name: "pytorch",
            env_prefix: "PYTORCH",
            native_lib: "torch",
            bridge_lib: "djl_torch",
            deferred_cuda: &[
                "fbgemm",
                "caffe2_nvrtc",
                "torch_cpu",
                "c10_cuda",
                "torch_cuda_cpp",
                "torch_cuda_cu",
                "torch_cuda",
                "torch",
            ],
            deferred_cpu: &["fbgemm", "torch_cpu", "torch"],
            component_patterns: &["torch_", "caffe2_"],
            aggregate_load: &[("1.8.1", HostOs::MacOs)],
            default_version: "2.1.1",
            api_version: "0.25.0",
            default_mirror: "https://publish.djl.ai/pytorch",
        }
    }

    pub fn onnxruntime() -> Self {
        Self {
            name: "onnxruntime",
            env_prefix: "ONNXRUNTIME",
            native_lib: "onnxruntime",
            bridge_lib: "onnxruntime4j_jni",
            deferred_cuda: &["onnxruntime_providers_shared", "onnxruntime"],
            deferred_cpu: &["onnxruntime"],
            component_patterns: &["onnxruntime_providers_"],
            aggregate_load: &[],
            default_version: "1.16.3",
            api_version: "0.25.0",
            default_mirror: "https://publish.djl.ai/onnxruntime",
        }
    }

    pub fn mxnet() -> Self {
        Self {
            name: "mxnet",
            env_prefix: "MXNET",
            native_lib: "mxnet",
            bridge_lib: "djl_mxnet",
            deferred_cuda: &["mxnet"],
            deferred_cpu: &["mxnet"],
            component_patterns: &[],
            aggregate_load: &[],
            default_version: "1.9.1",
            api_version: "0.25.0",
            default_mirror: "https://publish.djl.ai/mxnet",
        }
    }

    pub fn all() -> [Self; 3] {
        [Self::pytorch(), Self::onnxruntime(), Self::mxnet()]
    }

    pub fn by_name(name: &str) -> Result<Self> {
        Self::all()
            .into_iter()
            .find(|spec| spec.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| NativeError::UnknownEngine {
                name: name.to_string(),
            })
    }

    /// Override key for this engine, e.g. `key("VERSION")` is `PYTORCH_VERSION`.
    pub fn key(&self, suffix: &str) -> String {
        format!("{}_{suffix}", self.env_prefix)
    }

    pub fn native_lib_file(&self, os: HostOs) -> String {
        os.map_library_name(self.native_lib)
    }

    pub fn bridge_lib_file(&self, os: HostOs) -> String {
        os.map_library_name(self.bridge_lib)
    }

    /// Whether `version` on `os` must skip per-file loading.
    ///
    /// Snapshot and build suffixes are ignored, so `1.8.1-20210421` matches
    /// an entry for `1.8.1`.
    pub fn requires_aggregate_load(&self, version: &str, os: HostOs) -> bool {
        let canonical = canonical_version(version).unwrap_or_else(|_| version.to_string());
        self.aggregate_load
            .iter()
            .any(|&(v, o)| v == canonical && o == os)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name() {
        assert_eq!(EngineSpec::by_name("PyTorch").unwrap().name, "pytorch");
        assert!(matches!(
            EngineSpec::by_name("tensorflow"),
            Err(NativeError::UnknownEngine { .. })
        ));
    }

    #[test]
    fn override_keys_and_file_names() {
        let spec = EngineSpec::pytorch();
        assert_eq!(spec.key("LIBRARY_PATH"), "PYTORCH_LIBRARY_PATH");
        assert_eq!(spec.native_lib_file(HostOs::Linux), "libtorch.so");
        assert_eq!(spec.bridge_lib_file(HostOs::MacOs), "libdjl_torch.dylib");
        assert_eq!(spec.bridge_lib_file(HostOs::Windows), "djl_torch.dll");
    }

    #[test]
    fn aggregate_load_exception() {
        let spec = EngineSpec::pytorch();
        assert!(spec.requires_aggregate_load("1.8.1", HostOs::MacOs));
        assert!(!spec.requires_aggregate_load("1.8.1", HostOs::Linux));
        assert!(!spec.requires_aggregate_load("1.9.0", HostOs::MacOs));
        assert!(spec.requires_aggregate_load("1.8.1-20210421", HostOs::MacOs));
        assert!(spec.requires_aggregate_load("1.8.1-SNAPSHOT", HostOs::MacOs));
        assert!(!spec.requires_aggregate_load("1.8.10", HostOs::MacOs));
    }
}
