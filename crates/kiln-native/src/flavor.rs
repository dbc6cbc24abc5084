//! Build flavor selection.
//!
//! A flavor names a build variant: `cpu`, or `cu<major><minor>` for a CUDA
//! build. Builds linked against the pre-C++11 ABI carry a `-precxx11`
//! suffix.

use std::fmt;
use std::os::raw::c_int;
use std::sync::OnceLock;

use libloading::{Library, Symbol};

use crate::config::EngineConfig;
use crate::platform::{Host, HostOs};

pub const PRECXX11_SUFFIX: &str = "-precxx11";

/// Bundled legacy builds ship this runtime, which marks the old ABI.
const LEGACY_ABI_MARKER: &str = "libstdc++.so.6";

/// Reports the accelerators visible to this process.
pub trait GpuProbe: Send + Sync + fmt::Debug {
    fn device_count(&self) -> usize;

    /// CUDA runtime version encoded as `major * 1000 + minor * 10`.
    fn cuda_version(&self) -> Option<u32>;
}

/// Asks the CUDA runtime, if one can be opened.
///
/// The result is computed once per process. Hosts without a CUDA runtime
/// report zero devices.
#[derive(Debug, Clone, Copy, Default)]
pub struct CudaRuntimeProbe;

#[cfg(target_os = "windows")]
const CUDART_NAMES: &[&str] = &["cudart64_12.dll", "cudart64_110.dll", "cudart64_102.dll"];
#[cfg(not(target_os = "windows"))]
const CUDART_NAMES: &[&str] = &["libcudart.so", "libcudart.so.12", "libcudart.so.11.0"];

type CudaQuery = unsafe extern "C" fn(*mut c_int) -> c_int;

impl CudaRuntimeProbe {
    fn query() -> Option<(usize, u32)> {
        static RESULT: OnceLock<Option<(usize, u32)>> = OnceLock::new();
        *RESULT.get_or_init(|| {
            CUDART_NAMES.iter().find_map(|name| {
                // SAFETY: opening the CUDA runtime only runs its own initializers.
                let library = unsafe { Library::new(name) }.ok()?;
                log::debug!("probing CUDA runtime {name}");
                let count = unsafe { call(&library, b"cudaGetDeviceCount\0") }?;
                let version = unsafe { call(&library, b"cudaRuntimeGetVersion\0") }?;
                Some((count.max(0) as usize, version.max(0) as u32))
            })
        })
    }
}

/// Call a CUDA `cudaError_t f(int*)` entry point.
unsafe fn call(library: &Library, symbol: &[u8]) -> Option<c_int> {
    let query: Symbol<CudaQuery> = library.get(symbol).ok()?;
    let mut value: c_int = 0;
    (query(&mut value) == 0).then_some(value)
}

impl GpuProbe for CudaRuntimeProbe {
    fn device_count(&self) -> usize {
        Self::query().map_or(0, |(count, _)| count)
    }

    fn cuda_version(&self) -> Option<u32> {
        Self::query().map(|(_, version)| version)
    }
}

/// A probe with fixed answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticProbe {
    pub devices: usize,
    pub cuda_version: Option<u32>,
}

impl StaticProbe {
    pub fn none() -> Self {
        Self {
            devices: 0,
            cuda_version: None,
        }
    }

    pub fn cuda(devices: usize, version: u32) -> Self {
        Self {
            devices,
            cuda_version: Some(version),
        }
    }
}

impl GpuProbe for StaticProbe {
    fn device_count(&self) -> usize {
        self.devices
    }

    fn cuda_version(&self) -> Option<u32> {
        self.cuda_version
    }
}

/// `11080` → `cu118`.
pub fn cuda_flavor(version: u32) -> String {
    format!("cu{}{}", version / 1000, (version / 10) % 100)
}

/// `cu<major><minor>` when a device is visible, otherwise `cpu`.
pub fn probe_flavor(probe: &dyn GpuProbe) -> String {
    match probe.cuda_version() {
        Some(version) if probe.device_count() > 0 => cuda_flavor(version),
        _ => "cpu".to_string(),
    }
}

/// `{ENGINE}_FLAVOR` from the environment or properties.
pub fn flavor_override(config: &EngineConfig) -> Option<String> {
    config
        .overrides()
        .non_empty(&config.spec().key("FLAVOR"))
        .map(|f| f.trim().to_string())
}

/// Override, or the probe result. The ABI suffix is applied separately.
pub fn resolve_flavor(config: &EngineConfig) -> String {
    flavor_override(config).unwrap_or_else(|| probe_flavor(config.gpu_probe()))
}

/// `-precxx11` for downloads: forced by `{ENGINE}_PRECXX11` or on linux
/// aarch64, where only that ABI is published.
pub fn abi_suffix(config: &EngineConfig, host: &Host) -> &'static str {
    let forced = config.overrides().flag(&config.spec().key("PRECXX11"));
    let aarch64_linux = host.os == HostOs::Linux && host.arch == "aarch64";
    if forced || aarch64_linux {
        PRECXX11_SUFFIX
    } else {
        ""
    }
}

/// `-precxx11` for bundled builds that ship the legacy C++ runtime.
pub fn bundle_abi_suffix(libraries: &[String]) -> &'static str {
    if libraries.iter().any(|l| l == LEGACY_ABI_MARKER) {
        PRECXX11_SUFFIX
    } else {
        ""
    }
}

/// Flavor of an existing install found through a library path override.
///
/// An explicit `{ENGINE}_FLAVOR` is taken as is. Otherwise system installs
/// are assumed to use the pre-C++11 ABI.
pub fn install_flavor(config: &EngineConfig) -> String {
    flavor_override(config).unwrap_or_else(|| {
        with_abi_suffix(&probe_flavor(config.gpu_probe()), PRECXX11_SUFFIX)
    })
}

/// Append `suffix` unless `flavor` already ends with it.
pub fn with_abi_suffix(flavor: &str, suffix: &str) -> String {
    if suffix.is_empty() || flavor.ends_with(suffix) {
        flavor.to_string()
    } else {
        format!("{flavor}{suffix}")
    }
}
