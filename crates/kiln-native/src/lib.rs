//! Native library management for Kiln engines.
//!
//! Turning an [`EngineSpec`] into loaded libraries takes four steps:
//!
//! 1. [`resolve`] picks the version, flavor and classifier for this host,
//!    honoring overrides from [`config`].
//! 2. On a cache miss, [`fetch`] downloads the artifacts listed in the
//!    repository manifest, or the bundled libraries are copied, into a
//!    temporary directory that [`cache`] renames into place.
//! 3. [`bridge`] finds or fetches the bridge library for the same entry.
//! 4. [`loader`] loads everything in dependency order.
//!
//! [`EngineContext`] runs these steps once per engine per process.

pub mod bridge;
pub mod cache;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod flavor;
pub mod loader;
pub mod manifest;
pub mod platform;
pub mod resolve;
pub mod version;

pub use cache::{CacheEntry, EngineCache};
pub use config::{EngineConfig, Overrides, Properties, PropertySource};
pub use context::{EngineContext, LoadedEngine};
pub use engine::EngineSpec;
pub use error::{NativeError, Result};
pub use fetch::{ArtifactSource, Fetcher, LocalMirror};
#[cfg(feature = "http")]
pub use fetch::HttpMirror;
pub use flavor::{CudaRuntimeProbe, GpuProbe, StaticProbe};
pub use loader::{DynamicLoader, LibraryLoader, LoadHook, LoadPlan};
pub use platform::{Host, HostOs, PlatformDescriptor};
pub use resolve::{find_library, LibraryOrigin, Resolution, ResolvedLibrary};
pub use version::EngineVersion;
