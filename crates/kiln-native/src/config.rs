//! Override lookup and engine configuration.
//!
//! Overrides come from two layers with fixed precedence: the process
//! environment, then an in-process property table. The table can be
//! filled in code or loaded from a `kiln.toml` file:
//!
//! ```toml
//! [properties]
//! PYTORCH_VERSION = "2.1.1"
//! PYTORCH_PRECXX11 = true
//! KILN_CACHE_DIR = "/var/cache/kiln"
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::cache::EngineCache;
use crate::engine::EngineSpec;
use crate::error::{NativeError, Result};
use crate::fetch::{self, ArtifactSource, Fetcher};
use crate::flavor::{CudaRuntimeProbe, GpuProbe};
use crate::loader::LoadHook;
use crate::platform::Host;

/// Cache root override.
pub const CACHE_DIR_KEY: &str = "KILN_CACHE_DIR";
/// Set to `true` to forbid remote fetches.
pub const OFFLINE_KEY: &str = "KILN_OFFLINE";
/// Generic path list searched after `{ENGINE}_LIBRARY_PATH`.
pub const LIBRARY_PATH_KEY: &str = "library.path";

/// A layer of string-valued overrides.
pub trait PropertySource: Send + Sync + fmt::Debug {
    fn get(&self, key: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl PropertySource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// An in-process property table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    values: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    properties: BTreeMap<String, toml::Value>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse the `[properties]` table of a `kiln.toml` document.
    ///
    /// Non-string values are stored in their TOML rendering, so
    /// `FLAG = true` reads back as `"true"`.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(text)?;
        let values = file
            .properties
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    toml::Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect();
        Ok(Self { values })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

impl PropertySource for Properties {
    fn get(&self, key: &str) -> Option<String> {
        Properties::get(self, key).map(str::to_string)
    }
}

/// Where an override value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Environment,
    Property,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Environment => write!(f, "env"),
            Origin::Property => write!(f, "property"),
        }
    }
}

/// Environment-then-property lookup.
#[derive(Debug, Clone)]
pub struct Overrides {
    env: Option<Arc<dyn PropertySource>>,
    properties: Properties,
}

impl Overrides {
    /// Overrides backed by the process environment.
    pub fn new(properties: Properties) -> Self {
        Self {
            env: Some(Arc::new(EnvSource)),
            properties,
        }
    }

    /// Overrides that ignore the process environment.
    pub fn isolated(properties: Properties) -> Self {
        Self {
            env: None,
            properties,
        }
    }

    /// Replace the environment layer.
    pub fn with_env_source(mut self, source: Arc<dyn PropertySource>) -> Self {
        self.env = Some(source);
        self
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lookup(key).map(|(value, _)| value)
    }

    /// The value and the layer that supplied it.
    pub fn lookup(&self, key: &str) -> Option<(String, Origin)> {
        if let Some(value) = self.env.as_ref().and_then(|env| env.get(key)) {
            return Some((value, Origin::Environment));
        }
        self.properties
            .get(key)
            .map(|value| (value.to_string(), Origin::Property))
    }

    /// Like [`Overrides::get`] but treats empty values as unset.
    pub fn non_empty(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    /// True when either layer holds `true` (case-insensitive).
    pub fn flag(&self, key: &str) -> bool {
        let is_true = |v: &str| v.trim().eq_ignore_ascii_case("true");
        self.env
            .as_ref()
            .and_then(|env| env.get(key))
            .is_some_and(|v| is_true(&v))
            || self.properties.get(key).is_some_and(is_true)
    }
}

/// Everything needed to resolve and load one engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    spec: EngineSpec,
    overrides: Overrides,
    cache_root: Option<PathBuf>,
    bundle_dir: Option<PathBuf>,
    host: Option<Host>,
    gpu_probe: Arc<dyn GpuProbe>,
    source: Option<Arc<dyn ArtifactSource>>,
    load_hook: Option<LoadHook>,
}

impl EngineConfig {
    /// Configuration reading overrides from the environment.
    pub fn new(spec: EngineSpec) -> Self {
        Self::with_overrides(spec, Overrides::new(Properties::new()))
    }

    /// Configuration that only sees `properties`.
    pub fn isolated(spec: EngineSpec, properties: Properties) -> Self {
        Self::with_overrides(spec, Overrides::isolated(properties))
    }

    pub fn with_overrides(spec: EngineSpec, overrides: Overrides) -> Self {
        Self {
            spec,
            overrides,
            cache_root: None,
            bundle_dir: None,
            host: None,
            gpu_probe: Arc::new(CudaRuntimeProbe),
            source: None,
            load_hook: None,
        }
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.overrides.properties = properties;
        self
    }

    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = Some(root.into());
        self
    }

    /// Directory holding natively packaged libraries and their records.
    pub fn with_bundle_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bundle_dir = Some(dir.into());
        self
    }

    pub fn with_host(mut self, host: Host) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_gpu_probe(mut self, probe: impl GpuProbe + 'static) -> Self {
        self.gpu_probe = Arc::new(probe);
        self
    }

    /// Fetch artifacts from `source` instead of the configured mirror.
    pub fn with_source(mut self, source: impl ArtifactSource + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Run `hook` on every library path before it is loaded.
    pub fn with_load_hook(mut self, hook: LoadHook) -> Self {
        self.load_hook = Some(hook);
        self
    }

    pub fn spec(&self) -> &EngineSpec {
        &self.spec
    }

    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    pub fn overrides_mut(&mut self) -> &mut Overrides {
        &mut self.overrides
    }

    pub fn bundle_dir(&self) -> Option<&Path> {
        self.bundle_dir.as_deref()
    }

    pub fn gpu_probe(&self) -> &dyn GpuProbe {
        self.gpu_probe.as_ref()
    }

    pub fn load_hook(&self) -> Option<LoadHook> {
        self.load_hook
    }

    pub fn host(&self) -> Result<Host> {
        match &self.host {
            Some(host) => Ok(host.clone()),
            None => Host::detect(),
        }
    }

    /// Explicit root, then `KILN_CACHE_DIR`, then `$HOME/.kiln/cache`.
    pub fn cache_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.cache_root {
            return Ok(root.clone());
        }
        if let Some(root) = self.overrides.non_empty(CACHE_DIR_KEY) {
            return Ok(PathBuf::from(root));
        }
        home_dir()
            .map(|home| home.join(".kiln").join("cache"))
            .ok_or_else(|| NativeError::CacheError {
                path: PathBuf::new(),
                detail: format!("no home directory; set {CACHE_DIR_KEY}"),
            })
    }

    pub fn cache(&self) -> Result<EngineCache> {
        Ok(EngineCache::new(self.cache_root()?))
    }

    pub fn offline(&self) -> bool {
        self.overrides.flag(OFFLINE_KEY)
    }

    /// `{ENGINE}_MIRROR`, or the engine's default repository.
    pub fn mirror(&self) -> String {
        self.overrides
            .non_empty(&self.spec.key("MIRROR"))
            .unwrap_or_else(|| self.spec.default_mirror.to_string())
    }

    pub fn artifact_source(&self) -> Result<Arc<dyn ArtifactSource>> {
        match &self.source {
            Some(source) => Ok(Arc::clone(source)),
            None => fetch::open_mirror(&self.mirror()),
        }
    }

    pub fn fetcher(&self) -> Result<Fetcher> {
        Ok(Fetcher::new(self.artifact_source()?, self.offline()))
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}
