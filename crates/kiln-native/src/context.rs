//! Process-wide engine initialization.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::bridge::find_bridge_library;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::loader::{DynamicLoader, LibraryLoader, LoadPlan};
use crate::resolve::{find_library, LibraryOrigin};

/// An engine whose libraries are loaded into this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedEngine {
    pub engine: String,
    pub dir: PathBuf,
    pub version: String,
    pub flavor: String,
    pub classifier: String,
    pub api_version: String,
    pub bridge_path: PathBuf,
    pub origin: LibraryOrigin,
    /// Number of libraries loaded, bridge included.
    pub loaded: usize,
}

#[derive(Debug, Default)]
struct State {
    engines: HashMap<String, Arc<LoadedEngine>>,
    loaders: Vec<DynamicLoader>,
}

/// Resolves, fetches and loads each engine at most once.
///
/// One lock covers the whole sequence, so concurrent callers for the same
/// engine wait for the first one and then share its result.
#[derive(Debug, Default)]
pub struct EngineContext {
    state: Mutex<State>,
}

impl EngineContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The context shared by the whole process.
    pub fn global() -> &'static EngineContext {
        static CONTEXT: OnceLock<EngineContext> = OnceLock::new();
        CONTEXT.get_or_init(EngineContext::new)
    }

    /// Initialize the engine of `config` with the platform linker.
    pub fn initialize(&self, config: &EngineConfig) -> Result<Arc<LoadedEngine>> {
        let mut state = self.state.lock();
        if let Some(engine) = state.engines.get(config.spec().name) {
            return Ok(Arc::clone(engine));
        }
        let mut loader = DynamicLoader::new(config.load_hook());
        let engine = load_engine(config, &mut loader)?;
        state.loaders.push(loader);
        Ok(remember(&mut state, engine))
    }

    /// Initialize the engine of `config` through `loader`.
    pub fn initialize_with(
        &self,
        config: &EngineConfig,
        loader: &mut dyn LibraryLoader,
    ) -> Result<Arc<LoadedEngine>> {
        let mut state = self.state.lock();
        if let Some(engine) = state.engines.get(config.spec().name) {
            return Ok(Arc::clone(engine));
        }
        let engine = load_engine(config, loader)?;
        Ok(remember(&mut state, engine))
    }

    pub fn get(&self, engine: &str) -> Option<Arc<LoadedEngine>> {
        self.state.lock().engines.get(engine).cloned()
    }

    /// Forget initialized engines. Loaded libraries stay mapped.
    pub fn reset(&self) {
        self.state.lock().engines.clear();
    }
}

fn remember(state: &mut State, engine: LoadedEngine) -> Arc<LoadedEngine> {
    let engine = Arc::new(engine);
    state.engines.insert(engine.engine.clone(), Arc::clone(&engine));
    engine
}

fn load_engine(config: &EngineConfig, loader: &mut dyn LibraryLoader) -> Result<LoadedEngine> {
    let spec = config.spec();
    let lib = find_library(config)?;
    let plan = LoadPlan::build(&lib.dir, spec, &lib.flavor, &lib.version, lib.os)?;
    plan.execute(loader)?;

    let bridge_path = find_bridge_library(config, &lib)?;
    loader.load(&bridge_path)?;

    log::info!(
        "{} {}-{}-{} loaded from {} ({})",
        spec.name,
        lib.version,
        lib.flavor,
        lib.classifier,
        lib.dir.display(),
        lib.origin
    );
    Ok(LoadedEngine {
        engine: spec.name.to_string(),
        loaded: plan.steps().len() + 1,
        dir: lib.dir,
        version: lib.version,
        flavor: lib.flavor,
        classifier: lib.classifier,
        api_version: lib.api_version,
        bridge_path,
        origin: lib.origin,
    })
}
