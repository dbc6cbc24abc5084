//! `kiln.toml` settings.
//!
//! ```toml
//! [engine]
//! default = "pytorch"
//! bundle = "/opt/kiln/bundle"
//!
//! [properties]
//! PYTORCH_VERSION = "2.1.1"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use kiln_native::{EngineConfig, EngineSpec, Properties};
use serde::Deserialize;

pub const FILE_NAME: &str = "kiln.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineSection {
    /// Engine used when `--engine` is not given.
    #[serde(default)]
    pub default: Option<String>,
    /// Directory of natively packaged libraries.
    #[serde(default)]
    pub bundle: Option<PathBuf>,
}

#[derive(Deserialize)]
struct SettingsFile {
    #[serde(default)]
    engine: EngineSection,
}

/// Loaded settings and where they came from.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub engine: EngineSection,
    pub properties: Properties,
    pub path: Option<PathBuf>,
}

impl Settings {
    pub fn parse(text: &str) -> Result<Self> {
        let file: SettingsFile = toml::from_str(text).context("parsing settings")?;
        let properties = Properties::from_toml_str(text).context("parsing [properties]")?;
        Ok(Self {
            engine: file.engine,
            properties,
            path: None,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut settings =
            Self::parse(&text).with_context(|| format!("in {}", path.display()))?;
        if let Some(bundle) = settings.engine.bundle.take() {
            let base = path.parent().unwrap_or(Path::new("."));
            settings.engine.bundle = Some(base.join(bundle));
        }
        settings.path = Some(path.to_path_buf());
        Ok(settings)
    }

    /// Search upward from `start_dir` for a `kiln.toml`.
    pub fn find_and_load(start_dir: &Path) -> Result<Option<Self>> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(FILE_NAME);
            if candidate.is_file() {
                return Self::load(&candidate).map(Some);
            }
            if !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    /// `--engine`, then `[engine] default`, then PyTorch.
    pub fn engine_spec(&self, engine: Option<&str>) -> Result<EngineSpec> {
        match engine.or(self.engine.default.as_deref()) {
            Some(name) => Ok(EngineSpec::by_name(name)?),
            None => Ok(EngineSpec::pytorch()),
        }
    }

    /// Configuration for `engine` reading the environment and these settings.
    pub fn engine_config(&self, engine: Option<&str>) -> Result<EngineConfig> {
        let mut config =
            EngineConfig::new(self.engine_spec(engine)?).with_properties(self.properties.clone());
        if let Some(bundle) = &self.engine.bundle {
            config = config.with_bundle_dir(bundle);
        }
        Ok(config)
    }
}
