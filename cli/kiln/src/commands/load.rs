//! `kiln load`: full initialization in this process.

use anyhow::Result;
use kiln_native::{EngineConfig, EngineContext};

pub fn run(config: &EngineConfig) -> Result<()> {
    match EngineContext::global().initialize(config) {
        Ok(engine) => {
            println!(
                "Loaded {} {}-{}-{} ({} libraries) from {}",
                engine.engine,
                engine.version,
                engine.flavor,
                engine.classifier,
                engine.loaded,
                engine.dir.display()
            );
            Ok(())
        }
        Err(e) if e.is_missing_dependency() => {
            println!("Skipped loading {}: missing host dependency", config.spec().name);
            println!("  {e}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
