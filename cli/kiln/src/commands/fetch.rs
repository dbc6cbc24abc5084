//! `kiln fetch`: populate the cache without loading anything.

use anyhow::{Context, Result};
use kiln_native::bridge::find_bridge_library;
use kiln_native::{find_library, EngineConfig};

pub fn run(config: &EngineConfig) -> Result<()> {
    let lib = find_library(config)
        .with_context(|| format!("fetching {} libraries", config.spec().name))?;
    let bridge = find_bridge_library(config, &lib).context("fetching bridge library")?;
    println!(
        "{} {}-{}-{} ({}) in {}",
        config.spec().name,
        lib.version,
        lib.flavor,
        lib.classifier,
        lib.origin,
        lib.dir.display()
    );
    println!("Bridge: {}", bridge.display());
    Ok(())
}
