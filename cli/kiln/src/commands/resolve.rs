//! `kiln resolve`: show what would be loaded, without fetching.

use anyhow::Result;
use kiln_native::{resolve, EngineConfig, LibraryOrigin};

pub fn run(config: &EngineConfig) -> Result<()> {
    let r = resolve::resolve(config)?;
    println!("Engine:     {}", config.spec().name);
    println!("Version:    {}", r.version);
    println!("Flavor:     {}", r.flavor);
    println!("Classifier: {}", r.classifier);
    println!("Directory:  {}", r.dir.display());
    let status = match (r.origin, r.cached) {
        (LibraryOrigin::Override, _) => "existing install (library path override)",
        (_, true) => "cached",
        (LibraryOrigin::Bundle, false) => "not cached (copied from bundle on load)",
        (_, false) => "not cached (downloaded on load)",
    };
    println!("Status:     {status}");
    Ok(())
}
