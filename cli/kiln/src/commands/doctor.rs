//! `kiln doctor`: configuration and host diagnostics.

use anyhow::Result;
use kiln_native::config::{CACHE_DIR_KEY, LIBRARY_PATH_KEY, OFFLINE_KEY};
use kiln_native::flavor::probe_flavor;
use kiln_native::{resolve, EngineCache, EngineConfig};

use crate::settings::Settings;

/// Print what Kiln sees for the engine of `config`.
pub fn run(settings: &Settings, config: &EngineConfig) -> Result<()> {
    let spec = config.spec();
    println!("=== Kiln Doctor ===");
    println!();
    println!("Kiln version: {}", env!("CARGO_PKG_VERSION"));
    match &settings.path {
        Some(path) => println!("Settings:     {}", path.display()),
        None => println!("Settings:     none"),
    }
    println!();

    println!("--- Overrides ({}) ---", spec.name);
    let keys = [
        spec.key("LIBRARY_PATH"),
        LIBRARY_PATH_KEY.to_string(),
        spec.key("VERSION"),
        spec.key("FLAVOR"),
        spec.key("PRECXX11"),
        spec.key("MIRROR"),
        CACHE_DIR_KEY.to_string(),
        OFFLINE_KEY.to_string(),
    ];
    let mut any = false;
    for key in &keys {
        if let Some((value, origin)) = config.overrides().lookup(key) {
            println!("  {key} = {value} ({origin})");
            any = true;
        }
    }
    if !any {
        println!("  none");
    }
    println!();

    println!("--- Host ---");
    match config.host() {
        Ok(host) => println!("  Classifier: {}", host.classifier()),
        Err(e) => println!("  Classifier: unsupported ({e})"),
    }
    let probe = config.gpu_probe();
    println!("  GPUs:       {}", probe.device_count());
    match probe.cuda_version() {
        Some(v) => println!("  CUDA:       {}.{}", v / 1000, (v / 10) % 100),
        None => println!("  CUDA:       not found"),
    }
    println!("  Flavor:     {}", probe_flavor(probe));
    println!();

    println!("--- Cache ---");
    match config.cache_root() {
        Ok(root) => {
            println!("  Root: {}", root.display());
            let cache = EngineCache::new(root);
            let entries = cache.list(spec.name)?;
            println!("  {} entries: {}", spec.name, entries.len());
        }
        Err(e) => println!("  Root: unavailable ({e})"),
    }
    match resolve::resolve(config) {
        Ok(r) => println!(
            "  Resolved: {}-{}-{} ({})",
            r.version,
            r.flavor,
            r.classifier,
            if r.cached { "cached" } else { "not cached" }
        ),
        Err(e) => println!("  Resolved: error: {e}"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use kiln_native::{EngineSpec, Properties, StaticProbe};

    use super::*;

    #[test]
    fn doctor_runs_without_error() {
        let cache = tempfile::tempdir().unwrap();
        let config = EngineConfig::isolated(
            EngineSpec::pytorch(),
            Properties::new().with("PYTORCH_FLAVOR", "cpu"),
        )
        .with_gpu_probe(StaticProbe::cuda(1, 12010))
        .with_cache_root(cache.path());
        run(&Settings::default(), &config).unwrap();
    }
}
