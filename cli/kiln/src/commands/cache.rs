//! `kiln cache`: inspect and clean the library cache.

use anyhow::{Context, Result};
use kiln_native::{EngineCache, EngineSpec};

/// List entries of `engine`, or of every engine with a cache directory.
pub fn list(cache: &EngineCache, engine: Option<&EngineSpec>) -> Result<()> {
    let engines = match engine {
        Some(spec) => vec![spec.name.to_string()],
        None => cache.engines()?,
    };
    println!("Cache root: {}", cache.root().display());
    let mut total = 0;
    for name in &engines {
        for entry in cache.list(name)? {
            let verified = match cache.verify_integrity(&entry.path) {
                Ok(true) => "verified",
                Ok(false) => "unverified",
                Err(_) => "corrupt record",
            };
            println!(
                "  {}/{}  {} files, {} bytes, {verified}",
                entry.engine, entry.key, entry.files, entry.size_bytes
            );
            total += 1;
        }
    }
    if total == 0 {
        println!("  (empty)");
    }
    Ok(())
}

/// Remove one entry of `engine`, or all of its entries.
pub fn clean(cache: &EngineCache, engine: &EngineSpec, key: Option<&str>) -> Result<()> {
    match key {
        Some(key) => {
            if cache
                .remove(engine.name, key)
                .with_context(|| format!("removing {}/{key}", engine.name))?
            {
                println!("Removed {}/{key}", engine.name);
            } else {
                println!("No entry {}/{key}", engine.name);
            }
        }
        None => {
            let n = cache
                .clear(engine.name)
                .with_context(|| format!("clearing {}", engine.name))?;
            println!("Removed {n} {} entries", engine.name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populate(root: &std::path::Path, key: &str) {
        let dir = root.join("pytorch").join(key);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("libtorch.so"), b"torch").unwrap();
    }

    #[test]
    fn list_empty_and_populated() {
        let root = tempfile::tempdir().unwrap();
        let cache = EngineCache::new(root.path().to_path_buf());
        list(&cache, None).unwrap();
        populate(root.path(), "2.1.1-cpu-linux-x86_64");
        list(&cache, Some(&EngineSpec::pytorch())).unwrap();
        list(&cache, None).unwrap();
    }

    #[test]
    fn clean_one_entry_then_all() {
        let root = tempfile::tempdir().unwrap();
        let cache = EngineCache::new(root.path().to_path_buf());
        populate(root.path(), "2.1.1-cpu-linux-x86_64");
        populate(root.path(), "2.1.1-cu118-linux-x86_64");
        let spec = EngineSpec::pytorch();

        clean(&cache, &spec, Some("2.1.1-cpu-linux-x86_64")).unwrap();
        assert!(!root.path().join("pytorch/2.1.1-cpu-linux-x86_64").exists());
        assert!(root.path().join("pytorch/2.1.1-cu118-linux-x86_64").exists());

        clean(&cache, &spec, Some("missing")).unwrap();
        clean(&cache, &spec, None).unwrap();
        assert!(!root.path().join("pytorch").exists());
    }
}
