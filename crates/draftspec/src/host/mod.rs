//! Script Host (C3): orchestrates preprocess → cache lookup → compile →
//! execute (spec.md §4.2), using the compiler/grammar resolution documented in
//! SPEC_FULL.md §0.

pub mod compiler;
pub mod preprocess;

use crate::cache::{CacheKey, DiskCache};
use crate::error::Result;
use crate::tree::SpecContext;
use compiler::Compiler;
use std::path::Path;
use tracing::info;

/// Crate version baked into the cache key, so a rebuilt host with different
/// compiler semantics can never silently reuse an older artefact.
pub const FRAMEWORK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Loads and executes one entry-point manifest end to end: preprocess, cache
/// lookup/compile, then materialize body closures against the live registry.
pub fn load(entry: &Path, cache: &DiskCache, compiler: &dyn Compiler) -> Result<SpecContext> {
    let preprocessed = preprocess::preprocess(entry)?;
    let key = CacheKey::compute(
        FRAMEWORK_VERSION,
        entry,
        &preprocessed.file_hashes,
        &preprocessed.combined_source,
    );

    info!(file = %entry.display(), cache_key = key.as_str(), "loading spec manifest");

    let artefact = cache.get_or_compute(&key, entry, || {
        compiler.compile(entry, &preprocessed.combined_source)
    })?;

    compiler::materialize(&artefact, entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry;
    use compiler::ManifestCompiler;
    use std::fs;
    use std::io::Write;

    #[test]
    fn loads_a_manifest_end_to_end_through_the_cache() {
        let _guard = registry::lock();
        registry::clear();
        registry::register("suite::adds", || assert_eq!(2 + 2, 4));

        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.dspec");
        fs::File::create(&main)
            .unwrap()
            .write_all(
                br#"
                describe "Calculator" {
                    it "adds" { body = "suite::adds" }
                }
                "#,
            )
            .unwrap();

        let cache_dir = dir.path().join("cache");
        let cache = DiskCache::new(&cache_dir, FRAMEWORK_VERSION);
        let compiler = ManifestCompiler;

        let tree = load(&main, &cache, &compiler).unwrap();
        assert_eq!(tree.children[0].specs.len(), 1);

        // Second load should hit the cache rather than reparse.
        let tree2 = load(&main, &cache, &compiler).unwrap();
        assert_eq!(tree2.children[0].specs.len(), 1);
    }
}
