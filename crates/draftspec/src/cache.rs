//! Compilation cache (C4, spec.md §4.2/§6): a content-addressed disk cache of
//! [`crate::host::compiler::CompiledArtefact`]s, fronted by an in-memory LRU.
//!
//! Cache-key composition is grounded on the `other_examples` Turborepo
//! task-hash crate (hashing a framework version, a main path, and a sorted set
//! of file hashes together); content hashing uses `sha2` as
//! `josongsong-semantica-codegraph`'s storage layer does; the in-memory LRU
//! uses the `lru` crate the same pack repo depends on for its function-summary
//! cache. Atomic disk writes (`.tmp` + rename) are hand-written — no crate in
//! the retrieval pack does this as a reusable helper, so it is the core's own
//! responsibility here, just as spec.md §6 requires.

use crate::error::{DraftSpecError, Result};
use crate::host::compiler::CompiledArtefact;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// A 16-hex-character truncated SHA-256 digest, per spec.md §4.2.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// `hash(frameworkVersion || mainPath || sortedFileHashes || hash(preprocessedSource))`.
    pub fn compute(
        framework_version: &str,
        main_path: &Path,
        file_hashes: &[(PathBuf, String)],
        preprocessed_source: &str,
    ) -> Self {
        let mut sorted: Vec<&(PathBuf, String)> = file_hashes.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        let mut source_hasher = Sha256::new();
        source_hasher.update(preprocessed_source.as_bytes());
        let source_digest = source_hasher.finalize();

        let mut hasher = Sha256::new();
        hasher.update(framework_version.as_bytes());
        hasher.update(main_path.to_string_lossy().as_bytes());
        for (path, digest) in sorted {
            hasher.update(path.to_string_lossy().as_bytes());
            hasher.update(digest.as_bytes());
        }
        hasher.update(source_digest);

        let full = hasher.finalize();
        let hex: String = full.iter().map(|b| format!("{b:02x}")).collect();
        CacheKey(hex[..16].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntryMeta {
    key: String,
    framework_version: String,
    main_path: PathBuf,
    created_unix_secs: u64,
}

/// An in-memory LRU sitting in front of the disk cache within one process,
/// per spec.md §4.2's cache policy bullet.
struct MemoryCache {
    inner: Mutex<LruCache<String, CompiledArtefact>>,
}

impl MemoryCache {
    fn new(capacity: usize) -> Self {
        MemoryCache {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).unwrap(),
            )),
        }
    }

    fn get(&self, key: &CacheKey) -> Option<CompiledArtefact> {
        self.inner
            .lock()
            .expect("draftspec: memory cache lock poisoned")
            .get(key.as_str())
            .cloned()
    }

    fn put(&self, key: &CacheKey, artefact: CompiledArtefact) {
        self.inner
            .lock()
            .expect("draftspec: memory cache lock poisoned")
            .put(key.as_str().to_string(), artefact);
    }
}

/// On-disk cache under `<directory>/scripts/`, each entry split into sibling
/// `<key>.meta.json` and `<key>.artefact.json` files, written via `.tmp` + rename.
pub struct DiskCache {
    directory: PathBuf,
    memory: MemoryCache,
    framework_version: String,
}

const ARTEFACT_EXT: &str = "artefact.json";
const META_EXT: &str = "meta.json";

impl DiskCache {
    pub fn new(directory: impl Into<PathBuf>, framework_version: impl Into<String>) -> Self {
        DiskCache {
            directory: directory.into(),
            memory: MemoryCache::new(256),
            framework_version: framework_version.into(),
        }
    }

    fn scripts_dir(&self) -> PathBuf {
        self.directory.join("scripts")
    }

    fn meta_path(&self, key: &CacheKey) -> PathBuf {
        self.scripts_dir().join(format!("{}.{META_EXT}", key.as_str()))
    }

    fn artefact_path(&self, key: &CacheKey) -> PathBuf {
        self.scripts_dir().join(format!("{}.{ARTEFACT_EXT}", key.as_str()))
    }

    /// Returns the cached artefact for `key`, computing and storing it via
    /// `compute` on a miss. A malformed or missing on-disk entry is treated as
    /// a miss: the stale entry is deleted and `compute` runs, per spec.md's
    /// "CacheIntegrity errors fall through to a miss" rule.
    pub fn get_or_compute(
        &self,
        key: &CacheKey,
        main_path: &Path,
        compute: impl FnOnce() -> Result<CompiledArtefact>,
    ) -> Result<CompiledArtefact> {
        if let Some(hit) = self.memory.get(key) {
            debug!(cache_key = key.as_str(), "compilation cache memory hit");
            return Ok(hit);
        }

        match self.read_disk(key) {
            Ok(Some(artefact)) => {
                debug!(cache_key = key.as_str(), "compilation cache disk hit");
                self.memory.put(key, artefact.clone());
                return Ok(artefact);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(cache_key = key.as_str(), error = %e, "discarding corrupt cache entry");
                self.evict(key);
            }
        }

        debug!(cache_key = key.as_str(), "compilation cache miss");
        let artefact = compute()?;
        // Best-effort: an unwritable cache directory must not abort the run,
        // per spec.md §4.2. The in-memory cache still serves this process.
        if let Err(e) = self.write_disk(key, main_path, &artefact) {
            warn!(cache_key = key.as_str(), error = %e, "failed to persist compiled artefact to disk");
        }
        self.memory.put(key, artefact.clone());
        Ok(artefact)
    }

    fn read_disk(&self, key: &CacheKey) -> Result<Option<CompiledArtefact>> {
        let meta_path = self.meta_path(key);
        let artefact_path = self.artefact_path(key);
        if !meta_path.exists() || !artefact_path.exists() {
            return Ok(None);
        }

        let meta_bytes = fs::read(&meta_path)?;
        let meta: CacheEntryMeta = serde_json::from_slice(&meta_bytes)?;
        if meta.framework_version != self.framework_version {
            return Err(DraftSpecError::CacheIntegrity {
                key: key.as_str().to_string(),
                reason: "framework version mismatch".to_string(),
            });
        }

        let artefact_bytes = fs::read(&artefact_path)?;
        let artefact: CompiledArtefact = serde_json::from_slice(&artefact_bytes)?;
        Ok(Some(artefact))
    }

    fn write_disk(&self, key: &CacheKey, main_path: &Path, artefact: &CompiledArtefact) -> Result<()> {
        fs::create_dir_all(self.scripts_dir())?;

        let meta = CacheEntryMeta {
            key: key.as_str().to_string(),
            framework_version: self.framework_version.clone(),
            main_path: main_path.to_path_buf(),
            created_unix_secs: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        };

        atomic_write(&self.meta_path(key), &serde_json::to_vec_pretty(&meta)?)?;
        atomic_write(&self.artefact_path(key), &serde_json::to_vec(artefact)?)?;
        Ok(())
    }

    fn evict(&self, key: &CacheKey) {
        let _ = fs::remove_file(self.meta_path(key));
        let _ = fs::remove_file(self.artefact_path(key));
    }
}

/// Writes `contents` to `path` via a sibling `.tmp` file then `rename`, so a
/// reader never observes a partially written cache entry (spec.md §6).
fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("tmp")
    ));
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::ManifestNode;

    fn sample_artefact() -> CompiledArtefact {
        CompiledArtefact {
            nodes: vec![ManifestNode::Spec {
                name: "x".to_string(),
                focused: false,
                skipped: false,
                body_key: Some("k".to_string()),
                line: 1,
            }],
        }
    }

    #[test]
    fn cache_key_changes_when_a_file_hash_changes() {
        let main = PathBuf::from("main.dspec");
        let a = CacheKey::compute("1.0", &main, &[(main.clone(), "aaaa".to_string())], "src");
        let b = CacheKey::compute("1.0", &main, &[(main.clone(), "bbbb".to_string())], "src");
        assert_ne!(a.as_str(), b.as_str());
        assert_eq!(a.as_str().len(), 16);
    }

    #[test]
    fn get_or_compute_hits_memory_cache_without_recomputing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), "1.0");
        let key = CacheKey::compute("1.0", Path::new("main.dspec"), &[], "src");

        let mut calls = 0;
        let result = cache.get_or_compute(&key, Path::new("main.dspec"), || {
            calls += 1;
            Ok(sample_artefact())
        });
        assert!(result.is_ok());

        let result2 = cache.get_or_compute(&key, Path::new("main.dspec"), || {
            calls += 1;
            Ok(sample_artefact())
        });
        assert!(result2.is_ok());
        assert_eq!(calls, 1);
    }

    #[test]
    fn get_or_compute_succeeds_even_when_the_cache_directory_cannot_be_created() {
        let dir = tempfile::tempdir().unwrap();
        // A plain file where the cache expects a directory: `create_dir_all`
        // fails on every call, forcing every `write_disk` to error.
        let blocked = dir.path().join("blocked");
        fs::File::create(&blocked).unwrap();

        let cache = DiskCache::new(&blocked, "1.0");
        let key = CacheKey::compute("1.0", Path::new("main.dspec"), &[], "src");

        let result = cache.get_or_compute(&key, Path::new("main.dspec"), || Ok(sample_artefact()));
        assert!(result.is_ok(), "an unwritable cache dir must not fail the run");

        // Still served from the in-memory cache within this process.
        let mut calls = 0;
        cache
            .get_or_compute(&key, Path::new("main.dspec"), || {
                calls += 1;
                Ok(sample_artefact())
            })
            .unwrap();
        assert_eq!(calls, 0);
    }

    #[test]
    fn disk_entry_survives_a_fresh_cache_instance() {
        let dir = tempfile::tempdir().unwrap();
        let key = CacheKey::compute("1.0", Path::new("main.dspec"), &[], "src");

        {
            let cache = DiskCache::new(dir.path(), "1.0");
            cache
                .get_or_compute(&key, Path::new("main.dspec"), || Ok(sample_artefact()))
                .unwrap();
        }

        let cache2 = DiskCache::new(dir.path(), "1.0");
        let mut calls = 0;
        cache2
            .get_or_compute(&key, Path::new("main.dspec"), || {
                calls += 1;
                Ok(sample_artefact())
            })
            .unwrap();
        assert_eq!(calls, 0, "should have been served from disk, not recomputed");
    }
}
