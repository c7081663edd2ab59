//! Key/value persistence over structured cache specs.
//!
//! The in-memory map is authoritative; the optional on-disk mirror is
//! best-effort and never blocks or fails a read/write against memory.
//! A missing entry is soft ("not yet discovered"), not an error.

use arachne_core::{ArachneError, ArachneResult, CacheSpec};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct Cache {
    mem: HashMap<String, serde_json::Value>,
    disk: Option<PathBuf>,
}

impl Cache {
    /// Memory-only cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Disk-mirrored cache rooted at `<dir>/<network>/<deployment>`.
    ///
    /// Existing entries are loaded eagerly; unreadable files are skipped
    /// with a warning so one corrupt entry cannot poison the run.
    pub fn with_disk(dir: &Path, network: &str, deployment: &str) -> Self {
        let root = dir.join(network).join(deployment);
        let mut cache = Self {
            mem: HashMap::new(),
            disk: Some(root.clone()),
        };
        cache.load_disk(&root, &root);
        cache
    }

    fn load_disk(&mut self, root: &Path, dir: &Path) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return, // nothing persisted yet
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                self.load_disk(root, &path);
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let key = match path.strip_prefix(root) {
                Ok(rel) => rel.with_extension("").to_string_lossy().replace('\\', "/"),
                Err(_) => continue,
            };
            match std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|s| serde_json::from_str(&s).map_err(|e| e.to_string()))
            {
                Ok(value) => {
                    self.mem.insert(key, value);
                }
                Err(error) => {
                    tracing::warn!(path = %path.display(), error, "skipping unreadable cache entry");
                }
            }
        }
    }

    /// Read a cached value. Missing or undecodable entries read as `None`.
    pub fn read_cache<T: DeserializeOwned>(&self, spec: &CacheSpec) -> Option<T> {
        let value = self.mem.get(&spec.rel_path())?;
        match serde_json::from_value(value.clone()) {
            Ok(v) => Some(v),
            Err(error) => {
                tracing::warn!(spec = %spec.rel_path(), %error, "cache entry failed to decode");
                None
            }
        }
    }

    /// Store a value. The in-memory write is synchronous; the disk mirror
    /// is best-effort.
    pub fn store_cache<T: Serialize>(&mut self, spec: &CacheSpec, value: &T) -> ArachneResult<()> {
        let json = serde_json::to_value(value)
            .map_err(|e| ArachneError::Cache(format!("serialize {}: {e}", spec.rel_path())))?;
        self.mem.insert(spec.rel_path(), json.clone());

        if let Some(root) = &self.disk {
            let path = root.join(spec.rel_path()).with_extension("json");
            if let Err(error) = write_file(&path, &json) {
                tracing::warn!(path = %path.display(), %error, "disk cache write failed");
            }
        }
        Ok(())
    }

    /// Drop an entry from memory and disk.
    pub fn remove(&mut self, spec: &CacheSpec) {
        self.mem.remove(&spec.rel_path());
        if let Some(root) = &self.disk {
            let path = root.join(spec.rel_path()).with_extension("json");
            if path.exists() {
                if let Err(error) = std::fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), %error, "disk cache remove failed");
                }
            }
        }
    }

    /// Bulk-merge raw entries into memory (used when forking a manager
    /// from another deployment's state).
    pub fn load_memory(&mut self, entries: HashMap<String, serde_json::Value>) {
        self.mem.extend(entries);
    }

    /// Raw view of the in-memory store.
    pub fn entries(&self) -> &HashMap<String, serde_json::Value> {
        &self.mem
    }

    /// Deep copy of the in-memory store, detached from disk so fork
    /// mutations cannot leak into the original's mirror.
    pub fn fork(&self) -> Self {
        Self {
            mem: self.mem.clone(),
            disk: None,
        }
    }
}

fn write_file(path: &Path, value: &serde_json::Value) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(segments: &[&str]) -> CacheSpec {
        CacheSpec::new(segments.iter().copied())
    }

    #[test]
    fn miss_reads_as_none() {
        let cache = Cache::new();
        assert_eq!(cache.read_cache::<u64>(&spec(&["nope"])), None);
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut cache = Cache::new();
        cache.store_cache(&spec(&["a", "b"]), &vec![1u64, 2]).unwrap();
        assert_eq!(
            cache.read_cache::<Vec<u64>>(&spec(&["a", "b"])),
            Some(vec![1, 2])
        );
    }

    #[test]
    fn fork_is_isolated() {
        let mut original = Cache::new();
        original.store_cache(&spec(&["k"]), &1u64).unwrap();

        let mut forked = original.fork();
        forked.store_cache(&spec(&["k"]), &2u64).unwrap();
        forked.store_cache(&spec(&["only-fork"]), &3u64).unwrap();

        assert_eq!(original.read_cache::<u64>(&spec(&["k"])), Some(1));
        assert_eq!(original.read_cache::<u64>(&spec(&["only-fork"])), None);
        assert_eq!(forked.read_cache::<u64>(&spec(&["k"])), Some(2));
    }

    #[test]
    fn load_memory_merges() {
        let mut cache = Cache::new();
        cache.store_cache(&spec(&["keep"]), &"old").unwrap();

        let mut incoming = HashMap::new();
        incoming.insert("new".to_string(), serde_json::json!(42));
        cache.load_memory(incoming);

        assert_eq!(cache.read_cache::<String>(&spec(&["keep"])), Some("old".into()));
        assert_eq!(cache.read_cache::<u64>(&spec(&["new"])), Some(42));
    }

    #[test]
    fn disk_round_trip_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut cache = Cache::with_disk(dir.path(), "mainnet", "usdc");
            cache.store_cache(&spec(&["roots"]), &vec![("comet", "0x01")]).unwrap();
        }
        let reloaded = Cache::with_disk(dir.path(), "mainnet", "usdc");
        assert_eq!(
            reloaded.read_cache::<Vec<(String, String)>>(&spec(&["roots"])),
            Some(vec![("comet".into(), "0x01".into())])
        );

        // Distinct deployment namespaces do not see each other.
        let other = Cache::with_disk(dir.path(), "mainnet", "weth");
        assert_eq!(other.read_cache::<serde_json::Value>(&spec(&["roots"])), None);
    }

    #[test]
    fn remove_deletes_entry() {
        let mut cache = Cache::new();
        cache.store_cache(&spec(&["gone"]), &1u64).unwrap();
        cache.remove(&spec(&["gone"]));
        assert_eq!(cache.read_cache::<u64>(&spec(&["gone"])), None);
    }
}
