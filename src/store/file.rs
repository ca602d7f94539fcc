//! Local filesystem cache store
//!
//! Selected for identified runs that stay on the local target or have no
//! remote data store attached. Rooted at the run's temp location:
//!
//! - `<root>/store_manifest.json` written at construction
//! - `<root>/<digest>.bin` entry payloads
//! - `<root>/<digest>.meta.json` entry metadata sidecars
//!
//! Payloads land under a hidden UUID temp name and are renamed into place,
//! so readers never observe a partial write. The platform may clean temp
//! space underneath a run; a vanished entry reads as `NotFound`.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use walkdir::WalkDir;

use super::{
    meta_name, payload_name, validate_key, CacheError, CacheResult, CacheStats, CacheStore,
    EntryMeta, StoreKind, StoreManifest, META_SUFFIX, PAYLOAD_SUFFIX, STORE_MANIFEST_FILENAME,
};
use crate::timeout::{copy_with_deadline, validate_task_timeout, TaskDeadline};

/// Filesystem store rooted at the run's temp location.
pub struct FileCacheStore {
    /// Store root (the run's temp location)
    root: PathBuf,

    /// Bound applied to every operation
    task_timeout: Duration,
}

impl FileCacheStore {
    /// Create a store rooted at the run's temp location.
    ///
    /// Creates the root directory when missing and writes the store
    /// manifest. The run id only annotates the manifest.
    pub fn create(
        temp_location: impl Into<PathBuf>,
        run_id: Option<&str>,
        task_timeout: Duration,
    ) -> CacheResult<Self> {
        validate_task_timeout(task_timeout)?;
        let root: PathBuf = temp_location.into();
        fs::create_dir_all(&root).map_err(|e| CacheError::io("create_store", &root, e))?;

        let store = Self { root, task_timeout };
        let manifest = StoreManifest::new(StoreKind::LocalFile, run_id, task_timeout);
        let json = serde_json::to_vec_pretty(&manifest)?;
        store.write_atomic(
            &store.root.join(STORE_MANIFEST_FILENAME),
            &json,
            &TaskDeadline::start(task_timeout),
            "create_store",
        )?;
        Ok(store)
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read back the manifest written at construction.
    pub fn manifest(&self) -> CacheResult<StoreManifest> {
        let path = self.root.join(STORE_MANIFEST_FILENAME);
        let bytes = fs::read(&path).map_err(|e| CacheError::io("read_manifest", &path, e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Metadata sidecar for a key.
    pub fn entry_meta(&self, key: &str) -> CacheResult<EntryMeta> {
        validate_key(key)?;
        let path = self.root.join(meta_name(key));
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CacheError::not_found(key))
            }
            Err(e) => return Err(CacheError::io("read_meta", &path, e)),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn deadline(&self) -> TaskDeadline {
        TaskDeadline::start(self.task_timeout)
    }

    fn paths_for(&self, key: &str) -> (PathBuf, PathBuf) {
        (
            self.root.join(payload_name(key)),
            self.root.join(meta_name(key)),
        )
    }

    /// Write bytes under a hidden temp name, then rename into place.
    fn write_atomic(
        &self,
        target: &Path,
        bytes: &[u8],
        deadline: &TaskDeadline,
        operation: &str,
    ) -> CacheResult<()> {
        let tmp = self.root.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        let written = (|| {
            let mut file =
                File::create(&tmp).map_err(|e| CacheError::io(operation, &tmp, e))?;
            let mut source = bytes;
            copy_with_deadline(&mut source, &mut file, deadline, operation, &tmp)?;
            fs::rename(&tmp, target).map_err(|e| CacheError::io(operation, target, e))
        })();
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        written
    }

    fn remove_if_present(path: &Path, operation: &str) -> CacheResult<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(operation, path, e)),
        }
    }
}

impl CacheStore for FileCacheStore {
    fn kind(&self) -> StoreKind {
        StoreKind::LocalFile
    }

    fn task_timeout(&self) -> Duration {
        self.task_timeout
    }

    fn local_root(&self) -> Option<&Path> {
        Some(&self.root)
    }

    fn put(&self, key: &str, value: &[u8]) -> CacheResult<()> {
        validate_key(key)?;
        let deadline = self.deadline();
        deadline.check("put")?;

        // Payload first, sidecar second: an entry without a sidecar is
        // readable but unlisted, never the other way around.
        let (payload, meta) = self.paths_for(key);
        self.write_atomic(&payload, value, &deadline, "put")?;
        let meta_json = serde_json::to_vec_pretty(&EntryMeta::new(key, value.len() as u64))?;
        self.write_atomic(&meta, &meta_json, &deadline, "put")?;
        Ok(())
    }

    fn get(&self, key: &str) -> CacheResult<Vec<u8>> {
        validate_key(key)?;
        let deadline = self.deadline();
        deadline.check("get")?;

        let (payload, _) = self.paths_for(key);
        let mut file = match File::open(&payload) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CacheError::not_found(key))
            }
            Err(e) => return Err(CacheError::io("get", &payload, e)),
        };
        let mut bytes = Vec::new();
        copy_with_deadline(&mut file, &mut bytes, &deadline, "get", &payload)?;
        Ok(bytes)
    }

    fn exists(&self, key: &str) -> CacheResult<bool> {
        validate_key(key)?;
        self.deadline().check("exists")?;
        let (payload, _) = self.paths_for(key);
        Ok(payload.is_file())
    }

    fn remove(&self, key: &str) -> CacheResult<bool> {
        validate_key(key)?;
        self.deadline().check("remove")?;
        let (payload, meta) = self.paths_for(key);
        Self::remove_if_present(&meta, "remove")?;
        Self::remove_if_present(&payload, "remove")
    }

    fn keys(&self) -> CacheResult<Vec<String>> {
        let deadline = self.deadline();
        deadline.check("keys")?;

        let mut keys = Vec::new();
        let entries =
            fs::read_dir(&self.root).map_err(|e| CacheError::io("keys", &self.root, e))?;
        for entry in entries {
            deadline.check("keys")?;
            let entry = entry.map_err(|e| CacheError::io("keys", &self.root, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.ends_with(META_SUFFIX) {
                continue;
            }
            let parsed: CacheResult<EntryMeta> = fs::read(entry.path())
                .map_err(|e| CacheError::io("keys", entry.path(), e))
                .and_then(|bytes| Ok(serde_json::from_slice::<EntryMeta>(&bytes)?));
            match parsed {
                Ok(meta) => {
                    if self.root.join(payload_name(&meta.key)).is_file() {
                        keys.push(meta.key);
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        path = %entry.path().display(),
                        error = %err,
                        "skipping unreadable entry sidecar"
                    );
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn clear(&self) -> CacheResult<()> {
        let deadline = self.deadline();
        deadline.check("clear")?;

        let entries =
            fs::read_dir(&self.root).map_err(|e| CacheError::io("clear", &self.root, e))?;
        for entry in entries {
            deadline.check("clear")?;
            let entry = entry.map_err(|e| CacheError::io("clear", &self.root, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            let is_entry_file = name.ends_with(PAYLOAD_SUFFIX) || name.ends_with(META_SUFFIX);
            let is_stale_tmp = name.starts_with('.') && name.ends_with(".tmp");
            if is_entry_file || is_stale_tmp {
                Self::remove_if_present(&entry.path(), "clear")?;
            }
        }
        Ok(())
    }

    fn stats(&self) -> CacheResult<CacheStats> {
        let deadline = self.deadline();
        deadline.check("stats")?;

        let mut stats = CacheStats::default();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            deadline.check("stats")?;
            let entry = entry.map_err(|e| {
                CacheError::io(
                    "stats",
                    &self.root,
                    io::Error::new(io::ErrorKind::Other, e.to_string()),
                )
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if !entry.file_name().to_string_lossy().ends_with(PAYLOAD_SUFFIX) {
                continue;
            }
            let metadata = entry
                .metadata()
                .map_err(|e| {
                    CacheError::io(
                        "stats",
                        entry.path(),
                        io::Error::new(io::ErrorKind::Other, e.to_string()),
                    )
                })?;
            stats.entries += 1;
            stats.total_bytes += metadata.len();
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeout::COPY_CHUNK_BYTES;
    use tempfile::TempDir;

    fn make_store(tmp: &TempDir) -> FileCacheStore {
        FileCacheStore::create(tmp.path(), Some("run-1"), Duration::from_secs(60)).unwrap()
    }

    #[test]
    fn test_create_writes_manifest() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(&tmp);
        let manifest = store.manifest().unwrap();
        assert_eq!(manifest.kind, StoreKind::LocalFile);
        assert_eq!(manifest.run_id.as_deref(), Some("run-1"));
        assert_eq!(manifest.task_timeout_seconds, 60);
        assert!(tmp.path().join(STORE_MANIFEST_FILENAME).is_file());
    }

    #[test]
    fn test_create_makes_missing_directories() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("deep").join("run");
        let store = FileCacheStore::create(&nested, None, Duration::from_secs(60)).unwrap();
        assert_eq!(store.root(), nested.as_path());
        assert!(nested.is_dir());
    }

    #[test]
    fn test_root_is_temp_location() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(&tmp);
        assert_eq!(store.local_root(), Some(tmp.path()));
    }

    #[test]
    fn test_put_get_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(&tmp);
        store.put("featurized", b"columns").unwrap();
        assert_eq!(store.get("featurized").unwrap(), b"columns");
        assert!(store.exists("featurized").unwrap());
    }

    #[test]
    fn test_put_is_last_write_wins() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(&tmp);
        store.put("k", b"first").unwrap();
        store.put("k", b"replacement").unwrap();
        assert_eq!(store.get("k").unwrap(), b"replacement");
        assert_eq!(store.entry_meta("k").unwrap().size, 11);
    }

    #[test]
    fn test_large_payload_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(&tmp);
        let payload = vec![42u8; COPY_CHUNK_BYTES * 3 + 5];
        store.put("big", &payload).unwrap();
        assert_eq!(store.get("big").unwrap(), payload);
    }

    #[test]
    fn test_key_with_path_separators_stays_in_root() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(&tmp);
        store.put("nested/looking/key", b"v").unwrap();
        assert_eq!(store.get("nested/looking/key").unwrap(), b"v");
        // Digest addressing keeps everything directly under the root.
        assert!(!tmp.path().join("nested").exists());
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(&tmp);
        let err = store.get("absent").unwrap_err();
        assert!(matches!(err, CacheError::NotFound { .. }));
    }

    #[test]
    fn test_entry_vanishing_externally_reads_as_not_found() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(&tmp);
        store.put("k", b"v").unwrap();
        fs::remove_file(tmp.path().join(payload_name("k"))).unwrap();
        let err = store.get("k").unwrap_err();
        assert!(matches!(err, CacheError::NotFound { .. }));
    }

    #[test]
    fn test_remove_deletes_payload_and_sidecar() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(&tmp);
        store.put("k", b"v").unwrap();
        assert!(store.remove("k").unwrap());
        assert!(!store.remove("k").unwrap());
        assert!(!tmp.path().join(payload_name("k")).exists());
        assert!(!tmp.path().join(meta_name("k")).exists());
    }

    #[test]
    fn test_keys_lists_original_keys_sorted() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(&tmp);
        store.put("transformers", b"1").unwrap();
        store.put("training_type", b"2").unwrap();
        store.put("a key with spaces", b"3").unwrap();
        assert_eq!(
            store.keys().unwrap(),
            vec!["a key with spaces", "training_type", "transformers"]
        );
    }

    #[test]
    fn test_keys_skips_corrupt_sidecars() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(&tmp);
        store.put("good", b"1").unwrap();
        fs::write(tmp.path().join(format!("deadbeef{}", META_SUFFIX)), b"{not json").unwrap();
        assert_eq!(store.keys().unwrap(), vec!["good"]);
    }

    #[test]
    fn test_clear_keeps_root_and_manifest() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(&tmp);
        store.put("a", b"1").unwrap();
        store.put("b", b"2").unwrap();
        store.clear().unwrap();
        assert!(store.keys().unwrap().is_empty());
        assert!(tmp.path().is_dir());
        assert!(store.manifest().is_ok());
    }

    #[test]
    fn test_stats_counts_entries_and_bytes() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(&tmp);
        store.put("a", b"12345").unwrap();
        store.put("b", b"123").unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.total_bytes, 8);
    }

    #[test]
    fn test_zero_timeout_is_rejected_at_construction() {
        let tmp = TempDir::new().unwrap();
        let result = FileCacheStore::create(tmp.path(), None, Duration::ZERO);
        assert!(matches!(result, Err(CacheError::Configuration { .. })));
    }
}
