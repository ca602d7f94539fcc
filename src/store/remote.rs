//! Remote file share cache store
//!
//! Selected for identified runs on remote targets with a data store
//! attached. Entries live on the share in a directory named after the run
//! id; payloads stage through the run's temp location on the way in and
//! out, mirroring how cloud transfer clients move whole files.
//!
//! Construction order is fixed:
//! 1. validate the task timeout and credential bundle (`Configuration`)
//! 2. connect to the share with a reachability probe (`Connection`)
//! 3. write the store manifest through the share
//!
//! The share reuses the local entry layout: `<digest>.bin` payloads,
//! `<digest>.meta.json` sidecars, and `store_manifest.json`.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{
    meta_name, payload_name, validate_key, CacheError, CacheResult, CacheStats, CacheStore,
    EntryMeta, StoreKind, StoreManifest, META_SUFFIX, PAYLOAD_SUFFIX, STORE_MANIFEST_FILENAME,
};
use crate::context::DataStoreConfig;
use crate::share::{FileShare, ShareConnector, ShareError};
use crate::timeout::{copy_with_deadline, validate_task_timeout, TaskDeadline};

/// Cache store over a remote file share, scoped to one run.
pub struct RemoteFileCacheStore {
    /// Share client for the run's directory
    share: Box<dyn FileShare>,

    /// Share-side path of this store (the run id)
    share_path: String,

    /// Local staging directory (the run's temp location)
    staging_root: PathBuf,

    /// Bound applied to every operation
    task_timeout: Duration,
}

impl RemoteFileCacheStore {
    /// Connect to the run's share directory and construct the store.
    ///
    /// Credential validation comes before the connection attempt, so a
    /// malformed data store is always `Configuration` and an unreachable
    /// share is always `Connection`.
    pub fn connect(
        connector: &dyn ShareConnector,
        data_store: &DataStoreConfig,
        run_id: &str,
        temp_location: impl Into<PathBuf>,
        task_timeout: Duration,
    ) -> CacheResult<Self> {
        validate_task_timeout(task_timeout)?;
        data_store.validate()?;
        if run_id.trim().is_empty() {
            return Err(CacheError::configuration(
                "run id must not be empty for a remote store",
            ));
        }

        let staging_root: PathBuf = temp_location.into();
        fs::create_dir_all(&staging_root)
            .map_err(|e| CacheError::io("create_store", &staging_root, e))?;

        let endpoint = data_store.endpoint();
        let share = connector
            .connect(data_store, run_id)
            .map_err(|e| Self::connect_error(&endpoint, e))?;
        share
            .ensure_ready()
            .map_err(|e| Self::connect_error(&endpoint, e))?;

        let store = Self {
            share,
            share_path: run_id.to_string(),
            staging_root,
            task_timeout,
        };

        let manifest = StoreManifest::new(StoreKind::RemoteFile, Some(run_id), task_timeout);
        let json = serde_json::to_vec_pretty(&manifest)?;
        let deadline = TaskDeadline::start(task_timeout);
        store.stage_and_upload(
            STORE_MANIFEST_FILENAME,
            &json,
            &deadline,
            "create_store",
            STORE_MANIFEST_FILENAME,
        )?;
        Ok(store)
    }

    /// Share-side path of this store.
    pub fn share_path(&self) -> &str {
        &self.share_path
    }

    /// Local staging directory.
    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    /// Read back the manifest uploaded at construction.
    pub fn manifest(&self) -> CacheResult<StoreManifest> {
        let deadline = self.deadline();
        deadline.check("read_manifest")?;
        let bytes = self.download_and_read(
            STORE_MANIFEST_FILENAME,
            STORE_MANIFEST_FILENAME,
            &deadline,
            "read_manifest",
        )?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn deadline(&self) -> TaskDeadline {
        TaskDeadline::start(self.task_timeout)
    }

    fn staging_path(&self) -> PathBuf {
        self.staging_root
            .join(format!(".staging.{}.tmp", uuid::Uuid::new_v4()))
    }

    /// Any share fault during construction means the store is unreachable.
    fn connect_error(endpoint: &str, err: ShareError) -> CacheError {
        match err {
            ShareError::Unreachable { endpoint, message } => {
                CacheError::Connection { endpoint, message }
            }
            other => CacheError::connection(endpoint, other.to_string()),
        }
    }

    /// Share fault with no useful key context (list, manifest traffic).
    fn share_error(&self, operation: &str, err: ShareError) -> CacheError {
        match err {
            ShareError::Unreachable { endpoint, message } => {
                CacheError::Connection { endpoint, message }
            }
            ShareError::NotFound { name } => CacheError::not_found(name),
            ShareError::Io(e) => CacheError::io(operation, PathBuf::from(&self.share_path), e),
        }
    }

    /// Share fault during an operation on a known key.
    fn keyed_share_error(&self, operation: &str, key: &str, err: ShareError) -> CacheError {
        match err {
            ShareError::NotFound { .. } => CacheError::not_found(key),
            other => self.share_error(operation, other),
        }
    }

    /// Write bytes to a staging file, upload it, then drop the staging file.
    fn stage_and_upload(
        &self,
        name: &str,
        bytes: &[u8],
        deadline: &TaskDeadline,
        operation: &str,
        key: &str,
    ) -> CacheResult<()> {
        let staging = self.staging_path();
        let uploaded = (|| {
            let mut file =
                File::create(&staging).map_err(|e| CacheError::io(operation, &staging, e))?;
            let mut source = bytes;
            copy_with_deadline(&mut source, &mut file, deadline, operation, &staging)?;
            drop(file);
            self.share
                .upload(name, &staging)
                .map_err(|e| self.keyed_share_error(operation, key, e))?;
            // The upload itself is not preemptible; an overrun surfaces here.
            deadline.check(operation)
        })();
        let _ = fs::remove_file(&staging);
        uploaded
    }

    /// Download a share file into staging and read it back.
    fn download_and_read(
        &self,
        name: &str,
        key: &str,
        deadline: &TaskDeadline,
        operation: &str,
    ) -> CacheResult<Vec<u8>> {
        let staging = self.staging_path();
        let downloaded = (|| {
            self.share
                .download(name, &staging)
                .map_err(|e| self.keyed_share_error(operation, key, e))?;
            deadline.check(operation)?;
            let mut file =
                File::open(&staging).map_err(|e| CacheError::io(operation, &staging, e))?;
            let mut bytes = Vec::new();
            copy_with_deadline(&mut file, &mut bytes, deadline, operation, &staging)?;
            Ok(bytes)
        })();
        let _ = fs::remove_file(&staging);
        downloaded
    }

    /// Sidecars of all live entries (sidecar parsed and payload present).
    fn read_all_meta(
        &self,
        deadline: &TaskDeadline,
        operation: &str,
    ) -> CacheResult<Vec<EntryMeta>> {
        let names = self
            .share
            .list()
            .map_err(|e| self.share_error(operation, e))?;
        let mut metas = Vec::new();
        for name in &names {
            if !name.ends_with(META_SUFFIX) {
                continue;
            }
            deadline.check(operation)?;
            let staging = self.staging_path();
            let parsed: CacheResult<EntryMeta> = match self.share.download(name, &staging) {
                Ok(()) => {
                    let read = fs::read(&staging)
                        .map_err(|e| CacheError::io(operation, &staging, e))
                        .and_then(|bytes| Ok(serde_json::from_slice::<EntryMeta>(&bytes)?));
                    let _ = fs::remove_file(&staging);
                    read
                }
                // Entry went away between list and read.
                Err(ShareError::NotFound { .. }) => continue,
                Err(e) => return Err(self.share_error(operation, e)),
            };
            match parsed {
                Ok(meta) => {
                    if names.iter().any(|n| *n == payload_name(&meta.key)) {
                        metas.push(meta);
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        name = %name,
                        error = %err,
                        "skipping unreadable entry sidecar"
                    );
                }
            }
        }
        Ok(metas)
    }
}

impl CacheStore for RemoteFileCacheStore {
    fn kind(&self) -> StoreKind {
        StoreKind::RemoteFile
    }

    fn task_timeout(&self) -> Duration {
        self.task_timeout
    }

    fn local_root(&self) -> Option<&Path> {
        Some(&self.staging_root)
    }

    fn remote_path(&self) -> Option<&str> {
        Some(&self.share_path)
    }

    fn put(&self, key: &str, value: &[u8]) -> CacheResult<()> {
        validate_key(key)?;
        let deadline = self.deadline();
        deadline.check("put")?;

        // Payload first, sidecar second, matching the local layout.
        self.stage_and_upload(&payload_name(key), value, &deadline, "put", key)?;
        let meta_json = serde_json::to_vec_pretty(&EntryMeta::new(key, value.len() as u64))?;
        self.stage_and_upload(&meta_name(key), &meta_json, &deadline, "put", key)?;
        tracing::debug!(key = %key, bytes = value.len(), share_path = %self.share_path, "uploaded cache entry");
        Ok(())
    }

    fn get(&self, key: &str) -> CacheResult<Vec<u8>> {
        validate_key(key)?;
        let deadline = self.deadline();
        deadline.check("get")?;
        let bytes = self.download_and_read(&payload_name(key), key, &deadline, "get")?;
        tracing::debug!(key = %key, bytes = bytes.len(), share_path = %self.share_path, "downloaded cache entry");
        Ok(bytes)
    }

    fn exists(&self, key: &str) -> CacheResult<bool> {
        validate_key(key)?;
        let deadline = self.deadline();
        deadline.check("exists")?;
        let present = self
            .share
            .exists(&payload_name(key))
            .map_err(|e| self.keyed_share_error("exists", key, e))?;
        deadline.check("exists")?;
        Ok(present)
    }

    fn remove(&self, key: &str) -> CacheResult<bool> {
        validate_key(key)?;
        let deadline = self.deadline();
        deadline.check("remove")?;
        self.share
            .delete(&meta_name(key))
            .map_err(|e| self.keyed_share_error("remove", key, e))?;
        let removed = self
            .share
            .delete(&payload_name(key))
            .map_err(|e| self.keyed_share_error("remove", key, e))?;
        deadline.check("remove")?;
        Ok(removed)
    }

    fn keys(&self) -> CacheResult<Vec<String>> {
        let deadline = self.deadline();
        deadline.check("keys")?;
        let mut keys: Vec<String> = self
            .read_all_meta(&deadline, "keys")?
            .into_iter()
            .map(|meta| meta.key)
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn clear(&self) -> CacheResult<()> {
        let deadline = self.deadline();
        deadline.check("clear")?;
        let names = self.share.list().map_err(|e| self.share_error("clear", e))?;
        for name in names {
            deadline.check("clear")?;
            if name.ends_with(PAYLOAD_SUFFIX) || name.ends_with(META_SUFFIX) {
                self.share
                    .delete(&name)
                    .map_err(|e| self.share_error("clear", e))?;
            }
        }
        Ok(())
    }

    fn stats(&self) -> CacheResult<CacheStats> {
        let deadline = self.deadline();
        deadline.check("stats")?;
        let metas = self.read_all_meta(&deadline, "stats")?;
        Ok(CacheStats {
            entries: metas.len(),
            total_bytes: metas.iter().map(|meta| meta.size).sum(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FailureConfig, MockConnector, ShareOp};
    use tempfile::TempDir;

    fn sample_data_store() -> DataStoreConfig {
        DataStoreConfig::new("runstore").with_account_key("k3y")
    }

    fn make_store(tmp: &TempDir, connector: &MockConnector) -> RemoteFileCacheStore {
        RemoteFileCacheStore::connect(
            connector,
            &sample_data_store(),
            "run-1",
            tmp.path(),
            Duration::from_secs(60),
        )
        .unwrap()
    }

    #[test]
    fn test_connect_uploads_manifest_to_run_path() {
        let tmp = TempDir::new().unwrap();
        let connector = MockConnector::new();
        let store = make_store(&tmp, &connector);

        assert_eq!(connector.last_share_path().as_deref(), Some("run-1"));
        assert_eq!(store.share_path(), "run-1");
        assert_eq!(store.remote_path(), Some("run-1"));
        assert!(connector
            .share()
            .files()
            .contains_key(STORE_MANIFEST_FILENAME));

        let manifest = store.manifest().unwrap();
        assert_eq!(manifest.kind, StoreKind::RemoteFile);
        assert_eq!(manifest.run_id.as_deref(), Some("run-1"));
        assert_eq!(manifest.task_timeout_seconds, 60);
    }

    #[test]
    fn test_connect_validates_credentials_before_connecting() {
        let tmp = TempDir::new().unwrap();
        let connector = MockConnector::new();
        let missing_creds = DataStoreConfig::new("runstore");
        let result = RemoteFileCacheStore::connect(
            &connector,
            &missing_creds,
            "run-1",
            tmp.path(),
            Duration::from_secs(60),
        );
        assert!(matches!(result, Err(CacheError::Configuration { .. })));
        // The connector was never consulted.
        assert!(connector.last_share_path().is_none());
    }

    #[test]
    fn test_connect_rejects_empty_run_id() {
        let tmp = TempDir::new().unwrap();
        let connector = MockConnector::new();
        let result = RemoteFileCacheStore::connect(
            &connector,
            &sample_data_store(),
            "  ",
            tmp.path(),
            Duration::from_secs(60),
        );
        assert!(matches!(result, Err(CacheError::Configuration { .. })));
    }

    #[test]
    fn test_unreachable_share_is_connection_error() {
        let tmp = TempDir::new().unwrap();
        let connector = MockConnector::new();
        connector
            .share()
            .inject(ShareOp::Connect, FailureConfig::unreachable("offline"));
        let result = RemoteFileCacheStore::connect(
            &connector,
            &sample_data_store(),
            "run-1",
            tmp.path(),
            Duration::from_secs(60),
        );
        match result {
            Err(err) => {
                assert!(matches!(err, CacheError::Connection { .. }));
                assert_eq!(err.subkind(), "connection");
            }
            Ok(_) => panic!("expected connection error"),
        }
    }

    #[test]
    fn test_put_get_round_trip_through_share() {
        let tmp = TempDir::new().unwrap();
        let connector = MockConnector::new();
        let store = make_store(&tmp, &connector);

        store.put("featurized", b"columns").unwrap();
        let files = connector.share().files();
        assert!(files.contains_key(&payload_name("featurized")));
        assert!(files.contains_key(&meta_name("featurized")));
        assert_eq!(store.get("featurized").unwrap(), b"columns");
    }

    #[test]
    fn test_put_is_last_write_wins() {
        let tmp = TempDir::new().unwrap();
        let connector = MockConnector::new();
        let store = make_store(&tmp, &connector);
        store.put("k", b"first").unwrap();
        store.put("k", b"second").unwrap();
        assert_eq!(store.get("k").unwrap(), b"second");
    }

    #[test]
    fn test_get_missing_reports_original_key() {
        let tmp = TempDir::new().unwrap();
        let connector = MockConnector::new();
        let store = make_store(&tmp, &connector);
        let err = store.get("absent").unwrap_err();
        match err {
            CacheError::NotFound { key } => assert_eq!(key, "absent"),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_remove_deletes_payload_and_sidecar() {
        let tmp = TempDir::new().unwrap();
        let connector = MockConnector::new();
        let store = make_store(&tmp, &connector);
        store.put("k", b"v").unwrap();
        assert!(store.remove("k").unwrap());
        assert!(!store.remove("k").unwrap());
        let files = connector.share().files();
        assert!(!files.contains_key(&payload_name("k")));
        assert!(!files.contains_key(&meta_name("k")));
    }

    #[test]
    fn test_keys_lists_original_keys_sorted() {
        let tmp = TempDir::new().unwrap();
        let connector = MockConnector::new();
        let store = make_store(&tmp, &connector);
        store.put("transformers", b"1").unwrap();
        store.put("training_type", b"2").unwrap();
        assert_eq!(store.keys().unwrap(), vec!["training_type", "transformers"]);
    }

    #[test]
    fn test_keys_skips_corrupt_sidecars() {
        let tmp = TempDir::new().unwrap();
        let connector = MockConnector::new();
        let store = make_store(&tmp, &connector);
        store.put("good", b"1").unwrap();
        connector
            .share()
            .seed(&format!("deadbeef{}", META_SUFFIX), b"{not json");
        assert_eq!(store.keys().unwrap(), vec!["good"]);
    }

    #[test]
    fn test_clear_keeps_manifest() {
        let tmp = TempDir::new().unwrap();
        let connector = MockConnector::new();
        let store = make_store(&tmp, &connector);
        store.put("a", b"1").unwrap();
        store.put("b", b"2").unwrap();
        store.clear().unwrap();

        assert!(store.keys().unwrap().is_empty());
        let files = connector.share().files();
        assert_eq!(files.len(), 1);
        assert!(files.contains_key(STORE_MANIFEST_FILENAME));
    }

    #[test]
    fn test_stats_sums_sidecar_sizes() {
        let tmp = TempDir::new().unwrap();
        let connector = MockConnector::new();
        let store = make_store(&tmp, &connector);
        store.put("a", b"12345").unwrap();
        store.put("b", b"123").unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.total_bytes, 8);
    }

    #[test]
    fn test_slow_share_surfaces_timeout() {
        let tmp = TempDir::new().unwrap();
        let connector = MockConnector::new();
        let store = RemoteFileCacheStore::connect(
            &connector,
            &sample_data_store(),
            "run-1",
            tmp.path(),
            Duration::from_millis(50),
        )
        .unwrap();
        store.put("k", b"v").unwrap();

        connector.share().inject(
            ShareOp::Download,
            FailureConfig::delay(Duration::from_millis(120)),
        );
        let err = store.get("k").unwrap_err();
        assert!(matches!(err, CacheError::Timeout { .. }));
        assert_eq!(err.subkind(), "timeout");
    }

    #[test]
    fn test_staging_files_are_cleaned_up() {
        let tmp = TempDir::new().unwrap();
        let connector = MockConnector::new();
        let store = make_store(&tmp, &connector);
        store.put("k", b"v").unwrap();
        store.get("k").unwrap();

        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert!(leftovers.is_empty(), "staging leftovers: {:?}", leftovers);
    }

    #[test]
    fn test_local_root_is_staging_directory() {
        let tmp = TempDir::new().unwrap();
        let connector = MockConnector::new();
        let store = make_store(&tmp, &connector);
        assert_eq!(store.local_root(), Some(tmp.path()));
        assert_eq!(store.task_timeout(), Duration::from_secs(60));
    }
}
