// # File Seen Store
//
// File-based implementation of SeenStore with crash recovery.
//
// ## Purpose
//
// Keeps every agent's seen buffer across daemon restarts. A lost buffer
// means every still-listed favorite is emitted again, so writes are
// durable before `save` returns.
//
// ## Crash Recovery
//
// - Atomic writes: write to `.tmp`, fsync, then rename over the state file
// - Backup: the previous good file is copied to `.backup` before each rename
// - Recovery: a state file that fails to parse is replaced by its backup
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "agents": {
//     "tectonic-favorites": {
//       "last_seen": ["473263745245519872", "473263745245519873"],
//       "updated_at": "2025-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::config::SeenStoreConfig;
use crate::traits::seen_store::{SeenRecord, SeenStore, SeenStoreFactory};

/// State file format version
const STATE_FILE_VERSION: &str = "1.0";

/// File-based seen store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use favwatch_core::state::FileSeenStore;
/// use favwatch_core::traits::{SeenRecord, SeenStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileSeenStore::new("/var/lib/favwatch/seen.json").await?;
///
///     // Written to disk before returning
///     store.save("agent-1", &SeenRecord::new(vec!["42".into()])).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileSeenStore {
    path: PathBuf,
    state: Arc<RwLock<FileState>>,
    read_only: bool,
}

#[derive(Debug)]
struct FileState {
    /// Mirrors the file on disk; only updated after a successful write
    agents: HashMap<String, SeenRecord>,
}

/// Serializable state file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    agents: HashMap<String, SeenRecord>,
}

/// Why a state file could not be loaded
enum LoadFailure {
    /// The file exists but could not be read
    Unreadable(Error),
    /// The file was read but is not a valid state file
    Corrupt(Error),
}

impl FileSeenStore {
    /// Create or load a file seen store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Load the existing state file, if any
    /// 3. Fall back to the backup if the state file is corrupt, restoring it
    ///    over the state file
    /// 4. Start empty if both are unusable
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create state directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let agents = Self::load_with_recovery(&path, true).await?;
        Ok(Self::with_agents(path, agents, false))
    }

    /// Load a file seen store without ever touching the disk
    ///
    /// Recovery from the backup happens in memory only. `save` and `delete`
    /// fail. Used for dry runs.
    pub async fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let agents = Self::load_with_recovery(&path, false).await?;
        Ok(Self::with_agents(path, agents, true))
    }

    fn with_agents(path: PathBuf, agents: HashMap<String, SeenRecord>, read_only: bool) -> Self {
        Self {
            path,
            state: Arc::new(RwLock::new(FileState { agents })),
            read_only,
        }
    }

    /// Path of the main state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_with_recovery(path: &Path, restore: bool) -> Result<HashMap<String, SeenRecord>, Error> {
        match Self::load_state(path).await {
            Ok(agents) => {
                tracing::debug!("Loaded seen state for {} agent(s)", agents.len());
                Ok(agents)
            }
            Err(LoadFailure::Unreadable(e)) => Err(e),
            Err(LoadFailure::Corrupt(e)) => {
                tracing::warn!("State file appears corrupted: {}. Attempting recovery from backup.", e);

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty state.");
                    return Ok(HashMap::new());
                }

                match Self::load_state(&backup_path).await {
                    Ok(agents) => {
                        tracing::info!("Recovered seen state from backup: {} agent(s)", agents.len());
                        if restore && let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!("Failed to restore state file from backup: {}", restore_err);
                        }
                        Ok(agents)
                    }
                    Err(LoadFailure::Unreadable(e)) | Err(LoadFailure::Corrupt(e)) => {
                        tracing::error!("Backup also unusable: {}. Starting with empty state.", e);
                        Ok(HashMap::new())
                    }
                }
            }
        }
    }

    async fn load_state(path: &Path) -> Result<HashMap<String, SeenRecord>, LoadFailure> {
        if !path.exists() {
            tracing::debug!("State file does not exist: {}", path.display());
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            LoadFailure::Unreadable(Error::seen_store(format!(
                "Failed to read state file {}: {}",
                path.display(),
                e
            )))
        })?;

        let state_file: StateFileFormat = serde_json::from_str(&content).map_err(|e| {
            LoadFailure::Corrupt(Error::seen_store(format!(
                "Failed to parse state file {}: {}",
                path.display(),
                e
            )))
        })?;

        if state_file.version != STATE_FILE_VERSION {
            tracing::warn!(
                "State file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STATE_FILE_VERSION,
                state_file.version
            );
        }

        Ok(state_file.agents)
    }

    /// Replace the in-memory state with `agents`, writing the file first
    ///
    /// The caller's write guard serializes writers. On error the in-memory
    /// state is left as it was.
    async fn commit(&self, state: &mut FileState, agents: HashMap<String, SeenRecord>) -> Result<(), Error> {
        if self.read_only {
            return Err(Error::seen_store(format!(
                "State file {} was opened read-only",
                self.path.display()
            )));
        }

        self.write_state(&agents).await?;
        state.agents = agents;
        Ok(())
    }

    /// Write state to file atomically
    async fn write_state(&self, agents: &HashMap<String, SeenRecord>) -> Result<(), Error> {
        let state_file = StateFileFormat {
            version: STATE_FILE_VERSION.to_string(),
            agents: agents.clone(),
        };
        let json = serde_json::to_string_pretty(&state_file)
            .map_err(|e| Error::seen_store(format!("Failed to serialize state: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::seen_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::seen_store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                Error::seen_store(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::seen_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Seen state written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl SeenStore for FileSeenStore {
    async fn load(&self, agent_id: &str) -> Result<Option<SeenRecord>, Error> {
        let state_guard = self.state.read().await;
        Ok(state_guard.agents.get(agent_id).cloned())
    }

    async fn save(&self, agent_id: &str, record: &SeenRecord) -> Result<(), Error> {
        let mut state_guard = self.state.write().await;
        let mut agents = state_guard.agents.clone();
        agents.insert(agent_id.to_string(), record.clone());

        // Immediate write for durability
        self.commit(&mut state_guard, agents).await
    }

    async fn delete(&self, agent_id: &str) -> Result<(), Error> {
        let mut state_guard = self.state.write().await;
        if !state_guard.agents.contains_key(agent_id) {
            return Ok(());
        }
        let mut agents = state_guard.agents.clone();
        agents.remove(agent_id);

        self.commit(&mut state_guard, agents).await
    }

    async fn list_agents(&self) -> Result<Vec<String>, Error> {
        let state_guard = self.state.read().await;
        Ok(state_guard.agents.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Every save is written through before it returns
        Ok(())
    }
}

/// Factory for file-backed seen stores
pub struct FileSeenStoreFactory;

#[async_trait]
impl SeenStoreFactory for FileSeenStoreFactory {
    async fn create(&self, config: &SeenStoreConfig) -> Result<Box<dyn SeenStore>, Error> {
        match config {
            SeenStoreConfig::File { path } => {
                if path.is_empty() {
                    return Err(Error::config("File seen store path cannot be empty"));
                }
                Ok(Box::new(FileSeenStore::new(path).await?))
            }
            _ => Err(Error::config("Invalid config for file seen store")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seen::ItemId;
    use tempfile::tempdir;

    fn record(ids: &[u64]) -> SeenRecord {
        SeenRecord::new(ids.iter().copied().map(ItemId::from).collect())
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seen.json");

        let store = FileSeenStore::new(&path).await.unwrap();
        assert!(store.list_agents().await.unwrap().is_empty());

        store.save("agent", &record(&[1, 2, 3])).await.unwrap();
        assert!(path.exists());

        let reopened = FileSeenStore::new(&path).await.unwrap();
        let loaded = reopened.load("agent").await.unwrap().unwrap();
        assert_eq!(loaded.last_seen, record(&[1, 2, 3]).last_seen);
    }

    #[tokio::test]
    async fn test_file_store_corruption_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seen.json");

        let store = FileSeenStore::new(&path).await.unwrap();
        store.save("agent", &record(&[1])).await.unwrap();
        // Second write leaves the first one in the backup
        store.save("agent", &record(&[1, 2])).await.unwrap();

        let backup_path = FileSeenStore::backup_path(&path);
        assert!(backup_path.exists(), "Backup file should exist after write");

        fs::write(&path, b"{ not json").await.unwrap();

        let recovered = FileSeenStore::new(&path).await.unwrap();
        let loaded = recovered.load("agent").await.unwrap().unwrap();
        assert_eq!(loaded.last_seen, record(&[1]).last_seen);
    }

    #[tokio::test]
    async fn test_corrupt_file_without_backup_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seen.json");
        fs::write(&path, b"garbage").await.unwrap();

        let store = FileSeenStore::new(&path).await.unwrap();
        assert!(store.list_agents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reads_numeric_ids_from_older_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seen.json");
        let legacy = r#"{
            "version": "1.0",
            "agents": {
                "agent": { "last_seen": [10, 11], "updated_at": "2014-06-02T00:38:12Z" }
            }
        }"#;
        fs::write(&path, legacy).await.unwrap();

        let store = FileSeenStore::new(&path).await.unwrap();
        let loaded = store.load("agent").await.unwrap().unwrap();
        assert_eq!(loaded.last_seen, vec![ItemId::from("10"), ItemId::from("11")]);
    }

    #[tokio::test]
    async fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("seen.json");

        let store = FileSeenStore::new(&path).await.unwrap();
        store.save("agent", &record(&[5])).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_previous_record_loaded() {
        let dir = tempdir().unwrap();
        let state_dir = dir.path().join("state");
        let path = state_dir.join("seen.json");

        let store = FileSeenStore::new(&path).await.unwrap();
        store.save("agent", &record(&[1])).await.unwrap();

        // Nowhere left to write the temp file
        fs::remove_dir_all(&state_dir).await.unwrap();

        assert!(store.save("agent", &record(&[1, 2])).await.is_err());
        let loaded = store.load("agent").await.unwrap().unwrap();
        assert_eq!(loaded.last_seen, record(&[1]).last_seen);

        assert!(store.delete("agent").await.is_err());
        assert!(store.load("agent").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_read_only_open_recovers_without_writing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seen.json");

        let store = FileSeenStore::new(&path).await.unwrap();
        store.save("agent", &record(&[1])).await.unwrap();
        store.save("agent", &record(&[1, 2])).await.unwrap();
        fs::write(&path, b"{ not json").await.unwrap();

        let read_only = FileSeenStore::open_read_only(&path).await.unwrap();
        let loaded = read_only.load("agent").await.unwrap().unwrap();
        assert_eq!(loaded.last_seen, record(&[1]).last_seen);

        // Corrupt file left as it was
        assert_eq!(fs::read(&path).await.unwrap(), b"{ not json".to_vec());

        assert!(read_only.save("agent", &record(&[9])).await.is_err());
        assert_eq!(fs::read(&path).await.unwrap(), b"{ not json".to_vec());
    }

    #[tokio::test]
    async fn test_read_only_open_does_not_create_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("seen.json");

        let store = FileSeenStore::open_read_only(&path).await.unwrap();
        assert!(store.list_agents().await.unwrap().is_empty());
        assert!(!dir.path().join("missing").exists());
    }

    #[tokio::test]
    async fn test_created_at_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seen.json");
        let created = chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);

        let store = FileSeenStore::new(&path).await.unwrap();
        store.save("agent", &record(&[1]).with_created_at(created)).await.unwrap();

        let reopened = FileSeenStore::new(&path).await.unwrap();
        let loaded = reopened.load("agent").await.unwrap().unwrap();
        assert_eq!(loaded.created_at, Some(created));
    }

    #[tokio::test]
    async fn test_delete_missing_agent_does_not_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seen.json");

        let store = FileSeenStore::new(&path).await.unwrap();
        store.delete("nobody").await.unwrap();
        assert!(!path.exists());
    }
}
