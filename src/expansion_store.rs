use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::StoreError;

/// Persisted per-thread expansion flags, keyed by (account, thread id).
///
/// Implementations must be safe to call from any task. A thread never
/// recorded is collapsed.
pub trait ExpansionStore: Send + Sync {
    fn get(&self, account: &str, thread_id: &str) -> Result<bool, StoreError>;
    fn set(&self, account: &str, thread_id: &str, expanded: bool) -> Result<(), StoreError>;
}

/// Process-lifetime store.
#[derive(Default)]
pub struct MemoryExpansionStore {
    expanded: Mutex<HashMap<(String, String), bool>>,
}

impl MemoryExpansionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExpansionStore for MemoryExpansionStore {
    fn get(&self, account: &str, thread_id: &str) -> Result<bool, StoreError> {
        let map = self.expanded.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(map
            .get(&(account.to_string(), thread_id.to_string()))
            .copied()
            .unwrap_or(false))
    }

    fn set(&self, account: &str, thread_id: &str, expanded: bool) -> Result<(), StoreError> {
        let mut map = self.expanded.lock().map_err(|_| StoreError::Poisoned)?;
        map.insert((account.to_string(), thread_id.to_string()), expanded);
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct AccountThreads {
    #[serde(default)]
    expanded: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ExpansionFile {
    #[serde(default)]
    accounts: BTreeMap<String, AccountThreads>,
}

/// Return the default path to `threads.toml` under the XDG state directory.
pub fn default_state_path() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        PathBuf::from(xdg).join("gmtui").join("threads.toml")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home)
            .join(".local")
            .join("state")
            .join("gmtui")
            .join("threads.toml")
    } else {
        PathBuf::from("threads.toml")
    }
}

/// TOML-file store. The in-memory map answers every `get`; each change
/// is serialized on the caller's task and written to disk from tokio's
/// blocking pool. Outside a runtime the write happens inline.
pub struct FileExpansionStore {
    path: Arc<PathBuf>,
    state: Mutex<ExpansionFile>,
    version: AtomicU64,
    written: Arc<Mutex<u64>>,
}

impl FileExpansionStore {
    /// Open the store at `path`. A missing file starts empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let state = match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ExpansionFile::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: Arc::new(path),
            state: Mutex::new(state),
            version: AtomicU64::new(0),
            written: Arc::new(Mutex::new(0)),
        })
    }
}

/// Write `contents` unless a newer version already reached the disk.
/// Holding `written` for the whole write keeps writes ordered.
fn write_versioned(
    path: &Path,
    written: &Mutex<u64>,
    version: u64,
    contents: &str,
) -> Result<(), StoreError> {
    let mut last = written.lock().map_err(|_| StoreError::Poisoned)?;
    if version <= *last {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    *last = version;
    Ok(())
}

impl ExpansionStore for FileExpansionStore {
    fn get(&self, account: &str, thread_id: &str) -> Result<bool, StoreError> {
        let state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(state
            .accounts
            .get(account)
            .is_some_and(|a| a.expanded.contains(thread_id)))
    }

    fn set(&self, account: &str, thread_id: &str, expanded: bool) -> Result<(), StoreError> {
        let (version, contents) = {
            let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
            let threads = &mut state.accounts.entry(account.to_string()).or_default().expanded;
            let changed = if expanded {
                threads.insert(thread_id.to_string())
            } else {
                threads.remove(thread_id)
            };
            if !changed {
                return Ok(());
            }
            let contents = toml::to_string_pretty(&*state)?;
            (self.version.fetch_add(1, Ordering::SeqCst) + 1, contents)
        };
        debug!(account, thread_id, expanded, version, "persisting expansion state");

        if tokio::runtime::Handle::try_current().is_err() {
            return write_versioned(&self.path, &self.written, version, &contents);
        }
        let path = Arc::clone(&self.path);
        let written = Arc::clone(&self.written);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = write_versioned(&path, &written, version, &contents) {
                warn!(path = %path.display(), error = %e, "could not save expansion state");
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_defaults_to_collapsed() {
        let store = MemoryExpansionStore::new();
        assert!(!store.get("work", "t1").unwrap());
        store.set("work", "t1", true).unwrap();
        assert!(store.get("work", "t1").unwrap());
        assert!(!store.get("home", "t1").unwrap());
    }

    #[test]
    fn file_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("threads.toml");

        let store = FileExpansionStore::open(&path).unwrap();
        store.set("work", "t1", true).unwrap();
        store.set("work", "t2", true).unwrap();
        store.set("work", "t2", false).unwrap();
        store.set("home", "t9", true).unwrap();

        let reopened = FileExpansionStore::open(&path).unwrap();
        assert!(reopened.get("work", "t1").unwrap());
        assert!(!reopened.get("work", "t2").unwrap());
        assert!(reopened.get("home", "t9").unwrap());
        assert!(!reopened.get("home", "t1").unwrap());
    }

    #[test]
    fn file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let store = FileExpansionStore::open(&path).unwrap();
        assert!(!store.get("a", "b").unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("threads.toml");
        std::fs::write(&path, "accounts = 3").unwrap();
        assert!(matches!(
            FileExpansionStore::open(&path),
            Err(StoreError::Parse(_))
        ));
    }

    #[test]
    fn file_format_is_grouped_by_account() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("threads.toml");
        let store = FileExpansionStore::open(&path).unwrap();
        store.set("work", "t1", true).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("[accounts.work]"));
        assert!(text.contains("t1"));
    }

    #[tokio::test]
    async fn file_store_writes_in_the_background() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("threads.toml");
        let store = FileExpansionStore::open(&path).unwrap();

        for i in 0..20 {
            store.set("work", &format!("t{}", i), true).unwrap();
            assert!(store.get("work", &format!("t{}", i)).unwrap());
        }
        store.set("work", "t0", false).unwrap();
        assert!(!store.get("work", "t0").unwrap());

        let mut settled = false;
        for _ in 0..200 {
            if let Ok(reopened) = FileExpansionStore::open(&path) {
                if reopened.get("work", "t19").unwrap() && !reopened.get("work", "t0").unwrap() {
                    settled = true;
                    break;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(settled, "final state never reached disk");
    }
}
