//! Durable session persistence.
//!
//! The session is kept as two entries, [`TOKEN_KEY`] and [`USER_KEY`], in a
//! [`KeyValueStore`]. Both are written in one batch so a reader never sees
//! only one of them.

use std::collections::{BTreeMap, HashMap};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::error::StoreError;
use crate::models::UserProfile;

/// Key of the opaque session token.
pub const TOKEN_KEY: &str = "token";

/// Key of the JSON-serialized user record.
pub const USER_KEY: &str = "user";

/// String key-value storage that survives restarts.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Read several keys from one consistent snapshot.
    fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StoreError> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    /// Write all entries or none of them.
    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError>;

    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Process-local store, lost on exit.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StoreError> {
        let entries = lock(&self.entries);
        Ok(keys.iter().map(|key| entries.get(*key).cloned()).collect())
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        let mut map = lock(&self.entries);
        for (key, value) in entries {
            map.insert(key.to_string(), value.clone());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut map = lock(&self.entries);
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }
}

/// JSON file store. Every write goes to a temporary file that is synced to
/// disk before it replaces the real one, so a crash mid-write leaves the
/// previous contents intact.
///
/// All operations block on file I/O. [`SessionManager`](super::SessionManager)
/// calls them from the blocking pool.
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(&serde_json::to_vec(entries)?)?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_all()?.remove(key))
    }

    fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StoreError> {
        let mut entries = self.read_all()?;
        Ok(keys.iter().map(|key| entries.remove(*key)).collect())
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        let _guard = lock(&self.write_lock);
        // An unreadable file is replaced rather than blocking every future write.
        let mut map = self.read_all().unwrap_or_default();
        for (key, value) in entries {
            map.insert(key.to_string(), value.clone());
        }
        self.write_all(&map)
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        let _guard = lock(&self.write_lock);
        let mut map = match self.read_all() {
            Ok(map) => map,
            Err(StoreError::Serde(_)) => BTreeMap::new(),
            Err(e) => return Err(e),
        };
        if !self.path.exists() {
            return Ok(());
        }
        for key in keys {
            map.remove(*key);
        }
        self.write_all(&map)
    }
}

/// A restored or freshly issued session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user: UserProfile,
}

/// Reads and writes the session pair.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn persist(&self, session: &Session) -> Result<(), StoreError> {
        let user = serde_json::to_string(&session.user)?;
        self.backend
            .set_many(&[(TOKEN_KEY, session.token.clone()), (USER_KEY, user)])
    }

    /// Load the stored session. Missing, partial or unreadable data is
    /// treated as no session and cleaned up.
    pub fn restore(&self) -> Option<Session> {
        let values = match self.backend.get_many(&[TOKEN_KEY, USER_KEY]) {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored session");
                return None;
            }
        };

        let mut values = values.into_iter();
        let token = values.next().flatten();
        let user = values.next().flatten();

        match (token, user) {
            (Some(token), Some(user)) if !token.is_empty() => {
                match serde_json::from_str::<UserProfile>(&user) {
                    Ok(user) => Some(Session { token, user }),
                    Err(e) => {
                        tracing::warn!(error = %e, "Discarding corrupt stored session");
                        self.discard();
                        None
                    }
                }
            }
            (None, None) => None,
            _ => {
                tracing::warn!("Discarding incomplete stored session");
                self.discard();
                None
            }
        }
    }

    /// Remove both entries. Calling it again is a no-op.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.backend.remove_many(&[TOKEN_KEY, USER_KEY])
    }

    fn discard(&self) {
        if let Err(e) = self.clear() {
            tracing::warn!(error = %e, "Failed to remove stale session data");
        }
    }
}
