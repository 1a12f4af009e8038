//! Durable key-value persistence behind a narrow port.
//!
//! The engine only ever needs `get`/`set` by string key, so [`StoragePort`] is
//! all it sees. [`MemoryStorage`] backs tests and throwaway sessions;
//! [`sqlite::SqliteStorage`] is the production adapter. Stores write through a
//! [`StateWriter`] so a slow adapter never blocks the engine.

pub mod schema;
pub mod sqlite;
pub mod writer;

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::StorageError;

pub use sqlite::SqliteStorage;
pub use writer::StateWriter;

/// Key holding the serialized `{sessions, folders}` set.
pub const SESSIONS_KEY: &str = "vitalchat.sessions";
/// Key holding the serialized knowledge-entry list.
pub const KNOWLEDGE_KEY: &str = "vitalchat.knowledge";

/// String-keyed get/set surface. No transactional guarantees across keys.
///
/// All methods are synchronous. Writes go through [`StateWriter`]; the load-time
/// reads happen once at startup (the server runs them in `spawn_blocking`).
pub trait StoragePort: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// In-process storage. Contents vanish with the value.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StoragePort for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| StorageError::Unavailable(format!("storage lock poisoned: {e}")))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StorageError::Unavailable(format!("storage lock poisoned: {e}")))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
