use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("storage backend failed for {key}: {reason}")]
    Backend { key: String, reason: String },
    #[error("stored {key} has {actual} bytes, expected {expected}")]
    WrongSize { key: String, expected: usize, actual: usize },
}

/// Where EEPROM and flash contents survive between sessions. Called from
/// outside the cycle handler only.
pub trait Persistence {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError>;
    fn store(&self, key: &str, data: &[u8]) -> Result<(), PersistError>;
}

pub fn eeprom_key(md5: &str) -> String {
    format!("{}.eeprom", md5)
}

pub fn flash_key(md5: &str) -> String {
    format!("{}.flash", md5)
}

/// Shareable in-memory store, clones see the same contents.
#[derive(Default)]
pub struct MemoryPersistence {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryPersistence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.blobs.lock().contains_key(key)
    }
}

impl Clone for MemoryPersistence {
    fn clone(&self) -> Self {
        Self {
            blobs: self.blobs.clone(),
        }
    }
}

impl Persistence for MemoryPersistence {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError> {
        Ok(self.blobs.lock().get(key).cloned())
    }

    fn store(&self, key: &str, data: &[u8]) -> Result<(), PersistError> {
        self.blobs.lock().insert(key.to_string(), data.to_vec());
        Ok(())
    }
}
