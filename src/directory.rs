use std::collections::HashMap;
use std::io;
use std::path::Path;

use dashmap::DashMap;
use ulid::Ulid;

/// User lookup. Account management lives elsewhere; the scheduler only needs names.
pub trait UserDirectory: Send + Sync {
    fn display_name(&self, user_id: &Ulid) -> Option<String>;
}

#[derive(Default)]
pub struct InMemoryDirectory {
    names: DashMap<Ulid, String>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: Ulid, name: impl Into<String>) {
        self.names.insert(user_id, name.into());
    }

    /// Load a JSON object mapping user ULIDs to display names.
    pub fn from_json_file(path: &Path) -> io::Result<Self> {
        let raw = std::fs::read(path)?;
        let parsed: HashMap<Ulid, String> = serde_json::from_slice(&raw)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let directory = Self::new();
        for (id, name) in parsed {
            directory.insert(id, name);
        }
        Ok(directory)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl UserDirectory for InMemoryDirectory {
    fn display_name(&self, user_id: &Ulid) -> Option<String> {
        self.names.get(user_id).map(|e| e.value().clone())
    }
}
