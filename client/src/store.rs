//! Local persistence of saved channels.
//!
//! The API client never touches this store. Callers save the `{id, name,
//! apiKey}` triple after creating a channel and look keys up by channel id.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

pub const CHANNELS_KEY: &str = "@iot_workshop_channels";

/// Durable string key-value storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &S {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}

/// A JSON object file. Missing file reads as an empty store.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        // write-then-rename
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;

        debug!("Saved {} store entries to {}", entries.len(), self.path.display());
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    fn entries(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Store("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries()?.clear();
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedChannel {
    pub id: String,
    pub name: String,
    #[serde(rename = "apiKey")]
    pub api_key: String,
}

/// Typed list of saved channels kept under [`CHANNELS_KEY`].
#[derive(Debug)]
pub struct SavedChannels<S> {
    store: S,
}

impl<S: KeyValueStore> SavedChannels<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn list(&self) -> Result<Vec<SavedChannel>> {
        match self.store.get(CHANNELS_KEY)? {
            Some(text) => Ok(serde_json::from_str(&text)?),
            None => Ok(Vec::new()),
        }
    }

    /// Appends an entry. Entries for the same channel id accumulate; lookups
    /// return the most recently added one.
    pub fn add(&self, channel: SavedChannel) -> Result<Vec<SavedChannel>> {
        let mut channels = self.list()?;
        channels.push(channel);
        self.write(&channels)?;
        Ok(channels)
    }

    pub fn find(&self, id: &str) -> Result<Option<SavedChannel>> {
        Ok(self.list()?.into_iter().rev().find(|c| c.id == id))
    }

    /// Removes every entry for `id`, returning how many were dropped.
    pub fn remove(&self, id: &str) -> Result<usize> {
        let mut channels = self.list()?;
        let before = channels.len();
        channels.retain(|c| c.id != id);
        let removed = before - channels.len();

        if removed > 0 {
            self.write(&channels)?;
        }
        Ok(removed)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.remove(CHANNELS_KEY)
    }

    fn write(&self, channels: &[SavedChannel]) -> Result<()> {
        self.store
            .set(CHANNELS_KEY, &serde_json::to_string(channels)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved(id: &str, key: &str) -> SavedChannel {
        SavedChannel {
            id: id.to_string(),
            name: format!("Channel {id}"),
            api_key: key.to_string(),
        }
    }

    #[test]
    fn test_empty_store_lists_nothing() {
        let channels = SavedChannels::new(MemoryStore::default());
        assert!(channels.list().unwrap().is_empty());
        assert_eq!(channels.find("ch_1").unwrap(), None);
    }

    #[test]
    fn test_add_find_remove() {
        let channels = SavedChannels::new(MemoryStore::default());
        channels.add(saved("ch_1", "k_old")).unwrap();
        channels.add(saved("ch_2", "k_2")).unwrap();
        channels.add(saved("ch_1", "k_new")).unwrap();

        assert_eq!(channels.list().unwrap().len(), 3);
        assert_eq!(channels.find("ch_1").unwrap().unwrap().api_key, "k_new");

        assert_eq!(channels.remove("ch_1").unwrap(), 2);
        assert_eq!(channels.list().unwrap(), vec![saved("ch_2", "k_2")]);
        assert_eq!(channels.remove("ch_1").unwrap(), 0);

        channels.clear().unwrap();
        assert!(channels.list().unwrap().is_empty());
    }

    #[test]
    fn test_saved_channel_json_shape() {
        let store = MemoryStore::default();
        SavedChannels::new(&store).add(saved("ch_1", "k_1")).unwrap();

        let raw = store.get(CHANNELS_KEY).unwrap().unwrap();
        assert_eq!(raw, r#"[{"id":"ch_1","name":"Channel ch_1","apiKey":"k_1"}]"#);
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = FileStore::new(&path);
        assert_eq!(store.get("a").unwrap(), None);
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("a").unwrap().as_deref(), Some("1"));

        reopened.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        assert_eq!(store.get("b").unwrap().as_deref(), Some("2"));

        store.clear().unwrap();
        assert!(!path.exists());
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "not json").unwrap();

        let err = FileStore::new(&path).get("a").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
