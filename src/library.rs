//! Bibliographic entries and the stores that hold them.
//!
//! The engine only reads entries; it never edits the library itself. Entries
//! can be loaded from a JSON object keyed by id, a JSON array, or JSONL (one
//! entry per line).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading a library.
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid JSONL at line {line}: {message}")]
    JsonlError { line: usize, message: String },

    #[error("Entry has an invalid id: {0:?}")]
    InvalidId(String),
}

/// A free-text note attached to an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub text: String,
    /// Where the note applies (page, section...), if given.
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// A bibliographic entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    #[serde(rename = "type", default)]
    pub entry_type: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<Note>,
    /// Creation time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub created: u64,
}

impl Entry {
    pub fn new(id: impl Into<String>, entry_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entry_type: entry_type.into(),
            fields: BTreeMap::new(),
            notes: Vec::new(),
            created: 0,
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Returns a trimmed, non-empty field value.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Returns true if `id` can appear inside a marker tag.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && !id
            .chars()
            .any(|c| c == ':' || c == ',' || c == '|' || c == '{' || c == '}' || c.is_whitespace())
}

/// Mapping from entry id to entry.
pub type Library = BTreeMap<String, Entry>;

/// Loads a library from a JSON, JSON array or JSONL file.
pub fn load_library(path: &Path) -> Result<Library, LibraryError> {
    let content = fs::read_to_string(path)?;
    parse_library(&content)
}

/// Parses library content in any of the supported layouts.
pub fn parse_library(content: &str) -> Result<Library, LibraryError> {
    let trimmed = content.trim();

    if trimmed.is_empty() {
        return Ok(Library::new());
    }

    let entries: Vec<Entry> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed)?
    } else if let Ok(map) = serde_json::from_str::<BTreeMap<String, Entry>>(trimmed) {
        map.into_values().collect()
    } else {
        // Treat as JSONL: one entry per non-empty line
        let mut entries = Vec::new();
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Entry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    return Err(LibraryError::JsonlError {
                        line: line_num + 1,
                        message: e.to_string(),
                    });
                }
            }
        }
        entries
    };

    let mut library = Library::new();
    for entry in entries {
        if !is_valid_id(&entry.id) {
            return Err(LibraryError::InvalidId(entry.id));
        }
        library.insert(entry.id.clone(), entry);
    }
    Ok(library)
}

/// Serializes a library as a pretty-printed id→entry JSON object.
pub fn library_to_json(library: &Library) -> Result<String, LibraryError> {
    Ok(serde_json::to_string_pretty(library)?)
}

/// Key-value store holding the entry library.
pub trait LibraryStore: Send + Sync {
    fn get(&self) -> Library;
    fn put(&self, library: Library);
    fn upsert(&self, entry: Entry);
    fn remove(&self, id: &str) -> Option<Entry>;
    fn clear(&self);

    fn entry(&self, id: &str) -> Option<Entry> {
        self.get().get(id).cloned()
    }
}

/// Key-value store holding the cited order.
pub trait OrderStore: Send + Sync {
    fn get(&self) -> Vec<String>;
    fn put(&self, order: Vec<String>);
    fn clear(&self);

    /// Appends `id` unless it is already present.
    fn mark_cited(&self, id: &str) {
        let mut order = self.get();
        if !order.iter().any(|seen| seen == id) {
            order.push(id.to_string());
            self.put(order);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory library store.
#[derive(Debug, Default)]
pub struct MemoryLibrary {
    inner: Mutex<Library>,
}

impl MemoryLibrary {
    pub fn new(library: Library) -> Self {
        Self {
            inner: Mutex::new(library),
        }
    }
}

impl LibraryStore for MemoryLibrary {
    fn get(&self) -> Library {
        lock(&self.inner).clone()
    }

    fn put(&self, library: Library) {
        *lock(&self.inner) = library;
    }

    fn upsert(&self, entry: Entry) {
        lock(&self.inner).insert(entry.id.clone(), entry);
    }

    fn remove(&self, id: &str) -> Option<Entry> {
        lock(&self.inner).remove(id)
    }

    fn clear(&self) {
        lock(&self.inner).clear();
    }

    fn entry(&self, id: &str) -> Option<Entry> {
        lock(&self.inner).get(id).cloned()
    }
}

/// In-memory cited-order store.
#[derive(Debug, Default)]
pub struct MemoryOrder {
    inner: Mutex<Vec<String>>,
}

impl MemoryOrder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderStore for MemoryOrder {
    fn get(&self) -> Vec<String> {
        lock(&self.inner).clone()
    }

    fn put(&self, order: Vec<String>) {
        *lock(&self.inner) = order;
    }

    fn clear(&self) {
        lock(&self.inner).clear();
    }

    fn mark_cited(&self, id: &str) {
        let mut order = lock(&self.inner);
        if !order.iter().any(|seen| seen == id) {
            order.push(id.to_string());
        }
    }
}
