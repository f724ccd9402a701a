use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::warn;

use crate::domain::ports::QueryStore;

/// Encode a query as an `application/x-www-form-urlencoded` string.
pub fn encode_query(query: &BTreeMap<String, String>) -> String {
    // Serializing a string map cannot fail.
    serde_urlencoded::to_string(query).unwrap_or_default()
}

/// Decode a query string. A leading `?` is accepted; a repeated key keeps
/// its last value.
pub fn decode_query(raw: &str) -> Result<BTreeMap<String, String>, serde_urlencoded::de::Error> {
    let raw = raw.trim().trim_start_matches('?');
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(raw)?;
    Ok(pairs.into_iter().collect())
}

/// Process-local store. Clones share the same query.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueryStore {
    query: Arc<Mutex<BTreeMap<String, String>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryQueryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_query(query: BTreeMap<String, String>) -> Self {
        Self {
            query: Arc::new(Mutex::new(query)),
            writes: Arc::default(),
        }
    }

    /// Number of writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl QueryStore for MemoryQueryStore {
    fn read(&self) -> BTreeMap<String, String> {
        self.query
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn write(&self, query: &BTreeMap<String, String>) {
        *self.query.lock().unwrap_or_else(PoisonError::into_inner) = query.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Keeps the query as a single query-string line in a file, so a list
/// view's page, sort and filters survive restarts.
#[derive(Debug, Clone)]
pub struct FileQueryStore {
    path: PathBuf,
}

impl FileQueryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl QueryStore for FileQueryStore {
    fn read(&self) -> BTreeMap<String, String> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!("cannot read persisted query {}: {}", self.path.display(), e);
                return BTreeMap::new();
            }
        };
        decode_query(&raw).unwrap_or_else(|e| {
            warn!("ignoring malformed persisted query {}: {}", self.path.display(), e);
            BTreeMap::new()
        })
    }

    fn write(&self, query: &BTreeMap<String, String>) {
        if let Err(e) = fs::write(&self.path, encode_query(query)) {
            warn!("cannot persist query to {}: {}", self.path.display(), e);
        }
    }
}
