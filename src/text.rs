//! Content-addressed text storage.
//!
//! Source and compiled text is stored once, keyed by the lowercase hex
//! SHA-256 of its bytes.

use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Hex SHA-256 of a text body.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Deduplicating text table.
#[derive(Debug, Clone, Default)]
pub struct TextStore {
    texts: HashMap<String, String>,
}

impl TextStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a text body and return its hash. Storing the same body twice
    /// keeps a single copy.
    pub fn put(&mut self, text: &str) -> String {
        let hash = content_hash(text);
        self.texts.entry(hash.clone()).or_insert_with(|| text.to_string());
        hash
    }

    /// Fetch a text body by hash.
    pub fn get(&self, hash: &str) -> Option<&str> {
        self.texts.get(hash).map(String::as_str)
    }

    /// Number of distinct bodies.
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}
