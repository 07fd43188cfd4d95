//! Response cache keyed by request fingerprint.
//!
//! Entries expire lazily: an entry older than the TTL is dropped when it is
//! next looked up. There is no background sweep. Size is capped, and the
//! oldest entry is evicted when an insert would exceed the cap.

use sha3::{Digest, Sha3_256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::types::{CompletionRequest, CompletionResponse};

/// Deterministic cache key over messages, temperature and max tokens.
pub fn fingerprint(request: &CompletionRequest) -> String {
    let mut hasher = Sha3_256::new();
    for msg in &request.messages {
        let role = msg.role.to_string();
        hasher.update((role.len() as u64).to_le_bytes());
        hasher.update(role.as_bytes());
        hasher.update((msg.content.len() as u64).to_le_bytes());
        hasher.update(msg.content.as_bytes());
    }
    hasher.update(request.temperature.to_bits().to_le_bytes());
    hasher.update(request.max_tokens.to_le_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub response: Arc<CompletionResponse>,
    pub created_at: Instant,
}

#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fetch a live entry, dropping it if it has expired.
    pub fn get(&self, key: &str) -> Option<Arc<CompletionResponse>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = match entries.get(key) {
            Some(entry) if entry.created_at.elapsed() > self.ttl => true,
            Some(entry) => return Some(entry.response.clone()),
            None => return None,
        };
        if expired {
            entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: String, response: Arc<CompletionResponse>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.created_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key,
            CacheEntry {
                response,
                created_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
