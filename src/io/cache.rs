use crate::types::{ReferenceKey, ReferenceRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A reference image as returned by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedReference {
    pub request: ReferenceRequest,
    #[serde(rename = "image_base64", with = "base64_bytes")]
    pub bytes: Vec<u8>,
    /// Container format tag, e.g. "png"
    pub format: String,
    pub fetched_at: DateTime<Utc>,
}

/// Key/value store for fetched reference images
///
/// Implementations must tolerate concurrent callers. Two callers missing on
/// the same key may both `put`; the later write wins.
pub trait ReferenceCache: Send + Sync {
    fn get(&self, key: &ReferenceKey) -> Option<Arc<CachedReference>>;
    fn put(&self, key: ReferenceKey, value: Arc<CachedReference>);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-lifetime memoization with no eviction
///
/// Entries are never pruned, so memory grows with the number of distinct
/// requests. Substitute a bounded implementation if request keys are not
/// expected to stay few.
#[derive(Debug, Default)]
pub struct InMemoryReferenceCache {
    entries: RwLock<HashMap<ReferenceKey, Arc<CachedReference>>>,
}

impl InMemoryReferenceCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReferenceCache for InMemoryReferenceCache {
    fn get(&self, key: &ReferenceKey) -> Option<Arc<CachedReference>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn put(&self, key: ReferenceKey, value: Arc<CachedReference>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, value);
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}
