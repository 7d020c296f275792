//! Volatile key/value tier used in front of the durable store.

mod memory;

pub use memory::MemoryCache;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

use crate::error::CacheError;

/// Cache key holding a user's current session.
pub fn session_key(user_id: &str) -> String {
    format!("game:session:{user_id}")
}

/// String-valued cache with per-key expiry.
///
/// Implementations may drop keys at any time; callers treat a miss as
/// "unknown", never as "absent".
#[async_trait]
pub trait VolatileCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Reads and decodes a JSON value. Undecodable entries count as a miss.
pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn VolatileCache,
    key: &str,
) -> Result<Option<T>, CacheError> {
    Ok(cache
        .get(key)
        .await?
        .and_then(|raw| serde_json::from_str(&raw).ok()))
}

pub async fn set_json<T: Serialize + Sync>(
    cache: &dyn VolatileCache,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), CacheError> {
    let encoded = serde_json::to_string(value)?;
    cache.set(key, encoded, ttl).await
}
