//! Room persistence in the external key-value cache
//!
//! The cache holds the canonical room record under `room:{CODE}` plus an
//! `active:rooms` membership set. Every write refreshes a four-hour
//! sliding TTL; expiry is the cache's job, there is no sweeper. All
//! mutations to the same code are serialized by a per-code async lock, so
//! a read-modify-write through [`RoomStore::update`] is atomic within the
//! process.

use std::{error::Error, sync::Arc, time::Duration};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    code::RoomCode,
    constants::room::{ACTIVE_SET_KEY, KEY_PREFIX, TTL_SECS},
    room::Room,
};

/// Error raised by cache backends regardless of the underlying store.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not be reached or rejected the operation.
    #[error("cache unavailable: {message}")]
    Unavailable {
        /// What the store was trying to do.
        message: String,
        /// The backend's own failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl CacheError {
    /// Constructs an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        CacheError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

/// Errors surfaced by room store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `create` found the code already present.
    #[error("room code already in use")]
    CodeInUse,
    /// No record behind the code, or its TTL expired.
    #[error("room not found")]
    NotFound,
    /// The stored record failed to (de)serialize.
    #[error("room record corrupted")]
    Conflict(#[from] serde_json::Error),
    /// The cache backend failed.
    #[error(transparent)]
    Backend(#[from] CacheError),
}

/// String-valued key-value cache with TTLs and membership sets.
///
/// Modeled on the subset of a Redis-style cache the engine needs. String
/// keys carry a TTL; set keys do not.
#[async_trait]
pub trait KvCache: Send + Sync {
    /// Sets `key` only if absent; returns whether the write happened.
    async fn set_nx(&self, key: &str, value: String, ttl: Duration) -> Result<bool, CacheError>;

    /// Sets `key` unconditionally, refreshing its TTL.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Reads `key`; expired keys read as absent.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Removes `key`.
    async fn del(&self, key: &str) -> Result<(), CacheError>;

    /// Adds `member` to the set at `key`.
    async fn sadd(&self, key: &str, member: &str) -> Result<(), CacheError>;

    /// Removes `member` from the set at `key`.
    async fn srem(&self, key: &str, member: &str) -> Result<(), CacheError>;

    /// Lists the members of the set at `key`.
    async fn smembers(&self, key: &str) -> Result<Vec<String>, CacheError>;
}

/// Process-local cache backend.
///
/// Expiry is lazy: a string key past its deadline reads as absent and is
/// dropped on the next access. Suitable for tests and single-process
/// deployments; a shared cache drops in behind the same trait.
#[derive(Default)]
pub struct MemoryCache {
    strings: DashMap<String, (String, tokio::time::Instant)>,
    sets: DashMap<String, Vec<String>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let now = tokio::time::Instant::now();
        let expired = match self.strings.get(key) {
            Some(entry) => {
                if entry.1 > now {
                    return Some(entry.0.clone());
                }
                true
            }
            None => false,
        };
        // The read guard is released before the expired key is dropped.
        if expired {
            self.strings.remove(key);
        }
        None
    }
}

#[async_trait]
impl KvCache for MemoryCache {
    async fn set_nx(&self, key: &str, value: String, ttl: Duration) -> Result<bool, CacheError> {
        let now = tokio::time::Instant::now();
        match self.strings.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().1 > now {
                    return Ok(false);
                }
                occupied.insert((value, now + ttl));
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert((value, now + ttl));
                Ok(true)
            }
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.strings
            .insert(key.to_owned(), (value, tokio::time::Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.live_value(key))
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.strings.remove(key);
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), CacheError> {
        let mut set = self.sets.entry(key.to_owned()).or_default();
        if !set.iter().any(|m| m == member) {
            set.push(member.to_owned());
        }
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), CacheError> {
        if let Some(mut set) = self.sets.get_mut(key) {
            set.retain(|m| m != member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, CacheError> {
        Ok(self
            .sets
            .get(key)
            .map(|set| set.value().clone())
            .unwrap_or_default())
    }
}

/// Read-modify-write access to room records by code.
pub struct RoomStore {
    cache: Arc<dyn KvCache>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    ttl: Duration,
}

impl RoomStore {
    /// Creates a store over the given cache with the standard room TTL.
    pub fn new(cache: Arc<dyn KvCache>) -> Self {
        Self {
            cache,
            locks: DashMap::new(),
            ttl: Duration::from_secs(TTL_SECS),
        }
    }

    fn key(code: &RoomCode) -> String {
        format!("{KEY_PREFIX}{code}")
    }

    /// Acquires the per-code lock.
    ///
    /// Callers that need to broadcast in commit order hold this guard
    /// across their read, write, and derived emits. [`RoomStore::update`]
    /// takes it internally; do not call `update` while holding the guard.
    pub async fn lock(&self, code: &RoomCode) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(code.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Whether an unexpired record exists for the code.
    pub async fn exists(&self, code: &RoomCode) -> Result<bool, StoreError> {
        Ok(self.cache.get(&Self::key(code)).await?.is_some())
    }

    /// Creates a room record, failing if the code is taken.
    pub async fn create(&self, room: Room) -> Result<(), StoreError> {
        let _guard = self.lock(&room.code).await;
        let encoded = serde_json::to_string(&room)?;
        if !self
            .cache
            .set_nx(&Self::key(&room.code), encoded, self.ttl)
            .await?
        {
            return Err(StoreError::CodeInUse);
        }
        self.cache.sadd(ACTIVE_SET_KEY, room.code.as_str()).await?;
        tracing::debug!(code = %room.code, "room record created");
        Ok(())
    }

    /// Reads the room record behind the code.
    pub async fn get(&self, code: &RoomCode) -> Result<Room, StoreError> {
        let raw = self
            .cache
            .get(&Self::key(code))
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Writes a room record back, refreshing the TTL.
    ///
    /// The caller must hold the per-code guard from [`RoomStore::lock`].
    pub async fn put(&self, room: &Room) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(room)?;
        self.cache
            .set(&Self::key(&room.code), encoded, self.ttl)
            .await?;
        Ok(())
    }

    /// Atomically applies `mutate` to the room record.
    ///
    /// Fetches under the per-code lock, runs the mutator, and writes back
    /// with a refreshed TTL. If the mutator fails nothing is written, so no
    /// partial state is ever visible.
    pub async fn update<T, E, F>(&self, code: &RoomCode, mutate: F) -> Result<T, E>
    where
        F: FnOnce(&mut Room) -> Result<T, E>,
        E: From<StoreError>,
    {
        let _guard = self.lock(code).await;
        let mut room = self.get(code).await?;
        let out = mutate(&mut room)?;
        self.put(&room).await?;
        Ok(out)
    }

    /// Removes the room record and its active-set membership.
    pub async fn delete(&self, code: &RoomCode) -> Result<(), StoreError> {
        let _guard = self.lock(code).await;
        self.cache.del(&Self::key(code)).await?;
        self.cache.srem(ACTIVE_SET_KEY, code.as_str()).await?;
        // Evicted under the guard, and only when unshared: two strong
        // references are the map's Arc and this guard's. A waiter's clone
        // keeps the entry alive, so it serializes against any later create
        // for the same code instead of getting a fresh mutex.
        self.locks
            .remove_if(code.as_str(), |_, lock| Arc::strong_count(lock) == 2);
        tracing::debug!(%code, "room record deleted");
        Ok(())
    }

    /// Lists the codes currently in the active-rooms set.
    pub async fn active_codes(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.cache.smembers(ACTIVE_SET_KEY).await?)
    }
}
