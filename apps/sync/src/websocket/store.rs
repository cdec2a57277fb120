//! Shared playback-state store
//!
//! Holds the per-user "now playing" record in Redis so any server process
//! handling a user's connections observes the same state, with an in-memory
//! fallback for single-instance mode when Redis is unavailable.
//!
//! Consistency is last-writer-wins by arrival order; `last_updated` is
//! stamped on every accepted write and strictly increases.

use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use unison_protocol::PlaybackState;

/// Default TTL for stored playback state (24h); the record is ephemeral
pub const DEFAULT_STATE_TTL_SECS: u64 = 86_400;

/// Playback-state store with Redis + in-memory fallback
#[derive(Clone)]
pub struct PlaybackStore {
    inner: Arc<StoreInner>,
}

enum StoreInner {
    /// Redis-backed store for multi-instance deployments
    Redis(RedisStore),
    /// In-memory store for single-instance mode
    Memory(MemoryStore),
}

impl PlaybackStore {
    /// Create a new store backed by Redis
    pub fn new_with_redis(client: redis::Client, ttl_secs: u64) -> Self {
        Self {
            inner: Arc::new(StoreInner::Redis(RedisStore { client, ttl_secs })),
        }
    }

    /// Create a new in-memory store (single instance mode)
    pub fn new_in_memory() -> Self {
        Self {
            inner: Arc::new(StoreInner::Memory(MemoryStore::default())),
        }
    }

    /// Try to create with Redis, fall back to in-memory
    pub async fn try_with_redis(redis_url: &str, ttl_secs: u64) -> Self {
        match redis::Client::open(redis_url) {
            Ok(client) => {
                // Test connection
                match client.get_multiplexed_async_connection().await {
                    Ok(mut conn) => {
                        let pong: Result<String, _> =
                            redis::cmd("PING").query_async(&mut conn).await;
                        if pong.is_ok() {
                            tracing::info!("Redis connected for playback state");
                            return Self::new_with_redis(client, ttl_secs);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Redis connection failed for playback state");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Redis client creation failed for playback state");
            }
        }

        tracing::warn!("Using in-memory playback state store (single instance mode only)");
        Self::new_in_memory()
    }

    /// Read the stored state, or the documented default if none exists
    ///
    /// A backing-store failure also reads as the default: sync is a
    /// best-effort convenience, so storage errors are logged, never
    /// surfaced as playback errors.
    pub async fn get_state(&self, user_id: Uuid) -> PlaybackState {
        match &*self.inner {
            StoreInner::Redis(redis) => redis.get(user_id).await,
            StoreInner::Memory(memory) => memory.get(user_id),
        }
    }

    /// Overwrite the stored state
    ///
    /// The write is stamped so `last_updated` strictly exceeds the previous
    /// record's; the stamped snapshot is returned for broadcasting.
    pub async fn set_state(&self, user_id: Uuid, mut state: PlaybackState) -> PlaybackState {
        state.sanitize();
        match &*self.inner {
            StoreInner::Redis(redis) => redis.set(user_id, state).await,
            StoreInner::Memory(memory) => memory.set(user_id, state),
        }
    }

    /// Check if we're using Redis (multi-instance capable)
    pub fn is_redis_backed(&self) -> bool {
        matches!(&*self.inner, StoreInner::Redis(_))
    }
}

/// Stamp a write so `last_updated` strictly increases
fn stamp(mut state: PlaybackState, previous: i64) -> PlaybackState {
    let now = chrono::Utc::now().timestamp_millis();
    state.last_updated = now.max(previous + 1);
    state
}

fn state_key(user_id: Uuid) -> String {
    format!("sync:playback:{}", user_id)
}

/// Redis-backed implementation
struct RedisStore {
    client: redis::Client,
    ttl_secs: u64,
}

impl RedisStore {
    async fn get(&self, user_id: Uuid) -> PlaybackState {
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, user_id = %user_id, "Redis unavailable for state read");
                return PlaybackState::default();
            }
        };

        let payload: Result<Option<String>, _> = redis::cmd("GET")
            .arg(state_key(user_id))
            .query_async(&mut conn)
            .await;

        match payload {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!(error = %e, user_id = %user_id, "Corrupt playback state record");
                PlaybackState::default()
            }),
            Ok(None) => PlaybackState::default(),
            Err(e) => {
                tracing::warn!(error = %e, user_id = %user_id, "Failed to read playback state");
                PlaybackState::default()
            }
        }
    }

    async fn set(&self, user_id: Uuid, state: PlaybackState) -> PlaybackState {
        let previous = self.get(user_id).await.last_updated;
        let state = stamp(state, previous);

        let json = match serde_json::to_string(&state) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize playback state");
                return state;
            }
        };

        match self.client.get_multiplexed_async_connection().await {
            Ok(mut conn) => {
                let result: Result<(), _> = redis::cmd("SET")
                    .arg(state_key(user_id))
                    .arg(json)
                    .arg("EX")
                    .arg(self.ttl_secs)
                    .query_async(&mut conn)
                    .await;

                if let Err(e) = result {
                    tracing::error!(error = %e, user_id = %user_id, "Failed to write playback state");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, user_id = %user_id, "Redis unavailable for state write");
            }
        }

        state
    }
}

/// In-memory implementation for single-instance mode
#[derive(Default)]
struct MemoryStore {
    /// Per-user state records
    states: DashMap<Uuid, PlaybackState>,
}

impl MemoryStore {
    fn get(&self, user_id: Uuid) -> PlaybackState {
        self.states
            .get(&user_id)
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    fn set(&self, user_id: Uuid, state: PlaybackState) -> PlaybackState {
        let mut entry = self.states.entry(user_id).or_default();
        let state = stamp(state, entry.last_updated);
        *entry = state.clone();
        state
    }
}
