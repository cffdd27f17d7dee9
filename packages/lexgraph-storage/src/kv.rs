use std::{collections::HashMap, sync::Mutex};

use serde_json::Value;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};

use crate::{BoxFuture, KvStore, Result};

pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Process-local key-value store. Expired entries are swept on every write and the oldest entries
/// are evicted once `max_entries` is exceeded.
#[derive(Debug)]
pub struct MemoryKvStore {
	max_entries: usize,
	state: Mutex<MemoryKvState>,
}
impl MemoryKvStore {
	pub fn new() -> Self {
		Self::with_capacity(DEFAULT_MAX_ENTRIES)
	}

	pub fn with_capacity(max_entries: usize) -> Self {
		Self { max_entries: max_entries.max(1), state: Mutex::new(MemoryKvState::default()) }
	}

	pub fn len(&self) -> usize {
		self.state.lock().unwrap_or_else(|err| err.into_inner()).entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn get_inner(&self, key: &str, now: OffsetDateTime) -> Option<Value> {
		let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());

		if state.entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
			state.entries.remove(key);

			return None;
		}

		state.entries.get(key).map(|entry| entry.value.clone())
	}

	fn set_inner(
		&self,
		key: &str,
		value: Value,
		expires_at: Option<OffsetDateTime>,
		now: OffsetDateTime,
	) {
		let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());

		state.entries.retain(|_, entry| !entry.is_expired(now));

		let seq = state.next_seq;

		state.next_seq += 1;
		state.entries.insert(key.to_string(), MemoryKvEntry { value, expires_at, seq });

		while state.entries.len() > self.max_entries {
			let Some(oldest) =
				state.entries.iter().min_by_key(|(_, entry)| entry.seq).map(|(key, _)| key.clone())
			else {
				break;
			};

			state.entries.remove(&oldest);
		}
	}
}
impl Default for MemoryKvStore {
	fn default() -> Self {
		Self::new()
	}
}
impl KvStore for MemoryKvStore {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>>> {
		Box::pin(async move { Ok(self.get_inner(key, OffsetDateTime::now_utc())) })
	}

	fn set<'a>(
		&'a self,
		key: &'a str,
		value: Value,
		ttl: Option<Duration>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();

			self.set_inner(key, value, ttl.map(|ttl| now + ttl), now);

			Ok(())
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());

			Ok(state.entries.remove(key).is_some())
		})
	}
}

#[derive(Debug, Default)]
struct MemoryKvState {
	next_seq: u64,
	entries: HashMap<String, MemoryKvEntry>,
}

#[derive(Debug)]
struct MemoryKvEntry {
	value: Value,
	expires_at: Option<OffsetDateTime>,
	/// Insertion order, used to evict the oldest entry first.
	seq: u64,
}
impl MemoryKvEntry {
	fn is_expired(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|expires_at| expires_at <= now)
	}
}

pub struct PgKvStore {
	pool: PgPool,
}
impl PgKvStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	async fn get_inner(&self, key: &str) -> Result<Option<Value>> {
		let value: Option<Value> = sqlx::query_scalar(
			"\
SELECT value
FROM kv_entries
WHERE key = $1 AND (expires_at IS NULL OR expires_at > now())",
		)
		.bind(key)
		.fetch_optional(&self.pool)
		.await?;

		Ok(value)
	}

	async fn set_inner(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
		let expires_at = ttl.map(|ttl| OffsetDateTime::now_utc() + ttl);

		sqlx::query(
			"\
INSERT INTO kv_entries (key, value, expires_at, updated_at)
VALUES ($1, $2, $3, now())
ON CONFLICT (key) DO UPDATE
SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at, updated_at = now()",
		)
		.bind(key)
		.bind(value)
		.bind(expires_at)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	async fn delete_inner(&self, key: &str) -> Result<bool> {
		let result =
			sqlx::query("DELETE FROM kv_entries WHERE key = $1").bind(key).execute(&self.pool).await?;

		Ok(result.rows_affected() > 0)
	}
}
impl KvStore for PgKvStore {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>>> {
		Box::pin(self.get_inner(key))
	}

	fn set<'a>(
		&'a self,
		key: &'a str,
		value: Value,
		ttl: Option<Duration>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.set_inner(key, value, ttl))
	}

	fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(self.delete_inner(key))
	}
}
