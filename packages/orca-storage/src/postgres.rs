use std::time::Duration as StdDuration;

use serde_json::Value;
use sqlx::{PgPool, Row};
use time::{Duration, OffsetDateTime};

use crate::{BoxFuture, CacheEntry, CacheStore, Error, Result};

/// Stored for TTLs that reach past it.
const NEVER_EXPIRES: OffsetDateTime = time::macros::datetime!(9999-12-31 23:59:59 UTC);

/// Postgres backend over the `agent_cache` table, shared by every API replica.
#[derive(Clone)]
pub struct PgCache {
	pool: PgPool,
}
impl PgCache {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	async fn fetch(&self, key: &str) -> Result<Option<CacheEntry>> {
		let now = OffsetDateTime::now_utc();
		let row = sqlx::query(
			"\
SELECT owner, payload, created_at, expires_at
FROM agent_cache
WHERE cache_key = $1 AND expires_at > $2",
		)
		.bind(key)
		.bind(now)
		.fetch_optional(&self.pool)
		.await?;
		let Some(row) = row else {
			sqlx::query("DELETE FROM agent_cache WHERE cache_key = $1 AND expires_at <= $2")
				.bind(key)
				.bind(now)
				.execute(&self.pool)
				.await?;

			return Ok(None);
		};
		let owner: String = row.try_get("owner")?;
		let value: Value = row.try_get("payload")?;
		let created_at: OffsetDateTime = row.try_get("created_at")?;
		let expires_at: OffsetDateTime = row.try_get("expires_at")?;
		let ttl = StdDuration::try_from(expires_at - created_at).map_err(|err| {
			Error::InvalidArgument(format!("Cache entry {key:?} has a negative TTL: {err}."))
		})?;

		sqlx::query(
			"\
UPDATE agent_cache
SET last_accessed_at = $1, hit_count = hit_count + 1
WHERE cache_key = $2",
		)
		.bind(now)
		.bind(key)
		.execute(&self.pool)
		.await?;

		Ok(Some(CacheEntry { value, owner, created_at, ttl }))
	}

	async fn store(&self, key: &str, entry: CacheEntry) -> Result<()> {
		let expires_at = expiry(entry.created_at, entry.ttl);

		sqlx::query(
			"\
INSERT INTO agent_cache (cache_key, owner, payload, created_at, last_accessed_at, expires_at, hit_count)
VALUES ($1, $2, $3, $4, $4, $5, 0)
ON CONFLICT (cache_key) DO UPDATE SET
	owner = EXCLUDED.owner,
	payload = EXCLUDED.payload,
	created_at = EXCLUDED.created_at,
	last_accessed_at = EXCLUDED.last_accessed_at,
	expires_at = EXCLUDED.expires_at,
	hit_count = 0",
		)
		.bind(key)
		.bind(entry.owner)
		.bind(entry.value)
		.bind(entry.created_at)
		.bind(expires_at)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<bool> {
		let result = sqlx::query("DELETE FROM agent_cache WHERE cache_key = $1")
			.bind(key)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected() > 0)
	}

	async fn purge(&self) -> Result<u64> {
		let result = sqlx::query("DELETE FROM agent_cache WHERE expires_at <= $1")
			.bind(OffsetDateTime::now_utc())
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}
}
impl CacheStore for PgCache {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<CacheEntry>>> {
		Box::pin(self.fetch(key))
	}

	fn set<'a>(&'a self, key: &'a str, entry: CacheEntry) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.store(key, entry))
	}

	fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(self.delete(key))
	}

	fn purge_expired(&self) -> BoxFuture<'_, Result<u64>> {
		Box::pin(self.purge())
	}
}

fn expiry(created_at: OffsetDateTime, ttl: StdDuration) -> OffsetDateTime {
	Duration::try_from(ttl)
		.ok()
		.and_then(|ttl| created_at.checked_add(ttl))
		.map_or(NEVER_EXPIRES, |expires_at| expires_at.min(NEVER_EXPIRES))
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;

	#[test]
	fn expiry_saturates_at_the_horizon() {
		let created_at = datetime!(2026-01-01 0:00 UTC);

		assert_eq!(expiry(created_at, StdDuration::from_secs(60)), datetime!(2026-01-01 0:01 UTC));
		assert_eq!(expiry(created_at, StdDuration::MAX), NEVER_EXPIRES);
		assert_eq!(expiry(created_at, StdDuration::from_secs(u64::MAX / 2)), NEVER_EXPIRES);
		assert_eq!(expiry(created_at, StdDuration::from_secs(20_000 * 365 * 86_400)), NEVER_EXPIRES);
	}
}
