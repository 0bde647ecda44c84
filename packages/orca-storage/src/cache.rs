use std::{future::Future, pin::Pin, time::Duration};

use serde_json::Value;
use time::OffsetDateTime;

use crate::Result;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
	pub value: Value,
	/// Agent identity, or `attachment` for enrichment slots.
	pub owner: String,
	pub created_at: OffsetDateTime,
	pub ttl: Duration,
}
impl CacheEntry {
	pub fn new(owner: impl Into<String>, value: Value, ttl: Duration) -> Self {
		Self { value, owner: owner.into(), created_at: OffsetDateTime::now_utc(), ttl }
	}
}

/// Shared key/value store with per-entry TTL.
///
/// A miss is `Ok(None)`, never an error. An expired entry reads as a miss. Writes replace the
/// whole entry, so concurrent writers of one key converge on the last write.
pub trait CacheStore
where
	Self: Send + Sync,
{
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<CacheEntry>>>;

	fn set<'a>(&'a self, key: &'a str, entry: CacheEntry) -> BoxFuture<'a, Result<()>>;

	fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>>;

	/// Deletes every expired entry and reports how many went.
	fn purge_expired(&self) -> BoxFuture<'_, Result<u64>>;
}
