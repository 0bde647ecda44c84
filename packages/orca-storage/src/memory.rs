use std::{
	collections::HashMap,
	future,
	sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use tokio::time::Instant;

use crate::{BoxFuture, CacheEntry, CacheStore, Result};

struct Slot {
	entry: CacheEntry,
	// `None` when the TTL reaches past the clock's range.
	expires_at: Option<Instant>,
}
impl Slot {
	fn live_at(&self, now: Instant) -> bool {
		self.expires_at.is_none_or(|expires_at| expires_at > now)
	}
}

/// In-process backend. Expiry follows the tokio clock.
pub struct MemoryCache {
	slots: RwLock<HashMap<String, Slot>>,
	max_entries: usize,
}
impl MemoryCache {
	pub fn new(max_entries: usize) -> Self {
		Self { slots: RwLock::new(HashMap::new()), max_entries: max_entries.max(1) }
	}

	pub fn len(&self) -> usize {
		self.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Slot>> {
		self.slots.read().unwrap_or_else(|err| err.into_inner())
	}

	fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Slot>> {
		self.slots.write().unwrap_or_else(|err| err.into_inner())
	}

	fn lookup(&self, key: &str) -> Option<CacheEntry> {
		let now = Instant::now();

		{
			let slots = self.read();

			match slots.get(key) {
				None => return None,
				Some(slot) if slot.live_at(now) => return Some(slot.entry.clone()),
				Some(_) => {},
			}
		}

		let mut slots = self.write();

		// Another writer may have refreshed the slot between the two locks.
		if slots.get(key).map(|slot| !slot.live_at(now)).unwrap_or(false) {
			slots.remove(key);
		}

		None
	}

	fn insert(&self, key: &str, entry: CacheEntry) {
		let now = Instant::now();
		let expires_at = now.checked_add(entry.ttl);
		let mut slots = self.write();

		if !slots.contains_key(key) && slots.len() >= self.max_entries {
			slots.retain(|_, slot| slot.live_at(now));

			if slots.len() >= self.max_entries {
				let victim = slots
					.iter()
					.min_by_key(|(_, slot)| (slot.expires_at.is_none(), slot.expires_at))
					.map(|(victim, _)| victim.clone());

				if let Some(victim) = victim {
					slots.remove(&victim);
				}
			}
		}

		slots.insert(key.to_string(), Slot { entry, expires_at });
	}

	fn purge(&self) -> u64 {
		let now = Instant::now();
		let mut slots = self.write();
		let before = slots.len();

		slots.retain(|_, slot| slot.live_at(now));

		(before - slots.len()) as u64
	}
}
impl CacheStore for MemoryCache {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<CacheEntry>>> {
		Box::pin(future::ready(Ok(self.lookup(key))))
	}

	fn set<'a>(&'a self, key: &'a str, entry: CacheEntry) -> BoxFuture<'a, Result<()>> {
		self.insert(key, entry);

		Box::pin(future::ready(Ok(())))
	}

	fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>> {
		let removed = self.write().remove(key).is_some();

		Box::pin(future::ready(Ok(removed)))
	}

	fn purge_expired(&self) -> BoxFuture<'_, Result<u64>> {
		Box::pin(future::ready(Ok(self.purge())))
	}
}
