pub mod cache;
pub mod db;
pub mod memory;
pub mod postgres;
pub mod schema;

mod error;

pub use cache::{BoxFuture, CacheEntry, CacheStore};
pub use error::Error;

use std::sync::Arc;

use crate::{db::Db, memory::MemoryCache, postgres::PgCache};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Opens the configured backend. Postgres gets its schema bootstrapped first.
pub async fn open(cfg: &orca_config::Storage) -> Result<Arc<dyn CacheStore>> {
	match cfg.backend.as_str() {
		"memory" => Ok(Arc::new(MemoryCache::new(cfg.max_entries))),
		"postgres" => {
			let Some(postgres) = &cfg.postgres else {
				return Err(Error::InvalidArgument(
					"storage.postgres is required for the postgres backend.".to_string(),
				));
			};
			let db = Db::connect(postgres).await?;

			db.ensure_schema().await?;

			Ok(Arc::new(PgCache::new(db.pool)))
		},
		other => Err(Error::InvalidArgument(format!("Unknown storage backend {other:?}."))),
	}
}
