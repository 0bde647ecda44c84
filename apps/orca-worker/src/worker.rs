use std::time::Duration;

use orca_storage::CacheStore;

const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Sweeps expired entries forever. Failed sweeps back off exponentially up to five minutes.
pub async fn run_janitor(cache: &dyn CacheStore, interval: Duration) -> color_eyre::Result<()> {
	let mut failures = 0_u32;

	loop {
		let delay = match sweep(cache).await {
			Ok(_) => {
				failures = 0;

				interval
			},
			Err(err) => {
				failures = failures.saturating_add(1);

				let delay = backoff(interval, failures);

				tracing::error!(
					error = %err,
					failures,
					retry_in_secs = delay.as_secs(),
					"Cache purge failed."
				);

				delay
			},
		};

		tokio::time::sleep(delay).await;
	}
}

pub async fn sweep(cache: &dyn CacheStore) -> orca_storage::Result<u64> {
	let purged = cache.purge_expired().await?;

	if purged > 0 {
		tracing::info!(count = purged, "Purged expired cache entries.");
	}

	Ok(purged)
}

fn backoff(interval: Duration, failures: u32) -> Duration {
	let factor = 2_u32.saturating_pow(failures.saturating_sub(1).min(16));

	interval.saturating_mul(factor).min(MAX_BACKOFF.max(interval))
}
