pub mod worker;

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use color_eyre::eyre;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
	version = orca_cli::VERSION,
	rename_all = "kebab",
	styles = orca_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = orca_config::load(&args.config)?;
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	if config.storage.backend != "postgres" {
		return Err(eyre::eyre!(
			"orca-worker sweeps the shared postgres cache. The memory backend is swept by orca-api."
		));
	}

	let cache = orca_storage::open(&config.storage).await?;
	let interval = Duration::from_secs(config.storage.purge_interval_secs);

	tracing::info!(interval_secs = interval.as_secs(), "Cache janitor started.");

	worker::run_janitor(cache.as_ref(), interval).await
}
