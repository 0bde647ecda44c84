use std::sync::Arc;

use orca_service::OrcaService;
use orca_storage::CacheStore;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<OrcaService>,
	pub cache: Arc<dyn CacheStore>,
}
impl AppState {
	pub async fn new(config: orca_config::Config) -> color_eyre::Result<Self> {
		let cache = orca_storage::open(&config.storage).await?;
		let service = OrcaService::new(config, cache.clone())?;

		Ok(Self { service: Arc::new(service), cache })
	}

	pub fn from_service(service: OrcaService, cache: Arc<dyn CacheStore>) -> Self {
		Self { service: Arc::new(service), cache }
	}
}
