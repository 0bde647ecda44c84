use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = orca_api::Args::parse();

	orca_api::run(args).await
}
