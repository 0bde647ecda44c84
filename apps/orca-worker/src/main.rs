use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = orca_worker::Args::parse();

	orca_worker::run(args).await
}
