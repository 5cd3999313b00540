use clap::Parser;

use quire_worker::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	quire_worker::run(Args::parse()).await
}
