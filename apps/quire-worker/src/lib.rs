use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use quire_providers::{embedding::HttpEmbeddingLoader, remote::HttpRemote};
use quire_service::{QuireService, SyncLoop};
use quire_storage::db::Db;

#[derive(Debug, Parser)]
#[command(
	version = quire_cli::VERSION,
	rename_all = "kebab",
	styles = quire_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

/// Runs the background sync loop until ctrl-c.
pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = quire_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.sqlite).await?;

	db.ensure_schema().await?;

	let remote = Arc::new(HttpRemote::new(&config.remote)?);
	let loader = Arc::new(HttpEmbeddingLoader::new(config.providers.embedding.clone()));
	let service = Arc::new(QuireService::new(config, db, remote, loader));
	let sync = SyncLoop::spawn(service.clone());

	tracing::info!(version = quire_cli::VERSION, "Quire worker started.");

	tokio::signal::ctrl_c().await?;
	tracing::info!("Shutdown requested.");
	sync.shutdown().await;

	let stats = service.outbox_stats().await?;

	tracing::info!(
		pending = stats.pending,
		processing = stats.processing,
		attention = stats.attention,
		"Quire worker stopped."
	);

	Ok(())
}
