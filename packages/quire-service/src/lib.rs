pub mod embedding;
pub mod folders;
pub mod notes;
pub mod runner;
pub mod search;
pub mod sync;
pub mod threads;

mod error;

pub use embedding::{ChatMessage, EmbeddingPipeline, IndexReport};
pub use error::{Error, Result};
pub use folders::FolderDeleteReport;
pub use runner::SyncLoop;
pub use search::{SearchOptions, SearchOutcome};
pub use sync::{DrainReport, PullOutcome, PullReport};

use std::sync::{
	Arc,
	atomic::{AtomicU64, Ordering},
};

use uuid::Uuid;

use quire_config::Config;
use quire_domain::{
	backoff::BackoffPolicy,
	timestamp::{Clock, SystemClock},
};
use quire_providers::{EngineLoader, RemoteNotes};
use quire_storage::db::Db;

/// Local-first note store with outbox sync and on-device semantic search.
pub struct QuireService {
	pub cfg: Config,
	pub db: Db,
	pub embedding: EmbeddingPipeline,
	remote: Arc<dyn RemoteNotes>,
	clock: Arc<dyn Clock>,
	pull_generation: AtomicU64,
	search_generation: AtomicU64,
}
impl QuireService {
	pub fn new(
		cfg: Config,
		db: Db,
		remote: Arc<dyn RemoteNotes>,
		loader: Arc<dyn EngineLoader>,
	) -> Self {
		let embedding = EmbeddingPipeline::new(loader, &cfg.embedding);

		Self {
			cfg,
			db,
			embedding,
			remote,
			clock: Arc::new(SystemClock),
			pull_generation: AtomicU64::new(0),
			search_generation: AtomicU64::new(0),
		}
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	pub(crate) fn now(&self) -> i64 {
		self.clock.now_millis()
	}

	pub(crate) fn backoff(&self) -> BackoffPolicy {
		BackoffPolicy {
			base_ms: self.cfg.outbox.base_backoff_ms,
			max_ms: self.cfg.outbox.max_backoff_ms,
			max_retries: self.cfg.outbox.max_retries,
		}
	}
}

/// Monotonic generation counter; a newer `begin` supersedes every older token.
pub(crate) struct Generation<'a> {
	counter: &'a AtomicU64,
	token: u64,
}
impl<'a> Generation<'a> {
	pub(crate) fn begin(counter: &'a AtomicU64) -> Self {
		let token = counter.fetch_add(1, Ordering::SeqCst) + 1;

		Self { counter, token }
	}

	pub(crate) fn is_current(&self) -> bool {
		self.counter.load(Ordering::SeqCst) == self.token
	}
}

pub(crate) fn new_id() -> String {
	Uuid::new_v4().to_string()
}
