pub mod embedding;
pub mod remote;

mod error;

pub use embedding::{CountingLoader, FakeEmbedder};
pub use error::{Error, Result};
pub use remote::{FakeFailure, FakeRemote, RemoteCall};

use std::{
	env, fs,
	path::{Path, PathBuf},
	sync::atomic::{AtomicI64, Ordering},
	time::Duration,
};

use serde_json::Map;

use uuid::Uuid;

use quire_domain::{
	note::{Folder, Note},
	timestamp::{Clock, RemoteTimestamp},
};
use quire_providers::remote::RemoteNote;
use quire_storage::db::Db;

/// A fresh in-memory store with the schema applied. Each call is fully isolated.
pub async fn test_db() -> Result<Db> {
	let db = Db::connect_in_memory(Duration::from_secs(5)).await?;

	db.ensure_schema().await?;

	Ok(db)
}

/// A file-backed store in the temp directory, removed on drop. Use it when a test needs more than
/// one pooled connection.
pub struct TestDatabase {
	path: PathBuf,
	db: Db,
}
impl TestDatabase {
	pub async fn new(pool_max_conns: u32) -> Result<Self> {
		let path = env::temp_dir().join(format!("quire_test_{}.db", Uuid::new_v4().simple()));
		let cfg = quire_config::Sqlite {
			path: path.to_string_lossy().into_owned(),
			pool_max_conns,
			busy_timeout_ms: 5_000,
		};
		let db = Db::connect(&cfg).await?;

		db.ensure_schema().await?;

		Ok(Self { path, db })
	}

	pub fn db(&self) -> &Db {
		&self.db
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		for suffix in ["", "-wal", "-shm"] {
			let mut file = self.path.clone().into_os_string();

			file.push(suffix);

			if let Err(err) = fs::remove_file(&file)
				&& err.kind() != std::io::ErrorKind::NotFound
			{
				eprintln!("Test database cleanup failed: {err}.");
			}
		}
	}
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
	now: AtomicI64,
}
impl ManualClock {
	pub fn new(start: i64) -> Self {
		Self { now: AtomicI64::new(start) }
	}

	pub fn advance(&self, millis: i64) -> i64 {
		self.now.fetch_add(millis, Ordering::SeqCst) + millis
	}

	pub fn set(&self, now: i64) {
		self.now.store(now, Ordering::SeqCst);
	}
}
impl Clock for ManualClock {
	fn now_millis(&self) -> i64 {
		self.now.load(Ordering::SeqCst)
	}
}

/// A valid configuration pointing at an in-memory store and unroutable remotes.
pub fn test_config() -> quire_config::Config {
	quire_config::Config {
		service: quire_config::Service { log_level: "info".to_string() },
		storage: quire_config::Storage {
			sqlite: quire_config::Sqlite {
				path: quire_storage::db::IN_MEMORY_PATH.to_string(),
				pool_max_conns: 1,
				busy_timeout_ms: 5_000,
			},
		},
		remote: quire_config::Remote {
			api_base: "http://127.0.0.1:9".to_string(),
			api_key: None,
			timeout_ms: 1_000,
			default_headers: Map::new(),
		},
		providers: quire_config::Providers {
			embedding: quire_config::EmbeddingProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:9".to_string(),
				api_key: "test-key".to_string(),
				path: "/embeddings".to_string(),
				model: "test-embedding".to_string(),
				dimensions: 8,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
		},
		outbox: quire_config::Outbox::default(),
		sync: quire_config::Sync::default(),
		embedding: quire_config::Embedding::default(),
		search: quire_config::Search::default(),
	}
}

pub fn note(id: &str, content: &str, folder_id: Option<&str>, updated_at: i64) -> Note {
	Note {
		id: id.to_string(),
		title: quire_domain::note::extract_title(content),
		content: content.to_string(),
		folder_id: folder_id.map(str::to_string),
		created_at: updated_at,
		updated_at,
	}
}

pub fn folder(id: &str, parent_id: Option<&str>) -> Folder {
	Folder {
		id: id.to_string(),
		name: format!("Folder {id}"),
		parent_id: parent_id.map(str::to_string),
		created_at: 0,
		updated_at: 0,
	}
}

pub fn remote_note(id: &str, content: &str, updated_at: RemoteTimestamp) -> RemoteNote {
	RemoteNote {
		id: id.to_string(),
		title: quire_domain::note::extract_title(content),
		content: content.to_string(),
		folder_id: None,
		created_at: updated_at.clone(),
		updated_at,
	}
}
