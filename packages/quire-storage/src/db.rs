use std::{str::FromStr, time::Duration};

use sqlx::{
	Sqlite, SqliteConnection, SqlitePool, Transaction,
	pool::PoolConnection,
	sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use tokio::sync::{Mutex, MutexGuard};

use crate::{Result, schema};

pub const IN_MEMORY_PATH: &str = ":memory:";

/// Local store handle. Reads may use any pooled connection; every write goes through
/// [`Db::begin_write`], which serializes writers behind a process-wide gate.
pub struct Db {
	pub pool: SqlitePool,
	write_gate: Mutex<()>,
}
impl Db {
	pub async fn connect(cfg: &quire_config::Sqlite) -> Result<Self> {
		let busy_timeout = Duration::from_millis(cfg.busy_timeout_ms);

		if cfg.path.trim() == IN_MEMORY_PATH {
			return Self::connect_in_memory(busy_timeout).await;
		}

		let options = SqliteConnectOptions::new()
			.filename(&cfg.path)
			.create_if_missing(true)
			.journal_mode(SqliteJournalMode::Wal)
			.busy_timeout(busy_timeout);
		let pool = SqlitePoolOptions::new()
			.max_connections(cfg.pool_max_conns)
			.connect_with(options)
			.await?;

		tracing::info!(path = %cfg.path, max_conns = cfg.pool_max_conns, "Opened local store.");

		Ok(Self { pool, write_gate: Mutex::new(()) })
	}

	/// Every in-memory connection is its own database, so the pool pins exactly one connection
	/// for the lifetime of the handle.
	pub async fn connect_in_memory(busy_timeout: Duration) -> Result<Self> {
		let options = SqliteConnectOptions::from_str("sqlite::memory:")?.busy_timeout(busy_timeout);
		let pool = SqlitePoolOptions::new()
			.max_connections(1)
			.min_connections(1)
			.idle_timeout(None)
			.max_lifetime(None)
			.connect_with(options)
			.await?;

		Ok(Self { pool, write_gate: Mutex::new(()) })
	}

	pub async fn ensure_schema(&self) -> Result<()> {
		let statements = schema::statements();
		let mut tx = self.begin_write().await?;

		for statement in &statements {
			sqlx::query(statement).execute(tx.conn()).await?;
		}

		tx.commit().await?;

		tracing::debug!(statements = statements.len(), "Local store schema ensured.");

		Ok(())
	}

	/// A connection for reads outside a write transaction. Do not hold one across
	/// [`Db::begin_write`] on an in-memory store; the pool only has a single connection.
	pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
		Ok(self.pool.acquire().await?)
	}

	pub async fn begin_write(&self) -> Result<WriteTx<'_>> {
		let gate = self.write_gate.lock().await;
		let tx = self.pool.begin().await?;

		Ok(WriteTx { tx, _gate: gate })
	}
}

/// A transaction holding the write gate. Dropping it without [`WriteTx::commit`] rolls back.
pub struct WriteTx<'a> {
	tx: Transaction<'static, Sqlite>,
	_gate: MutexGuard<'a, ()>,
}
impl WriteTx<'_> {
	pub fn conn(&mut self) -> &mut SqliteConnection {
		&mut self.tx
	}

	pub async fn commit(self) -> Result<()> {
		self.tx.commit().await?;

		Ok(())
	}
}
