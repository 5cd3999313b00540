pub mod db;
pub mod folders;
pub mod models;
pub mod notes;
pub mod outbox;
pub mod schema;
pub mod sync_state;
pub mod vectors;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Rows per multi-value statement; keeps bound parameters well under SQLite's variable limit.
pub(crate) const BATCH_ROWS: usize = 500;
