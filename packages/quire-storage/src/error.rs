#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error("Duplicate outbox op id {0}.")]
	DuplicateOp(String),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Corrupt row: {0}")]
	Corrupt(String),
	#[error(transparent)]
	Domain(#[from] quire_domain::Error),
}
