pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Duplicate outbox op {op_id}.")]
	DuplicateOp { op_id: String },
	#[error("Network error: {message}")]
	Network { message: String },
	#[error("Authorization failed: {message}")]
	Authorization { message: String },
	#[error("Embedding unavailable: {message}")]
	EmbeddingUnavailable { message: String },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
}
impl Error {
	pub(crate) fn embedding(err: impl std::fmt::Display) -> Self {
		Self::EmbeddingUnavailable { message: err.to_string() }
	}
}

impl From<quire_storage::Error> for Error {
	fn from(err: quire_storage::Error) -> Self {
		match err {
			quire_storage::Error::DuplicateOp(op_id) => Self::DuplicateOp { op_id },
			quire_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			quire_storage::Error::NotFound(message) => Self::NotFound { message },
			quire_storage::Error::Domain(inner) =>
				Self::InvalidRequest { message: inner.to_string() },
			quire_storage::Error::Sqlx(_) | quire_storage::Error::Corrupt(_) =>
				Self::Storage { message: err.to_string() },
		}
	}
}

impl From<quire_providers::Error> for Error {
	fn from(err: quire_providers::Error) -> Self {
		use quire_providers::Error as ProviderError;

		match err {
			ProviderError::Authorization { .. } => Self::Authorization { message: err.to_string() },
			ProviderError::Rejected { .. }
			| ProviderError::InvalidConfig { .. }
			| ProviderError::InvalidHeaderName(_)
			| ProviderError::InvalidHeaderValue(_) =>
				Self::InvalidRequest { message: err.to_string() },
			ProviderError::Network { .. }
			| ProviderError::Server { .. }
			| ProviderError::InvalidResponse { .. } => Self::Network { message: err.to_string() },
		}
	}
}
