pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid payload for {op_type}: {message}")]
	InvalidPayload { op_type: &'static str, message: String },
	#[error("Invalid timestamp {value:?}.")]
	InvalidTimestamp { value: String },
}
