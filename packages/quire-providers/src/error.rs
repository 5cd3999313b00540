pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// The request never produced a response: connect failure, timeout, reset.
	#[error("Network error: {message}")]
	Network { message: String },
	/// Credentials were refused or the target is gone for good (401, 403, 404, 410).
	#[error("Authorization failed with status {status}: {message}")]
	Authorization { status: u16, message: String },
	/// Any other 4xx.
	#[error("Request rejected with status {status}: {message}")]
	Rejected { status: u16, message: String },
	#[error("Server error with status {status}: {message}")]
	Server { status: u16, message: String },
	#[error("{message}")]
	InvalidResponse { message: String },
	#[error("{message}")]
	InvalidConfig { message: String },
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
}
impl Error {
	pub fn from_status(status: u16, body: &str) -> Self {
		let message = summarize_body(body);

		match status {
			401 | 403 | 404 | 410 => Self::Authorization { status, message },
			400..=499 => Self::Rejected { status, message },
			500..=599 => Self::Server { status, message },
			_ => Self::InvalidResponse {
				message: format!("Unexpected status {status}: {message}"),
			},
		}
	}

	pub fn is_authorization(&self) -> bool {
		matches!(self, Self::Authorization { .. })
	}
}
impl From<reqwest::Error> for Error {
	fn from(err: reqwest::Error) -> Self {
		if err.is_decode() {
			return Self::InvalidResponse { message: err.to_string() };
		}
		if err.is_builder() {
			return Self::InvalidConfig { message: err.to_string() };
		}

		Self::Network { message: err.to_string() }
	}
}

fn summarize_body(body: &str) -> String {
	const MAX_BODY_CHARS: usize = 256;

	let trimmed = body.trim();

	if trimmed.is_empty() {
		return "empty response body".to_string();
	}

	trimmed.chars().take(MAX_BODY_CHARS).collect()
}
