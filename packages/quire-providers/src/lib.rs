pub mod embedding;
pub mod remote;

mod error;

pub use error::{Error, Result};

use std::{future::Future, pin::Pin, sync::Arc};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName};
use serde_json::{Map, Value};

use quire_domain::outbox::{NoteDraft, NoteMove, NotePatch, ThreadPatch};

use crate::remote::NoteListing;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The server side of note and thread sync.
pub trait RemoteNotes
where
	Self: Send + Sync,
{
	/// One page of the server's notes. `cursor` resumes after a previous page.
	fn list_notes<'a>(&'a self, cursor: Option<&'a str>) -> BoxFuture<'a, Result<NoteListing>>;

	fn create_note<'a>(&'a self, draft: &'a NoteDraft) -> BoxFuture<'a, Result<()>>;

	fn update_note<'a>(&'a self, id: &'a str, patch: &'a NotePatch) -> BoxFuture<'a, Result<()>>;

	fn move_note<'a>(&'a self, id: &'a str, dest: &'a NoteMove) -> BoxFuture<'a, Result<()>>;

	fn delete_note<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>>;

	fn update_thread<'a>(
		&'a self,
		id: &'a str,
		patch: &'a ThreadPatch,
	) -> BoxFuture<'a, Result<()>>;

	fn delete_thread<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>>;
}

pub trait EmbeddingEngine
where
	Self: Send + Sync,
{
	/// Identifies the vectors this engine produces; stored next to every vector.
	fn model(&self) -> &str;

	/// One vector per input, in input order.
	fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

/// Builds an engine on first use. Loading may be expensive (model weights, warm-up requests).
pub trait EngineLoader
where
	Self: Send + Sync,
{
	fn load(&self) -> BoxFuture<'_, Result<Arc<dyn EmbeddingEngine>>>;
}

pub fn auth_headers(
	api_key: Option<&str>,
	default_headers: &Map<String, Value>,
) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	if let Some(api_key) = api_key {
		headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);
	}

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}
