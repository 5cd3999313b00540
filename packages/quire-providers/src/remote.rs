use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use quire_domain::{
	note::Note,
	outbox::{NoteDraft, NoteMove, NotePatch, ThreadPatch},
	timestamp::RemoteTimestamp,
};

use crate::{BoxFuture, Error, RemoteNotes, Result};

/// A note as the server reports it. Timestamps arrive in whatever form the server emits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteNote {
	pub id: String,
	pub title: String,
	pub content: String,
	#[serde(default)]
	pub folder_id: Option<String>,
	pub created_at: RemoteTimestamp,
	pub updated_at: RemoteTimestamp,
}
impl RemoteNote {
	pub fn into_note(self) -> quire_domain::Result<Note> {
		Ok(Note {
			created_at: self.created_at.to_millis()?,
			updated_at: self.updated_at.to_millis()?,
			id: self.id,
			title: self.title,
			content: self.content,
			folder_id: self.folder_id,
		})
	}
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NoteListing {
	pub notes: Vec<RemoteNote>,
	/// Present when the server supports incremental listing.
	pub next_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListingBody {
	Page {
		notes: Vec<RemoteNote>,
		#[serde(default, rename = "nextCursor")]
		next_cursor: Option<String>,
	},
	Full(Vec<RemoteNote>),
}
impl From<ListingBody> for NoteListing {
	fn from(body: ListingBody) -> Self {
		match body {
			ListingBody::Page { notes, next_cursor } => Self { notes, next_cursor },
			ListingBody::Full(notes) => Self { notes, next_cursor: None },
		}
	}
}

pub struct HttpRemote {
	client: Client,
	api_base: String,
}
impl HttpRemote {
	pub fn new(cfg: &quire_config::Remote) -> Result<Self> {
		let headers = crate::auth_headers(cfg.api_key.as_deref(), &cfg.default_headers)?;
		let client = Client::builder()
			.timeout(Duration::from_millis(cfg.timeout_ms))
			.default_headers(headers)
			.build()?;

		Ok(Self { client, api_base: cfg.api_base.trim_end_matches('/').to_string() })
	}

	fn url(&self, path: &str) -> String {
		format!("{}{path}", self.api_base)
	}

	async fn list(&self, cursor: Option<&str>) -> Result<NoteListing> {
		let mut request = self.client.get(self.url("/notes"));

		if let Some(cursor) = cursor {
			request = request.query(&[("cursor", cursor)]);
		}

		parse_listing(&send(request).await?)
	}

	async fn execute(&self, request: RequestBuilder) -> Result<()> {
		send(request).await.map(|_| ())
	}
}
impl RemoteNotes for HttpRemote {
	fn list_notes<'a>(&'a self, cursor: Option<&'a str>) -> BoxFuture<'a, Result<NoteListing>> {
		Box::pin(self.list(cursor))
	}

	fn create_note<'a>(&'a self, draft: &'a NoteDraft) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.execute(self.client.post(self.url("/notes")).json(draft)))
	}

	fn update_note<'a>(&'a self, id: &'a str, patch: &'a NotePatch) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.execute(self.client.patch(self.url(&format!("/notes/{id}"))).json(patch)))
	}

	fn move_note<'a>(&'a self, id: &'a str, dest: &'a NoteMove) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.execute(self.client.patch(self.url(&format!("/notes/{id}"))).json(dest)))
	}

	fn delete_note<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.execute(self.client.delete(self.url(&format!("/notes/{id}")))))
	}

	fn update_thread<'a>(
		&'a self,
		id: &'a str,
		patch: &'a ThreadPatch,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.execute(self.client.patch(self.url(&format!("/threads/{id}"))).json(patch)))
	}

	fn delete_thread<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.execute(self.client.delete(self.url(&format!("/threads/{id}")))))
	}
}

async fn send(request: RequestBuilder) -> Result<String> {
	let res = request.send().await?;
	let status = res.status();
	let body = res.text().await?;

	if !status.is_success() {
		tracing::debug!(status = status.as_u16(), "Remote request failed.");

		return Err(Error::from_status(status.as_u16(), &body));
	}

	Ok(body)
}

pub fn parse_listing(body: &str) -> Result<NoteListing> {
	serde_json::from_str::<ListingBody>(body)
		.map(NoteListing::from)
		.map_err(|err| Error::InvalidResponse {
			message: format!("Malformed note listing: {err}."),
		})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bare_array_is_a_full_listing() {
		let listing = parse_listing(
			r#"[{"id":"n1","title":"T","content":"C","folderId":null,"createdAt":1,"updatedAt":2}]"#,
		)
		.expect("parse failed");

		assert_eq!(listing.notes.len(), 1);
		assert_eq!(listing.next_cursor, None);
	}

	#[test]
	fn paged_listing_carries_cursor() {
		let listing = parse_listing(r#"{"notes":[],"nextCursor":"c-2"}"#).expect("parse failed");

		assert!(listing.notes.is_empty());
		assert_eq!(listing.next_cursor.as_deref(), Some("c-2"));
	}

	#[test]
	fn mixed_timestamp_forms_normalize() {
		let body = r#"[{
			"id": "n1",
			"title": "T",
			"content": "C",
			"createdAt": "2024-01-01T00:00:00Z",
			"updatedAt": "1704067200500"
		}]"#;
		let listing = parse_listing(body).expect("parse failed");
		let note = listing.notes[0].clone().into_note().expect("normalize failed");

		assert_eq!(note.created_at, 1_704_067_200_000);
		assert_eq!(note.updated_at, 1_704_067_200_500);
		assert_eq!(note.folder_id, None);
	}

	#[test]
	fn garbage_is_an_invalid_response() {
		assert!(matches!(parse_listing("{\"items\":1}"), Err(Error::InvalidResponse { .. })));
	}
}
