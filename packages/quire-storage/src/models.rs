use sqlx::FromRow;

use quire_domain::{
	note::{Folder, Note},
	outbox::{Attention, OpPayload, OpStatus, OutboxOp},
	vector::MessageVector,
};

use crate::{Error, Result, vectors};

#[derive(Debug, FromRow)]
pub struct NoteRow {
	pub id: String,
	pub title: String,
	pub content: String,
	pub folder_id: Option<String>,
	pub created_at: i64,
	pub updated_at: i64,
}
impl From<NoteRow> for Note {
	fn from(row: NoteRow) -> Self {
		Self {
			id: row.id,
			title: row.title,
			content: row.content,
			folder_id: row.folder_id,
			created_at: row.created_at,
			updated_at: row.updated_at,
		}
	}
}

#[derive(Debug, FromRow)]
pub struct FolderRow {
	pub id: String,
	pub name: String,
	pub parent_id: Option<String>,
	pub created_at: i64,
	pub updated_at: i64,
}
impl From<FolderRow> for Folder {
	fn from(row: FolderRow) -> Self {
		Self {
			id: row.id,
			name: row.name,
			parent_id: row.parent_id,
			created_at: row.created_at,
			updated_at: row.updated_at,
		}
	}
}

#[derive(Debug, FromRow)]
pub struct OutboxRow {
	pub seq: i64,
	pub op_id: String,
	pub entity_id: String,
	pub op_type: String,
	pub payload: String,
	pub status: String,
	pub retry_count: i64,
	pub next_retry_at: i64,
	pub created_at: i64,
	pub updated_at: i64,
	pub last_error: Option<String>,
	pub attention: Option<String>,
}
impl TryFrom<OutboxRow> for OutboxOp {
	type Error = Error;

	fn try_from(row: OutboxRow) -> Result<Self> {
		let corrupt =
			|message: String| Error::Corrupt(format!("outbox op {}: {message}", row.op_id));
		let payload: OpPayload = serde_json::from_str(&row.payload)
			.map_err(|err| corrupt(format!("payload does not decode: {err}")))?;

		if payload.op_type().as_str() != row.op_type {
			return Err(corrupt(format!(
				"op_type {} does not match payload type {}.",
				row.op_type,
				payload.op_type()
			)));
		}

		let status: OpStatus = row.status.parse().map_err(corrupt)?;
		let attention: Option<Attention> =
			row.attention.as_deref().map(str::parse).transpose().map_err(corrupt)?;
		let retry_count = u32::try_from(row.retry_count)
			.map_err(|_| corrupt(format!("retry_count {} is out of range.", row.retry_count)))?;

		Ok(Self {
			op_id: row.op_id,
			entity_id: row.entity_id,
			payload,
			status,
			retry_count,
			next_retry_at: row.next_retry_at,
			created_at: row.created_at,
			updated_at: row.updated_at,
			last_error: row.last_error,
			attention,
		})
	}
}

#[derive(Debug, FromRow)]
pub struct VectorRow {
	pub id: String,
	pub thread_id: String,
	pub ts: i64,
	pub model: String,
	pub dim: i64,
	pub vec: Vec<u8>,
	pub preview: Option<String>,
	pub content_hash: Option<String>,
}
impl TryFrom<VectorRow> for MessageVector {
	type Error = Error;

	fn try_from(row: VectorRow) -> Result<Self> {
		let vec = vectors::decode_vector(&row.vec)
			.map_err(|message| Error::Corrupt(format!("vector {}: {message}", row.id)))?;

		if i64::try_from(vec.len()).ok() != Some(row.dim) {
			return Err(Error::Corrupt(format!(
				"vector {}: stored dim {} but blob holds {} values.",
				row.id,
				row.dim,
				vec.len()
			)));
		}

		Ok(Self {
			id: row.id,
			thread_id: row.thread_id,
			ts: row.ts,
			model: row.model,
			dim: vec.len(),
			vec,
			preview: row.preview,
			content_hash: row.content_hash,
		})
	}
}
