use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpType {
	NoteCreate,
	NoteUpdate,
	NoteMove,
	NoteDelete,
	ThreadUpdate,
	ThreadDelete,
}
impl OpType {
	pub const ALL: [Self; 6] = [
		Self::NoteCreate,
		Self::NoteUpdate,
		Self::NoteMove,
		Self::NoteDelete,
		Self::ThreadUpdate,
		Self::ThreadDelete,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::NoteCreate => "note.create",
			Self::NoteUpdate => "note.update",
			Self::NoteMove => "note.move",
			Self::NoteDelete => "note.delete",
			Self::ThreadUpdate => "thread.update",
			Self::ThreadDelete => "thread.delete",
		}
	}

	pub fn is_delete(self) -> bool {
		matches!(self, Self::NoteDelete | Self::ThreadDelete)
	}
}
impl fmt::Display for OpType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for OpType {
	type Err = String;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|op_type| op_type.as_str() == raw)
			.ok_or_else(|| format!("Unknown outbox op type {raw:?}."))
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteDraft {
	pub id: String,
	pub title: String,
	pub content: String,
	pub folder_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePatch {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub content: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteMove {
	/// Destination folder; `None` moves the note to the root.
	pub folder_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadPatch {
	pub title: String,
}

/// Mutation payload, keyed by op type on the wire and in the outbox table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OpPayload {
	#[serde(rename = "note.create")]
	NoteCreate(NoteDraft),
	#[serde(rename = "note.update")]
	NoteUpdate(NotePatch),
	#[serde(rename = "note.move")]
	NoteMove(NoteMove),
	#[serde(rename = "note.delete")]
	NoteDelete,
	#[serde(rename = "thread.update")]
	ThreadUpdate(ThreadPatch),
	#[serde(rename = "thread.delete")]
	ThreadDelete,
}
impl OpPayload {
	pub fn op_type(&self) -> OpType {
		match self {
			Self::NoteCreate(_) => OpType::NoteCreate,
			Self::NoteUpdate(_) => OpType::NoteUpdate,
			Self::NoteMove(_) => OpType::NoteMove,
			Self::NoteDelete => OpType::NoteDelete,
			Self::ThreadUpdate(_) => OpType::ThreadUpdate,
			Self::ThreadDelete => OpType::ThreadDelete,
		}
	}

	/// Boundary check applied before an op is persisted.
	pub fn validate(&self, entity_id: &str) -> Result<()> {
		let op_type = self.op_type().as_str();
		let invalid =
			|message: &str| Error::InvalidPayload { op_type, message: message.to_string() };

		if entity_id.trim().is_empty() {
			return Err(invalid("entity id must be non-empty."));
		}

		match self {
			Self::NoteCreate(draft) =>
				if draft.id != entity_id {
					return Err(invalid("draft id must match the entity id."));
				},
			Self::NoteUpdate(patch) =>
				if patch.title.is_none() && patch.content.is_none() {
					return Err(invalid("patch must change the title or the content."));
				},
			Self::NoteMove(dest) =>
				if dest.folder_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
					return Err(invalid("destination folder id must be non-empty."));
				},
			Self::ThreadUpdate(patch) =>
				if patch.title.trim().is_empty() {
					return Err(invalid("thread title must be non-empty."));
				},
			Self::NoteDelete | Self::ThreadDelete => {},
		}

		Ok(())
	}

	/// Folds a later payload for the same entity into this one. Returns `false` when the two
	/// payloads cannot be combined and `incoming` needs its own op.
	pub fn absorb(&mut self, incoming: &OpPayload) -> bool {
		match (self, incoming) {
			(Self::NoteCreate(draft), Self::NoteUpdate(patch)) => {
				if let Some(title) = &patch.title {
					draft.title = title.clone();
				}
				if let Some(content) = &patch.content {
					draft.content = content.clone();
				}

				true
			},
			(Self::NoteCreate(draft), Self::NoteMove(dest)) => {
				draft.folder_id = dest.folder_id.clone();

				true
			},
			(Self::NoteUpdate(current), Self::NoteUpdate(patch)) => {
				if patch.title.is_some() {
					current.title = patch.title.clone();
				}
				if patch.content.is_some() {
					current.content = patch.content.clone();
				}

				true
			},
			(Self::NoteMove(current), Self::NoteMove(dest)) => {
				current.folder_id = dest.folder_id.clone();

				true
			},
			(Self::ThreadUpdate(current), Self::ThreadUpdate(patch)) => {
				current.title = patch.title.clone();

				true
			},
			_ => false,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpStatus {
	Pending,
	Processing,
}
impl OpStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Processing => "processing",
		}
	}
}
impl FromStr for OpStatus {
	type Err = String;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw {
			"pending" => Ok(Self::Pending),
			"processing" => Ok(Self::Processing),
			other => Err(format!("Unknown outbox status {other:?}.")),
		}
	}
}

/// Why an op stopped being retried automatically and now waits for the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attention {
	/// Transient failures outlasted the retry budget.
	RetriesExhausted,
	/// The server refused the op outright (revoked access or missing entity).
	Rejected,
	/// The stored row no longer decodes into an op.
	Corrupt,
}
impl Attention {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::RetriesExhausted => "retries_exhausted",
			Self::Rejected => "rejected",
			Self::Corrupt => "corrupt",
		}
	}
}
impl FromStr for Attention {
	type Err = String;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw {
			"retries_exhausted" => Ok(Self::RetriesExhausted),
			"rejected" => Ok(Self::Rejected),
			"corrupt" => Ok(Self::Corrupt),
			other => Err(format!("Unknown outbox attention flag {other:?}.")),
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct OutboxOp {
	pub op_id: String,
	pub entity_id: String,
	pub payload: OpPayload,
	pub status: OpStatus,
	pub retry_count: u32,
	pub next_retry_at: i64,
	pub created_at: i64,
	pub updated_at: i64,
	pub last_error: Option<String>,
	pub attention: Option<Attention>,
}
impl OutboxOp {
	pub fn new(
		op_id: impl Into<String>,
		entity_id: impl Into<String>,
		payload: OpPayload,
		now: i64,
	) -> Self {
		Self {
			op_id: op_id.into(),
			entity_id: entity_id.into(),
			payload,
			status: OpStatus::Pending,
			retry_count: 0,
			next_retry_at: now,
			created_at: now,
			updated_at: now,
			last_error: None,
			attention: None,
		}
	}

	pub fn op_type(&self) -> OpType {
		self.payload.op_type()
	}

	pub fn needs_attention(&self) -> bool {
		self.attention.is_some()
	}
}
