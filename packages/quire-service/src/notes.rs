use quire_domain::{
	note::{Note, extract_title},
	outbox::{NoteDraft, NoteMove, NotePatch, OpPayload},
};
use quire_storage::{db::WriteTx, folders, notes, outbox};

use crate::{Error, QuireService, Result};

impl QuireService {
	pub async fn create_note(&self, content: &str, folder_id: Option<&str>) -> Result<Note> {
		let now = self.now();
		let note = Note {
			id: crate::new_id(),
			title: extract_title(content),
			content: content.to_string(),
			folder_id: folder_id.map(str::to_string),
			created_at: now,
			updated_at: now,
		};
		let draft = OpPayload::NoteCreate(NoteDraft {
			id: note.id.clone(),
			title: note.title.clone(),
			content: note.content.clone(),
			folder_id: note.folder_id.clone(),
		});
		let mut tx = self.db.begin_write().await?;

		ensure_folder(&mut tx, folder_id).await?;
		notes::put(tx.conn(), &note).await?;
		outbox::enqueue_coalesced(tx.conn(), &crate::new_id(), &note.id, draft, now).await?;
		tx.commit().await?;

		tracing::debug!(note_id = %note.id, "Created note.");

		Ok(note)
	}

	pub async fn update_note(&self, id: &str, content: &str) -> Result<Note> {
		let now = self.now();
		let mut tx = self.db.begin_write().await?;
		let mut note = load_note(&mut tx, id).await?;

		note.title = extract_title(content);
		note.content = content.to_string();
		note.updated_at = now;

		let patch = OpPayload::NoteUpdate(NotePatch {
			title: Some(note.title.clone()),
			content: Some(note.content.clone()),
		});

		notes::put(tx.conn(), &note).await?;
		outbox::enqueue_coalesced(tx.conn(), &crate::new_id(), id, patch, now).await?;
		tx.commit().await?;

		Ok(note)
	}

	/// Moves a note into `folder_id`, or to the root when `None`.
	pub async fn move_note(&self, id: &str, folder_id: Option<&str>) -> Result<Note> {
		let now = self.now();
		let mut tx = self.db.begin_write().await?;
		let mut note = load_note(&mut tx, id).await?;

		ensure_folder(&mut tx, folder_id).await?;

		note.folder_id = folder_id.map(str::to_string);
		note.updated_at = now;

		let dest = OpPayload::NoteMove(NoteMove { folder_id: note.folder_id.clone() });

		notes::put(tx.conn(), &note).await?;
		outbox::enqueue_coalesced(tx.conn(), &crate::new_id(), id, dest, now).await?;
		tx.commit().await?;

		Ok(note)
	}

	pub async fn delete_note(&self, id: &str) -> Result<()> {
		let now = self.now();
		let mut tx = self.db.begin_write().await?;

		if !notes::delete(tx.conn(), id).await? {
			return Err(Error::NotFound { message: format!("note {id}") });
		}

		outbox::enqueue_coalesced(tx.conn(), &crate::new_id(), id, OpPayload::NoteDelete, now)
			.await?;
		tx.commit().await?;

		tracing::debug!(note_id = id, "Deleted note.");

		Ok(())
	}

	pub async fn get_note(&self, id: &str) -> Result<Option<Note>> {
		let mut conn = self.db.acquire().await?;

		Ok(notes::get(&mut conn, id).await?)
	}

	/// Notes ordered by last update, newest first.
	pub async fn list_notes(&self) -> Result<Vec<Note>> {
		let mut conn = self.db.acquire().await?;

		Ok(notes::list(&mut conn).await?)
	}

	pub async fn recent_notes(&self, limit: usize) -> Result<Vec<Note>> {
		let mut recent = self.list_notes().await?;

		recent.truncate(limit);

		Ok(recent)
	}
}

async fn load_note(tx: &mut WriteTx<'_>, id: &str) -> Result<Note> {
	notes::get(tx.conn(), id)
		.await?
		.ok_or_else(|| Error::NotFound { message: format!("note {id}") })
}

async fn ensure_folder(tx: &mut WriteTx<'_>, folder_id: Option<&str>) -> Result<()> {
	let Some(folder_id) = folder_id else {
		return Ok(());
	};

	if folders::get(tx.conn(), folder_id).await?.is_none() {
		return Err(Error::NotFound { message: format!("folder {folder_id}") });
	}

	Ok(())
}
