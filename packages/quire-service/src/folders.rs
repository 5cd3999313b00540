//! Folders live only on this device; moving notes out of a deleted folder is what reaches the
//! server.

use std::collections::{HashSet, VecDeque};

use quire_domain::{
	note::Folder,
	outbox::{NoteMove, OpPayload},
	tree::FolderTree,
};
use quire_storage::{db::WriteTx, folders, notes, outbox};

use crate::{Error, QuireService, Result};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FolderDeleteReport {
	pub folders_removed: usize,
	pub notes_moved: usize,
}

impl QuireService {
	pub async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<Folder> {
		let name = validate_name(name)?;
		let now = self.now();
		let folder = Folder {
			id: crate::new_id(),
			name,
			parent_id: parent_id.map(str::to_string),
			created_at: now,
			updated_at: now,
		};
		let mut tx = self.db.begin_write().await?;

		if let Some(parent_id) = parent_id {
			load_folder(&mut tx, parent_id).await?;
		}

		folders::put(tx.conn(), &folder).await?;
		tx.commit().await?;

		Ok(folder)
	}

	pub async fn rename_folder(&self, id: &str, name: &str) -> Result<Folder> {
		let name = validate_name(name)?;
		let mut tx = self.db.begin_write().await?;
		let mut folder = load_folder(&mut tx, id).await?;

		folder.name = name;
		folder.updated_at = self.now();

		folders::put(tx.conn(), &folder).await?;
		tx.commit().await?;

		Ok(folder)
	}

	/// Re-parents a folder. Moving a folder under itself or one of its descendants is refused.
	pub async fn move_folder(&self, id: &str, parent_id: Option<&str>) -> Result<Folder> {
		let mut tx = self.db.begin_write().await?;
		let mut folder = load_folder(&mut tx, id).await?;

		if let Some(parent_id) = parent_id {
			load_folder(&mut tx, parent_id).await?;

			let tree = FolderTree::build(folders::list(tx.conn()).await?, Vec::new());

			if tree.is_descendant_or_self(parent_id, id) {
				return Err(Error::InvalidRequest {
					message: format!("folder {id} cannot move under {parent_id}."),
				});
			}
		}

		folder.parent_id = parent_id.map(str::to_string);
		folder.updated_at = self.now();

		folders::put(tx.conn(), &folder).await?;
		tx.commit().await?;

		Ok(folder)
	}

	/// Deletes a folder with all of its descendants. Notes inside them move to the root.
	pub async fn delete_folder(&self, id: &str) -> Result<FolderDeleteReport> {
		let now = self.now();
		let mut tx = self.db.begin_write().await?;

		load_folder(&mut tx, id).await?;

		let tree = FolderTree::build(folders::list(tx.conn()).await?, Vec::new());
		let doomed = subtree(&tree, id);
		let mut report = FolderDeleteReport::default();

		for folder_id in &doomed {
			for mut note in notes::list_in_folder(tx.conn(), Some(folder_id)).await? {
				note.folder_id = None;
				note.updated_at = now;

				notes::put(tx.conn(), &note).await?;
				outbox::enqueue_coalesced(
					tx.conn(),
					&crate::new_id(),
					&note.id,
					OpPayload::NoteMove(NoteMove { folder_id: None }),
					now,
				)
				.await?;

				report.notes_moved += 1;
			}

			if folders::delete(tx.conn(), folder_id).await? {
				report.folders_removed += 1;
			}
		}

		tx.commit().await?;

		tracing::info!(
			folder_id = id,
			folders_removed = report.folders_removed,
			notes_moved = report.notes_moved,
			"Deleted folder."
		);

		Ok(report)
	}

	pub async fn folder_tree(&self) -> Result<FolderTree> {
		let mut conn = self.db.acquire().await?;
		let all_folders = folders::list(&mut conn).await?;
		let all_notes = notes::list(&mut conn).await?;

		Ok(FolderTree::build(all_folders, all_notes))
	}
}

fn validate_name(name: &str) -> Result<String> {
	let trimmed = name.trim();

	if trimmed.is_empty() {
		return Err(Error::InvalidRequest { message: "folder name must be non-empty.".to_string() });
	}

	Ok(trimmed.to_string())
}

async fn load_folder(tx: &mut WriteTx<'_>, id: &str) -> Result<Folder> {
	folders::get(tx.conn(), id)
		.await?
		.ok_or_else(|| Error::NotFound { message: format!("folder {id}") })
}

/// `root` and everything below it, parents before children.
fn subtree(tree: &FolderTree, root: &str) -> Vec<String> {
	let mut out = Vec::new();
	let mut seen = HashSet::new();
	let mut queue = VecDeque::from([root.to_string()]);

	while let Some(id) = queue.pop_front() {
		if !seen.insert(id.clone()) {
			continue;
		}

		queue.extend(tree.children(&id).iter().map(|child| child.id.clone()));
		out.push(id);
	}

	out
}
