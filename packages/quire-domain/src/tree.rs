//! Folder hierarchy assembly.
//!
//! Parent and folder references are weak: a folder whose parent is unknown, or a note whose folder
//! is unknown, stays indexed under that key in `folder_children`/`folder_notes` and is reported as
//! detached instead of failing the build. Nothing detached appears in the root lists.

use std::collections::{HashMap, HashSet};

use crate::note::{Folder, Note};

/// Longest parent chain walked before a chain is treated as cyclic.
pub const MAX_FOLDER_DEPTH: usize = 64;

#[derive(Debug, Default)]
pub struct FolderTree {
	pub root_folders: Vec<Folder>,
	pub root_notes: Vec<Note>,
	pub folder_map: HashMap<String, Folder>,
	pub folder_children: HashMap<String, Vec<Folder>>,
	pub folder_notes: HashMap<String, Vec<Note>>,
}
impl FolderTree {
	pub fn build(folders: Vec<Folder>, notes: Vec<Note>) -> Self {
		let mut tree = Self::default();

		for folder in folders {
			match folder.parent_id.clone() {
				None => tree.root_folders.push(folder.clone()),
				Some(parent_id) =>
					tree.folder_children.entry(parent_id).or_default().push(folder.clone()),
			}

			tree.folder_map.insert(folder.id.clone(), folder);
		}
		for note in notes {
			match note.folder_id.clone() {
				None => tree.root_notes.push(note),
				Some(folder_id) => tree.folder_notes.entry(folder_id).or_default().push(note),
			}
		}

		tree
	}

	pub fn children(&self, folder_id: &str) -> &[Folder] {
		self.folder_children.get(folder_id).map(Vec::as_slice).unwrap_or_default()
	}

	pub fn notes_in(&self, folder_id: &str) -> &[Note] {
		self.folder_notes.get(folder_id).map(Vec::as_slice).unwrap_or_default()
	}

	/// Bucket keys under `folder_children` that name no known folder.
	pub fn detached_parent_keys(&self) -> Vec<&str> {
		let mut keys: Vec<&str> = self
			.folder_children
			.keys()
			.filter(|key| !self.folder_map.contains_key(*key))
			.map(String::as_str)
			.collect();

		keys.sort_unstable();

		keys
	}

	/// Notes whose folder reference points at a folder that does not exist locally.
	pub fn detached_notes(&self) -> Vec<&Note> {
		let mut notes: Vec<&Note> = self
			.folder_notes
			.iter()
			.filter(|(key, _)| !self.folder_map.contains_key(*key))
			.flat_map(|(_, notes)| notes.iter())
			.collect();

		notes.sort_by(|a, b| a.id.cmp(&b.id));

		notes
	}

	/// Ids from `folder_id` up to its root, inclusive. `None` for unknown folders, dangling
	/// parents, cycles, and chains deeper than [`MAX_FOLDER_DEPTH`].
	pub fn path_to_root(&self, folder_id: &str) -> Option<Vec<String>> {
		let mut path = Vec::new();
		let mut seen = HashSet::new();
		let mut cursor = self.folder_map.get(folder_id)?;

		loop {
			if !seen.insert(cursor.id.as_str()) || path.len() >= MAX_FOLDER_DEPTH {
				return None;
			}

			path.push(cursor.id.clone());

			match cursor.parent_id.as_deref() {
				None => return Some(path),
				Some(parent_id) => cursor = self.folder_map.get(parent_id)?,
			}
		}
	}

	/// True when `candidate` is `folder_id` itself or sits anywhere below it.
	pub fn is_descendant_or_self(&self, candidate: &str, folder_id: &str) -> bool {
		let mut seen = HashSet::new();
		let mut cursor = Some(candidate);

		while let Some(id) = cursor {
			if id == folder_id {
				return true;
			}
			if !seen.insert(id) || seen.len() > MAX_FOLDER_DEPTH {
				return false;
			}

			cursor = self.folder_map.get(id).and_then(|folder| folder.parent_id.as_deref());
		}

		false
	}
}
