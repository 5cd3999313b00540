use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const UNTITLED: &str = "Untitled";

static HEADING_PREFIX: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^#+\s*").expect("Heading prefix pattern must compile."));

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
	pub id: String,
	pub title: String,
	pub content: String,
	pub folder_id: Option<String>,
	pub created_at: i64,
	pub updated_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
	pub id: String,
	pub name: String,
	pub parent_id: Option<String>,
	pub created_at: i64,
	pub updated_at: i64,
}

/// Derives a note title from the first markdown line, dropping any heading marker.
pub fn extract_title(markdown: &str) -> String {
	let Some(first_line) = markdown.lines().next().map(str::trim) else {
		return UNTITLED.to_string();
	};
	let title = HEADING_PREFIX.replace(first_line, "");
	let title = title.trim();

	if title.is_empty() { UNTITLED.to_string() } else { title.to_string() }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strips_heading_markers() {
		assert_eq!(extract_title("## Weekly plan\nbody"), "Weekly plan");
		assert_eq!(extract_title("#NoSpace"), "NoSpace");
	}

	#[test]
	fn plain_first_line_is_kept() {
		assert_eq!(extract_title("Groceries\n- milk"), "Groceries");
	}

	#[test]
	fn blank_inputs_fall_back() {
		assert_eq!(extract_title(""), UNTITLED);
		assert_eq!(extract_title("   \n# Later heading"), UNTITLED);
		assert_eq!(extract_title("###   "), UNTITLED);
	}

	#[test]
	fn wire_form_is_camel_case() {
		let note = Note {
			id: "n1".to_string(),
			title: "t".to_string(),
			content: "c".to_string(),
			folder_id: None,
			created_at: 1,
			updated_at: 2,
		};
		let json = serde_json::to_value(&note).expect("encode failed");

		assert_eq!(json["folderId"], serde_json::Value::Null);
		assert_eq!(json["updatedAt"], 2);
	}
}
