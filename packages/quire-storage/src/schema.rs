const TABLES: [(&str, &str); 5] = [
	("001_notes", include_str!("../../../sql/tables/001_notes.sql")),
	("002_folders", include_str!("../../../sql/tables/002_folders.sql")),
	("003_outbox", include_str!("../../../sql/tables/003_outbox.sql")),
	("004_message_vectors", include_str!("../../../sql/tables/004_message_vectors.sql")),
	("005_sync_state", include_str!("../../../sql/tables/005_sync_state.sql")),
];

pub fn render_schema() -> String {
	let mut out = String::new();

	for (name, sql) in TABLES {
		out.push_str("-- ");
		out.push_str(name);
		out.push('\n');
		out.push_str(sql);
		out.push('\n');
	}

	out
}

/// Individual statements of the rendered schema, comments stripped.
pub fn statements() -> Vec<String> {
	render_schema()
		.split(';')
		.map(|statement| {
			statement
				.lines()
				.filter(|line| !line.trim_start().starts_with("--"))
				.collect::<Vec<_>>()
				.join("\n")
		})
		.map(|statement| statement.trim().to_string())
		.filter(|statement| !statement.is_empty())
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn every_table_is_created() {
		let statements = statements();

		for table in ["notes", "folders", "outbox", "message_vectors", "sync_state"] {
			let needle = format!("CREATE TABLE IF NOT EXISTS {table} (");

			assert!(
				statements.iter().any(|statement| statement.starts_with(&needle)),
				"missing table {table}"
			);
		}
	}

	#[test]
	fn comments_are_not_statements() {
		assert!(statements().iter().all(|statement| !statement.starts_with("--")));
	}
}
