use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use quire_domain::note::Note;

use crate::{BATCH_ROWS, Result, models::NoteRow};

const NOTE_COLUMNS: &str = "id, title, content, folder_id, created_at, updated_at";

pub async fn get(conn: &mut SqliteConnection, id: &str) -> Result<Option<Note>> {
	let sql = format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1");
	let row: Option<NoteRow> = sqlx::query_as(&sql).bind(id).fetch_optional(conn).await?;

	Ok(row.map(Note::from))
}

pub async fn put(conn: &mut SqliteConnection, note: &Note) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO notes (id, title, content, folder_id, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(id) DO UPDATE SET
	title = excluded.title,
	content = excluded.content,
	folder_id = excluded.folder_id,
	created_at = excluded.created_at,
	updated_at = excluded.updated_at",
	)
	.bind(note.id.as_str())
	.bind(note.title.as_str())
	.bind(note.content.as_str())
	.bind(note.folder_id.as_deref())
	.bind(note.created_at)
	.bind(note.updated_at)
	.execute(conn)
	.await?;

	Ok(())
}

pub async fn bulk_put(conn: &mut SqliteConnection, notes: &[Note]) -> Result<u64> {
	let mut written = 0;

	for chunk in notes.chunks(BATCH_ROWS) {
		let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
			"INSERT INTO notes (id, title, content, folder_id, created_at, updated_at) ",
		);

		builder.push_values(chunk, |mut row, note| {
			row.push_bind(note.id.as_str())
				.push_bind(note.title.as_str())
				.push_bind(note.content.as_str())
				.push_bind(note.folder_id.as_deref())
				.push_bind(note.created_at)
				.push_bind(note.updated_at);
		});
		builder.push(
			" ON CONFLICT(id) DO UPDATE SET title = excluded.title, content = excluded.content, \
			 folder_id = excluded.folder_id, created_at = excluded.created_at, \
			 updated_at = excluded.updated_at",
		);

		written += builder.build().execute(&mut *conn).await?.rows_affected();
	}

	Ok(written)
}

pub async fn delete(conn: &mut SqliteConnection, id: &str) -> Result<bool> {
	let result = sqlx::query("DELETE FROM notes WHERE id = ?1").bind(id).execute(conn).await?;

	Ok(result.rows_affected() > 0)
}

/// `updated_at` of the stored notes among `ids`; unknown ids are absent.
pub async fn updated_at_by_id(
	conn: &mut SqliteConnection,
	ids: &[String],
) -> Result<HashMap<String, i64>> {
	let mut out = HashMap::with_capacity(ids.len());

	for chunk in ids.chunks(BATCH_ROWS) {
		let mut builder: QueryBuilder<Sqlite> =
			QueryBuilder::new("SELECT id, updated_at FROM notes WHERE id IN (");
		let mut separated = builder.separated(", ");

		for id in chunk {
			separated.push_bind(id.as_str());
		}

		separated.push_unseparated(")");

		let rows: Vec<(String, i64)> = builder.build_query_as().fetch_all(&mut *conn).await?;

		out.extend(rows);
	}

	Ok(out)
}

/// All notes, most recently updated first.
pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<Note>> {
	let sql = format!("SELECT {NOTE_COLUMNS} FROM notes ORDER BY updated_at DESC, id ASC");
	let rows: Vec<NoteRow> = sqlx::query_as(&sql).fetch_all(conn).await?;

	Ok(rows.into_iter().map(Note::from).collect())
}

/// Notes directly inside `folder_id`; `None` lists root notes.
pub async fn list_in_folder(
	conn: &mut SqliteConnection,
	folder_id: Option<&str>,
) -> Result<Vec<Note>> {
	let sql = format!(
		"SELECT {NOTE_COLUMNS} FROM notes WHERE folder_id IS ?1 ORDER BY updated_at DESC, id ASC"
	);
	let rows: Vec<NoteRow> = sqlx::query_as(&sql).bind(folder_id).fetch_all(conn).await?;

	Ok(rows.into_iter().map(Note::from).collect())
}

pub async fn query<F>(conn: &mut SqliteConnection, predicate: F) -> Result<Vec<Note>>
where
	F: Fn(&Note) -> bool,
{
	Ok(list(conn).await?.into_iter().filter(|note| predicate(note)).collect())
}
