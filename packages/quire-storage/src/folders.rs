use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use quire_domain::note::Folder;

use crate::{BATCH_ROWS, Result, models::FolderRow};

const FOLDER_COLUMNS: &str = "id, name, parent_id, created_at, updated_at";

pub async fn get(conn: &mut SqliteConnection, id: &str) -> Result<Option<Folder>> {
	let sql = format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE id = ?1");
	let row: Option<FolderRow> = sqlx::query_as(&sql).bind(id).fetch_optional(conn).await?;

	Ok(row.map(Folder::from))
}

pub async fn put(conn: &mut SqliteConnection, folder: &Folder) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO folders (id, name, parent_id, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5)
ON CONFLICT(id) DO UPDATE SET
	name = excluded.name,
	parent_id = excluded.parent_id,
	created_at = excluded.created_at,
	updated_at = excluded.updated_at",
	)
	.bind(folder.id.as_str())
	.bind(folder.name.as_str())
	.bind(folder.parent_id.as_deref())
	.bind(folder.created_at)
	.bind(folder.updated_at)
	.execute(conn)
	.await?;

	Ok(())
}

pub async fn bulk_put(conn: &mut SqliteConnection, folders: &[Folder]) -> Result<u64> {
	let mut written = 0;

	for chunk in folders.chunks(BATCH_ROWS) {
		let mut builder: QueryBuilder<Sqlite> =
			QueryBuilder::new("INSERT INTO folders (id, name, parent_id, created_at, updated_at) ");

		builder.push_values(chunk, |mut row, folder| {
			row.push_bind(folder.id.as_str())
				.push_bind(folder.name.as_str())
				.push_bind(folder.parent_id.as_deref())
				.push_bind(folder.created_at)
				.push_bind(folder.updated_at);
		});
		builder.push(
			" ON CONFLICT(id) DO UPDATE SET name = excluded.name, parent_id = excluded.parent_id, \
			 created_at = excluded.created_at, updated_at = excluded.updated_at",
		);

		written += builder.build().execute(&mut *conn).await?.rows_affected();
	}

	Ok(written)
}

pub async fn delete(conn: &mut SqliteConnection, id: &str) -> Result<bool> {
	let result = sqlx::query("DELETE FROM folders WHERE id = ?1").bind(id).execute(conn).await?;

	Ok(result.rows_affected() > 0)
}

pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<Folder>> {
	let sql = format!("SELECT {FOLDER_COLUMNS} FROM folders ORDER BY name ASC, id ASC");
	let rows: Vec<FolderRow> = sqlx::query_as(&sql).fetch_all(conn).await?;

	Ok(rows.into_iter().map(Folder::from).collect())
}

/// Direct children of `parent_id`; `None` lists root folders.
pub async fn list_children(
	conn: &mut SqliteConnection,
	parent_id: Option<&str>,
) -> Result<Vec<Folder>> {
	let sql = format!(
		"SELECT {FOLDER_COLUMNS} FROM folders WHERE parent_id IS ?1 ORDER BY name ASC, id ASC"
	);
	let rows: Vec<FolderRow> = sqlx::query_as(&sql).bind(parent_id).fetch_all(conn).await?;

	Ok(rows.into_iter().map(Folder::from).collect())
}

pub async fn query<F>(conn: &mut SqliteConnection, predicate: F) -> Result<Vec<Folder>>
where
	F: Fn(&Folder) -> bool,
{
	Ok(list(conn).await?.into_iter().filter(|folder| predicate(folder)).collect())
}
