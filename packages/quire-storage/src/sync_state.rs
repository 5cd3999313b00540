use sqlx::SqliteConnection;

use crate::Result;

pub async fn get(conn: &mut SqliteConnection, key: &str) -> Result<Option<String>> {
	let value: Option<String> = sqlx::query_scalar("SELECT value FROM sync_state WHERE key = ?1")
		.bind(key)
		.fetch_optional(conn)
		.await?;

	Ok(value)
}

pub async fn set(conn: &mut SqliteConnection, key: &str, value: &str, now: i64) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO sync_state (key, value, updated_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
	)
	.bind(key)
	.bind(value)
	.bind(now)
	.execute(conn)
	.await?;

	Ok(())
}

pub async fn clear(conn: &mut SqliteConnection, key: &str) -> Result<()> {
	sqlx::query("DELETE FROM sync_state WHERE key = ?1").bind(key).execute(conn).await?;

	Ok(())
}
