//! Message vectors are stored as little-endian `f32` blobs next to their dimension.

use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use quire_domain::vector::MessageVector;

use crate::{BATCH_ROWS, Error, Result, models::VectorRow};

const VECTOR_COLUMNS: &str = "id, thread_id, ts, model, dim, vec, preview, content_hash";

pub fn encode_vector(vec: &[f32]) -> Vec<u8> {
	let mut out = Vec::with_capacity(vec.len() * 4);

	for value in vec {
		out.extend_from_slice(&value.to_le_bytes());
	}

	out
}

pub fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>, String> {
	if bytes.len() % 4 != 0 {
		return Err(format!("blob length {} is not a multiple of 4.", bytes.len()));
	}

	Ok(bytes
		.chunks_exact(4)
		.map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
		.collect())
}

fn validate(row: &MessageVector) -> Result<()> {
	if row.id.trim().is_empty() || row.thread_id.trim().is_empty() {
		return Err(Error::InvalidArgument(
			"vector id and thread id must be non-empty.".to_string(),
		));
	}
	if row.vec.is_empty() || row.dim != row.vec.len() {
		return Err(Error::InvalidArgument(format!(
			"vector {} declares dim {} but holds {} values.",
			row.id,
			row.dim,
			row.vec.len()
		)));
	}
	if row.vec.iter().any(|value| !value.is_finite()) {
		return Err(Error::InvalidArgument(format!("vector {} has non-finite values.", row.id)));
	}

	Ok(())
}

/// Inserts or replaces rows by id. Upserting the same row twice leaves one row.
pub async fn upsert(conn: &mut SqliteConnection, rows: &[MessageVector]) -> Result<()> {
	for row in rows {
		validate(row)?;
	}

	for chunk in rows.chunks(BATCH_ROWS) {
		let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
			"INSERT INTO message_vectors (id, thread_id, ts, model, dim, vec, preview, content_hash) ",
		);

		builder.push_values(chunk, |mut values, row| {
			values
				.push_bind(row.id.as_str())
				.push_bind(row.thread_id.as_str())
				.push_bind(row.ts)
				.push_bind(row.model.as_str())
				.push_bind(row.dim as i64)
				.push_bind(encode_vector(&row.vec))
				.push_bind(row.preview.as_deref())
				.push_bind(row.content_hash.as_deref());
		});
		builder.push(
			" ON CONFLICT(id) DO UPDATE SET thread_id = excluded.thread_id, ts = excluded.ts, \
			 model = excluded.model, dim = excluded.dim, vec = excluded.vec, \
			 preview = excluded.preview, content_hash = excluded.content_hash",
		);
		builder.build().execute(&mut *conn).await?;
	}

	tracing::debug!(rows = rows.len(), "Upserted message vectors.");

	Ok(())
}

pub async fn delete_by_ids(conn: &mut SqliteConnection, ids: &[String]) -> Result<u64> {
	let mut deleted = 0;

	for chunk in ids.chunks(BATCH_ROWS) {
		let mut builder: QueryBuilder<Sqlite> =
			QueryBuilder::new("DELETE FROM message_vectors WHERE id IN (");
		let mut separated = builder.separated(", ");

		for id in chunk {
			separated.push_bind(id.as_str());
		}

		separated.push_unseparated(")");

		deleted += builder.build().execute(&mut *conn).await?.rows_affected();
	}

	Ok(deleted)
}

pub async fn delete_by_thread(conn: &mut SqliteConnection, thread_id: &str) -> Result<u64> {
	let result = sqlx::query("DELETE FROM message_vectors WHERE thread_id = ?1")
		.bind(thread_id)
		.execute(conn)
		.await?;

	Ok(result.rows_affected())
}

pub async fn get(conn: &mut SqliteConnection, id: &str) -> Result<Option<MessageVector>> {
	let sql = format!("SELECT {VECTOR_COLUMNS} FROM message_vectors WHERE id = ?1");
	let row: Option<VectorRow> = sqlx::query_as(&sql).bind(id).fetch_optional(conn).await?;

	row.map(MessageVector::try_from).transpose()
}

pub async fn by_thread(conn: &mut SqliteConnection, thread_id: &str) -> Result<Vec<MessageVector>> {
	let sql = format!(
		"SELECT {VECTOR_COLUMNS} FROM message_vectors WHERE thread_id = ?1 ORDER BY ts DESC, id ASC"
	);
	let rows: Vec<VectorRow> = sqlx::query_as(&sql).bind(thread_id).fetch_all(conn).await?;

	rows.into_iter().map(MessageVector::try_from).collect()
}

/// The newest `limit` vectors by message timestamp.
pub async fn recent(conn: &mut SqliteConnection, limit: usize) -> Result<Vec<MessageVector>> {
	let sql =
		format!("SELECT {VECTOR_COLUMNS} FROM message_vectors ORDER BY ts DESC, id ASC LIMIT ?1");
	let limit = i64::try_from(limit).unwrap_or(i64::MAX);
	let rows: Vec<VectorRow> = sqlx::query_as(&sql).bind(limit).fetch_all(conn).await?;

	rows.into_iter().map(MessageVector::try_from).collect()
}

/// `(model, content_hash)` for each stored id in `ids`.
pub async fn fingerprints(
	conn: &mut SqliteConnection,
	ids: &[String],
) -> Result<HashMap<String, (String, Option<String>)>> {
	let mut out = HashMap::with_capacity(ids.len());

	for chunk in ids.chunks(BATCH_ROWS) {
		let mut builder: QueryBuilder<Sqlite> =
			QueryBuilder::new("SELECT id, model, content_hash FROM message_vectors WHERE id IN (");
		let mut separated = builder.separated(", ");

		for id in chunk {
			separated.push_bind(id.as_str());
		}

		separated.push_unseparated(")");

		let rows: Vec<(String, String, Option<String>)> =
			builder.build_query_as().fetch_all(&mut *conn).await?;

		for (id, model, hash) in rows {
			out.insert(id, (model, hash));
		}
	}

	Ok(out)
}

pub async fn count(conn: &mut SqliteConnection) -> Result<i64> {
	let count: i64 =
		sqlx::query_scalar("SELECT COUNT(*) FROM message_vectors").fetch_one(conn).await?;

	Ok(count)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn blob_encoding_preserves_values() {
		let vec = vec![0.5_f32, -1.25, f32::MIN_POSITIVE, 3.0e7];
		let bytes = encode_vector(&vec);

		assert_eq!(bytes.len(), 16);
		assert_eq!(decode_vector(&bytes), Ok(vec));
	}

	#[test]
	fn truncated_blob_is_rejected() {
		assert!(decode_vector(&[0, 0, 128]).is_err());
	}

	#[test]
	fn non_finite_values_are_rejected() {
		let row = MessageVector::new("m1", "t1", 1, "model", vec![1.0, f32::NAN]);

		assert!(validate(&row).is_err());
	}

	#[test]
	fn declared_dim_must_match() {
		let mut row = MessageVector::new("m1", "t1", 1, "model", vec![1.0, 2.0]);

		row.dim = 3;

		assert!(validate(&row).is_err());
	}
}
