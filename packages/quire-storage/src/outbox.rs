//! Durable queue of pending remote mutations.
//!
//! Ops for one entity are delivered strictly in enqueue order: an op is claimable only while no
//! older op for the same entity exists and none is in flight. Flagged ops (`attention` set) stay
//! `pending` but are never claimed, so they also hold back later ops for their entity until the
//! user retries or discards them.

use std::collections::HashSet;

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, types::Json};

use quire_domain::{
	backoff::BackoffPolicy,
	outbox::{Attention, OpPayload, OpStatus, OutboxOp},
};

use crate::{BATCH_ROWS, Error, Result, models::OutboxRow};

const OUTBOX_COLUMNS: &str = "seq, op_id, entity_id, op_type, payload, status, retry_count, \
	next_retry_at, created_at, updated_at, last_error, attention";

/// What [`enqueue_coalesced`] did with the incoming payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Coalesced {
	/// Stored as a new op.
	Inserted { op_id: String },
	/// Folded into an existing pending op.
	Merged { op_id: String },
	/// A delete cancelled a create the server never saw; nothing is left to send.
	Cancelled,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OutboxStats {
	pub pending: i64,
	pub processing: i64,
	pub attention: i64,
}

pub async fn enqueue(conn: &mut SqliteConnection, op: &OutboxOp) -> Result<()> {
	op.payload.validate(&op.entity_id)?;

	let result = sqlx::query(
		"\
INSERT INTO outbox (
	op_id,
	entity_id,
	op_type,
	payload,
	status,
	retry_count,
	next_retry_at,
	created_at,
	updated_at,
	last_error,
	attention
)
VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5, ?6, ?7, NULL, NULL)",
	)
	.bind(op.op_id.as_str())
	.bind(op.entity_id.as_str())
	.bind(op.op_type().as_str())
	.bind(Json(&op.payload))
	.bind(op.next_retry_at)
	.bind(op.created_at)
	.bind(op.updated_at)
	.execute(conn)
	.await;

	match result {
		Ok(_) => {
			tracing::debug!(
				op_id = %op.op_id,
				entity_id = %op.entity_id,
				op_type = %op.op_type(),
				"Enqueued outbox op."
			);

			Ok(())
		},
		Err(sqlx::Error::Database(err)) if err.is_unique_violation() =>
			Err(Error::DuplicateOp(op.op_id.clone())),
		Err(err) => Err(err.into()),
	}
}

/// Enqueues `payload`, folding it into ops that have not been sent yet where possible.
///
/// A delete drops every pending op for the entity; if one of them was the create, the entity
/// never reached the server and the delete is dropped too. Other payloads merge into the newest
/// pending op that can absorb them; merging resets that op's retry state.
pub async fn enqueue_coalesced(
	conn: &mut SqliteConnection,
	op_id: &str,
	entity_id: &str,
	payload: OpPayload,
	now: i64,
) -> Result<Coalesced> {
	payload.validate(entity_id)?;

	let siblings: Vec<OutboxOp> = list_pending_for_entity(&mut *conn, entity_id).await?;

	if payload.op_type().is_delete() {
		let created_locally =
			siblings.iter().any(|sibling| matches!(sibling.payload, OpPayload::NoteCreate(_)));
		let dropped = sqlx::query("DELETE FROM outbox WHERE entity_id = ?1 AND status = 'pending'")
			.bind(entity_id)
			.execute(&mut *conn)
			.await?
			.rows_affected();

		if created_locally {
			tracing::debug!(entity_id, dropped, "Delete cancelled an unsent create.");

			return Ok(Coalesced::Cancelled);
		}

		enqueue(conn, &OutboxOp::new(op_id, entity_id, payload, now)).await?;

		return Ok(Coalesced::Inserted { op_id: op_id.to_string() });
	}

	for sibling in siblings.iter().rev() {
		let mut merged = sibling.payload.clone();

		if !merged.absorb(&payload) {
			continue;
		}

		sqlx::query(
			"\
UPDATE outbox
SET
	payload = ?1,
	retry_count = 0,
	next_retry_at = ?2,
	updated_at = ?2,
	last_error = NULL,
	attention = NULL
WHERE op_id = ?3 AND status = 'pending'",
		)
		.bind(Json(&merged))
		.bind(now)
		.bind(sibling.op_id.as_str())
		.execute(&mut *conn)
		.await?;

		tracing::debug!(
			op_id = %sibling.op_id,
			entity_id,
			op_type = %payload.op_type(),
			"Coalesced outbox op."
		);

		return Ok(Coalesced::Merged { op_id: sibling.op_id.clone() });
	}

	enqueue(conn, &OutboxOp::new(op_id, entity_id, payload, now)).await?;

	Ok(Coalesced::Inserted { op_id: op_id.to_string() })
}

/// Atomically leases the next deliverable op, or `None` when nothing is due.
///
/// A leased row that no longer decodes is flagged [`Attention::Corrupt`] and the next candidate is
/// tried, so one bad row never stalls the queue.
pub async fn claim_next(conn: &mut SqliteConnection, now: i64) -> Result<Option<OutboxOp>> {
	let sql = format!(
		"\
UPDATE outbox
SET status = 'processing', updated_at = ?1
WHERE seq = (
	SELECT candidate.seq
	FROM outbox AS candidate
	WHERE candidate.status = 'pending'
		AND candidate.attention IS NULL
		AND candidate.next_retry_at <= ?1
		AND NOT EXISTS (
			SELECT 1
			FROM outbox AS sibling
			WHERE sibling.entity_id = candidate.entity_id
				AND (sibling.status = 'processing' OR sibling.seq < candidate.seq)
		)
	ORDER BY candidate.next_retry_at ASC, candidate.seq ASC
	LIMIT 1
)
RETURNING {OUTBOX_COLUMNS}"
	);

	loop {
		let row: Option<OutboxRow> =
			sqlx::query_as(&sql).bind(now).fetch_optional(&mut *conn).await?;
		let Some(row) = row else {
			return Ok(None);
		};
		let op_id = row.op_id.clone();

		match OutboxOp::try_from(row) {
			Ok(op) => return Ok(Some(op)),
			Err(Error::Corrupt(message)) => flag_corrupt(&mut *conn, &op_id, &message, now).await?,
			Err(err) => return Err(err),
		}
	}
}

pub async fn complete(conn: &mut SqliteConnection, op_id: &str) -> Result<()> {
	let result =
		sqlx::query("DELETE FROM outbox WHERE op_id = ?1").bind(op_id).execute(conn).await?;

	if result.rows_affected() == 0 {
		return Err(Error::NotFound(format!("outbox op {op_id}")));
	}

	Ok(())
}

/// Records a transient failure and schedules the next attempt. Once the retry budget is spent the
/// op is flagged `retries_exhausted` and left for the user.
pub async fn fail(
	conn: &mut SqliteConnection,
	op_id: &str,
	error: &str,
	now: i64,
	policy: &BackoffPolicy,
) -> Result<OutboxOp> {
	let op = get(&mut *conn, op_id)
		.await?
		.ok_or_else(|| Error::NotFound(format!("outbox op {op_id}")))?;
	let retry_count = op.retry_count.saturating_add(1);
	let next_retry_at = policy.next_retry_at(now, op.next_retry_at, retry_count);
	let attention = policy.exhausted(retry_count).then_some(Attention::RetriesExhausted);

	sqlx::query(
		"\
UPDATE outbox
SET
	status = 'pending',
	retry_count = ?1,
	next_retry_at = ?2,
	updated_at = ?3,
	last_error = ?4,
	attention = COALESCE(?5, attention)
WHERE op_id = ?6",
	)
	.bind(i64::from(retry_count))
	.bind(next_retry_at)
	.bind(now)
	.bind(error)
	.bind(attention.map(Attention::as_str))
	.bind(op_id)
	.execute(&mut *conn)
	.await?;

	if attention.is_some() {
		tracing::warn!(
			op_id,
			entity_id = %op.entity_id,
			retry_count,
			"Outbox op exhausted its retries."
		);
	}

	get(conn, op_id).await?.ok_or_else(|| Error::NotFound(format!("outbox op {op_id}")))
}

/// Flags an op the server refused outright. It is not retried automatically.
pub async fn reject(
	conn: &mut SqliteConnection,
	op_id: &str,
	error: &str,
	now: i64,
) -> Result<OutboxOp> {
	let result = sqlx::query(
		"\
UPDATE outbox
SET status = 'pending', updated_at = ?1, last_error = ?2, attention = ?3
WHERE op_id = ?4",
	)
	.bind(now)
	.bind(error)
	.bind(Attention::Rejected.as_str())
	.bind(op_id)
	.execute(&mut *conn)
	.await?;

	if result.rows_affected() == 0 {
		return Err(Error::NotFound(format!("outbox op {op_id}")));
	}

	get(conn, op_id).await?.ok_or_else(|| Error::NotFound(format!("outbox op {op_id}")))
}

/// Returns ops whose lease is older than `lease_ms` to the queue, due immediately.
pub async fn recover_stale(conn: &mut SqliteConnection, now: i64, lease_ms: i64) -> Result<u64> {
	let result = sqlx::query(
		"\
UPDATE outbox
SET status = 'pending', next_retry_at = ?1, updated_at = ?1
WHERE status = 'processing' AND updated_at <= ?2",
	)
	.bind(now)
	.bind(now.saturating_sub(lease_ms))
	.execute(conn)
	.await?;
	let recovered = result.rows_affected();

	if recovered > 0 {
		tracing::warn!(recovered, "Recovered outbox ops with expired leases.");
	}

	Ok(recovered)
}

pub async fn list_attention(conn: &mut SqliteConnection) -> Result<Vec<OutboxOp>> {
	let sql =
		format!("SELECT {OUTBOX_COLUMNS} FROM outbox WHERE attention IS NOT NULL ORDER BY seq ASC");

	fetch_ops(conn, &sql, None).await
}

/// Clears the attention flag and retry counter so the op is delivered on the next drain.
pub async fn retry(conn: &mut SqliteConnection, op_id: &str, now: i64) -> Result<OutboxOp> {
	let result = sqlx::query(
		"\
UPDATE outbox
SET attention = NULL, retry_count = 0, next_retry_at = ?1, updated_at = ?1
WHERE op_id = ?2 AND status = 'pending'",
	)
	.bind(now)
	.bind(op_id)
	.execute(&mut *conn)
	.await?;

	if result.rows_affected() == 0 {
		return Err(missing_or_in_flight(&mut *conn, op_id).await);
	}

	get(conn, op_id).await?.ok_or_else(|| Error::NotFound(format!("outbox op {op_id}")))
}

/// Drops a pending op without sending it.
pub async fn discard(conn: &mut SqliteConnection, op_id: &str) -> Result<()> {
	let result = sqlx::query("DELETE FROM outbox WHERE op_id = ?1 AND status = 'pending'")
		.bind(op_id)
		.execute(&mut *conn)
		.await?;

	if result.rows_affected() == 0 {
		return Err(missing_or_in_flight(conn, op_id).await);
	}

	tracing::info!(op_id, "Discarded outbox op.");

	Ok(())
}

async fn missing_or_in_flight(conn: &mut SqliteConnection, op_id: &str) -> Error {
	match get(conn, op_id).await {
		Ok(Some(op)) if op.status == OpStatus::Processing =>
			Error::InvalidArgument(format!("outbox op {op_id} is being delivered.")),
		Ok(_) => Error::NotFound(format!("outbox op {op_id}")),
		Err(err) => err,
	}
}

/// The subset of `ids` that has at least one outbox op, in any state.
pub async fn locked_entity_ids(
	conn: &mut SqliteConnection,
	ids: &[String],
) -> Result<HashSet<String>> {
	let mut locked = HashSet::new();

	for chunk in ids.chunks(BATCH_ROWS) {
		let mut builder: QueryBuilder<Sqlite> =
			QueryBuilder::new("SELECT DISTINCT entity_id FROM outbox WHERE entity_id IN (");
		let mut separated = builder.separated(", ");

		for id in chunk {
			separated.push_bind(id.as_str());
		}

		separated.push_unseparated(")");

		let rows: Vec<String> = builder.build_query_scalar().fetch_all(&mut *conn).await?;

		locked.extend(rows);
	}

	Ok(locked)
}

/// Not-yet-claimed ops for `entity_id`, oldest first.
pub async fn list_pending_for_entity(
	conn: &mut SqliteConnection,
	entity_id: &str,
) -> Result<Vec<OutboxOp>> {
	let sql = format!(
		"SELECT {OUTBOX_COLUMNS} FROM outbox WHERE entity_id = ?1 AND status = 'pending' ORDER BY \
		 seq ASC"
	);

	fetch_ops(conn, &sql, Some(entity_id)).await
}

pub async fn get(conn: &mut SqliteConnection, op_id: &str) -> Result<Option<OutboxOp>> {
	let sql = format!("SELECT {OUTBOX_COLUMNS} FROM outbox WHERE op_id = ?1");
	let row: Option<OutboxRow> = sqlx::query_as(&sql).bind(op_id).fetch_optional(conn).await?;

	row.map(OutboxOp::try_from).transpose()
}

pub async fn list_all(conn: &mut SqliteConnection) -> Result<Vec<OutboxOp>> {
	let sql = format!("SELECT {OUTBOX_COLUMNS} FROM outbox ORDER BY seq ASC");

	fetch_ops(conn, &sql, None).await
}

pub async fn stats(conn: &mut SqliteConnection) -> Result<OutboxStats> {
	let (pending, processing, attention): (i64, i64, i64) = sqlx::query_as(
		"\
SELECT
	COALESCE(SUM(CASE WHEN status = 'pending' AND attention IS NULL THEN 1 ELSE 0 END), 0),
	COALESCE(SUM(CASE WHEN status = 'processing' THEN 1 ELSE 0 END), 0),
	COALESCE(SUM(CASE WHEN attention IS NOT NULL THEN 1 ELSE 0 END), 0)
FROM outbox",
	)
	.fetch_one(conn)
	.await?;

	Ok(OutboxStats { pending, processing, attention })
}

async fn fetch_ops(
	conn: &mut SqliteConnection,
	sql: &str,
	bind: Option<&str>,
) -> Result<Vec<OutboxOp>> {
	let mut query = sqlx::query_as::<_, OutboxRow>(sql);

	if let Some(value) = bind {
		query = query.bind(value);
	}

	let mut ops = Vec::new();

	for row in query.fetch_all(conn).await? {
		let op_id = row.op_id.clone();

		match OutboxOp::try_from(row) {
			Ok(op) => ops.push(op),
			// Flagged rows stay countable and discardable by id.
			Err(Error::Corrupt(message)) => {
				tracing::warn!(op_id, error = %message, "Skipping undecodable outbox op.");
			},
			Err(err) => return Err(err),
		}
	}

	Ok(ops)
}

async fn flag_corrupt(
	conn: &mut SqliteConnection,
	op_id: &str,
	message: &str,
	now: i64,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE outbox
SET status = 'pending', attention = ?1, last_error = ?2, updated_at = ?3
WHERE op_id = ?4",
	)
	.bind(Attention::Corrupt.as_str())
	.bind(message)
	.bind(now)
	.bind(op_id)
	.execute(conn)
	.await?;

	tracing::error!(op_id, error = %message, "Flagged undecodable outbox op.");

	Ok(())
}
