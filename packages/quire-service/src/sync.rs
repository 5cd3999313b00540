use quire_domain::outbox::{OpPayload, OutboxOp};
use quire_providers::Error as ProviderError;
use quire_storage::{
	notes,
	outbox::{self, OutboxStats},
	sync_state,
};

use crate::{Generation, QuireService, Result};

pub const NOTES_CURSOR_KEY: &str = "notes.cursor";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
	pub recovered: u64,
	pub claimed: usize,
	pub completed: usize,
	pub failed: usize,
	pub rejected: usize,
	/// Ops settled by another drain after their lease expired mid-dispatch.
	pub lost: usize,
}

enum Settled {
	Completed,
	Rejected,
	Failed,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PullReport {
	pub fetched: usize,
	pub applied: usize,
	/// Server notes left alone because a local op for them is still queued.
	pub skipped: usize,
	/// Server notes older than the local copy.
	pub stale: usize,
	/// Server notes dropped because their timestamps could not be read.
	pub invalid: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PullOutcome {
	Applied(PullReport),
	/// A newer pull or [`QuireService::cancel_pull`] superseded this one; nothing was merged.
	Cancelled,
}

impl QuireService {
	/// Pushes due outbox ops to the server, at most `outbox.drain_batch` per pass. A failing op
	/// only delays its own entity.
	pub async fn drain_outbox(&self) -> Result<DrainReport> {
		let mut report = DrainReport::default();

		{
			let mut tx = self.db.begin_write().await?;

			report.recovered = outbox::recover_stale(
				tx.conn(),
				self.now(),
				self.cfg.outbox.processing_lease_ms,
			)
			.await?;

			tx.commit().await?;
		}

		for _ in 0..self.cfg.outbox.drain_batch {
			let claimed = {
				let mut tx = self.db.begin_write().await?;
				let op = outbox::claim_next(tx.conn(), self.now()).await?;

				tx.commit().await?;

				op
			};
			let Some(op) = claimed else {
				break;
			};

			report.claimed += 1;

			let result = self.dispatch(&op).await;
			let mut tx = self.db.begin_write().await?;
			let (settled, outcome) = match result {
				Ok(()) => (outbox::complete(tx.conn(), &op.op_id).await, Settled::Completed),
				Err(err) if err.is_authorization() => {
					let message = sanitize_outbox_error(
						&err.to_string(),
						self.cfg.outbox.max_error_chars,
					);

					tracing::warn!(
						error = %err,
						op_id = %op.op_id,
						entity_id = %op.entity_id,
						"Outbox op rejected by the server."
					);

					(
						outbox::reject(tx.conn(), &op.op_id, &message, self.now())
							.await
							.map(|_| ()),
						Settled::Rejected,
					)
				},
				Err(err) => {
					let message = sanitize_outbox_error(
						&err.to_string(),
						self.cfg.outbox.max_error_chars,
					);

					tracing::error!(
						error = %err,
						op_id = %op.op_id,
						entity_id = %op.entity_id,
						"Outbox op failed."
					);

					(
						outbox::fail(tx.conn(), &op.op_id, &message, self.now(), &self.backoff())
							.await
							.map(|_| ()),
						Settled::Failed,
					)
				},
			};

			match settled {
				Ok(()) => match outcome {
					Settled::Completed => report.completed += 1,
					Settled::Rejected => report.rejected += 1,
					Settled::Failed => report.failed += 1,
				},
				// Another drain recovered the lease and already settled this op.
				Err(quire_storage::Error::NotFound(_)) => {
					tracing::warn!(
						op_id = %op.op_id,
						entity_id = %op.entity_id,
						"Outbox op lease was lost before it settled."
					);

					report.lost += 1;
				},
				Err(err) => return Err(err.into()),
			}

			tx.commit().await?;
		}

		if report.claimed > 0 {
			tracing::info!(
				claimed = report.claimed,
				completed = report.completed,
				failed = report.failed,
				rejected = report.rejected,
				lost = report.lost,
				"Outbox drained."
			);
		}

		Ok(report)
	}

	async fn dispatch(&self, op: &OutboxOp) -> Result<(), ProviderError> {
		let id = op.entity_id.as_str();

		match &op.payload {
			OpPayload::NoteCreate(draft) => self.remote.create_note(draft).await,
			OpPayload::NoteUpdate(patch) => self.remote.update_note(id, patch).await,
			OpPayload::NoteMove(dest) => self.remote.move_note(id, dest).await,
			OpPayload::NoteDelete => self.remote.delete_note(id).await,
			OpPayload::ThreadUpdate(patch) => self.remote.update_thread(id, patch).await,
			OpPayload::ThreadDelete => self.remote.delete_thread(id).await,
		}
	}

	/// Fetches the server's notes and stores every note that has no queued local op and is not
	/// older than the local copy. Local edits that have not reached the server are never
	/// overwritten.
	pub async fn pull_notes(&self) -> Result<PullOutcome> {
		let generation = Generation::begin(&self.pull_generation);
		let cursor = {
			let mut conn = self.db.acquire().await?;

			sync_state::get(&mut conn, NOTES_CURSOR_KEY).await?
		};
		let listing = self.remote.list_notes(cursor.as_deref()).await?;

		if !generation.is_current() {
			tracing::debug!("Pull superseded before merge.");

			return Ok(PullOutcome::Cancelled);
		}

		let mut report = PullReport { fetched: listing.notes.len(), ..Default::default() };
		let mut incoming = Vec::with_capacity(listing.notes.len());

		for remote in listing.notes {
			let id = remote.id.clone();

			match remote.into_note() {
				Ok(note) => incoming.push(note),
				Err(err) => {
					tracing::warn!(error = %err, note_id = %id, "Skipping remote note.");

					report.invalid += 1;
				},
			}
		}

		let mut tx = self.db.begin_write().await?;

		if !generation.is_current() {
			return Ok(PullOutcome::Cancelled);
		}

		let ids: Vec<String> = incoming.iter().map(|note| note.id.clone()).collect();
		let locked = outbox::locked_entity_ids(tx.conn(), &ids).await?;
		let unlocked: Vec<_> =
			incoming.into_iter().filter(|note| !locked.contains(&note.id)).collect();

		report.skipped = ids.len() - unlocked.len();

		// The listing may predate an op that completed while it was in flight.
		let local = notes::updated_at_by_id(tx.conn(), &ids).await?;
		let fresh: Vec<_> = unlocked
			.into_iter()
			.filter(|note| {
				local.get(&note.id).is_none_or(|updated_at| note.updated_at >= *updated_at)
			})
			.collect();

		report.stale = ids.len() - report.skipped - fresh.len();
		report.applied = fresh.len();

		notes::bulk_put(tx.conn(), &fresh).await?;

		match listing.next_cursor.as_deref() {
			Some(next) => sync_state::set(tx.conn(), NOTES_CURSOR_KEY, next, self.now()).await?,
			None => sync_state::clear(tx.conn(), NOTES_CURSOR_KEY).await?,
		}

		tx.commit().await?;

		tracing::info!(
			fetched = report.fetched,
			applied = report.applied,
			skipped = report.skipped,
			stale = report.stale,
			invalid = report.invalid,
			"Pulled remote notes."
		);

		Ok(PullOutcome::Applied(report))
	}

	/// Discards the result of any pull currently in flight.
	pub fn cancel_pull(&self) {
		Generation::begin(&self.pull_generation);
	}

	pub async fn list_attention(&self) -> Result<Vec<OutboxOp>> {
		let mut conn = self.db.acquire().await?;

		Ok(outbox::list_attention(&mut conn).await?)
	}

	/// Re-arms a flagged op for the next drain.
	pub async fn retry_op(&self, op_id: &str) -> Result<OutboxOp> {
		let mut tx = self.db.begin_write().await?;
		let op = outbox::retry(tx.conn(), op_id, self.now()).await?;

		tx.commit().await?;

		Ok(op)
	}

	pub async fn discard_op(&self, op_id: &str) -> Result<()> {
		let mut tx = self.db.begin_write().await?;

		outbox::discard(tx.conn(), op_id).await?;
		tx.commit().await?;

		Ok(())
	}

	pub async fn outbox_stats(&self) -> Result<OutboxStats> {
		let mut conn = self.db.acquire().await?;

		Ok(outbox::stats(&mut conn).await?)
	}
}

/// Redacts credentials from an error message before it is persisted and caps its length.
pub fn sanitize_outbox_error(text: &str, max_chars: usize) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		for key in ["api_key", "apikey", "password", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = raw.split(sep).next().unwrap_or(raw);

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > max_chars {
		out = out.chars().take(max_chars).collect();
		out.push_str("...");
	}

	out
}
