use quire_domain::outbox::{OpPayload, ThreadPatch};
use quire_storage::{outbox, vectors};

use crate::{Error, QuireService, Result};

impl QuireService {
	pub async fn update_thread_title(&self, thread_id: &str, title: &str) -> Result<()> {
		let title = title.trim();

		if title.is_empty() {
			return Err(Error::InvalidRequest {
				message: "thread title must be non-empty.".to_string(),
			});
		}

		let payload = OpPayload::ThreadUpdate(ThreadPatch { title: title.to_string() });
		let mut tx = self.db.begin_write().await?;

		outbox::enqueue_coalesced(tx.conn(), &crate::new_id(), thread_id, payload, self.now())
			.await?;
		tx.commit().await?;

		Ok(())
	}

	/// Queues the thread's deletion and drops its vectors in the same transaction.
	pub async fn delete_thread(&self, thread_id: &str) -> Result<u64> {
		let mut tx = self.db.begin_write().await?;

		outbox::enqueue_coalesced(
			tx.conn(),
			&crate::new_id(),
			thread_id,
			OpPayload::ThreadDelete,
			self.now(),
		)
		.await?;

		let removed = vectors::delete_by_thread(tx.conn(), thread_id).await?;

		tx.commit().await?;

		tracing::debug!(thread_id, vectors_removed = removed, "Deleted thread.");

		Ok(removed)
	}
}
