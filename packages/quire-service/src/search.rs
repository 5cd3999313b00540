use serde::{Deserialize, Serialize};

use quire_domain::vector::{self, MessageVector, SearchHit};
use quire_storage::vectors;

use crate::{Error, Generation, QuireService, Result};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
	/// Results to return; `search.default_k` when unset.
	pub k: Option<usize>,
	/// Restricts the scan to one thread.
	pub thread_id: Option<String>,
	/// Newest vectors scanned by an unscoped search; `search.scan_limit` when unset.
	pub scan_limit: Option<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SearchOutcome {
	Hits(Vec<SearchHit>),
	/// A newer text search started before this one finished.
	Superseded,
}

impl QuireService {
	/// Brute-force cosine search. Unscoped searches only look at the `scan_limit` most recent
	/// vectors, so very old messages can be missed in large stores.
	pub async fn search(&self, query: &[f32], opts: &SearchOptions) -> Result<Vec<SearchHit>> {
		if query.is_empty() || query.iter().any(|value| !value.is_finite()) {
			return Err(Error::InvalidRequest {
				message: "query vector must be non-empty and finite.".to_string(),
			});
		}

		let k = opts.k.unwrap_or(self.cfg.search.default_k);

		if k == 0 {
			return Ok(Vec::new());
		}

		let candidates = {
			let mut conn = self.db.acquire().await?;

			match opts.thread_id.as_deref() {
				Some(thread_id) => vectors::by_thread(&mut conn, thread_id).await?,
				None => {
					let limit = opts.scan_limit.unwrap_or(self.cfg.search.scan_limit);

					vectors::recent(&mut conn, limit).await?
				},
			}
		};
		let scanned = candidates.len();
		let hits = vector::rank_top_k(query, candidates, k);

		tracing::debug!(scanned, returned = hits.len(), "Vector search finished.");

		Ok(hits)
	}

	/// Embeds `query` and searches with it. Only the latest call gets results; older calls still
	/// running report [`SearchOutcome::Superseded`].
	pub async fn search_text(&self, query: &str, opts: &SearchOptions) -> Result<SearchOutcome> {
		let generation = Generation::begin(&self.search_generation);

		if query.trim().is_empty() {
			return Err(Error::InvalidRequest { message: "query must be non-empty.".to_string() });
		}

		let embedded = self.embedding.embed_one(query).await?;

		if !generation.is_current() {
			return Ok(SearchOutcome::Superseded);
		}

		let hits = self.search(&embedded, opts).await?;

		if !generation.is_current() {
			return Ok(SearchOutcome::Superseded);
		}

		Ok(SearchOutcome::Hits(hits))
	}

	pub async fn upsert_vectors(&self, rows: &[MessageVector]) -> Result<()> {
		let mut tx = self.db.begin_write().await?;

		vectors::upsert(tx.conn(), rows).await?;
		tx.commit().await?;

		Ok(())
	}

	pub async fn delete_vectors(&self, ids: &[String]) -> Result<u64> {
		let mut tx = self.db.begin_write().await?;
		let removed = vectors::delete_by_ids(tx.conn(), ids).await?;

		tx.commit().await?;

		Ok(removed)
	}

	/// Drops every vector of a thread without touching the server.
	pub async fn forget_thread(&self, thread_id: &str) -> Result<u64> {
		let mut tx = self.db.begin_write().await?;
		let removed = vectors::delete_by_thread(tx.conn(), thread_id).await?;

		tx.commit().await?;

		Ok(removed)
	}
}
