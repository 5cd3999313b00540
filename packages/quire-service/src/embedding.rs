use std::{collections::HashSet, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use quire_domain::vector::{self, MessageVector};
use quire_providers::{EmbeddingEngine, EngineLoader, embedding::validate_vectors};
use quire_storage::vectors;

use crate::{Error, QuireService, Result};

/// Turns text into vectors. The engine is loaded on first use; concurrent first callers share a
/// single load, and a failed load is retried by the next caller.
pub struct EmbeddingPipeline {
	loader: Arc<dyn EngineLoader>,
	engine: OnceCell<Arc<dyn EmbeddingEngine>>,
	batch_size: usize,
	max_input_chars: usize,
	preview_chars: usize,
}
impl EmbeddingPipeline {
	pub fn new(loader: Arc<dyn EngineLoader>, cfg: &quire_config::Embedding) -> Self {
		Self {
			loader,
			engine: OnceCell::new(),
			batch_size: cfg.batch_size.max(1),
			max_input_chars: cfg.max_input_chars,
			preview_chars: cfg.preview_chars,
		}
	}

	pub async fn engine(&self) -> Result<&Arc<dyn EmbeddingEngine>> {
		self.engine
			.get_or_try_init(|| async {
				let engine = self.loader.load().await.map_err(Error::embedding)?;

				tracing::info!(model = engine.model(), "Embedding engine loaded.");

				Ok(engine)
			})
			.await
	}

	pub fn is_loaded(&self) -> bool {
		self.engine.initialized()
	}

	pub async fn model(&self) -> Result<String> {
		Ok(self.engine().await?.model().to_string())
	}

	pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
		let mut vectors = self.embed_batch(&[text.to_string()]).await?;

		vectors.pop().ok_or_else(|| Error::embedding("engine returned no vector"))
	}

	/// Embeds `texts` in order, `batch_size` at a time, yielding to the runtime between batches.
	/// Inputs longer than `max_input_chars` are truncated.
	pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		if texts.is_empty() {
			return Ok(Vec::new());
		}

		let engine = self.engine().await?;
		let inputs: Vec<String> = texts
			.iter()
			.map(|text| vector::truncate_chars(text, self.max_input_chars).to_string())
			.collect();
		let mut out: Vec<Vec<f32>> = Vec::with_capacity(inputs.len());

		for (idx, chunk) in inputs.chunks(self.batch_size).enumerate() {
			if idx > 0 {
				tokio::task::yield_now().await;
			}

			let vectors = engine.embed(chunk).await.map_err(Error::embedding)?;

			validate_vectors(&vectors, chunk.len(), out.first().map(Vec::len))
				.map_err(Error::embedding)?;
			out.extend(vectors);
		}

		Ok(out)
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
	pub id: String,
	pub thread_id: String,
	pub ts: i64,
	pub text: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexReport {
	pub embedded: usize,
	/// Already indexed with the same text and model, or blank.
	pub skipped: usize,
}

impl QuireService {
	/// Embeds and stores the messages of one thread. Messages whose stored vector was built from
	/// the same text by the same model are left untouched.
	pub async fn index_thread(
		&self,
		thread_id: &str,
		messages: &[ChatMessage],
	) -> Result<IndexReport> {
		if let Some(stray) = messages.iter().find(|message| message.thread_id != thread_id) {
			return Err(Error::InvalidRequest {
				message: format!("message {} does not belong to thread {thread_id}.", stray.id),
			});
		}

		let mut seen = HashSet::new();

		if let Some(dup) = messages.iter().find(|message| !seen.insert(message.id.as_str())) {
			return Err(Error::InvalidRequest {
				message: format!("message {} appears twice.", dup.id),
			});
		}

		let mut report = IndexReport::default();
		let candidates: Vec<&ChatMessage> =
			messages.iter().filter(|message| !message.text.trim().is_empty()).collect();

		report.skipped = messages.len() - candidates.len();

		if candidates.is_empty() {
			return Ok(report);
		}

		let model = self.embedding.model().await?;
		let ids: Vec<String> = candidates.iter().map(|message| message.id.clone()).collect();
		let stored = {
			let mut conn = self.db.acquire().await?;

			vectors::fingerprints(&mut conn, &ids).await?
		};
		let pending: Vec<&ChatMessage> = candidates
			.into_iter()
			.filter(|message| {
				let hash = vector::content_hash(&message.text);

				stored.get(&message.id) != Some(&(model.clone(), Some(hash)))
			})
			.collect();

		report.skipped += ids.len() - pending.len();

		if pending.is_empty() {
			return Ok(report);
		}

		let texts: Vec<String> = pending.iter().map(|message| message.text.clone()).collect();
		let embedded = self.embedding.embed_batch(&texts).await?;
		let rows: Vec<MessageVector> = pending
			.iter()
			.zip(embedded)
			.map(|(message, vec)| {
				MessageVector::new(&message.id, &message.thread_id, message.ts, &model, vec)
					.with_source_text(&message.text, self.embedding.preview_chars)
			})
			.collect();
		let mut tx = self.db.begin_write().await?;

		vectors::upsert(tx.conn(), &rows).await?;
		tx.commit().await?;

		report.embedded = rows.len();

		tracing::debug!(
			thread_id,
			embedded = report.embedded,
			skipped = report.skipped,
			"Indexed thread."
		);

		Ok(report)
	}

	pub async fn index_message(&self, message: &ChatMessage) -> Result<IndexReport> {
		self.index_thread(&message.thread_id, std::slice::from_ref(message)).await
	}
}
