use std::{sync::Arc, time::Duration};

use reqwest::Client;
use serde_json::Value;

use crate::{BoxFuture, EmbeddingEngine, EngineLoader, Error, Result};

/// OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbedding {
	client: Client,
	url: String,
	model: String,
	dimensions: usize,
}
impl HttpEmbedding {
	pub fn new(cfg: &quire_config::EmbeddingProviderConfig) -> Result<Self> {
		let headers = crate::auth_headers(Some(cfg.api_key.as_str()), &cfg.default_headers)?;
		let client = Client::builder()
			.timeout(Duration::from_millis(cfg.timeout_ms))
			.default_headers(headers)
			.build()?;

		Ok(Self {
			client,
			url: format!("{}{}", cfg.api_base.trim_end_matches('/'), cfg.path),
			model: cfg.model.clone(),
			dimensions: cfg.dimensions as usize,
		})
	}

	async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		if texts.is_empty() {
			return Ok(Vec::new());
		}

		let body = serde_json::json!({
			"model": self.model,
			"input": texts,
			"dimensions": self.dimensions,
		});
		let res = self.client.post(&self.url).json(&body).send().await?;
		let status = res.status();

		if !status.is_success() {
			let text = res.text().await.unwrap_or_default();

			return Err(Error::from_status(status.as_u16(), &text));
		}

		let json: Value = res.json().await?;
		let vectors = parse_embedding_response(json)?;

		validate_vectors(&vectors, texts.len(), Some(self.dimensions))?;

		Ok(vectors)
	}
}
impl EmbeddingEngine for HttpEmbedding {
	fn model(&self) -> &str {
		&self.model
	}

	fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(self.embed_texts(texts))
	}
}

/// Loader for [`HttpEmbedding`]; building the client is the whole initialization.
pub struct HttpEmbeddingLoader {
	cfg: quire_config::EmbeddingProviderConfig,
}
impl HttpEmbeddingLoader {
	pub fn new(cfg: quire_config::EmbeddingProviderConfig) -> Self {
		Self { cfg }
	}
}
impl EngineLoader for HttpEmbeddingLoader {
	fn load(&self) -> BoxFuture<'_, Result<Arc<dyn EmbeddingEngine>>> {
		Box::pin(async move {
			let engine = HttpEmbedding::new(&self.cfg)?;

			tracing::info!(
				provider_id = %self.cfg.provider_id,
				model = %self.cfg.model,
				"Embedding engine ready."
			);

			Ok(Arc::new(engine) as Arc<dyn EmbeddingEngine>)
		})
	}
}

/// Checks a batch answer: one vector per input, none empty, all of one dimension (the expected
/// one when given).
pub fn validate_vectors(
	vectors: &[Vec<f32>],
	expected_count: usize,
	expected_dim: Option<usize>,
) -> Result<()> {
	if vectors.len() != expected_count {
		return Err(Error::InvalidResponse {
			message: format!(
				"Embedding provider returned {} vectors for {expected_count} inputs.",
				vectors.len()
			),
		});
	}

	let dim = expected_dim.or_else(|| vectors.first().map(Vec::len));

	for vec in vectors {
		if vec.is_empty() || Some(vec.len()) != dim {
			return Err(Error::InvalidResponse {
				message: format!(
					"Embedding dimension {} does not match expected {}.",
					vec.len(),
					dim.unwrap_or_default()
				),
			});
		}
		if vec.iter().any(|value| !value.is_finite()) {
			return Err(Error::InvalidResponse {
				message: "Embedding contains non-finite values.".to_string(),
			});
		}
	}

	Ok(())
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let invalid = |message: &str| Error::InvalidResponse { message: message.to_string() };
	let data = json
		.get("data")
		.and_then(|v| v.as_array())
		.ok_or_else(|| invalid("Embedding response is missing data array."))?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item
			.get("embedding")
			.and_then(|v| v.as_array())
			.ok_or_else(|| invalid("Embedding item missing embedding array."))?;
		let mut vec = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number = value.as_f64().ok_or_else(|| invalid("Embedding value must be numeric."))?;

			vec.push(number as f32);
		}

		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_embeddings_in_index_order() {
		let json = serde_json::json!({
			"data": [
				{ "index": 1, "embedding": [2.0, 3.0] },
				{ "index": 0, "embedding": [0.5, 1.5] }
			]
		});
		let parsed = parse_embedding_response(json).expect("parse failed");

		assert_eq!(parsed, vec![vec![0.5, 1.5], vec![2.0, 3.0]]);
	}

	#[test]
	fn missing_data_is_invalid() {
		let err = parse_embedding_response(serde_json::json!({ "object": "list" }))
			.expect_err("Expected missing data to fail.");

		assert!(matches!(err, Error::InvalidResponse { .. }));
	}

	#[test]
	fn count_mismatch_is_invalid() {
		assert!(validate_vectors(&[vec![1.0]], 2, None).is_err());
	}

	#[test]
	fn zero_and_ragged_dimensions_are_invalid() {
		assert!(validate_vectors(&[Vec::new()], 1, None).is_err());
		assert!(validate_vectors(&[vec![1.0, 2.0], vec![1.0]], 2, None).is_err());
		assert!(validate_vectors(&[vec![1.0, 2.0]], 1, Some(3)).is_err());
		assert!(validate_vectors(&[vec![1.0, 2.0], vec![0.0, 1.0]], 2, Some(2)).is_ok());
	}
}
