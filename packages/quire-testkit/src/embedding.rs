use std::{
	collections::HashMap,
	sync::{
		Arc, Mutex,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
	time::Duration,
};

use quire_providers::{
	BoxFuture, EmbeddingEngine, EngineLoader, Error as ProviderError, Result as ProviderResult,
};

pub const FAKE_MODEL: &str = "fake-embedding";

/// Deterministic embedder: each byte of the input bumps one of `dim` buckets, so texts sharing
/// characters land close together.
pub struct FakeEmbedder {
	dim: usize,
	model: String,
	overrides: Mutex<HashMap<String, Vec<f32>>>,
	batches: Mutex<Vec<Vec<String>>>,
	failing: AtomicBool,
	short_answers: AtomicBool,
}
impl FakeEmbedder {
	pub fn new(dim: usize) -> Self {
		Self {
			dim,
			model: FAKE_MODEL.to_string(),
			overrides: Mutex::new(HashMap::new()),
			batches: Mutex::new(Vec::new()),
			failing: AtomicBool::new(false),
			short_answers: AtomicBool::new(false),
		}
	}

	pub fn with_model(mut self, model: &str) -> Self {
		self.model = model.to_string();

		self
	}

	/// Pins the vector returned for `text`.
	pub fn set_vector(&self, text: &str, vec: Vec<f32>) {
		self.overrides.lock().unwrap_or_else(|err| err.into_inner()).insert(text.to_string(), vec);
	}

	pub fn set_failing(&self, failing: bool) {
		self.failing.store(failing, Ordering::SeqCst);
	}

	/// Answers every batch with one vector too few.
	pub fn set_short_answers(&self, short: bool) {
		self.short_answers.store(short, Ordering::SeqCst);
	}

	pub fn batches(&self) -> Vec<Vec<String>> {
		self.batches.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	pub fn embedded_texts(&self) -> Vec<String> {
		self.batches().into_iter().flatten().collect()
	}

	pub fn vector_for(&self, text: &str) -> Vec<f32> {
		if let Some(vec) = self.overrides.lock().unwrap_or_else(|err| err.into_inner()).get(text) {
			return vec.clone();
		}

		let mut vec = vec![0.0_f32; self.dim];

		for byte in text.bytes() {
			vec[usize::from(byte) % self.dim] += 1.0;
		}

		vec
	}

	fn answer(&self, texts: &[String]) -> ProviderResult<Vec<Vec<f32>>> {
		self.batches.lock().unwrap_or_else(|err| err.into_inner()).push(texts.to_vec());

		if self.failing.load(Ordering::SeqCst) {
			return Err(ProviderError::Network { message: "embedding engine offline".to_string() });
		}

		let mut vectors: Vec<Vec<f32>> = texts.iter().map(|text| self.vector_for(text)).collect();

		if self.short_answers.load(Ordering::SeqCst) {
			vectors.pop();
		}

		Ok(vectors)
	}
}
impl EmbeddingEngine for FakeEmbedder {
	fn model(&self) -> &str {
		&self.model
	}

	fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, ProviderResult<Vec<Vec<f32>>>> {
		Box::pin(async move { self.answer(texts) })
	}
}

/// Hands out a shared [`FakeEmbedder`] after a short delay and counts how often it was asked.
pub struct CountingLoader {
	engine: Arc<FakeEmbedder>,
	loads: AtomicUsize,
	delay: Duration,
	failing: AtomicBool,
}
impl CountingLoader {
	pub fn new(engine: Arc<FakeEmbedder>) -> Self {
		Self {
			engine,
			loads: AtomicUsize::new(0),
			delay: Duration::from_millis(20),
			failing: AtomicBool::new(false),
		}
	}

	pub fn loads(&self) -> usize {
		self.loads.load(Ordering::SeqCst)
	}

	pub fn set_failing(&self, failing: bool) {
		self.failing.store(failing, Ordering::SeqCst);
	}
}
impl EngineLoader for CountingLoader {
	fn load(&self) -> BoxFuture<'_, ProviderResult<Arc<dyn EmbeddingEngine>>> {
		Box::pin(async move {
			self.loads.fetch_add(1, Ordering::SeqCst);
			tokio::time::sleep(self.delay).await;

			if self.failing.load(Ordering::SeqCst) {
				return Err(ProviderError::InvalidConfig {
					message: "model weights unavailable".to_string(),
				});
			}

			Ok(self.engine.clone() as Arc<dyn EmbeddingEngine>)
		})
	}
}
