use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub remote: Remote,
	pub providers: Providers,
	#[serde(default)]
	pub outbox: Outbox,
	#[serde(default)]
	pub sync: Sync,
	#[serde(default)]
	pub embedding: Embedding,
	#[serde(default)]
	pub search: Search,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub sqlite: Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sqlite {
	/// Database file path, or `:memory:` for a throwaway in-process store.
	pub path: String,
	pub pool_max_conns: u32,
	#[serde(default = "default_busy_timeout_ms")]
	pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Remote {
	pub api_base: String,
	/// Bearer token. Optional for servers that authenticate through default headers.
	pub api_key: Option<String>,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Outbox {
	pub base_backoff_ms: i64,
	pub max_backoff_ms: i64,
	pub max_retries: u32,
	/// Ops left in `processing` longer than this are considered abandoned and re-queued.
	pub processing_lease_ms: i64,
	pub drain_batch: u32,
	pub max_error_chars: usize,
}
impl Default for Outbox {
	fn default() -> Self {
		Self {
			base_backoff_ms: 3_000,
			max_backoff_ms: 300_000,
			max_retries: 5,
			processing_lease_ms: 60_000,
			drain_batch: 20,
			max_error_chars: 1_024,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sync {
	pub drain_interval_ms: u64,
	pub pull_interval_ms: u64,
}
impl Default for Sync {
	fn default() -> Self {
		Self { drain_interval_ms: 5_000, pull_interval_ms: 30_000 }
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Embedding {
	pub batch_size: usize,
	pub max_input_chars: usize,
	pub preview_chars: usize,
}
impl Default for Embedding {
	fn default() -> Self {
		Self { batch_size: 4, max_input_chars: 4_000, preview_chars: 500 }
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Search {
	pub default_k: usize,
	/// Upper bound on vectors scanned by an unscoped query, newest first.
	pub scan_limit: usize,
}
impl Default for Search {
	fn default() -> Self {
		Self { default_k: 10, scan_limit: 50_000 }
	}
}

fn default_busy_timeout_ms() -> u64 {
	5_000
}
