mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, Embedding, EmbeddingProviderConfig, Outbox, Providers, Remote, Search, Service, Sqlite,
	Storage, Sync,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);
	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::validation("service.log_level", "must be non-empty."));
	}
	if cfg.storage.sqlite.path.trim().is_empty() {
		return Err(Error::validation("storage.sqlite.path", "must be non-empty."));
	}
	if cfg.storage.sqlite.pool_max_conns == 0 {
		return Err(Error::validation(
			"storage.sqlite.pool_max_conns",
			"must be greater than zero.",
		));
	}
	if cfg.remote.api_base.trim().is_empty() {
		return Err(Error::validation("remote.api_base", "must be non-empty."));
	}
	if cfg.remote.timeout_ms == 0 {
		return Err(Error::validation("remote.timeout_ms", "must be greater than zero."));
	}

	let embedding = &cfg.providers.embedding;

	if embedding.api_base.trim().is_empty() {
		return Err(Error::validation("providers.embedding.api_base", "must be non-empty."));
	}
	if embedding.model.trim().is_empty() {
		return Err(Error::validation("providers.embedding.model", "must be non-empty."));
	}
	if embedding.dimensions == 0 {
		return Err(Error::validation(
			"providers.embedding.dimensions",
			"must be greater than zero.",
		));
	}
	if embedding.timeout_ms == 0 {
		return Err(Error::validation(
			"providers.embedding.timeout_ms",
			"must be greater than zero.",
		));
	}

	for (key, value) in cfg.remote.default_headers.iter().chain(embedding.default_headers.iter()) {
		if !value.is_string() {
			return Err(Error::validation(
				"default_headers",
				format!("value for {key:?} must be a string."),
			));
		}
	}

	validate_outbox(cfg)?;

	if cfg.sync.drain_interval_ms == 0 {
		return Err(Error::validation("sync.drain_interval_ms", "must be greater than zero."));
	}
	if cfg.sync.pull_interval_ms == 0 {
		return Err(Error::validation("sync.pull_interval_ms", "must be greater than zero."));
	}
	if cfg.embedding.batch_size == 0 {
		return Err(Error::validation("embedding.batch_size", "must be greater than zero."));
	}
	if cfg.embedding.max_input_chars == 0 {
		return Err(Error::validation("embedding.max_input_chars", "must be greater than zero."));
	}
	if cfg.embedding.preview_chars == 0 {
		return Err(Error::validation("embedding.preview_chars", "must be greater than zero."));
	}
	if cfg.search.default_k == 0 {
		return Err(Error::validation("search.default_k", "must be greater than zero."));
	}
	if cfg.search.scan_limit == 0 {
		return Err(Error::validation("search.scan_limit", "must be greater than zero."));
	}

	Ok(())
}

fn validate_outbox(cfg: &Config) -> Result<()> {
	let outbox = &cfg.outbox;

	if outbox.base_backoff_ms <= 0 {
		return Err(Error::validation("outbox.base_backoff_ms", "must be greater than zero."));
	}
	if outbox.max_backoff_ms < outbox.base_backoff_ms {
		return Err(Error::validation(
			"outbox.max_backoff_ms",
			"must be greater than or equal to outbox.base_backoff_ms.",
		));
	}
	if outbox.processing_lease_ms <= 0 {
		return Err(Error::validation("outbox.processing_lease_ms", "must be greater than zero."));
	}
	if outbox.drain_batch == 0 {
		return Err(Error::validation("outbox.drain_batch", "must be greater than zero."));
	}
	if outbox.max_error_chars == 0 {
		return Err(Error::validation("outbox.max_error_chars", "must be greater than zero."));
	}

	// A dispatch must end before its lease can be recovered, or the op is sent twice.
	let lease_outlasts_dispatch = i64::try_from(cfg.remote.timeout_ms)
		.is_ok_and(|timeout| timeout < outbox.processing_lease_ms);

	if !lease_outlasts_dispatch {
		return Err(Error::validation(
			"outbox.processing_lease_ms",
			"must be greater than remote.timeout_ms.",
		));
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.remote.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
		cfg.remote.api_key = None;
	}

	let trimmed = cfg.remote.api_base.trim_end_matches('/').to_string();

	cfg.remote.api_base = trimmed;
	cfg.service.log_level = cfg.service.log_level.trim().to_string();
}
