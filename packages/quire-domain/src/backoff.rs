/// Retry schedule for failed outbox ops: the delay doubles per attempt from `base_ms` and is
/// capped at `max_ms`. No jitter, so consecutive delays never shrink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
	pub base_ms: i64,
	pub max_ms: i64,
	pub max_retries: u32,
}
impl BackoffPolicy {
	pub fn delay_for(&self, retry_count: u32) -> i64 {
		let exp = retry_count.max(1).saturating_sub(1).min(40);
		let base = self.base_ms.max(0).saturating_mul(1_i64 << exp);

		base.min(self.max_ms.max(0))
	}

	pub fn next_retry_at(&self, now: i64, previous: i64, retry_count: u32) -> i64 {
		now.saturating_add(self.delay_for(retry_count)).max(previous)
	}

	pub fn exhausted(&self, retry_count: u32) -> bool {
		retry_count > self.max_retries
	}
}
impl Default for BackoffPolicy {
	fn default() -> Self {
		Self { base_ms: 3_000, max_ms: 300_000, max_retries: 5 }
	}
}
