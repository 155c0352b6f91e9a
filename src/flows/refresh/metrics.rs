// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for refreshes performed under a lease.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	provider_calls: AtomicU64,
}
impl RefreshMetrics {
	/// Returns how many times a lease holder found the credential stale and tried to renew it.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of refreshes that stored a new access token.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of failed refreshes.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns the number of token endpoint calls.
	pub fn provider_calls(&self) -> u64 {
		self.provider_calls.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_provider_call(&self) {
		self.provider_calls.fetch_add(1, Ordering::Relaxed);
	}
}
