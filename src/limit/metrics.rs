// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe admission counters kept by every limiter.
#[derive(Debug, Default)]
pub struct AdmissionMetrics {
	admitted: AtomicU64,
	queued: AtomicU64,
	rejected: AtomicU64,
	timed_out: AtomicU64,
	cancelled: AtomicU64,
}
impl AdmissionMetrics {
	/// Returns the number of callers that received a slot, immediately or after queueing.
	pub fn admitted(&self) -> u64 {
		self.admitted.load(Ordering::Relaxed)
	}

	/// Returns the number of callers that had to join the queue.
	pub fn queued(&self) -> u64 {
		self.queued.load(Ordering::Relaxed)
	}

	/// Returns the number of callers turned away without queueing.
	pub fn rejected(&self) -> u64 {
		self.rejected.load(Ordering::Relaxed)
	}

	/// Returns the number of queued callers that gave up after the admission timeout.
	pub fn timed_out(&self) -> u64 {
		self.timed_out.load(Ordering::Relaxed)
	}

	/// Returns the number of queued callers that withdrew before admission.
	pub fn cancelled(&self) -> u64 {
		self.cancelled.load(Ordering::Relaxed)
	}

	pub(crate) fn record_admitted(&self) {
		self.admitted.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_queued(&self) {
		self.queued.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_rejected(&self) {
		self.rejected.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_timed_out(&self) {
		self.timed_out.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cancelled(&self) {
		self.cancelled.fetch_add(1, Ordering::Relaxed);
	}
}
