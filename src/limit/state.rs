//! Lock-protected limiter bookkeeping: in-flight count, sliding-window log, and waiter queue.

// crates.io
use tokio::sync::oneshot;
// self
use crate::{_prelude::*, config::RateLimitConfig};

/// Capacity handed to a queued waiter; `admitted_at` identifies its window entry.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Grant {
	pub(crate) admitted_at: Instant,
}

struct Waiter {
	id: u64,
	grant: oneshot::Sender<Grant>,
}

#[derive(Default)]
pub(crate) struct LimiterState {
	in_flight: usize,
	window: VecDeque<Instant>,
	queue: VecDeque<Waiter>,
	next_id: u64,
	torn_down: bool,
}
impl LimiterState {
	pub(crate) fn in_flight(&self) -> usize {
		self.in_flight
	}

	pub(crate) fn queued(&self) -> usize {
		self.queue.len()
	}

	pub(crate) fn window_count(&self) -> usize {
		self.window.len()
	}

	pub(crate) fn is_torn_down(&self) -> bool {
		self.torn_down
	}

	/// Drops window entries whose age reached the window length.
	pub(crate) fn prune(&mut self, now: Instant, config: &RateLimitConfig) {
		let Some(window) = config.window else { return };

		while let Some(&oldest) = self.window.front() {
			if now.saturating_duration_since(oldest) < window {
				break;
			}

			self.window.pop_front();
		}
	}

	pub(crate) fn has_capacity(&self, config: &RateLimitConfig) -> bool {
		let concurrency_ok = config.max_concurrent.is_none_or(|max| self.in_flight < max);
		let window_ok = config.max_per_window.is_none_or(|max| self.window.len() < max);

		concurrency_ok && window_ok
	}

	/// Admits a caller immediately if nobody is waiting ahead of it.
	pub(crate) fn try_occupy(&mut self, now: Instant, config: &RateLimitConfig) -> Option<Instant> {
		self.prune(now, config);

		if !self.queue.is_empty() || !self.has_capacity(config) {
			return None;
		}

		Some(self.occupy(now, config))
	}

	fn occupy(&mut self, now: Instant, config: &RateLimitConfig) -> Instant {
		self.in_flight += 1;

		if config.window.is_some() {
			self.window.push_back(now);
		}

		now
	}

	/// Frees a concurrency slot; the window entry of a used admission stays until it expires.
	pub(crate) fn vacate(&mut self) {
		debug_assert!(self.in_flight > 0, "Released more slots than were admitted.");

		self.in_flight = self.in_flight.saturating_sub(1);
	}

	/// Returns a grant that was never used, including its window entry.
	pub(crate) fn refund(&mut self, grant: Grant, config: &RateLimitConfig) {
		self.vacate();

		let entry = config
			.window
			.and_then(|_| self.window.iter().rposition(|at| *at == grant.admitted_at));

		if let Some(idx) = entry {
			self.window.remove(idx);
		}
	}

	/// Appends a waiter and returns its id, receiver, and zero-based position.
	pub(crate) fn enqueue(&mut self) -> (u64, oneshot::Receiver<Grant>, usize) {
		let (grant, receiver) = oneshot::channel();
		let id = self.next_id;

		self.next_id += 1;
		self.queue.push_back(Waiter { id, grant });

		(id, receiver, self.queue.len() - 1)
	}

	pub(crate) fn position_of(&self, id: u64) -> Option<usize> {
		self.queue.iter().position(|waiter| waiter.id == id)
	}

	/// Removes a waiter; returns false if it already left the queue (granted or torn down).
	pub(crate) fn withdraw(&mut self, id: u64) -> bool {
		match self.position_of(id) {
			Some(idx) => {
				self.queue.remove(idx);

				true
			},
			None => false,
		}
	}

	/// Grants capacity to queue heads, strictly in arrival order, while both ceilings hold.
	///
	/// Returns the number of waiters granted.
	pub(crate) fn promote(&mut self, now: Instant, config: &RateLimitConfig) -> usize {
		if self.torn_down {
			return 0;
		}

		self.prune(now, config);

		let mut granted = 0;

		while self.has_capacity(config) {
			let Some(waiter) = self.queue.pop_front() else { break };

			if waiter.grant.is_closed() {
				continue;
			}

			let grant = Grant { admitted_at: self.occupy(now, config) };

			match waiter.grant.send(grant) {
				Ok(()) => granted += 1,
				Err(_) => self.refund(grant, config),
			}
		}

		granted
	}

	/// Instant at which the oldest window entry expires, if a full window is holding up the queue.
	pub(crate) fn next_expiry(&self, config: &RateLimitConfig) -> Option<Instant> {
		let (Some(window), Some(max)) = (config.window, config.max_per_window) else {
			return None;
		};

		if self.queue.is_empty() || self.window.len() < max {
			return None;
		}

		self.window.front().map(|oldest| *oldest + window)
	}

	/// Marks the limiter as torn down and fails every waiter by dropping its sender.
	pub(crate) fn tear_down(&mut self) -> usize {
		self.torn_down = true;

		let failed = self.queue.len();

		self.queue.clear();

		failed
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn window_config() -> RateLimitConfig {
		RateLimitConfig::per_window(2, Duration::from_secs(1))
	}

	#[test]
	fn window_entries_expire_after_the_window_length() {
		let config = window_config();
		let start = Instant::now();
		let mut state = LimiterState::default();

		assert!(state.try_occupy(start, &config).is_some());
		assert!(state.try_occupy(start, &config).is_some());
		assert!(state.try_occupy(start, &config).is_none());
		assert!(state.try_occupy(start + Duration::from_millis(999), &config).is_none());
		assert!(state.try_occupy(start + Duration::from_secs(1), &config).is_some());
	}

	#[test]
	fn callers_never_jump_a_non_empty_queue() {
		let config = RateLimitConfig::concurrent(1);
		let now = Instant::now();
		let mut state = LimiterState::default();

		state.try_occupy(now, &config).expect("First caller should be admitted.");

		let (_id, _receiver, position) = state.enqueue();

		assert_eq!(position, 0);

		state.vacate();

		// Capacity is free, but the queued caller is still ahead.
		assert!(state.try_occupy(now, &config).is_none());
	}

	#[test]
	fn promotion_is_fifo_and_respects_the_ceiling() {
		let config = RateLimitConfig::concurrent(1);
		let now = Instant::now();
		let mut state = LimiterState::default();

		state.try_occupy(now, &config).expect("First caller should be admitted.");

		let (_, mut first, _) = state.enqueue();
		let (_, mut second, position) = state.enqueue();

		assert_eq!(position, 1);

		state.vacate();

		assert_eq!(state.promote(now, &config), 1);
		assert!(first.try_recv().is_ok());
		assert!(second.try_recv().is_err());
		assert_eq!(state.in_flight(), 1);
		assert_eq!(state.queued(), 1);
	}

	#[test]
	fn promotion_skips_abandoned_waiters() {
		let config = RateLimitConfig::concurrent(1);
		let now = Instant::now();
		let mut state = LimiterState::default();

		state.try_occupy(now, &config).expect("First caller should be admitted.");

		let (_, abandoned, _) = state.enqueue();
		let (_, mut waiting, _) = state.enqueue();

		drop(abandoned);
		state.vacate();
		state.promote(now, &config);

		assert!(waiting.try_recv().is_ok());
		assert_eq!(state.in_flight(), 1);
	}

	#[test]
	fn refund_removes_the_window_entry() {
		let config = window_config();
		let now = Instant::now();
		let mut state = LimiterState::default();
		let admitted_at = state.try_occupy(now, &config).expect("Caller should be admitted.");

		state.refund(Grant { admitted_at }, &config);

		assert_eq!(state.in_flight(), 0);
		assert_eq!(state.window_count(), 0);
	}

	#[test]
	fn next_expiry_only_reports_a_blocking_window() {
		let config = window_config();
		let now = Instant::now();
		let mut state = LimiterState::default();

		state.try_occupy(now, &config);

		let (_id, _receiver, _) = state.enqueue();

		assert_eq!(state.next_expiry(&config), None);

		state.window.push_back(now);

		assert_eq!(state.next_expiry(&config), Some(now + Duration::from_secs(1)));
	}
}
