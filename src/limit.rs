//! Shared admission control for every factory spawned from one loader service.
//!
//! A [`RateLimiter`] combines a concurrency ceiling with a sliding-window log. Callers that
//! arrive while either ceiling is reached join a FIFO queue and are promoted strictly in
//! arrival order: when an [`AdmissionPermit`] is dropped, or when the oldest window entry
//! expires. Nobody is ever admitted ahead of an earlier waiter.
//!
//! Admission is split in two so the queueing decision stays observable:
//! [`RateLimiter::admit`] never blocks and reports [`AdmissionResult::Queued`] with the
//! caller's FIFO position, while [`Ticket::wait`] suspends until the slot arrives, the
//! configured timeout elapses, or the limiter shuts down. Dropping a [`Ticket`] cancels it;
//! a slot granted to a ticket that is no longer interested is refunded to the next waiter.

mod metrics;
mod permit;
mod state;
mod ticket;

pub use metrics::AdmissionMetrics;
pub use permit::AdmissionPermit;
pub use ticket::Ticket;

// crates.io
use tokio::sync::Notify;
// self
use crate::{
	_prelude::*,
	CancellationToken,
	config::RateLimitConfig,
	obs::{self, Stage, StageOutcome},
};
use state::LimiterState;

/// Outcome of a non-blocking [`RateLimiter::admit`] call.
#[derive(Debug)]
pub enum AdmissionResult {
	/// Capacity was free and nobody was waiting; the slot is held by the permit.
	Admitted(AdmissionPermit),
	/// The caller joined the queue; wait on the ticket to receive the slot.
	Queued(Ticket),
	/// The caller was turned away without queueing.
	Rejected(RejectReason),
}
impl AdmissionResult {
	/// Returns the queue position for [`AdmissionResult::Queued`], if applicable.
	pub fn queue_position(&self) -> Option<usize> {
		match self {
			Self::Queued(ticket) => Some(ticket.position()),
			_ => None,
		}
	}
}

/// Reasons a caller can be rejected without queueing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
	/// The owning service has been torn down.
	ServiceTornDown,
	/// The queue already holds `capacity` waiters.
	QueueFull {
		/// Configured queue capacity.
		capacity: usize,
	},
}
impl From<RejectReason> for Error {
	fn from(reason: RejectReason) -> Self {
		match reason {
			RejectReason::ServiceTornDown => Error::ServiceTornDown,
			RejectReason::QueueFull { capacity } => Error::QueueFull { capacity },
		}
	}
}

/// Point-in-time view of a limiter's bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LimiterSnapshot {
	/// Admitted requests whose permits are still alive.
	pub in_flight: usize,
	/// Callers waiting in the queue.
	pub queued: usize,
	/// Admissions recorded in the current sliding window.
	pub window_count: usize,
	/// Whether the limiter has been shut down.
	pub torn_down: bool,
}

pub(crate) struct LimiterShared {
	pub(crate) config: RateLimitConfig,
	pub(crate) state: Mutex<LimiterState>,
	pub(crate) metrics: AdmissionMetrics,
	/// Fired whenever a promotion grants capacity, so queued waiters re-arm their window timers.
	pub(crate) promoted: Notify,
}
impl LimiterShared {
	/// Promotes queue heads and wakes the remaining waiters if anything was granted.
	pub(crate) fn promote(&self, state: &mut LimiterState) {
		if state.promote(Instant::now(), &self.config) > 0 {
			self.promoted.notify_waiters();
		}

		obs::record_limiter_load(state.in_flight(), state.queued());
	}

	fn release(&self) {
		let mut state = self.state.lock();

		state.vacate();
		self.promote(&mut state);
	}
}

/// Process-wide admission control handle; clones share the same state.
#[derive(Clone)]
pub struct RateLimiter(Arc<LimiterShared>);
impl RateLimiter {
	/// Creates a limiter after validating `config`.
	pub fn new(config: RateLimitConfig) -> Result<Self> {
		config.validate()?;

		Ok(Self(Arc::new(LimiterShared {
			config,
			state: Default::default(),
			metrics: Default::default(),
			promoted: Notify::new(),
		})))
	}

	/// Configuration the limiter was built with.
	pub fn config(&self) -> &RateLimitConfig {
		&self.0.config
	}

	/// Admission counters accumulated since construction.
	pub fn metrics(&self) -> &AdmissionMetrics {
		&self.0.metrics
	}

	/// Attempts admission without blocking.
	pub fn admit(&self) -> AdmissionResult {
		const STAGE: Stage = Stage::Admission;

		let shared = &self.0;
		let mut state = shared.state.lock();

		obs::record_stage_outcome(STAGE, StageOutcome::Attempt);

		if state.is_torn_down() {
			drop(state);

			return self.reject(RejectReason::ServiceTornDown);
		}

		// Expired window entries belong to earlier waiters first.
		shared.promote(&mut state);

		if let Some(admitted_at) = state.try_occupy(Instant::now(), &shared.config) {
			obs::record_limiter_load(state.in_flight(), state.queued());
			drop(state);
			shared.metrics.record_admitted();
			obs::record_stage_outcome(STAGE, StageOutcome::Success);

			return AdmissionResult::Admitted(AdmissionPermit::new(shared.clone(), admitted_at));
		}
		if let Some(capacity) = shared.config.max_queue.filter(|capacity| state.queued() >= *capacity)
		{
			drop(state);

			return self.reject(RejectReason::QueueFull { capacity });
		}

		let (id, receiver, position) = state.enqueue();

		obs::record_limiter_load(state.in_flight(), state.queued());
		drop(state);
		shared.metrics.record_queued();
		obs::record_stage_outcome(STAGE, StageOutcome::Queued);

		AdmissionResult::Queued(Ticket::new(shared.clone(), id, position, receiver))
	}

	/// Admits the caller, waiting in the queue if necessary.
	pub async fn acquire(&self) -> Result<AdmissionPermit> {
		match self.admit() {
			AdmissionResult::Admitted(permit) => Ok(permit),
			AdmissionResult::Queued(ticket) => ticket.wait().await,
			AdmissionResult::Rejected(reason) => Err(reason.into()),
		}
	}

	/// Same as [`acquire`](Self::acquire), but gives up with [`Error::Cancelled`] once `cancel`
	/// fires. An already-cancelled token never touches the queue.
	pub async fn acquire_or_cancel(&self, cancel: &CancellationToken) -> Result<AdmissionPermit> {
		if cancel.is_cancelled() {
			self.0.metrics.record_cancelled();

			return Err(Error::Cancelled);
		}

		match self.admit() {
			AdmissionResult::Admitted(permit) => Ok(permit),
			AdmissionResult::Queued(ticket) => ticket.wait_or_cancel(cancel).await,
			AdmissionResult::Rejected(reason) => Err(reason.into()),
		}
	}

	/// Shuts the limiter down: queued callers fail with [`Error::ServiceTornDown`] and every
	/// later admission is rejected, regardless of free capacity.
	pub fn shutdown(&self) {
		let failed = self.0.state.lock().tear_down();

		#[cfg(feature = "tracing")]
		tracing::debug!(failed, "rate limiter shut down");
		#[cfg(not(feature = "tracing"))]
		let _ = failed;
	}

	/// Returns true once [`shutdown`](Self::shutdown) has run.
	pub fn is_shut_down(&self) -> bool {
		self.0.state.lock().is_torn_down()
	}

	/// Captures the current bookkeeping after pruning expired window entries.
	pub fn snapshot(&self) -> LimiterSnapshot {
		let mut state = self.0.state.lock();

		state.prune(Instant::now(), &self.0.config);

		LimiterSnapshot {
			in_flight: state.in_flight(),
			queued: state.queued(),
			window_count: state.window_count(),
			torn_down: state.is_torn_down(),
		}
	}

	fn reject(&self, reason: RejectReason) -> AdmissionResult {
		self.0.metrics.record_rejected();
		obs::record_stage_outcome(Stage::Admission, StageOutcome::Rejected);

		AdmissionResult::Rejected(reason)
	}
}
impl Debug for RateLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RateLimiter")
			.field("config", &self.0.config)
			.field("snapshot", &self.snapshot())
			.finish()
	}
}
