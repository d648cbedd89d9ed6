// crates.io
use tokio::{sync::oneshot, time};
// self
use crate::{
	_prelude::*,
	CancellationToken,
	limit::{AdmissionPermit, LimiterShared, state::Grant},
	obs::{self, Stage, StageSpan},
};

/// A queued admission.
///
/// Waiting consumes the ticket. Dropping it (or the future returned by [`wait`](Self::wait))
/// withdraws the caller from the queue without consuming capacity and without delaying the
/// callers behind it.
pub struct Ticket {
	shared: Arc<LimiterShared>,
	id: u64,
	position: usize,
	receiver: oneshot::Receiver<Grant>,
	settled: bool,
}
impl Ticket {
	pub(crate) fn new(
		shared: Arc<LimiterShared>,
		id: u64,
		position: usize,
		receiver: oneshot::Receiver<Grant>,
	) -> Self {
		Self { shared, id, position, receiver, settled: false }
	}

	/// Zero-based FIFO position at the moment the caller was queued.
	pub fn position(&self) -> usize {
		self.position
	}

	/// Current FIFO position, or `None` once the caller has left the queue.
	pub fn current_position(&self) -> Option<usize> {
		self.shared.state.lock().position_of(self.id)
	}

	/// Waits for a slot.
	///
	/// Fails with [`Error::Timeout`] after the configured admission timeout and with
	/// [`Error::ServiceTornDown`] if the limiter shuts down first.
	pub async fn wait(self) -> Result<AdmissionPermit> {
		self.wait_until(None).await
	}

	/// Waits for a slot, failing with [`Error::Cancelled`] once `cancel` fires.
	pub async fn wait_or_cancel(self, cancel: &CancellationToken) -> Result<AdmissionPermit> {
		self.wait_until(Some(cancel)).await
	}

	async fn wait_until(mut self, cancel: Option<&CancellationToken>) -> Result<AdmissionPermit> {
		let span = StageSpan::admission_wait(self.position);
		let result = span.instrument(self.wait_inner(cancel)).await;

		#[cfg(feature = "tracing")]
		if let Err(e) = &result {
			tracing::debug!(position = self.position, error = %e, "queued admission failed");
		}

		obs::record_result(Stage::Admission, &result);

		result
	}

	async fn wait_inner(&mut self, cancel: Option<&CancellationToken>) -> Result<AdmissionPermit> {
		let config = self.shared.config;
		let started = Instant::now();
		let deadline = config.admission_timeout.map(|timeout| started + timeout);

		loop {
			let shared = self.shared.clone();
			let promoted = shared.promoted.notified();

			tokio::pin!(promoted);
			// Register before reading the window so a grant in between still wakes us.
			promoted.as_mut().enable();

			let wake = shared.state.lock().next_expiry(&config);

			tokio::select! {
				biased;

				grant = &mut self.receiver => {
					self.settled = true;

					return match grant {
						Ok(grant) => {
							self.shared.metrics.record_admitted();

							Ok(AdmissionPermit::new(self.shared.clone(), grant.admitted_at))
						},
						// Senders only vanish without a grant when the limiter is torn down.
						Err(_) => Err(Error::ServiceTornDown),
					};
				},
				_ = cancelled(cancel) => {
					self.abandon();
					self.shared.metrics.record_cancelled();

					return Err(Error::Cancelled);
				},
				_ = time::sleep_until(deadline.unwrap_or(started)), if deadline.is_some() => {
					self.abandon();
					self.shared.metrics.record_timed_out();

					return Err(Error::Timeout { waited: started.elapsed() });
				},
				_ = time::sleep_until(wake.unwrap_or(started)), if wake.is_some() => {
					shared.promote(&mut shared.state.lock());
				},
				// Another grant may have filled the window; recompute the wake-up.
				_ = &mut promoted => {},
			}
		}
	}

	/// Leaves the queue; a grant that raced with the withdrawal is handed back.
	fn abandon(&mut self) {
		if self.settled {
			return;
		}

		self.settled = true;

		let mut state = self.shared.state.lock();

		if state.withdraw(self.id) {
			return;
		}

		// Grants are sent under the state lock, so a racing grant is visible here.
		if let Ok(grant) = self.receiver.try_recv() {
			state.refund(grant, &self.shared.config);
			self.shared.promote(&mut state);
		}
	}
}
impl Drop for Ticket {
	fn drop(&mut self) {
		if self.settled {
			return;
		}

		self.abandon();
		self.shared.metrics.record_cancelled();
	}
}
impl Debug for Ticket {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Ticket")
			.field("id", &self.id)
			.field("position", &self.position)
			.field("settled", &self.settled)
			.finish()
	}
}

async fn cancelled(token: Option<&CancellationToken>) {
	match token {
		Some(token) => token.cancelled().await,
		None => std::future::pending().await,
	}
}
