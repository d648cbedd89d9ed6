//! Optional observability for the loader pipeline.
//!
//! Every request passes through up to three [`Stage`]s: admission, authorisation, and dispatch.
//! Each stage records an attempt and one terminal [`StageOutcome`]; failures are classified from
//! the error itself, so a timed-out admission and a rejected credential land in different
//! series.
//!
//! # Feature Flags
//!
//! - `tracing`: debug spans named `http_loader.stage` (fields `stage`, `call`) and
//!   `http_loader.admission_wait` (field `position`).
//! - `metrics`: the `http_loader_stage_total{stage, outcome}` counter plus the
//!   `http_loader_in_flight` and `http_loader_queue_depth` gauges.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::{_prelude::*, auth::AuthError};

/// Pipeline stages a request passes through on its way to the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
	/// Waiting for (or receiving) a rate-limit slot.
	Admission,
	/// Running the factory's authoriser chain.
	Authorisation,
	/// Handing the built request to the transport collaborator.
	Dispatch,
}
impl Stage {
	/// Metric and span label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Stage::Admission => "admission",
			Stage::Authorisation => "authorisation",
			Stage::Dispatch => "dispatch",
		}
	}
}
impl Display for Stage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// What happened to a request at one stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageOutcome {
	/// The request entered the stage.
	Attempt,
	/// The caller joined the admission queue.
	Queued,
	/// The stage completed.
	Success,
	/// The admission wait ran past its ceiling.
	Timeout,
	/// The caller withdrew.
	Cancelled,
	/// Turned away: full queue, torn-down service, or an authoriser refusing the request.
	Rejected,
	/// A credential had expired.
	Expired,
	/// Any other failure.
	Failure,
}
impl StageOutcome {
	/// Metric and span label.
	pub const fn as_str(self) -> &'static str {
		match self {
			StageOutcome::Attempt => "attempt",
			StageOutcome::Queued => "queued",
			StageOutcome::Success => "success",
			StageOutcome::Timeout => "timeout",
			StageOutcome::Cancelled => "cancelled",
			StageOutcome::Rejected => "rejected",
			StageOutcome::Expired => "expired",
			StageOutcome::Failure => "failure",
		}
	}
}
impl Display for StageOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl From<&AuthError> for StageOutcome {
	fn from(e: &AuthError) -> Self {
		match e {
			AuthError::Rejected { .. } => Self::Rejected,
			AuthError::Expired { .. } => Self::Expired,
			AuthError::Signing { .. } => Self::Failure,
		}
	}
}
impl From<&Error> for StageOutcome {
	fn from(e: &Error) -> Self {
		match e {
			Error::Auth(e) => e.into(),
			Error::Timeout { .. } => Self::Timeout,
			Error::Cancelled => Self::Cancelled,
			Error::ServiceTornDown | Error::QueueFull { .. } => Self::Rejected,
			Error::Config(_) | Error::Transport(_) | Error::InvalidRequest { .. } => Self::Failure,
		}
	}
}

/// Records the terminal outcome of a stage, classifying failures by error kind.
pub(crate) fn record_result<T, E>(stage: Stage, result: &Result<T, E>)
where
	for<'e> &'e E: Into<StageOutcome>,
{
	let outcome = match result {
		Ok(_) => StageOutcome::Success,
		Err(e) => e.into(),
	};

	record_stage_outcome(stage, outcome);
}
