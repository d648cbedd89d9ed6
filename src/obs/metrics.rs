// self
use crate::obs::{Stage, StageOutcome};

/// Increments `http_loader_stage_total{stage, outcome}` (when enabled).
pub fn record_stage_outcome(stage: Stage, outcome: StageOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"http_loader_stage_total",
			"stage" => stage.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (stage, outcome);
	}
}

/// Publishes the limiter's current load as the `http_loader_in_flight` and
/// `http_loader_queue_depth` gauges (when enabled).
pub fn record_limiter_load(in_flight: usize, queued: usize) {
	#[cfg(feature = "metrics")]
	{
		metrics::gauge!("http_loader_in_flight").set(in_flight as f64);
		metrics::gauge!("http_loader_queue_depth").set(queued as f64);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (in_flight, queued);
	}
}
