// self
use crate::{_prelude::*, obs::Stage};

/// Span wrapped around one pipeline stage, or a no-op without the `tracing` feature.
#[derive(Clone, Debug)]
pub struct StageSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl StageSpan {
	/// Span for `stage`, entered from the `call` site.
	pub fn new(stage: Stage, call: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::debug_span!("http_loader.stage", stage = stage.as_str(), call);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (stage, call);

			Self {}
		}
	}

	/// Span covering a queued caller's wait, tagged with its FIFO position at enqueue time.
	pub fn admission_wait(position: usize) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::debug_span!(
				"http_loader.admission_wait",
				stage = Stage::Admission.as_str(),
				position
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = position;

			Self {}
		}
	}

	/// Runs `fut` inside the span without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> impl Future<Output = Fut::Output> + use<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn instrumented_stages_pass_their_output_through() {
		let dispatch = StageSpan::new(Stage::Dispatch, "test").instrument(async { 42 }).await;
		let queued = StageSpan::admission_wait(3).instrument(async { "admitted" }).await;

		assert_eq!(dispatch, 42);
		assert_eq!(queued, "admitted");
	}
}
