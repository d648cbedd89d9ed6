//! Pluggable request authorisers and the ordered chain a factory runs them in.
//!
//! An [`Authoriser`] receives a [`PendingRequest`] by value and either hands back a decorated
//! request or rejects it with an [`AuthError`]. Factories apply every authoriser whose
//! [`requires_authorisation`](Authoriser::requires_authorisation) accepts the request, in the
//! order they were configured; the first failure aborts the chain.

pub mod basic;
pub mod bearer;
pub mod credential;
pub mod custom;
pub mod signed;

pub use basic::*;
pub use bearer::*;
pub use credential::*;
pub use custom::*;
pub use signed::*;

// self
use crate::{
	_prelude::*,
	error::BoxError,
	obs::{self, Stage, StageOutcome, StageSpan},
	request::PendingRequest,
};

/// Boxed future returned by [`Authoriser::authorise`].
pub type AuthoriseFuture<'a> =
	Pin<Box<dyn Future<Output = Result<PendingRequest, AuthError>> + 'a + Send>>;

/// Capability that decorates (or refuses) an outgoing request.
///
/// Implementations must be `Send + Sync` because one authoriser is shared by every clone of a
/// factory and may run on many requests at once.
pub trait Authoriser
where
	Self: Send + Sync,
{
	/// Stable name used in logs and errors.
	fn identifier(&self) -> &str;

	/// Returns false to skip this authoriser for `request`.
	fn requires_authorisation(&self, request: &PendingRequest) -> bool {
		let _ = request;

		true
	}

	/// Decorates `request` or rejects it.
	fn authorise(&self, request: PendingRequest) -> AuthoriseFuture<'_>;
}

/// Failures raised by authorisers.
#[derive(Debug, ThisError)]
pub enum AuthError {
	/// The authoriser refused the request.
	#[error("Authoriser `{authoriser}` rejected the request: {reason}.")]
	Rejected {
		/// Identifier of the rejecting authoriser.
		authoriser: String,
		/// Human-readable reason.
		reason: String,
	},
	/// The credential held by the authoriser has expired and must be replaced by the caller.
	#[error("Credential held by authoriser `{authoriser}` has expired.")]
	Expired {
		/// Identifier of the authoriser holding the stale credential.
		authoriser: String,
	},
	/// The request signer failed to produce a signature.
	#[error("Authoriser `{authoriser}` failed to sign the request.")]
	Signing {
		/// Identifier of the signing authoriser.
		authoriser: String,
		/// Signer-specific failure.
		#[source]
		source: BoxError,
	},
}
impl AuthError {
	/// Builds a [`AuthError::Rejected`] value.
	pub fn rejected(authoriser: impl Into<String>, reason: impl Into<String>) -> Self {
		Self::Rejected { authoriser: authoriser.into(), reason: reason.into() }
	}

	/// Builds a [`AuthError::Expired`] value.
	pub fn expired(authoriser: impl Into<String>) -> Self {
		Self::Expired { authoriser: authoriser.into() }
	}

	/// Wraps a signer failure.
	pub fn signing(authoriser: impl Into<String>, src: impl Into<BoxError>) -> Self {
		Self::Signing { authoriser: authoriser.into(), source: src.into() }
	}

	/// Identifier of the authoriser that raised the error.
	pub fn authoriser(&self) -> &str {
		match self {
			Self::Rejected { authoriser, .. }
			| Self::Expired { authoriser }
			| Self::Signing { authoriser, .. } => authoriser,
		}
	}
}

/// Authoriser that never decorates anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAuthoriser;
impl Authoriser for NoAuthoriser {
	fn identifier(&self) -> &str {
		"none"
	}

	fn requires_authorisation(&self, _: &PendingRequest) -> bool {
		false
	}

	fn authorise(&self, request: PendingRequest) -> AuthoriseFuture<'_> {
		Box::pin(async move { Ok(request) })
	}
}

/// Runs `authorisers` in order over `request`, stopping at the first failure.
pub(crate) async fn authorise_chain(
	authorisers: &[Arc<dyn Authoriser>],
	mut request: PendingRequest,
) -> Result<PendingRequest, AuthError> {
	const STAGE: Stage = Stage::Authorisation;

	let span = StageSpan::new(STAGE, "authorise_chain");

	obs::record_stage_outcome(STAGE, StageOutcome::Attempt);

	let result: Result<PendingRequest, AuthError> = span
		.instrument(async move {
			for authoriser in authorisers {
				if !authoriser.requires_authorisation(&request) {
					continue;
				}

				request = authoriser.authorise(request).await?;
			}

			Ok(request)
		})
		.await;

	#[cfg(feature = "tracing")]
	if let Err(e) = &result {
		tracing::debug!(authoriser = e.authoriser(), error = %e, "authoriser chain aborted");
	}

	obs::record_result(STAGE, &result);

	result
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::{Journal, RecordingAuthoriser},
		request::{HeaderName, RequestSpec},
	};

	fn pending() -> PendingRequest {
		let url = Url::parse("https://api.example.com/items").expect("Test URL should parse.");

		PendingRequest::try_from(RequestSpec::get(url)).expect("Request should be valid.")
	}

	#[tokio::test]
	async fn chain_applies_authorisers_in_order() {
		let journal = Journal::default();
		let chain: Vec<Arc<dyn Authoriser>> = vec![
			Arc::new(RecordingAuthoriser::stamping("a", &journal)),
			Arc::new(NoAuthoriser),
			Arc::new(RecordingAuthoriser::stamping("b", &journal)),
		];
		let request = authorise_chain(&chain, pending()).await.expect("Chain should succeed.");

		assert_eq!(*journal.lock(), vec!["a", "b"]);
		assert!(request.headers().contains_key(HeaderName::from_static("x-auth-a")));
		assert!(request.headers().contains_key(HeaderName::from_static("x-auth-b")));
	}

	#[tokio::test]
	async fn first_failure_short_circuits() {
		let journal = Journal::default();
		let chain: Vec<Arc<dyn Authoriser>> = vec![
			Arc::new(RecordingAuthoriser::rejecting("a", &journal)),
			Arc::new(RecordingAuthoriser::stamping("b", &journal)),
		];
		let err = authorise_chain(&chain, pending()).await.expect_err("Chain should abort.");

		assert_eq!(err.authoriser(), "a");
		assert_eq!(*journal.lock(), vec!["a"]);
	}

	#[tokio::test]
	async fn empty_chain_passes_the_request_through() {
		let request = pending();
		let out = authorise_chain(&[], request.clone()).await.expect("Empty chain should succeed.");

		assert_eq!(out, request);
	}
}
