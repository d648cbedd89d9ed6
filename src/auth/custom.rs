//! Closure-backed authoriser for one-off decoration rules.

// self
use crate::{
	_prelude::*,
	auth::{AuthError, AuthoriseFuture, Authoriser},
	request::PendingRequest,
};

/// Wraps a synchronous closure as an [`Authoriser`].
///
/// ```
/// use http_loader::{
/// 	auth::FnAuthoriser,
/// 	request::{HeaderName, HeaderValue, PendingRequest},
/// };
///
/// let api_key = FnAuthoriser::new("api-key", |mut request: PendingRequest| {
/// 	request
/// 		.headers_mut()
/// 		.insert(HeaderName::from_static("x-api-key"), HeaderValue::from_static("k-123"));
///
/// 	Ok(request)
/// });
/// # let _ = api_key;
/// ```
pub struct FnAuthoriser<F> {
	identifier: String,
	f: F,
}
impl<F> FnAuthoriser<F>
where
	F: Fn(PendingRequest) -> Result<PendingRequest, AuthError> + Send + Sync,
{
	/// Names the closure and wraps it.
	pub fn new(identifier: impl Into<String>, f: F) -> Self {
		Self { identifier: identifier.into(), f }
	}
}
impl<F> Authoriser for FnAuthoriser<F>
where
	F: Fn(PendingRequest) -> Result<PendingRequest, AuthError> + Send + Sync,
{
	fn identifier(&self) -> &str {
		&self.identifier
	}

	fn authorise(&self, request: PendingRequest) -> AuthoriseFuture<'_> {
		Box::pin(async move { (self.f)(request) })
	}
}
impl<F> Debug for FnAuthoriser<F> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FnAuthoriser").field("identifier", &self.identifier).finish_non_exhaustive()
	}
}
