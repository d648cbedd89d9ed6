//! Transport seam between built requests and whatever actually speaks HTTP.
//!
//! The loader never opens connections itself. [`Transport`] is its only dependency on an
//! HTTP stack: implementations receive a fully authorised [`PendingRequest`] and report a
//! [`LoadResponse`] or an opaque [`TransportError`]. With the default `reqwest` feature,
//! [`ReqwestTransport`] provides a ready-made implementation.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	error::TransportError,
	request::{HeaderMap, PendingRequest, StatusCode},
};
#[cfg(feature = "reqwest")] use crate::error::ConfigError;
#[cfg(feature = "reqwest")] use crate::request::header::RETRY_AFTER;

/// Boxed future returned by [`Transport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<LoadResponse, TransportError>> + 'a + Send>>;

/// External collaborator that dispatches requests.
///
/// Implementations must be `Send + Sync + 'static` so one transport can serve every factory in
/// the process; the returned futures must be `Send`.
pub trait Transport
where
	Self: 'static + Send + Sync,
{
	/// Dispatches `request` and collects the full response.
	fn execute<'a>(&'a self, request: &'a PendingRequest) -> TransportFuture<'a>;
}

/// Response collected by a [`Transport`].
///
/// Non-success statuses are not errors at this layer; callers inspect `status` themselves.
#[derive(Clone, Debug)]
pub struct LoadResponse {
	/// HTTP status code.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw response body.
	pub body: Vec<u8>,
	/// `Retry-After` hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client that gives up on any single call after `timeout`.
	pub fn with_timeout(timeout: Duration) -> Result<Self, ConfigError> {
		Ok(Self(ReqwestClient::builder().timeout(timeout).build()?))
	}

	async fn dispatch(&self, request: &PendingRequest) -> Result<LoadResponse, TransportError> {
		let response = self
			.0
			.request(request.method().clone(), request.url().clone())
			.headers(request.headers().clone())
			.body(request.body().to_vec())
			.send()
			.await?;
		let status = response.status();
		let headers = response.headers().to_owned();
		let retry_after = parse_retry_after(&headers);
		let body = response.bytes().await?.to_vec();

		Ok(LoadResponse { status, headers, body, retry_after })
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Debug for ReqwestTransport {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ReqwestTransport").field(&self.0).finish()
	}
}
#[cfg(feature = "reqwest")]
impl Transport for ReqwestTransport {
	fn execute<'a>(&'a self, request: &'a PendingRequest) -> TransportFuture<'a> {
		Box::pin(self.dispatch(request))
	}
}

#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::from_secs(secs));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Duration::try_from(delta).ok();
		}
	}

	None
}
