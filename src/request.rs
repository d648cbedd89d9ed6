//! Request values as they move from caller description to transport handoff.
//!
//! A [`RequestSpec`] is what callers hand to a factory. The factory turns it into a
//! [`PendingRequest`], which authorisers decorate, and finally returns a
//! [`DispatchableRequest`] that is ready for the transport collaborator.

// crates.io
pub use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
// self
use crate::{
	_prelude::*,
	limit::AdmissionPermit,
	obs::{self, Stage, StageOutcome, StageSpan},
	transport::{LoadResponse, Transport},
};

/// Caller-side description of an HTTP request.
#[derive(Clone, Debug)]
pub struct RequestSpec {
	/// HTTP method.
	pub method: Method,
	/// Absolute `http` or `https` URL.
	pub url: Url,
	/// Headers supplied by the caller.
	pub headers: HeaderMap,
	/// Raw request body.
	pub body: Vec<u8>,
}
impl RequestSpec {
	/// Creates a body-less request description.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: HeaderMap::new(), body: Vec::new() }
	}

	/// Shorthand for a `GET` request.
	pub fn get(url: Url) -> Self {
		Self::new(Method::GET, url)
	}

	/// Shorthand for a `POST` request carrying `body`.
	pub fn post(url: Url, body: impl Into<Vec<u8>>) -> Self {
		Self::new(Method::POST, url).with_body(body)
	}

	/// Appends a header.
	pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.append(name, value);

		self
	}

	/// Replaces the body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = body.into();

		self
	}
}

/// A not-yet-dispatched request flowing through admission and the authoriser chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingRequest {
	method: Method,
	url: Url,
	headers: HeaderMap,
	body: Vec<u8>,
}
impl PendingRequest {
	/// HTTP method.
	pub fn method(&self) -> &Method {
		&self.method
	}

	/// Target URL.
	pub fn url(&self) -> &Url {
		&self.url
	}

	/// Host component of the target URL.
	pub fn host(&self) -> Option<&str> {
		self.url.host_str()
	}

	/// Current header set.
	pub fn headers(&self) -> &HeaderMap {
		&self.headers
	}

	/// Mutable header set for authorisers.
	pub fn headers_mut(&mut self) -> &mut HeaderMap {
		&mut self.headers
	}

	/// Raw request body.
	pub fn body(&self) -> &[u8] {
		&self.body
	}
}
impl TryFrom<RequestSpec> for PendingRequest {
	type Error = Error;

	fn try_from(spec: RequestSpec) -> Result<Self> {
		let RequestSpec { method, url, headers, body } = spec;

		match url.scheme() {
			"http" | "https" => {},
			scheme =>
				return Err(Error::InvalidRequest {
					reason: format!("unsupported URL scheme `{scheme}`"),
				}),
		}

		if !url.has_host() {
			return Err(Error::InvalidRequest { reason: "URL has no host".into() });
		}

		Ok(Self { method, url, headers, body })
	}
}

/// An admitted, authorised request ready for the transport collaborator.
///
/// Under [`SlotRelease::OnCompletion`](crate::config::SlotRelease::OnCompletion) the request
/// still owns its rate-limit slot; the slot is released once [`send`](Self::send) completes or
/// the value is dropped.
#[derive(Debug)]
pub struct DispatchableRequest {
	request: PendingRequest,
	permit: Option<AdmissionPermit>,
}
impl DispatchableRequest {
	pub(crate) fn new(request: PendingRequest, permit: Option<AdmissionPermit>) -> Self {
		Self { request, permit }
	}

	/// The fully decorated request.
	pub fn request(&self) -> &PendingRequest {
		&self.request
	}

	/// Returns true when the request still owns its rate-limit slot.
	pub fn holds_slot(&self) -> bool {
		self.permit.is_some()
	}

	/// Splits the request from its slot, if any; dropping the permit releases the slot.
	pub fn into_parts(self) -> (PendingRequest, Option<AdmissionPermit>) {
		(self.request, self.permit)
	}

	/// Hands the request to `transport`, keeping any owned slot until the call completes.
	pub async fn send<T>(self, transport: &T) -> Result<LoadResponse>
	where
		T: ?Sized + Transport,
	{
		const STAGE: Stage = Stage::Dispatch;

		let span = StageSpan::new(STAGE, "send");

		obs::record_stage_outcome(STAGE, StageOutcome::Attempt);

		let Self { request, permit } = self;
		let result =
			span.instrument(async { transport.execute(&request).await.map_err(Error::from) }).await;

		drop(permit);
		obs::record_result(STAGE, &result);

		result
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(raw: &str) -> Url {
		Url::parse(raw).expect("Test URL should parse.")
	}

	#[test]
	fn pending_requests_keep_the_spec_intact() {
		let spec = RequestSpec::post(url("https://api.example.com/v1/items?page=2"), "payload")
			.with_header(header::ACCEPT, HeaderValue::from_static("application/json"));
		let request = PendingRequest::try_from(spec).expect("HTTPS requests should be accepted.");

		assert_eq!(request.method(), &Method::POST);
		assert_eq!(request.host(), Some("api.example.com"));
		assert_eq!(request.body(), b"payload");
		assert_eq!(request.headers()[header::ACCEPT], "application/json");
	}

	#[test]
	fn non_http_schemes_are_rejected() {
		let err = PendingRequest::try_from(RequestSpec::get(url("ftp://files.example.com/a")))
			.expect_err("FTP URLs cannot be dispatched.");

		assert!(matches!(err, Error::InvalidRequest { .. }));
		assert!(err.to_string().contains("ftp"));
	}
}
