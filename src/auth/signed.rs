//! Signed-request authoriser: adds `Date` and `Content-Digest`, then asks a caller-supplied
//! [`RequestSigner`] to sign a canonical rendering of the request.
//!
//! The canonical payload is one `name: value` line per covered component, joined by `\n`:
//!
//! ```text
//! (request-target): post /v1/items?page=2
//! host: api.example.com
//! date: Tue, 07 Jun 2022 20:51:35 GMT
//! content-digest: sha-256=:47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=:
//! ```
//!
//! The resulting header reads
//! `Authorization: Signature keyId="..",algorithm="..",headers="(request-target) host date content-digest",signature=".."`.
//! Key management and the signature algorithm itself stay with the caller.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};
use time::{UtcOffset, macros::format_description};
// self
use crate::{
	_prelude::*,
	auth::{AuthError, AuthoriseFuture, Authoriser},
	request::{
		HeaderName, HeaderValue, PendingRequest,
		header::{AUTHORIZATION, DATE},
	},
};

const COVERED_COMPONENTS: &str = "(request-target) host date content-digest";

/// `Content-Digest` header name (RFC 9530).
pub static CONTENT_DIGEST: HeaderName = HeaderName::from_static("content-digest");

/// Produces signatures over canonical request payloads.
pub trait RequestSigner
where
	Self: Send + Sync,
{
	/// Key identifier advertised in the `keyId` parameter.
	fn key_id(&self) -> &str;

	/// Algorithm name advertised in the `algorithm` parameter.
	fn algorithm(&self) -> &str;

	/// Signs `payload`, returning raw signature bytes.
	fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, Box<dyn StdError + Send + Sync>>;
}

/// Authoriser that signs requests with a [`RequestSigner`].
pub struct SignedRequestAuthoriser<S> {
	signer: S,
}
impl<S> SignedRequestAuthoriser<S>
where
	S: RequestSigner,
{
	/// Wraps `signer`.
	pub fn new(signer: S) -> Self {
		Self { signer }
	}

	/// Borrow the wrapped signer.
	pub fn signer(&self) -> &S {
		&self.signer
	}

	fn sign_at(
		&self,
		mut request: PendingRequest,
		now: OffsetDateTime,
	) -> Result<PendingRequest, AuthError> {
		let date = imf_fixdate(now).map_err(|e| AuthError::signing(self.identifier(), e))?;
		let digest = content_digest(request.body());
		let payload = canonical_payload(&request, &date, &digest);
		let signature = self
			.signer
			.sign(payload.as_bytes())
			.map_err(|e| AuthError::signing(self.identifier(), e))?;
		let authorization = format!(
			"Signature keyId=\"{}\",algorithm=\"{}\",headers=\"{COVERED_COMPONENTS}\",signature=\"{}\"",
			self.signer.key_id(),
			self.signer.algorithm(),
			STANDARD.encode(signature),
		);
		let headers = request.headers_mut();

		headers.insert(DATE, header_value(self.identifier(), date)?);
		headers.insert(CONTENT_DIGEST.clone(), header_value(self.identifier(), digest)?);
		headers.insert(AUTHORIZATION, header_value(self.identifier(), authorization)?);

		Ok(request)
	}
}
impl<S> Authoriser for SignedRequestAuthoriser<S>
where
	S: RequestSigner,
{
	fn identifier(&self) -> &str {
		"signed-request"
	}

	fn authorise(&self, request: PendingRequest) -> AuthoriseFuture<'_> {
		Box::pin(async move { self.sign_at(request, OffsetDateTime::now_utc()) })
	}
}
impl<S> Debug for SignedRequestAuthoriser<S>
where
	S: RequestSigner,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SignedRequestAuthoriser")
			.field("key_id", &self.signer.key_id())
			.field("algorithm", &self.signer.algorithm())
			.finish()
	}
}

/// Renders the `Content-Digest` value for `body`.
pub fn content_digest(body: &[u8]) -> String {
	format!("sha-256=:{}:", STANDARD.encode(Sha256::digest(body)))
}

fn canonical_payload(request: &PendingRequest, date: &str, digest: &str) -> String {
	let url = request.url();
	let target = match url.query() {
		Some(query) => format!("{}?{query}", url.path()),
		None => url.path().to_owned(),
	};
	let host = match url.port() {
		Some(port) => format!("{}:{port}", request.host().unwrap_or_default()),
		None => request.host().unwrap_or_default().to_owned(),
	};

	format!(
		"(request-target): {} {target}\nhost: {host}\ndate: {date}\ncontent-digest: {digest}",
		request.method().as_str().to_ascii_lowercase(),
	)
}

fn imf_fixdate(now: OffsetDateTime) -> Result<String, time::error::Format> {
	now.to_offset(UtcOffset::UTC).format(format_description!(
		"[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
	))
}

fn header_value(authoriser: &str, value: String) -> Result<HeaderValue, AuthError> {
	HeaderValue::try_from(value)
		.map_err(|_| AuthError::rejected(authoriser, "signature material is not a valid header"))
}
