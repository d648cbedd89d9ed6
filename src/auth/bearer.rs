//! Bearer-token authoriser with an optional expiry and host restriction.

// self
use crate::{
	_prelude::*,
	auth::{AuthError, AuthoriseFuture, Authoriser, Credential},
	error::ConfigError,
	request::{HeaderValue, PendingRequest, header::AUTHORIZATION},
};

struct BearerState {
	header: HeaderValue,
	expires_at: Option<OffsetDateTime>,
}

/// Adds `Authorization: Bearer <token>` to every request it accepts.
///
/// The token can be replaced at any time with [`replace_token`](Self::replace_token); requests
/// built afterwards pick up the new value. Once the configured expiry passes, requests fail with
/// [`AuthError::Expired`] until the caller installs a fresh token. Nothing is refreshed here.
pub struct BearerAuthoriser {
	identifier: String,
	hosts: Vec<String>,
	state: RwLock<BearerState>,
}
impl BearerAuthoriser {
	/// Creates an authoriser for a token without expiry.
	pub fn new(token: impl Into<Credential>) -> Result<Self, ConfigError> {
		let header = bearer_header(&token.into())?;

		Ok(Self {
			identifier: "bearer".into(),
			hosts: Vec::new(),
			state: RwLock::new(BearerState { header, expires_at: None }),
		})
	}

	/// Overrides the identifier reported in errors.
	pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
		self.identifier = identifier.into();

		self
	}

	/// Sets the instant after which the current token is considered expired.
	pub fn with_expiry(self, expires_at: OffsetDateTime) -> Self {
		self.state.write().expires_at = Some(expires_at);

		self
	}

	/// Restricts the authoriser to requests for `host`; may be called repeatedly.
	///
	/// Without any restriction every request is decorated.
	pub fn with_host(mut self, host: impl Into<String>) -> Self {
		self.hosts.push(host.into().to_ascii_lowercase());

		self
	}

	/// Installs a new token and expiry.
	pub fn replace_token(
		&self,
		token: impl Into<Credential>,
		expires_at: Option<OffsetDateTime>,
	) -> Result<(), ConfigError> {
		let header = bearer_header(&token.into())?;

		*self.state.write() = BearerState { header, expires_at };

		Ok(())
	}

	/// Expiry of the current token, if any.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.state.read().expires_at
	}

	/// Returns true when the current token has expired at `now`.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		self.state.read().expires_at.is_some_and(|expires_at| expires_at <= now)
	}
}
impl Authoriser for BearerAuthoriser {
	fn identifier(&self) -> &str {
		&self.identifier
	}

	fn requires_authorisation(&self, request: &PendingRequest) -> bool {
		if self.hosts.is_empty() {
			return true;
		}

		request.host().is_some_and(|host| self.hosts.iter().any(|h| h.eq_ignore_ascii_case(host)))
	}

	fn authorise(&self, mut request: PendingRequest) -> AuthoriseFuture<'_> {
		Box::pin(async move {
			let header = {
				let state = self.state.read();

				if state.expires_at.is_some_and(|at| at <= OffsetDateTime::now_utc()) {
					return Err(AuthError::expired(&self.identifier));
				}

				state.header.clone()
			};

			request.headers_mut().insert(AUTHORIZATION, header);

			Ok(request)
		})
	}
}
impl Debug for BearerAuthoriser {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BearerAuthoriser")
			.field("identifier", &self.identifier)
			.field("hosts", &self.hosts)
			.field("expires_at", &self.expires_at())
			.finish_non_exhaustive()
	}
}

fn bearer_header(token: &Credential) -> Result<HeaderValue, ConfigError> {
	let mut header = HeaderValue::try_from(format!("Bearer {}", token.expose()))
		.map_err(|_| ConfigError::InvalidHeader { name: AUTHORIZATION.to_string() })?;

	header.set_sensitive(true);

	Ok(header)
}
