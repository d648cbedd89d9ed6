//! HTTP Basic authoriser.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
// self
use crate::{
	_prelude::*,
	auth::{AuthoriseFuture, Authoriser, Credential},
	error::ConfigError,
	request::{HeaderValue, PendingRequest, header::AUTHORIZATION},
};

/// Adds `Authorization: Basic <base64(username:password)>` to every request.
pub struct BasicAuthoriser {
	username: String,
	header: HeaderValue,
}
impl BasicAuthoriser {
	/// Encodes the credential pair once, up front.
	pub fn new(
		username: impl Into<String>,
		password: impl Into<Credential>,
	) -> Result<Self, ConfigError> {
		let username = username.into();
		let password = password.into();
		let encoded = STANDARD.encode(format!("{username}:{}", password.expose()));
		let mut header = HeaderValue::try_from(format!("Basic {encoded}"))
			.map_err(|_| ConfigError::InvalidHeader { name: AUTHORIZATION.to_string() })?;

		header.set_sensitive(true);

		Ok(Self { username, header })
	}

	/// Username the credential pair was built for.
	pub fn username(&self) -> &str {
		&self.username
	}
}
impl Authoriser for BasicAuthoriser {
	fn identifier(&self) -> &str {
		"basic"
	}

	fn authorise(&self, mut request: PendingRequest) -> AuthoriseFuture<'_> {
		Box::pin(async move {
			request.headers_mut().insert(AUTHORIZATION, self.header.clone());

			Ok(request)
		})
	}
}
impl Debug for BasicAuthoriser {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BasicAuthoriser").field("username", &self.username).finish_non_exhaustive()
	}
}
