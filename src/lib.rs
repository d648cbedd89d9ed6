//! Application-wide HTTP request admission: one shared sliding-window rate limiter, FIFO-fair
//! queueing, and pluggable authorisers for every loader factory spawned from a service.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod error;
pub mod factory;
pub mod limit;
pub mod obs;
pub mod request;
pub mod service;
pub mod transport;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fixtures for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use crate::{
		auth::{AuthError, AuthoriseFuture, Authoriser},
		error::TransportError,
		request::{HeaderName, HeaderValue, PendingRequest, StatusCode},
		transport::{LoadResponse, Transport, TransportFuture},
	};

	/// Shared, ordered log of authoriser identifiers in invocation order.
	pub type Journal = Arc<Mutex<Vec<String>>>;

	/// Authoriser fixture that stamps a header and records its invocation in a [`Journal`].
	#[derive(Debug)]
	pub struct RecordingAuthoriser {
		identifier: String,
		header: HeaderName,
		journal: Journal,
		reject: bool,
	}
	impl RecordingAuthoriser {
		/// Creates an authoriser that adds `x-auth-<identifier>: <identifier>` to each request.
		pub fn stamping(identifier: &str, journal: &Journal) -> Self {
			let header = HeaderName::try_from(format!("x-auth-{identifier}"))
				.unwrap_or_else(|_| HeaderName::from_static("x-auth-invalid"));

			Self { identifier: identifier.into(), header, journal: journal.clone(), reject: false }
		}

		/// Creates an authoriser that records its invocation and rejects every request.
		pub fn rejecting(identifier: &str, journal: &Journal) -> Self {
			Self { reject: true, ..Self::stamping(identifier, journal) }
		}
	}
	impl Authoriser for RecordingAuthoriser {
		fn identifier(&self) -> &str {
			&self.identifier
		}

		fn authorise(&self, mut request: PendingRequest) -> AuthoriseFuture<'_> {
			Box::pin(async move {
				self.journal.lock().push(self.identifier.clone());

				if self.reject {
					return Err(AuthError::rejected(&self.identifier, "fixture rejects everything"));
				}

				let value = HeaderValue::from_str(&self.identifier)
					.map_err(|_| AuthError::rejected(&self.identifier, "invalid fixture value"))?;

				request.headers_mut().append(self.header.clone(), value);

				Ok(request)
			})
		}
	}

	/// Transport fixture that answers `200 OK` and keeps every request it was handed.
	#[derive(Clone, Debug, Default)]
	pub struct StubTransport {
		/// Requests observed by the transport, in dispatch order.
		pub seen: Arc<Mutex<Vec<PendingRequest>>>,
		/// Number of calls currently executing.
		pub active: Arc<AtomicUsize>,
		/// Highest number of calls observed executing at once.
		pub peak: Arc<AtomicUsize>,
		/// Artificial latency applied to every call.
		pub latency: Duration,
		/// Fails every call with a network error when set.
		pub fail: bool,
	}
	impl StubTransport {
		/// Builds a transport that sleeps for `latency` before answering.
		pub fn slow(latency: Duration) -> Self {
			Self { latency, ..Default::default() }
		}

		/// Requests observed so far.
		pub fn requests(&self) -> Vec<PendingRequest> {
			self.seen.lock().clone()
		}

		/// Highest concurrency observed so far.
		pub fn peak(&self) -> usize {
			self.peak.load(Ordering::SeqCst)
		}

		/// Builds a transport whose calls always fail.
		pub fn failing() -> Self {
			Self { fail: true, ..Default::default() }
		}
	}
	impl Transport for StubTransport {
		fn execute<'a>(&'a self, request: &'a PendingRequest) -> TransportFuture<'a> {
			Box::pin(async move {
				let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;

				self.peak.fetch_max(active, Ordering::SeqCst);
				self.seen.lock().push(request.clone());

				if !self.latency.is_zero() {
					tokio::time::sleep(self.latency).await;
				}

				self.active.fetch_sub(1, Ordering::SeqCst);

				if self.fail {
					return Err(TransportError::network(std::io::Error::other(
						"stub transport refused the call",
					)));
				}

				Ok(LoadResponse {
					status: StatusCode::OK,
					headers: Default::default(),
					body: b"ok".to_vec(),
					retry_after: None,
				})
			})
		}
	}
}

mod _prelude {
	pub use std::{
		collections::VecDeque,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::{Arc, Weak},
		time::Duration,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use tokio::time::Instant;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use tokio_util::sync::CancellationToken;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
