//! Loader-level error types shared across the limiter, authorisers, and transports.

// self
use crate::{_prelude::*, auth::AuthError};

/// Loader-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) type BoxError = Box<dyn StdError + Send + Sync>;

/// Canonical loader error exposed by public APIs.
///
/// Every variant reaches the immediate caller untouched; nothing in this crate retries.
/// Use [`Error::is_retryable`] to decide whether a fresh attempt makes sense.
#[derive(Debug, ThisError)]
pub enum Error {
	/// An authoriser rejected the request or failed to decorate it.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Failure reported by the transport collaborator, passed through as-is.
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// The caller waited in the admission queue longer than the configured ceiling.
	#[error("Admission wait exceeded {waited:?}.")]
	Timeout {
		/// How long the caller waited before giving up.
		waited: Duration,
	},
	/// The caller withdrew before admission; no slot was consumed.
	#[error("Request was cancelled before admission.")]
	Cancelled,
	/// The owning service has been torn down; every derived factory is inert.
	#[error("Loader service has been torn down.")]
	ServiceTornDown,
	/// The admission queue already holds its configured maximum of waiters.
	#[error("Admission queue is full ({capacity} waiters).")]
	QueueFull {
		/// Configured queue capacity.
		capacity: usize,
	},
	/// The request description cannot be dispatched.
	#[error("Request is invalid: {reason}.")]
	InvalidRequest {
		/// Human-readable reason.
		reason: String,
	},
}
impl Error {
	/// Returns true when a fresh attempt may succeed without remediation.
	///
	/// Admission waits, cancellations, saturated queues, and expired credentials are retryable;
	/// a torn-down service is terminal for that service instance.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			Self::Timeout { .. }
				| Self::Cancelled
				| Self::QueueFull { .. }
				| Self::Auth(AuthError::Expired { .. })
		)
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Neither a concurrency ceiling nor a per-window ceiling was configured.
	#[error("Rate limit configuration must set max_concurrent or max_per_window.")]
	NoCeiling,
	/// Only one half of the sliding-window pair was configured.
	#[error("The window and max_per_window options must be set together.")]
	IncompleteWindow,
	/// A ceiling or duration was configured as zero.
	#[error("The {field} option must be greater than zero.")]
	ZeroValue {
		/// Offending option name.
		field: &'static str,
	},
	/// User agent cannot be used as an HTTP header value.
	#[error("User agent `{user_agent}` is not a valid header value.")]
	InvalidUserAgent {
		/// Rejected user agent string.
		user_agent: String,
	},
	/// A credential or configured value cannot be carried in the named header.
	#[error("Value configured for the `{name}` header is not a valid header value.")]
	InvalidHeader {
		/// Header the value was meant for.
		name: String,
	},
	/// Configuration document could not be parsed.
	#[error("Configuration could not be parsed at `{}`.", .source.path())]
	Parse {
		/// Structured parsing failure, including the path of the offending field.
		#[from]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO) surfaced by the external collaborator.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while dispatching the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while dispatching the request.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
