//! Limiter and service configuration.
//!
//! Every option is externally configurable: build values programmatically with the `with_*`
//! helpers or deserialize them from JSON, where durations use humantime notation
//! (`"250ms"`, `"1s"`, `"2m"`).

// self
use crate::{_prelude::*, error::ConfigError};

/// Admission ceilings and waiting policy for a [`RateLimiter`](crate::limit::RateLimiter).
///
/// At least one ceiling must be set. When both the concurrency ceiling and the sliding-window
/// ceiling are set, a request is only admitted while both hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
	/// Maximum number of admitted requests in flight at once.
	pub max_concurrent: Option<usize>,
	/// Length of the sliding window used with [`max_per_window`](Self::max_per_window).
	#[serde(with = "humantime_serde")]
	pub window: Option<Duration>,
	/// Maximum number of admissions within any [`window`](Self::window).
	pub max_per_window: Option<usize>,
	/// Longest time a caller may wait in the queue; `None` waits indefinitely.
	#[serde(with = "humantime_serde")]
	pub admission_timeout: Option<Duration>,
	/// Maximum number of queued callers; `None` leaves the queue unbounded.
	pub max_queue: Option<usize>,
}
impl RateLimitConfig {
	const DEFAULT_ADMISSION_TIMEOUT: Duration = Duration::from_secs(30);
	const DEFAULT_MAX_CONCURRENT: usize = 8;

	/// Creates a configuration bounded only by concurrency.
	pub fn concurrent(max_concurrent: usize) -> Self {
		Self { max_concurrent: Some(max_concurrent), ..Self::unbounded() }
	}

	/// Creates a configuration bounded only by a sliding window.
	pub fn per_window(max_per_window: usize, window: Duration) -> Self {
		Self { window: Some(window), max_per_window: Some(max_per_window), ..Self::unbounded() }
	}

	/// Adds or replaces the concurrency ceiling.
	pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
		self.max_concurrent = Some(max_concurrent);

		self
	}

	/// Adds or replaces the sliding-window ceiling.
	pub fn with_window(mut self, max_per_window: usize, window: Duration) -> Self {
		self.max_per_window = Some(max_per_window);
		self.window = Some(window);

		self
	}

	/// Overrides the admission timeout; `None` waits indefinitely.
	pub fn with_admission_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.admission_timeout = timeout;

		self
	}

	/// Bounds the admission queue.
	pub fn with_max_queue(mut self, max_queue: usize) -> Self {
		self.max_queue = Some(max_queue);

		self
	}

	/// Checks the ceilings for consistency.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_concurrent == Some(0) {
			return Err(ConfigError::ZeroValue { field: "max_concurrent" });
		}
		if self.max_per_window == Some(0) {
			return Err(ConfigError::ZeroValue { field: "max_per_window" });
		}
		if self.window.is_some_and(|window| window.is_zero()) {
			return Err(ConfigError::ZeroValue { field: "window" });
		}
		if self.window.is_some() != self.max_per_window.is_some() {
			return Err(ConfigError::IncompleteWindow);
		}
		if self.max_concurrent.is_none() && self.max_per_window.is_none() {
			return Err(ConfigError::NoCeiling);
		}

		Ok(())
	}

	fn unbounded() -> Self {
		Self {
			max_concurrent: None,
			window: None,
			max_per_window: None,
			admission_timeout: Some(Self::DEFAULT_ADMISSION_TIMEOUT),
			max_queue: None,
		}
	}
}
impl Default for RateLimitConfig {
	fn default() -> Self {
		Self::concurrent(Self::DEFAULT_MAX_CONCURRENT)
	}
}

/// Controls when a request gives its rate-limit slot back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotRelease {
	/// The slot is released as soon as the request has been built and authorised.
	#[default]
	OnBuild,
	/// The slot travels with the built request until the transport call completes or the
	/// request is dropped.
	OnCompletion,
}

/// Top-level configuration for a [`LoaderService`](crate::service::LoaderService).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderConfig {
	/// User agent reported on every dispatched request.
	pub user_agent: String,
	/// Shared admission ceilings.
	#[serde(default)]
	pub rate_limit: RateLimitConfig,
	/// Default slot release policy handed to new factories.
	#[serde(default)]
	pub slot_release: SlotRelease,
}
impl LoaderConfig {
	/// Creates a configuration with default ceilings for the provided user agent.
	pub fn new(user_agent: impl Into<String>) -> Self {
		Self {
			user_agent: user_agent.into(),
			rate_limit: RateLimitConfig::default(),
			slot_release: SlotRelease::default(),
		}
	}

	/// Replaces the admission ceilings.
	pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
		self.rate_limit = rate_limit;

		self
	}

	/// Replaces the default slot release policy.
	pub fn with_slot_release(mut self, slot_release: SlotRelease) -> Self {
		self.slot_release = slot_release;

		self
	}

	/// Parses and validates a JSON configuration document.
	pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
		let mut deserializer = serde_json::Deserializer::from_str(raw);
		let config: Self = serde_path_to_error::deserialize(&mut deserializer)?;

		config.rate_limit.validate()?;

		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn default_config_is_valid_and_bounded_by_concurrency() {
		let config = RateLimitConfig::default();

		config.validate().expect("Default configuration should validate.");

		assert_eq!(config.max_concurrent, Some(8));
		assert_eq!(config.window, None);
		assert_eq!(config.admission_timeout, Some(Duration::from_secs(30)));
	}

	#[test]
	fn validation_rejects_inconsistent_ceilings() {
		let no_ceiling = RateLimitConfig { max_concurrent: None, ..Default::default() };

		assert!(matches!(no_ceiling.validate(), Err(ConfigError::NoCeiling)));

		let half_window =
			RateLimitConfig { window: Some(Duration::from_secs(1)), ..Default::default() };

		assert!(matches!(half_window.validate(), Err(ConfigError::IncompleteWindow)));
		assert!(matches!(
			RateLimitConfig::concurrent(0).validate(),
			Err(ConfigError::ZeroValue { field: "max_concurrent" })
		));
		assert!(matches!(
			RateLimitConfig::per_window(3, Duration::ZERO).validate(),
			Err(ConfigError::ZeroValue { field: "window" })
		));
		RateLimitConfig::per_window(2, Duration::from_secs(1))
			.with_max_concurrent(4)
			.validate()
			.expect("Both ceilings together should validate.");
	}

	#[test]
	fn json_documents_use_humantime_durations() {
		let config = LoaderConfig::from_json_str(
			r#"{
				"user_agent": "loader/1.0",
				"rate_limit": {
					"max_per_window": 2,
					"window": "1s",
					"admission_timeout": "250ms",
					"max_queue": 16
				},
				"slot_release": "on_completion"
			}"#,
		)
		.expect("Configuration document should parse.");

		assert_eq!(config.user_agent, "loader/1.0");
		assert_eq!(config.rate_limit.window, Some(Duration::from_secs(1)));
		assert_eq!(config.rate_limit.max_per_window, Some(2));
		// Omitted options fall back to the defaults.
		assert_eq!(config.rate_limit.max_concurrent, Some(8));
		assert_eq!(config.rate_limit.admission_timeout, Some(Duration::from_millis(250)));
		assert_eq!(config.slot_release, SlotRelease::OnCompletion);
	}

	#[test]
	fn json_documents_are_validated() {
		let err = LoaderConfig::from_json_str(
			r#"{ "user_agent": "loader/1.0", "rate_limit": { "max_per_window": 2 } }"#,
		)
		.expect_err("A window ceiling without a window length must be rejected.");

		assert!(matches!(err, ConfigError::IncompleteWindow));

		let err = LoaderConfig::from_json_str(
			r#"{ "user_agent": "loader/1.0", "rate_limit": { "window": "soon" } }"#,
		)
		.expect_err("Malformed durations must be rejected.");

		assert!(matches!(err, ConfigError::Parse { .. }));
		assert!(err.to_string().contains("rate_limit.window"), "Unexpected message: {err}.");
	}
}
