//! Top-level entry point owning the shared limiter and the user-agent identity.

// self
use crate::{
	_prelude::*,
	auth::Authoriser,
	config::{LoaderConfig, SlotRelease},
	error::ConfigError,
	factory::RequestFactory,
	limit::RateLimiter,
	request::HeaderValue,
};

/// State every factory reaches through a weak reference.
pub(crate) struct ServiceCore {
	pub(crate) limiter: RateLimiter,
	user_agent: RwLock<HeaderValue>,
}
impl ServiceCore {
	pub(crate) fn user_agent(&self) -> HeaderValue {
		self.user_agent.read().clone()
	}
}

/// Application-wide loader service.
///
/// A service owns one [`RateLimiter`] and one user agent. Every [`RequestFactory`] created from
/// it shares that limiter, so the ceilings hold across the whole process no matter how many
/// factories exist. Factories only hold a weak reference: once the service is torn down (or
/// dropped) they fail every build with [`Error::ServiceTornDown`].
pub struct LoaderService {
	core: Arc<ServiceCore>,
	slot_release: SlotRelease,
}
impl LoaderService {
	/// Creates a service with default ceilings that reports `user_agent` on every request.
	pub fn with_user_agent(user_agent: impl Into<String>) -> Result<Self> {
		Self::with_config(LoaderConfig::new(user_agent))
	}

	/// Creates a service from a full configuration.
	pub fn with_config(config: LoaderConfig) -> Result<Self> {
		let LoaderConfig { user_agent, rate_limit, slot_release } = config;
		let user_agent = parse_user_agent(user_agent)?;
		let limiter = RateLimiter::new(rate_limit)?;

		#[cfg(feature = "tracing")]
		tracing::debug!(?rate_limit, ?slot_release, "loader service created");

		Ok(Self {
			core: Arc::new(ServiceCore { limiter, user_agent: RwLock::new(user_agent) }),
			slot_release,
		})
	}

	/// Creates a factory that runs `authorisers` in the given order on every request.
	pub fn create_factory_with_authorisers<I>(&self, authorisers: I) -> RequestFactory
	where
		I: IntoIterator<Item = Arc<dyn Authoriser>>,
	{
		RequestFactory::new(
			authorisers.into_iter().collect(),
			Arc::downgrade(&self.core),
			self.slot_release,
		)
	}

	/// Creates a factory without authorisers.
	pub fn create_factory(&self) -> RequestFactory {
		self.create_factory_with_authorisers(Vec::<Arc<dyn Authoriser>>::new())
	}

	/// Current user agent.
	pub fn user_agent(&self) -> String {
		String::from_utf8_lossy(self.core.user_agent().as_bytes()).into_owned()
	}

	/// Replaces the user agent; requests built afterwards carry the new value.
	pub fn set_user_agent(&self, user_agent: impl Into<String>) -> Result<()> {
		*self.core.user_agent.write() = parse_user_agent(user_agent.into())?;

		Ok(())
	}

	/// Shared limiter, for inspection.
	pub fn rate_limiter(&self) -> &RateLimiter {
		&self.core.limiter
	}

	/// Slot release policy handed to new factories.
	pub fn slot_release(&self) -> SlotRelease {
		self.slot_release
	}

	/// Shuts the service down: queued callers fail with [`Error::ServiceTornDown`] and every
	/// factory created from this service becomes inert. Dropping the service does the same.
	pub fn teardown(&self) {
		self.core.limiter.shutdown();
	}

	/// Returns true once the service has been torn down.
	pub fn is_torn_down(&self) -> bool {
		self.core.limiter.is_shut_down()
	}
}
impl Drop for LoaderService {
	fn drop(&mut self) {
		self.teardown();
	}
}
impl Debug for LoaderService {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoaderService")
			.field("user_agent", &self.user_agent())
			.field("slot_release", &self.slot_release)
			.field("rate_limiter", &self.core.limiter)
			.finish()
	}
}

fn parse_user_agent(user_agent: String) -> Result<HeaderValue, ConfigError> {
	HeaderValue::try_from(user_agent.as_str())
		.map_err(|_| ConfigError::InvalidUserAgent { user_agent })
}
