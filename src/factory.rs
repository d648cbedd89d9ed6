//! Per-caller request construction bound to an ordered authoriser chain.

// self
use crate::{
	_prelude::*,
	CancellationToken,
	auth::{self, Authoriser},
	config::SlotRelease,
	limit::AdmissionPermit,
	request::{DispatchableRequest, PendingRequest, RequestSpec, header::USER_AGENT},
	service::ServiceCore,
	transport::{LoadResponse, Transport},
};

/// Builds requests through the shared limiter and the factory's authorisers.
///
/// Factories are cheap to clone and safe to use from many tasks at once. They do not keep the
/// owning [`LoaderService`](crate::service::LoaderService) alive; after it is torn down every
/// build fails with [`Error::ServiceTornDown`].
#[derive(Clone)]
pub struct RequestFactory {
	authorisers: Arc<[Arc<dyn Authoriser>]>,
	core: Weak<ServiceCore>,
	slot_release: SlotRelease,
}
impl RequestFactory {
	pub(crate) fn new(
		authorisers: Arc<[Arc<dyn Authoriser>]>,
		core: Weak<ServiceCore>,
		slot_release: SlotRelease,
	) -> Self {
		Self { authorisers, core, slot_release }
	}

	/// Authorisers applied to every request, in order.
	pub fn authorisers(&self) -> &[Arc<dyn Authoriser>] {
		&self.authorisers
	}

	/// Slot release policy applied to built requests.
	pub fn slot_release(&self) -> SlotRelease {
		self.slot_release
	}

	/// Returns a copy of this factory using `slot_release`.
	pub fn with_slot_release(mut self, slot_release: SlotRelease) -> Self {
		self.slot_release = slot_release;

		self
	}

	/// Returns true once the owning service is gone or torn down.
	pub fn is_inert(&self) -> bool {
		self.core().is_err()
	}

	/// Admits, authorises, and stamps `spec`, suspending while the limiter queues the caller.
	///
	/// A request that fails authorisation gives its slot back before the error is returned.
	pub async fn build_request(&self, spec: RequestSpec) -> Result<DispatchableRequest> {
		self.build(spec, None).await
	}

	/// Same as [`build_request`](Self::build_request), but gives up with [`Error::Cancelled`]
	/// once `cancel` fires, whether the caller is still queued or already authorising.
	pub async fn build_request_or_cancel(
		&self,
		spec: RequestSpec,
		cancel: &CancellationToken,
	) -> Result<DispatchableRequest> {
		self.build(spec, Some(cancel)).await
	}

	/// Builds `spec` and hands it to `transport`.
	pub async fn load<T>(&self, spec: RequestSpec, transport: &T) -> Result<LoadResponse>
	where
		T: ?Sized + Transport,
	{
		self.build_request(spec).await?.send(transport).await
	}

	async fn build(
		&self,
		spec: RequestSpec,
		cancel: Option<&CancellationToken>,
	) -> Result<DispatchableRequest> {
		let request = PendingRequest::try_from(spec)?;
		let limiter = self.core()?.limiter.clone();
		let permit = match cancel {
			Some(cancel) => limiter.acquire_or_cancel(cancel).await?,
			None => limiter.acquire().await?,
		};
		let mut request = self.authorise(request, cancel).await?;
		// The service may have been torn down while this request was authorising.
		let core = self.core()?;

		request.headers_mut().insert(USER_AGENT, core.user_agent());

		#[cfg(feature = "tracing")]
		tracing::debug!(
			method = %request.method(),
			url = %request.url(),
			slot_release = ?self.slot_release,
			"request built"
		);

		Ok(DispatchableRequest::new(request, self.retain(permit)))
	}

	async fn authorise(
		&self,
		request: PendingRequest,
		cancel: Option<&CancellationToken>,
	) -> Result<PendingRequest> {
		let chain = auth::authorise_chain(&self.authorisers, request);

		match cancel {
			Some(cancel) => tokio::select! {
				biased;

				_ = cancel.cancelled() => Err(Error::Cancelled),
				result = chain => result.map_err(Error::from),
			},
			None => chain.await.map_err(Error::from),
		}
	}

	fn retain(&self, permit: AdmissionPermit) -> Option<AdmissionPermit> {
		match self.slot_release {
			SlotRelease::OnBuild => {
				permit.release();

				None
			},
			SlotRelease::OnCompletion => Some(permit),
		}
	}

	fn core(&self) -> Result<Arc<ServiceCore>> {
		let core = self.core.upgrade().ok_or(Error::ServiceTornDown)?;

		if core.limiter.is_shut_down() {
			return Err(Error::ServiceTornDown);
		}

		Ok(core)
	}
}
impl Debug for RequestFactory {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let authorisers =
			self.authorisers.iter().map(|authoriser| authoriser.identifier()).collect::<Vec<_>>();

		f.debug_struct("RequestFactory")
			.field("authorisers", &authorisers)
			.field("slot_release", &self.slot_release)
			.field("inert", &self.is_inert())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::{Journal, RecordingAuthoriser},
		service::LoaderService,
	};

	fn spec() -> RequestSpec {
		RequestSpec::get(Url::parse("https://api.example.com/").expect("Test URL should parse."))
	}

	#[tokio::test]
	async fn on_build_releases_the_slot_immediately() {
		let service = LoaderService::with_user_agent("app/1.0").expect("Service should build.");
		let request = service
			.create_factory()
			.build_request(spec())
			.await
			.expect("Request should build.");

		assert!(!request.holds_slot());
		assert_eq!(service.rate_limiter().snapshot().in_flight, 0);
		assert_eq!(request.request().headers()[USER_AGENT], "app/1.0");
	}

	#[tokio::test]
	async fn invalid_specs_never_touch_the_limiter() {
		let service = LoaderService::with_user_agent("app/1.0").expect("Service should build.");
		let spec = RequestSpec::get(Url::parse("file:///etc/hosts").expect("URL should parse."));
		let err = service
			.create_factory()
			.build_request(spec)
			.await
			.expect_err("File URLs cannot be loaded.");

		assert!(matches!(err, Error::InvalidRequest { .. }));
		assert_eq!(service.rate_limiter().metrics().admitted(), 0);
	}

	#[tokio::test]
	async fn debug_lists_authoriser_identifiers() {
		let journal = Journal::default();
		let service = LoaderService::with_user_agent("app/1.0").expect("Service should build.");
		let factory = service.create_factory_with_authorisers([
			Arc::new(RecordingAuthoriser::stamping("a", &journal)) as Arc<dyn Authoriser>
		]);

		assert!(format!("{factory:?}").contains("[\"a\"]"));
	}
}
