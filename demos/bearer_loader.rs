//! Demonstrates two factories sharing one service-wide limiter: one attaches a bearer token,
//! the other loads anonymously. Both are served by a local mock server.

// std
use std::{sync::Arc, time::Duration};
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use http_loader::{
	auth::{Authoriser, BearerAuthoriser},
	config::{LoaderConfig, RateLimitConfig},
	request::RequestSpec,
	service::LoaderService,
	transport::ReqwestTransport,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let private_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/me").header("authorization", "Bearer demo-token");
			then.status(200).body("{\"name\":\"demo\"}");
		})
		.await;
	let public_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/status");
			then.status(200).body("ok");
		})
		.await;
	let config = LoaderConfig::new("bearer-loader-demo/0.1").with_rate_limit(
		RateLimitConfig::concurrent(2).with_window(4, Duration::from_millis(500)),
	);
	let service = LoaderService::with_config(config)?;
	let bearer: Arc<dyn Authoriser> = Arc::new(BearerAuthoriser::new("demo-token")?);
	let private = service.create_factory_with_authorisers([bearer]);
	let public = service.create_factory();
	let transport = ReqwestTransport::default();
	let me = Url::parse(&server.url("/me"))?;
	let status = Url::parse(&server.url("/status"))?;
	let (a, b, c, d, e, f) = tokio::try_join!(
		private.load(RequestSpec::get(me.clone()), &transport),
		private.load(RequestSpec::get(me.clone()), &transport),
		private.load(RequestSpec::get(me), &transport),
		public.load(RequestSpec::get(status.clone()), &transport),
		public.load(RequestSpec::get(status.clone()), &transport),
		public.load(RequestSpec::get(status), &transport),
	)?;

	for response in [a, b, c, d, e, f] {
		println!("{} {}", response.status, String::from_utf8_lossy(&response.body));
	}

	let metrics = service.rate_limiter().metrics();

	println!(
		"Admitted {} requests, {} had to queue behind the shared ceiling.",
		metrics.admitted(),
		metrics.queued()
	);

	private_mock.assert_calls_async(3).await;
	public_mock.assert_calls_async(3).await;

	Ok(())
}
