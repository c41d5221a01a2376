//! Demonstrates five concurrent requests racing an expired credential: one refresh episode
//! runs, every request replays once with the new token, and the session sink sees the rotation.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use session_broker::{
	auth::Credential,
	client::{ReqwestSessionClient, SessionClient},
	config::ClientConfig,
	http::Method,
	session::SessionEvent,
	store::{CredentialStore, MemoryStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let _anti_forgery = server
		.mock_async(|when, then| {
			when.method(GET).path("/auth/csrf-token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"csrfToken\":\"demo-csrf\"}");
		})
		.await;
	let refresh_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/auth/refresh").header("x-csrf-token", "demo-csrf");
			then.status(200)
				.delay(std::time::Duration::from_millis(200))
				.header("content-type", "application/json")
				.body("{\"accessToken\":\"fresh-access\",\"role\":\"admin\"}");
		})
		.await;
	let _expired = server
		.mock_async(|when, then| {
			when.method(GET).path("/reports").header("authorization", "Bearer stale-access");
			then.status(401).body("{\"detail\":\"Token expired\"}");
		})
		.await;
	let _reports = server
		.mock_async(|when, then| {
			when.method(GET).path("/reports").header("authorization", "Bearer fresh-access");
			then.status(200).header("content-type", "application/json").body("[]");
		})
		.await;
	let config = ClientConfig::builder(Url::parse(&server.base_url())?).build()?;
	let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::default());
	let client: ReqwestSessionClient = SessionClient::new(config, store)?;

	client.subscribe(Arc::new(|event: &SessionEvent| println!("Session event: {event:?}.")));
	client.establish_session(Credential::builder("stale-access").role("admin").build()?)?;

	let mut handles = Vec::new();

	for _ in 0..5 {
		let client = client.clone();

		handles.push(tokio::spawn(async move {
			let request = client.request(Method::GET, "/reports")?;

			client.send(request).await
		}));
	}
	for handle in handles {
		println!("Replayed request finished with status {}.", handle.await??.status);
	}

	println!(
		"Refresh episodes: {}, joined waiters: {}.",
		client.refresh_metrics().episodes(),
		client.refresh_metrics().joins(),
	);

	refresh_mock.assert_async().await;

	Ok(())
}
