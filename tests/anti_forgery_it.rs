// crates.io
use httpmock::prelude::*;
// self
use session_broker::{_preludet::*, auth::Credential, config::ClientConfig, http::Method};

const JSON: &str = "application/json";

fn seeded_client(config: ClientConfig) -> ReqwestTestClient {
	let (client, _) = build_reqwest_test_client(config);

	client
		.establish_session(Credential::builder("T1").build().expect("Seed credential should build."))
		.expect("Seeding the session should succeed.");

	client
}

#[tokio::test]
async fn stale_anti_forgery_refetches_then_surfaces() {
	let server = MockServer::start_async().await;
	let anti_forgery = server
		.mock_async(|when, then| {
			when.method(GET).path("/auth/csrf-token");
			then.status(200).header("content-type", JSON).body(r#"{"csrfToken":"csrf-stale"}"#);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/auth/refresh");
			then.status(200).header("content-type", JSON).body(r#"{"accessToken":"T2"}"#);
		})
		.await;
	let submit = server
		.mock_async(|when, then| {
			when.method(POST).path("/reports").header("x-csrf-token", "csrf-stale");
			then.status(403)
				.header("content-type", JSON)
				.body(r#"{"detail":"CSRF Failed: CSRF token missing or incorrect."}"#);
		})
		.await;
	let client = seeded_client(test_config(&server.base_url()));
	let request = client
		.request(Method::POST, "/reports")
		.expect("Path should resolve.")
		.json(&serde_json::json!({ "title": "weekly" }))
		.expect("Body should serialize.");
	let err = client.send(request).await.expect_err("Stale token should surface.");

	assert!(matches!(err, Error::StaleAntiForgery));
	anti_forgery.assert_calls_async(2).await;
	submit.assert_calls_async(2).await;
	refresh.assert_calls_async(0).await;
}

#[tokio::test]
async fn genuine_forbidden_is_not_retried() {
	let server = MockServer::start_async().await;
	let _anti_forgery = server
		.mock_async(|when, then| {
			when.method(GET).path("/auth/csrf-token");
			then.status(200).header("content-type", JSON).body(r#"{"csrfToken":"csrf-1"}"#);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/auth/refresh");
			then.status(200).header("content-type", JSON).body(r#"{"accessToken":"T2"}"#);
		})
		.await;
	let admin = server
		.mock_async(|when, then| {
			when.method(DELETE).path("/admin/users/7");
			then.status(403)
				.header("content-type", JSON)
				.body(r#"{"detail":"You do not have permission to perform this action."}"#);
		})
		.await;
	let client = seeded_client(test_config(&server.base_url()));
	let request = client.request(Method::DELETE, "/admin/users/7").expect("Path should resolve.");

	match client.send(request).await {
		Err(Error::Forbidden { reason }) => assert!(reason.contains("permission")),
		other => panic!("Unexpected send result: {other:?}."),
	}

	admin.assert_calls_async(1).await;
	refresh.assert_calls_async(0).await;
}

#[tokio::test]
async fn anti_forgery_token_is_reused_within_ttl() {
	let server = MockServer::start_async().await;
	let anti_forgery = server
		.mock_async(|when, then| {
			when.method(GET).path("/auth/csrf-token");
			then.status(200).header("content-type", JSON).body(r#"{"csrfToken":"csrf-1"}"#);
		})
		.await;
	let items = server
		.mock_async(|when, then| {
			when.method(GET).path("/items").header("x-csrf-token", "csrf-1");
			then.status(200).header("content-type", JSON).body("[]");
		})
		.await;
	let config = ClientConfig::builder(
		Url::parse(&server.base_url()).expect("Mock server URL should parse."),
	)
	.anti_forgery_ttl(Duration::seconds(1))
	.build()
	.expect("TTL configuration should validate.");
	let client = seeded_client(config);

	for _ in 0..3 {
		let request = client.request(Method::GET, "/items").expect("Path should resolve.");

		client.send(request).await.expect("Request within TTL should succeed.");
	}

	anti_forgery.assert_calls_async(1).await;

	tokio::time::sleep(std::time::Duration::from_millis(1_200)).await;

	let request = client.request(Method::GET, "/items").expect("Path should resolve.");

	client.send(request).await.expect("Request after TTL should succeed.");

	anti_forgery.assert_calls_async(2).await;
	items.assert_calls_async(4).await;
}

#[tokio::test]
async fn json_requests_carry_bearer_and_content_type() {
	let server = MockServer::start_async().await;
	let _anti_forgery = server
		.mock_async(|when, then| {
			when.method(GET).path("/auth/csrf-token");
			then.status(200).header("content-type", JSON).body(r#"{"csrfToken":"csrf-1"}"#);
		})
		.await;
	let create = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/items")
				.header("authorization", "Bearer T1")
				.header("content-type", JSON)
				.header("x-csrf-token", "csrf-1")
				.json_body(serde_json::json!({ "name": "widget" }));
			then.status(201).header("content-type", JSON).body(r#"{"id":1}"#);
		})
		.await;
	let client = seeded_client(test_config(&server.base_url()));
	let request = client
		.request(Method::POST, "/items")
		.expect("Path should resolve.")
		.json(&serde_json::json!({ "name": "widget" }))
		.expect("Body should serialize.");
	let response = client.send(request).await.expect("Create should succeed.");

	assert_eq!(response.status, 201);
	assert_eq!(
		response.json::<serde_json::Value>().expect("Body should decode.")["id"],
		serde_json::json!(1),
	);
	create.assert_calls_async(1).await;
}
