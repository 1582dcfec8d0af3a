// std
use std::{
	collections::VecDeque,
	sync::Mutex,
	time::Instant,
};
// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use vidgate::{
	_preludet::*,
	auth::Credential,
	cache::MemoryTokenCache,
	dispatch::{DispatchConfig, RequestDispatcher, RequestSpec},
	error::TransportError,
	http::{ApiTransport, RateLimitSignals, TransportFuture, TransportRequest, TransportResponse},
	retry::BackoffPolicy,
	service::{ServiceDescriptor, ServiceId},
	token::TokenManager,
};

const CLIENT_ID: &str = "client-dispatch";
const CLIENT_SECRET: &str = "secret-dispatch";

fn build_descriptor(server: &MockServer) -> ServiceDescriptor {
	let service_id =
		ServiceId::new("mock-cms").expect("Service identifier should be valid for dispatch tests.");

	ServiceDescriptor::builder(service_id)
		.api_base(Url::parse(&server.url("")).expect("Mock API base should parse successfully."))
		.token_endpoint(
			Url::parse(&server.url("/oauth2/token"))
				.expect("Mock token endpoint should parse successfully."),
		)
		.build()
		.expect("Service descriptor should build successfully.")
}

fn fast_config(max_attempts: u32) -> DispatchConfig {
	DispatchConfig {
		backoff: BackoffPolicy {
			base: Duration::milliseconds(20),
			cap: Duration::seconds(1),
			max_attempts,
			jitter: 0.0,
		},
		..DispatchConfig::default()
	}
}

async fn mock_token_endpoint(server: &MockServer) -> httpmock::Mock<'_> {
	server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"dispatch-token\",\"token_type\":\"bearer\",\"expires_in\":1800}",
			);
		})
		.await
}

fn build_dispatcher(server: &MockServer, max_attempts: u32) -> ReqwestTestDispatcher {
	let (dispatcher, _cache) =
		build_reqwest_test_dispatcher(build_descriptor(server), CLIENT_ID, CLIENT_SECRET);

	dispatcher.with_config(fast_config(max_attempts))
}

#[tokio::test]
async fn permanent_rejection_surfaces_envelope_without_retry() {
	let server = MockServer::start_async().await;
	let _token = mock_token_endpoint(&server).await;
	let dispatcher = build_dispatcher(&server, 3);
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/videos/missing.json");
			then.status(404)
				.header("content-type", "application/json")
				.body("{\"error\":{\"code\":\"not_found\",\"message\":\"No such video.\"}}");
		})
		.await;
	let err = dispatcher
		.send(&RequestSpec::get("/videos/missing.json"))
		.await
		.expect_err("404 responses should be permanent.");
	let Error::Permanent { status, envelope } = err else {
		panic!("404 responses should map to Error::Permanent.");
	};

	assert_eq!(status, 404);
	assert_eq!(
		envelope.expect("Error envelope should be attached.").error.code.as_deref(),
		Some("not_found")
	);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn transient_responses_retry_to_exhaustion() {
	let server = MockServer::start_async().await;
	let _token = mock_token_endpoint(&server).await;
	let dispatcher = build_dispatcher(&server, 3);
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/users/self/channels.json");
			then.status(503).body("maintenance");
		})
		.await;
	let err = dispatcher
		.send(&RequestSpec::get("/users/self/channels.json"))
		.await
		.expect_err("Exhausted transient retries should surface.");

	assert!(matches!(err, Error::Transient { status: Some(503), attempts: 3, .. }));

	mock.assert_calls_async(3).await;
}

#[tokio::test]
async fn non_idempotent_requests_are_not_replayed_after_transmission() {
	let server = MockServer::start_async().await;
	let _token = mock_token_endpoint(&server).await;
	let dispatcher = build_dispatcher(&server, 4);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/channels/1/videos.json");
			then.status(503).body("maintenance");
		})
		.await;
	let err = dispatcher
		.send(&RequestSpec::post("/channels/1/videos.json").with_json(json!({"title": "clip"})))
		.await
		.expect_err("Non-idempotent 5xx failures should surface immediately.");

	assert!(matches!(err, Error::Transient { attempts: 1, .. }));

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn rate_limit_wait_honors_retry_after_signal() {
	let server = MockServer::start_async().await;
	let _token = mock_token_endpoint(&server).await;
	let dispatcher = build_dispatcher(&server, 2);
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/videos/42.json");
			then.status(429).header("retry-after", "1").body("slow down");
		})
		.await;
	let started = Instant::now();
	let err = dispatcher
		.send(&RequestSpec::get("/videos/42.json"))
		.await
		.expect_err("Persistent rate limiting should surface after the attempt cap.");

	// The second attempt must not fire before the upstream's 1 s retry-after window,
	// which dwarfs the 20 ms backoff.
	assert!(started.elapsed() >= std::time::Duration::from_secs(1));
	assert!(matches!(err, Error::RateLimited { attempts: 2, .. }));

	mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn protection_toggle_dispatches_form_encoded() {
	let server = MockServer::start_async().await;
	let _token = mock_token_endpoint(&server).await;
	let dispatcher = build_dispatcher(&server, 2);
	let mock = server
		.mock_async(|when, then| {
			when.method(PUT)
				.path("/videos/42.json")
				.header("content-type", "application/x-www-form-urlencoded")
				.body_includes("protect=private");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"video\":{\"id\":\"42\"}}");
		})
		.await;
	let response = dispatcher
		.send(&RequestSpec::put("/videos/42.json").with_form([("protect", "private")]))
		.await
		.expect("Form-encoded mutation should succeed.");

	assert_eq!(response.status, 200);

	mock.assert_async().await;
}

#[tokio::test]
async fn metadata_update_dispatches_json() {
	let server = MockServer::start_async().await;
	let _token = mock_token_endpoint(&server).await;
	let dispatcher = build_dispatcher(&server, 2);
	let mock = server
		.mock_async(|when, then| {
			when.method(PUT)
				.path("/videos/42.json")
				.header("content-type", "application/json")
				.body_includes("\"title\":\"Spring recital\"");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"video\":{\"id\":\"42\",\"title\":\"Spring recital\"}}");
		})
		.await;

	dispatcher
		.send(&RequestSpec::put("/videos/42.json").with_json(json!({"title": "Spring recital"})))
		.await
		.expect("JSON mutation should succeed.");

	mock.assert_async().await;
}

// Scripted transport for failure sequences httpmock cannot express (a mock's response
// is fixed for its lifetime).
enum Step {
	Status(u16, &'static str),
	Connect,
	Hang,
}

#[derive(Default)]
struct ScriptedTransport {
	steps: Mutex<VecDeque<Step>>,
	token_grants: Mutex<u32>,
	dispatch_log: Mutex<Vec<(Instant, Option<String>)>>,
}
impl ScriptedTransport {
	fn new(steps: impl IntoIterator<Item = Step>) -> Self {
		Self { steps: Mutex::new(steps.into_iter().collect()), ..Self::default() }
	}

	fn dispatch_log(&self) -> Vec<(Instant, Option<String>)> {
		self.dispatch_log.lock().expect("Dispatch log lock should not be poisoned.").clone()
	}

	fn token_grants(&self) -> u32 {
		*self.token_grants.lock().expect("Token grant lock should not be poisoned.")
	}
}
impl ApiTransport for ScriptedTransport {
	fn execute(&self, request: TransportRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			if request.url.path() == "/oauth2/token" {
				let mut grants =
					self.token_grants.lock().expect("Token grant lock should not be poisoned.");

				*grants += 1;

				let body = format!(
					"{{\"access_token\":\"tok-{grants}\",\"token_type\":\"bearer\",\"expires_in\":1800}}",
					grants = *grants
				);

				return Ok(TransportResponse {
					status: 200,
					rate_limit: RateLimitSignals::default(),
					body: body.into_bytes(),
				});
			}

			self.dispatch_log
				.lock()
				.expect("Dispatch log lock should not be poisoned.")
				.push((Instant::now(), request.authorization.clone()));

			let step = self
				.steps
				.lock()
				.expect("Step lock should not be poisoned.")
				.pop_front()
				.expect("Scripted transport ran out of steps.");

			match step {
				Step::Status(status, body) => Ok(TransportResponse {
					status,
					rate_limit: RateLimitSignals::default(),
					body: body.as_bytes().to_vec(),
				}),
				Step::Connect =>
					Err(TransportError::connect(std::io::Error::other("connection refused"))),
				Step::Hang => {
					tokio::time::sleep(std::time::Duration::from_secs(30)).await;

					Err(TransportError::Timeout)
				},
			}
		})
	}
}

fn scripted_descriptor() -> ServiceDescriptor {
	let service_id =
		ServiceId::new("scripted-cms").expect("Service identifier should be valid.");

	ServiceDescriptor::builder(service_id)
		.api_base(Url::parse("https://api.example.com").expect("Base URL should parse."))
		.token_endpoint(
			Url::parse("https://api.example.com/oauth2/token")
				.expect("Token endpoint should parse."),
		)
		.build()
		.expect("Scripted descriptor should build successfully.")
}

fn scripted_dispatcher(
	transport: Arc<ScriptedTransport>,
	max_attempts: u32,
) -> RequestDispatcher<ScriptedTransport> {
	let cache = Arc::new(MemoryTokenCache::default());
	let credential = Credential::new(CLIENT_ID, CLIENT_SECRET)
		.expect("Test credential should be considered valid.");
	let manager = Arc::new(TokenManager::new(
		transport.clone(),
		cache,
		scripted_descriptor(),
		credential,
	));

	RequestDispatcher::new(transport, manager).with_config(DispatchConfig {
		backoff: BackoffPolicy {
			base: Duration::milliseconds(30),
			cap: Duration::seconds(1),
			max_attempts,
			jitter: 0.5,
		},
		..DispatchConfig::default()
	})
}

#[tokio::test]
async fn two_transient_failures_then_success_takes_three_attempts() {
	let transport = Arc::new(ScriptedTransport::new([
		Step::Status(503, "busy"),
		Step::Status(503, "busy"),
		Step::Status(200, "{\"videos\":[]}"),
	]));
	let dispatcher = scripted_dispatcher(transport.clone(), 4);
	let response = dispatcher
		.send(&RequestSpec::get("/channels/1/videos.json"))
		.await
		.expect("Third attempt should succeed.");

	assert_eq!(response.status, 200);

	let log = transport.dispatch_log();

	assert_eq!(log.len(), 3);

	let first_gap = log[1].0 - log[0].0;
	let second_gap = log[2].0 - log[1].0;

	assert!(second_gap >= first_gap, "Inter-attempt delays must not decrease.");
}

#[tokio::test]
async fn connect_failures_replay_even_for_non_idempotent_requests() {
	let transport = Arc::new(ScriptedTransport::new([
		Step::Connect,
		Step::Status(201, "{\"video\":{\"id\":\"9\"}}"),
	]));
	let dispatcher = scripted_dispatcher(transport.clone(), 3);
	let response = dispatcher
		.send(&RequestSpec::post("/channels/1/videos.json").with_json(json!({"title": "clip"})))
		.await
		.expect("A connect failure never transmitted the body, so the retry is safe.");

	assert_eq!(response.status, 201);
	assert_eq!(transport.dispatch_log().len(), 2);
}

#[tokio::test]
async fn unauthorized_response_reacquires_token_once() {
	let transport = Arc::new(ScriptedTransport::new([
		Step::Status(401, "{\"error\":{\"code\":\"unauthorized\"}}"),
		Step::Status(200, "{\"videos\":[]}"),
	]));
	let dispatcher = scripted_dispatcher(transport.clone(), 3);
	let response = dispatcher
		.send(&RequestSpec::get("/channels/1/videos.json"))
		.await
		.expect("Request should succeed after one token re-acquisition.");

	assert_eq!(response.status, 200);
	assert_eq!(transport.token_grants(), 2, "The 401 should force exactly one re-exchange.");

	let log = transport.dispatch_log();

	assert_eq!(log.len(), 2);
	assert_eq!(log[0].1.as_deref(), Some("Bearer tok-1"));
	assert_eq!(log[1].1.as_deref(), Some("Bearer tok-2"));
}

#[tokio::test]
async fn repeated_unauthorized_becomes_authentication_error() {
	let transport = Arc::new(ScriptedTransport::new([
		Step::Status(401, "{\"error\":{\"code\":\"unauthorized\"}}"),
		Step::Status(401, "{\"error\":{\"code\":\"unauthorized\"}}"),
	]));
	let dispatcher = scripted_dispatcher(transport.clone(), 3);
	let err = dispatcher
		.send(&RequestSpec::get("/channels/1/videos.json"))
		.await
		.expect_err("A second 401 should be permanent.");

	assert!(matches!(err, Error::Authentication { status: Some(401), .. }));
	assert_eq!(transport.dispatch_log().len(), 2);
}

#[tokio::test]
async fn deadline_timeouts_classify_as_transient_and_retry() {
	let transport = Arc::new(ScriptedTransport::new([
		Step::Hang,
		Step::Status(200, "{\"videos\":[]}"),
	]));
	let dispatcher = scripted_dispatcher(transport.clone(), 3);
	let response = dispatcher
		.send(
			&RequestSpec::get("/channels/1/videos.json")
				.with_deadline(Duration::milliseconds(100)),
		)
		.await
		.expect("The retry after the timed-out attempt should succeed.");

	assert_eq!(response.status, 200);
	assert_eq!(transport.dispatch_log().len(), 2);
}
