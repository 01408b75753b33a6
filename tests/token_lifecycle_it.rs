#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use record_broker::{
	_preludet::*,
	auth::{PendingAuthorization, ScopeSet, TokenRecord},
	error::ErrorKind,
	flows::{AuthState, TokenManager},
	oauth::ReqwestTransportErrorMapper,
	store::{
		self, KvStore, MemoryStore, PENDING_AUTHORIZATION_KEY, StoreError, StoreFuture,
		TOKEN_RECORD_KEY,
	},
};

const TOKEN_BODY: &str = "{\"access_token\":\"access-new\",\"refresh_token\":\"refresh-new\",\"token_type\":\"bearer\",\"expires_in\":3600}";

fn manager_for(server: &MockServer) -> (ReqwestTestTokenManager, Arc<MemoryStore>, Arc<MemoryStore>) {
	build_reqwest_test_token_manager(test_descriptor(&server.url("/authorize"), &server.url("/token")))
}

async fn seed_record(durable: &MemoryStore, access: &str, refresh: Option<&str>, expires_in: Duration) {
	let issued = OffsetDateTime::now_utc() - Duration::minutes(30);
	let scope = ScopeSet::new(["data.records:read", "data.records:write"])
		.expect("Seed scopes should be valid.");
	let mut builder = TokenRecord::builder(scope)
		.access_token(access)
		.issued_at(issued)
		.expires_at(OffsetDateTime::now_utc() + expires_in);

	if let Some(refresh) = refresh {
		builder = builder.refresh_token(refresh);
	}

	let record = builder.build().expect("Seed record should build.");

	store::save_json(durable, TOKEN_RECORD_KEY, &record, None)
		.await
		.expect("Failed to seed the token record.");
}

async fn stored_record(durable: &MemoryStore) -> Option<TokenRecord> {
	store::load_json(durable, TOKEN_RECORD_KEY).await.expect("Stored record should be readable.")
}

#[tokio::test]
async fn begin_authorization_builds_pkce_url_and_keeps_pending_state() {
	let server = MockServer::start_async().await;
	let (manager, _, scratch) = manager_for(&server);
	let request = manager.begin_authorization().await.expect("Authorization should start.");
	let pairs: HashMap<_, _> = request.url.query_pairs().into_owned().collect();

	assert_eq!(request.url.path(), "/authorize");
	assert_eq!(pairs.get("response_type"), Some(&"code".into()));
	assert_eq!(pairs.get("client_id"), Some(&"client-it".into()));
	assert_eq!(pairs.get("redirect_uri"), Some(&"https://app.example.com/oauth/callback".into()));
	assert_eq!(pairs.get("scope"), Some(&"data.records:read data.records:write".into()));
	assert_eq!(pairs.get("state"), Some(&request.state));
	assert_eq!(pairs.get("code_challenge_method"), Some(&"S256".into()));

	let pending: PendingAuthorization =
		store::load_json(scratch.as_ref(), PENDING_AUTHORIZATION_KEY)
			.await
			.expect("Pending authorization should be readable.")
			.expect("Pending authorization should be stored.");

	assert_eq!(pending.state, request.state);
	assert_eq!(pairs.get("code_challenge"), Some(&pending.code_challenge()));
	assert!(!request.url.as_str().contains(pending.code_verifier.expose()));
	assert_eq!(manager.state(), AuthState::Authorizing);
}

#[tokio::test]
async fn completed_authorization_persists_the_credential() {
	let server = MockServer::start_async().await;
	let (manager, durable, scratch) = manager_for(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.header("content-type", "application/x-www-form-urlencoded");
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await;
	let request = manager.begin_authorization().await.expect("Authorization should start.");

	manager
		.complete_authorization("valid-code", &request.state)
		.await
		.expect("Authorization should complete.");
	mock.assert_calls_async(1).await;

	let record = stored_record(&durable).await.expect("Credential should be stored.");

	assert_eq!(record.access_token.expose(), "access-new");
	assert_eq!(record.refresh_token.as_ref().map(|secret| secret.expose()), Some("refresh-new"));
	assert!(record.expires_at > record.issued_at);
	assert!(!scratch.contains_key(PENDING_AUTHORIZATION_KEY));
	assert_eq!(manager.state(), AuthState::Authenticated);
	assert_eq!(manager.metrics().exchanges(), 1);

	let token = manager
		.get_valid_token()
		.await
		.expect("Token lookup should succeed.")
		.expect("A fresh credential should be returned.");

	assert_eq!(token.expose(), "access-new");
}

#[tokio::test]
async fn mismatched_state_never_reaches_the_token_endpoint() {
	let server = MockServer::start_async().await;
	let (manager, durable, scratch) = manager_for(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await;

	manager.begin_authorization().await.expect("Authorization should start.");

	let err = manager
		.complete_authorization("valid-code", "forged-state")
		.await
		.expect_err("A forged state must be rejected.");

	assert!(matches!(err, Error::CsrfMismatch));
	mock.assert_calls_async(0).await;
	assert!(stored_record(&durable).await.is_none());
	assert!(!scratch.contains_key(PENDING_AUTHORIZATION_KEY));
	assert_eq!(manager.state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn replayed_callback_is_rejected_after_success() {
	let server = MockServer::start_async().await;
	let (manager, _, _) = manager_for(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await;
	let request = manager.begin_authorization().await.expect("Authorization should start.");

	manager
		.complete_authorization("valid-code", &request.state)
		.await
		.expect("First completion should succeed.");

	let err = manager
		.complete_authorization("valid-code", &request.state)
		.await
		.expect_err("A replayed callback must be rejected.");

	assert!(matches!(err, Error::CsrfMismatch));
	mock.assert_calls_async(1).await;
	assert_eq!(manager.state(), AuthState::Authenticated);
}

#[tokio::test]
async fn rejected_exchange_clears_everything() {
	let server = MockServer::start_async().await;
	let (manager, durable, scratch) = manager_for(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\",\"error_description\":\"code expired\"}");
		})
		.await;
	let request = manager.begin_authorization().await.expect("Authorization should start.");
	let err = manager
		.complete_authorization("stale-code", &request.state)
		.await
		.expect_err("A refused code must fail the exchange.");

	mock.assert_calls_async(1).await;

	let source = match err {
		Error::ExchangeFailed { source } => source,
		other => panic!("Expected an exchange failure, got {other:?}."),
	};

	assert!(matches!(source.as_ref(), Error::Rejected { status: 400, .. }));
	assert!(stored_record(&durable).await.is_none());
	assert!(scratch.is_empty());
	assert_eq!(manager.state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn missing_credential_yields_none() {
	let server = MockServer::start_async().await;
	let (manager, _, _) = manager_for(&server);

	assert!(manager.get_valid_token().await.expect("Token lookup should succeed.").is_none());
	assert!(matches!(manager.force_refresh().await, Err(Error::Unauthorized)));
	assert_eq!(manager.state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn fresh_credential_skips_the_token_endpoint() {
	let server = MockServer::start_async().await;
	let (manager, durable, _) = manager_for(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await;

	seed_record(&durable, "access-old", Some("refresh-old"), Duration::hours(1)).await;

	let token = manager
		.get_valid_token()
		.await
		.expect("Token lookup should succeed.")
		.expect("The stored credential should be returned.");

	assert_eq!(token.expose(), "access-old");
	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
	let server = MockServer::start_async().await;
	let (manager, durable, _) = manager_for(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.delay(StdDuration::from_millis(100))
				.body(TOKEN_BODY);
		})
		.await;

	seed_record(&durable, "access-old", Some("refresh-old"), Duration::minutes(1)).await;

	let (first, second, third) =
		tokio::join!(manager.get_valid_token(), manager.get_valid_token(), manager.get_valid_token());

	for result in [first, second, third] {
		let token = result
			.expect("Token lookup should succeed.")
			.expect("A refreshed credential should be returned.");

		assert_eq!(token.expose(), "access-new");
	}

	mock.assert_calls_async(1).await;
	assert_eq!(manager.metrics().refresh_attempts(), 1);
	assert_eq!(manager.metrics().refresh_successes(), 1);
	assert_eq!(manager.state(), AuthState::Authenticated);
}

#[tokio::test]
async fn non_rotating_refresh_keeps_the_previous_refresh_token() {
	let server = MockServer::start_async().await;
	let (manager, durable, _) = manager_for(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"access-rotated\",\"token_type\":\"bearer\",\"expires_in\":3600}");
		})
		.await;

	seed_record(&durable, "access-old", Some("refresh-old"), Duration::minutes(1)).await;

	let token = manager.force_refresh().await.expect("Forced refresh should succeed.");

	mock.assert_calls_async(1).await;
	assert_eq!(token.expose(), "access-rotated");

	let record = stored_record(&durable).await.expect("Refreshed credential should be stored.");

	assert_eq!(record.refresh_token.as_ref().map(|secret| secret.expose()), Some("refresh-old"));
}

#[tokio::test]
async fn failed_refresh_clears_the_credential() {
	let server = MockServer::start_async().await;
	let (manager, durable, _) = manager_for(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\"}");
		})
		.await;

	seed_record(&durable, "access-old", Some("refresh-revoked"), Duration::minutes(1)).await;

	let token = manager.get_valid_token().await.expect("A refused refresh is not an error here.");

	assert!(token.is_none());
	mock.assert_calls_async(1).await;
	assert!(stored_record(&durable).await.is_none());
	assert_eq!(manager.metrics().refresh_failures(), 1);
	assert_eq!(manager.state(), AuthState::Unauthenticated);

	let err = manager.force_refresh().await.expect_err("Nothing is left to refresh.");

	assert!(matches!(err, Error::Unauthorized));
}

#[tokio::test]
async fn credential_without_refresh_token_is_dropped_when_due() {
	let server = MockServer::start_async().await;
	let (manager, durable, _) = manager_for(&server);

	seed_record(&durable, "access-old", None, Duration::minutes(1)).await;

	assert!(manager.get_valid_token().await.expect("Token lookup should succeed.").is_none());
	assert!(stored_record(&durable).await.is_none());
}

#[tokio::test]
async fn logout_during_refresh_wins() {
	let server = MockServer::start_async().await;
	let (manager, durable, _) = manager_for(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.delay(StdDuration::from_millis(300))
				.body(TOKEN_BODY);
		})
		.await;

	seed_record(&durable, "access-old", Some("refresh-old"), Duration::minutes(1)).await;

	let (token, cleared) = tokio::join!(manager.get_valid_token(), async {
		tokio::time::sleep(StdDuration::from_millis(50)).await;
		manager.clear().await
	});

	cleared.expect("Logout should succeed.");
	mock.assert_calls_async(1).await;
	assert!(token.expect("Token lookup should succeed.").is_none());
	assert!(stored_record(&durable).await.is_none());
	assert_eq!(manager.state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn clear_is_idempotent() {
	let server = MockServer::start_async().await;
	let (manager, durable, scratch) = manager_for(&server);

	seed_record(&durable, "access-old", Some("refresh-old"), Duration::hours(1)).await;
	manager.begin_authorization().await.expect("Authorization should start.");
	manager.clear().await.expect("First clear should succeed.");
	manager.clear().await.expect("Second clear should succeed.");

	assert!(durable.is_empty());
	assert!(scratch.is_empty());
	assert_eq!(manager.state(), AuthState::Unauthenticated);
}

struct ReadOnlyStore(Arc<MemoryStore>);
impl KvStore for ReadOnlyStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		self.0.get(key)
	}

	fn set<'a>(&'a self, _: &'a str, _: String, _: Option<Duration>) -> StoreFuture<'a, ()> {
		Box::pin(async { Err(StoreError::Backend { message: "disk full".into() }) })
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		self.0.delete(key)
	}
}

fn manager_over_read_only_durable(
	server: &MockServer,
) -> (ReqwestTestTokenManager, Arc<MemoryStore>) {
	let backing = Arc::new(MemoryStore::default());
	let durable: Arc<dyn KvStore> = Arc::new(ReadOnlyStore(Arc::clone(&backing)));
	let scratch: Arc<dyn KvStore> = Arc::new(MemoryStore::default());
	let manager = TokenManager::with_http_client(
		test_descriptor(&server.url("/authorize"), &server.url("/token")),
		test_token_config(),
		durable,
		scratch,
		test_reqwest_http_client(),
		Arc::new(ReqwestTransportErrorMapper),
	);

	(manager, backing)
}

#[tokio::test]
async fn abandoned_redirect_settles_back_to_authenticated() {
	let server = MockServer::start_async().await;
	let (manager, durable, scratch) = manager_for(&server);

	seed_record(&durable, "access-old", Some("refresh-old"), Duration::hours(1)).await;

	manager.get_valid_token().await.expect("Token lookup should succeed.");
	assert_eq!(manager.state(), AuthState::Authenticated);

	manager.begin_authorization().await.expect("Authorization should start.");
	manager.get_valid_token().await.expect("Token lookup should succeed.");
	assert_eq!(manager.state(), AuthState::Authorizing);

	// Same effect as the pending authorization outliving its TTL.
	scratch.delete(PENDING_AUTHORIZATION_KEY).await.expect("Delete should succeed.");

	let token = manager
		.get_valid_token()
		.await
		.expect("Token lookup should succeed.")
		.expect("The stored credential should still be served.");

	assert_eq!(token.expose(), "access-old");
	assert_eq!(manager.state(), AuthState::Authenticated);
}

#[tokio::test]
async fn storage_failure_after_exchange_leaves_no_in_progress_state() {
	let server = MockServer::start_async().await;
	let (manager, backing) = manager_over_read_only_durable(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await;
	let request = manager.begin_authorization().await.expect("Authorization should start.");
	let err = manager
		.complete_authorization("valid-code", &request.state)
		.await
		.expect_err("Persisting the credential should fail.");

	mock.assert_calls_async(1).await;
	assert_eq!(err.kind(), ErrorKind::Storage);
	assert_eq!(manager.state(), AuthState::Unauthenticated);
	assert!(stored_record(&backing).await.is_none());
}

#[tokio::test]
async fn storage_failure_after_refresh_restores_the_prior_state() {
	let server = MockServer::start_async().await;
	let (manager, backing) = manager_over_read_only_durable(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await;

	seed_record(&backing, "access-old", Some("refresh-old"), Duration::minutes(1)).await;

	let before = manager.state();
	let err = manager.force_refresh().await.expect_err("Persisting the refresh should fail.");

	mock.assert_calls_async(1).await;
	assert_eq!(err.kind(), ErrorKind::Storage);
	assert_eq!(manager.state(), before);
	assert_ne!(manager.state(), AuthState::RefreshPending);
	assert_eq!(manager.metrics().refresh_failures(), 1);

	let kept = stored_record(&backing).await.expect("The previous credential should remain.");

	assert_eq!(kept.access_token.expose(), "access-old");
}
