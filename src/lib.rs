//! Access layer for hosted record stores: a sliding-window request scheduler, a PKCE token
//! lifecycle manager, a two-tier read-through cache, and a collision-aware slug allocator.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod ext;
pub mod flows;
pub mod http;
#[cfg(feature = "reqwest")] pub mod layer;
pub mod oauth;
pub mod obs;
pub mod provider;
#[cfg(feature = "reqwest")] pub mod remote;
pub mod retry;
pub mod schedule;
pub mod slug;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::ScopeSet,
		config::TokenConfig,
		flows::TokenManager,
		http::ReqwestHttpClient,
		oauth::ReqwestTransportErrorMapper,
		provider::{ClientAuthMethod, ProviderDescriptor},
		store::{KvStore, MemoryStore},
	};

	/// Token manager type alias used by reqwest-backed integration tests.
	pub type ReqwestTestTokenManager = TokenManager<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Builds a reqwest client that accepts the self-signed certificates produced by `httpmock`.
	pub fn test_reqwest_client() -> ReqwestClient {
		ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.")
	}

	/// Wraps [`test_reqwest_client`] in the token-endpoint transport.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		ReqwestHttpClient::with_client(test_reqwest_client())
	}

	/// Builds a descriptor whose endpoints live on the provided mock server base URL.
	pub fn test_descriptor(authorize: &str, token: &str) -> ProviderDescriptor {
		ProviderDescriptor::builder(
			crate::auth::ProviderId::new("mock-provider")
				.expect("Mock provider identifier should be valid."),
		)
		.authorization_endpoint(Url::parse(authorize).expect("Failed to parse mock authorize URL."))
		.token_endpoint(Url::parse(token).expect("Failed to parse mock token URL."))
		.preferred_client_auth_method(ClientAuthMethod::ClientSecretPost)
		.build()
		.expect("Mock provider descriptor should build.")
	}

	/// Token configuration shared across integration tests.
	pub fn test_token_config() -> TokenConfig {
		TokenConfig::new(
			"client-it",
			Url::parse("https://app.example.com/oauth/callback")
				.expect("Failed to parse test redirect URI."),
			ScopeSet::new(["data.records:read", "data.records:write"])
				.expect("Failed to build test scopes."),
		)
		.with_client_secret("secret-it")
	}

	/// Constructs a [`TokenManager`] backed by in-memory durable and scratch stores.
	pub fn build_reqwest_test_token_manager(
		descriptor: ProviderDescriptor,
	) -> (ReqwestTestTokenManager, Arc<MemoryStore>, Arc<MemoryStore>) {
		let durable_backend = Arc::new(MemoryStore::default());
		let scratch_backend = Arc::new(MemoryStore::default());
		let durable: Arc<dyn KvStore> = durable_backend.clone();
		let scratch: Arc<dyn KvStore> = scratch_backend.clone();
		let manager = TokenManager::with_http_client(
			descriptor,
			test_token_config(),
			durable,
			scratch,
			test_reqwest_http_client(),
			Arc::new(ReqwestTransportErrorMapper),
		);

		(manager, durable_backend, scratch_backend)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap, VecDeque},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
