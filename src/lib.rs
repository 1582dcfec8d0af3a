//! Resilient access layer for rate-limited, eventually consistent video CMS APIs—dual-kind token
//! brokering, classified retries, link-walking pagination, and verified optimistic mutations.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod mutate;
pub mod obs;
pub mod paginate;
pub mod retry;
pub mod service;
pub mod token;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::Credential,
		cache::MemoryTokenCache,
		dispatch::RequestDispatcher,
		http::ReqwestTransport,
		service::ServiceDescriptor,
		token::TokenManager,
	};

	/// Dispatcher type alias used by reqwest-backed integration tests.
	pub type ReqwestTestDispatcher = RequestDispatcher<ReqwestTransport>;

	/// Builds a reqwest transport that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_transport() -> ReqwestTransport {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestTransport::with_client(client)
	}

	/// Constructs a [`TokenManager`] backed by an in-memory cache and the reqwest transport
	/// used across integration tests.
	pub fn build_reqwest_test_token_manager(
		descriptor: ServiceDescriptor,
		client_id: &str,
		client_secret: &str,
	) -> (Arc<TokenManager<ReqwestTransport>>, Arc<MemoryTokenCache>) {
		let cache_backend = Arc::new(MemoryTokenCache::default());
		let credential = Credential::new(client_id, client_secret)
			.expect("Test credential should be considered valid.");
		let manager = TokenManager::new(
			test_reqwest_transport(),
			cache_backend.clone(),
			descriptor,
			credential,
		);

		(Arc::new(manager), cache_backend)
	}

	/// Constructs a [`RequestDispatcher`] wired to a fresh token manager and in-memory cache.
	pub fn build_reqwest_test_dispatcher(
		descriptor: ServiceDescriptor,
		client_id: &str,
		client_secret: &str,
	) -> (ReqwestTestDispatcher, Arc<MemoryTokenCache>) {
		let (manager, cache_backend) =
			build_reqwest_test_token_manager(descriptor, client_id, client_secret);
		let dispatcher = RequestDispatcher::new(test_reqwest_transport(), manager);

		(dispatcher, cache_backend)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _, vidgate as _};
