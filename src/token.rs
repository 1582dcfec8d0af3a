//! Token acquisition with caching and singleflight guards.
//!
//! [`TokenManager::acquire`] hands out cached tokens while they stay outside the
//! safety margin and only contacts the token endpoint when the cached record is
//! missing or stale. A per-key singleflight guard ensures concurrent callers
//! piggy-back on the same in-flight exchange instead of stampeding the endpoint.
//! Exchange failures follow the dispatcher's classification, but retries are bounded
//! to a small fixed attempt count before an authentication error surfaces.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, Credential, TokenKind},
	cache::{CacheKey, TokenCache},
	error::{ConfigError, ErrorEnvelope, TransportError},
	http::{ApiTransport, Method, TransportRequest, TransportResponse},
	obs::{self, OpKind, OpOutcome, OpSpan},
	retry::{self, BackoffPolicy},
	service::ServiceDescriptor,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

/// Longest `expires_in` the manager accepts from the token endpoint.
const EXPIRES_IN_MAX: i64 = 366 * 24 * 60 * 60;

#[cfg(feature = "reqwest")]
/// Token manager specialized for the crate's default reqwest transport.
pub type ReqwestTokenManager = TokenManager<ReqwestTransport>;

/// Tuning knobs for [`TokenManager`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TokenManagerConfig {
	/// Window before expiry inside which a cached token is treated as stale.
	pub safety_margin: Duration,
	/// Total exchange attempts (first try included) before surfacing a failure.
	pub exchange_attempts: u32,
	/// Deadline applied to each individual exchange attempt.
	pub exchange_deadline: Duration,
	/// Backoff policy between transient exchange failures.
	pub backoff: BackoffPolicy,
}
impl Default for TokenManagerConfig {
	fn default() -> Self {
		Self {
			// The upstream invalidates tokens server-side slightly before the advertised
			// expiry; five minutes absorbs that plus clock skew.
			safety_margin: Duration::seconds(300),
			exchange_attempts: 3,
			exchange_deadline: Duration::seconds(30),
			backoff: BackoffPolicy::default(),
		}
	}
}

/// Acquires, caches, and refreshes access tokens of both kinds.
///
/// The manager exclusively owns its cache reference; construct one manager per
/// credential set and share it via `Arc`. Cache entries are partitioned by the
/// credential fingerprint, so several managers with distinct credentials can share
/// one cache backend without observing each other's tokens.
#[derive(Clone)]
pub struct TokenManager<T>
where
	T: ?Sized + ApiTransport,
{
	/// Transport used for exchange requests.
	pub transport: Arc<T>,
	/// Cache backend that persists issued tokens.
	pub cache: Arc<dyn TokenCache>,
	/// Service descriptor defining the token endpoint and quirks.
	pub descriptor: ServiceDescriptor,
	config: TokenManagerConfig,
	credential: Credential,
	refresh_guards: Arc<Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>>,
}
impl<T> TokenManager<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates a manager for the provided transport, cache, descriptor, and credential.
	pub fn new(
		transport: impl Into<Arc<T>>,
		cache: Arc<dyn TokenCache>,
		descriptor: ServiceDescriptor,
		credential: Credential,
	) -> Self {
		Self {
			transport: transport.into(),
			cache,
			descriptor,
			config: TokenManagerConfig::default(),
			credential,
			refresh_guards: Default::default(),
		}
	}

	/// Overrides the manager configuration.
	pub fn with_config(mut self, config: TokenManagerConfig) -> Self {
		self.config = config;

		self
	}

	/// Returns the active configuration.
	pub fn config(&self) -> &TokenManagerConfig {
		&self.config
	}

	/// Returns a usable token of the requested kind, exchanging credentials only when
	/// no fresh cached token exists.
	pub async fn acquire(&self, kind: TokenKind) -> Result<AccessToken> {
		const KIND: OpKind = OpKind::TokenExchange;

		let span = OpSpan::new(KIND, "acquire");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let key = CacheKey::new(&self.credential, kind);
				let guard = self.refresh_guard(&key);
				let _singleflight = guard.lock().await;
				let now = OffsetDateTime::now_utc();

				if let Some(current) = self
					.cache
					.fetch(&key)
					.await
					.map_err(Error::from)?
					.filter(|token| token.is_usable_at(now, self.config.safety_margin))
				{
					return Ok(current);
				}

				let token = self.exchange(kind).await?;

				self.cache.store(key, token.clone()).await.map_err(Error::from)?;

				Ok(token)
			})
			.await;

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(KIND, OpOutcome::Failure),
		}

		result
	}

	/// Drops the cached token of the requested kind.
	///
	/// Used by the dispatcher when the upstream rejects a token that the cache still
	/// considers fresh (server-side revocation).
	pub async fn invalidate(&self, kind: TokenKind) -> Result<()> {
		let key = CacheKey::new(&self.credential, kind);

		self.cache.evict(&key).await.map_err(Error::from)?;

		Ok(())
	}

	fn refresh_guard(&self, key: &CacheKey) -> Arc<AsyncMutex<()>> {
		let mut guards = self.refresh_guards.lock();

		guards.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}

	async fn exchange(&self, kind: TokenKind) -> Result<AccessToken> {
		let request = self.exchange_request(kind);
		let mut attempt = 0_u32;

		loop {
			attempt += 1;

			let outcome =
				tokio::time::timeout(
					retry::to_std(self.config.exchange_deadline),
					self.transport.execute(request.clone()),
				)
				.await
				.map_err(|_| TransportError::Timeout)
				.and_then(|result| result);

			match outcome {
				Ok(response) if response.is_success() =>
					return self.decode_exchange(kind, &response),
				Ok(response) if (400..500).contains(&response.status) =>
					return Err(Error::Authentication {
						reason: exchange_reason(&response),
						status: Some(response.status),
					}),
				Ok(response) => {
					if attempt >= self.config.exchange_attempts {
						return Err(Error::Authentication {
							reason: exchange_reason(&response),
							status: Some(response.status),
						});
					}
				},
				Err(transport_error) => {
					if attempt >= self.config.exchange_attempts {
						return Err(Error::Authentication {
							reason: transport_error.to_string(),
							status: None,
						});
					}
				},
			}

			retry::sleep_for(self.config.backoff.delay_for(attempt)).await;
		}
	}

	fn exchange_request(&self, kind: TokenKind) -> TransportRequest {
		let mut form = url::form_urlencoded::Serializer::new(String::new());

		form.append_pair("grant_type", "client_credentials");
		form.append_pair("client_id", self.credential.client_id());
		form.append_pair("client_secret", self.credential.client_secret().expose());

		if let Some(token_type) = kind.exchange_token_type() {
			form.append_pair("token_type", token_type);
		}
		if let Some(device_name) = self.descriptor.quirks.device_name.as_deref() {
			form.append_pair("device_name", device_name);
		}

		TransportRequest {
			method: Method::Post,
			url: self.descriptor.endpoints.token.clone(),
			authorization: None,
			content_type: Some("application/x-www-form-urlencoded"),
			body: Some(form.finish().into_bytes()),
		}
	}

	fn decode_exchange(&self, kind: TokenKind, response: &TransportResponse) -> Result<AccessToken> {
		let mut deserializer = serde_json::Deserializer::from_slice(&response.body);
		let payload: TokenEndpointResponse = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| ConfigError::ResponseDecode {
				source,
				status: Some(response.status),
			})?;
		let expires_in = payload.expires_in.ok_or(ConfigError::MissingExpiresIn)?;

		if expires_in <= 0 {
			return Err(ConfigError::NonPositiveExpiresIn.into());
		}
		if expires_in > EXPIRES_IN_MAX {
			return Err(ConfigError::ExpiresInOutOfRange.into());
		}

		let mut builder = AccessToken::builder(kind)
			.value(payload.access_token)
			.issued_now()
			.expires_in(Duration::seconds(expires_in));

		if let Some(scope) = payload.scope {
			builder = builder.scope_hint(scope);
		}

		builder.build().map_err(|err| ConfigError::from(err).into())
	}
}
impl<T> Debug for TokenManager<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("descriptor", &self.descriptor.id)
			.field("credential", &self.credential)
			.field("config", &self.config)
			.finish()
	}
}

#[derive(Deserialize)]
struct TokenEndpointResponse {
	access_token: String,
	#[serde(default)]
	expires_in: Option<i64>,
	#[serde(default)]
	scope: Option<String>,
}

fn exchange_reason(response: &TransportResponse) -> String {
	match ErrorEnvelope::parse(&response.body) {
		Some(envelope) => envelope.to_string(),
		None => format!("token endpoint returned status {}", response.status),
	}
}
