//! Resilient request dispatch with uniform outcome classification.
//!
//! [`RequestDispatcher::send`] resolves the token for the spec's endpoint family,
//! encodes the declared body, and drives the retry loop: transient and rate-limited
//! outcomes retry under the backoff policy (a rate-limited wait is the larger of the
//! backoff value and the upstream's signal), permanent outcomes surface immediately,
//! and non-idempotent requests are only replayed when the failure provably occurred
//! before the request body was transmitted.

pub mod outcome;
pub mod spec;

pub use outcome::*;
pub use spec::*;

// self
use crate::{
	_prelude::*,
	auth::TokenKind,
	error::TransportError,
	http::{ApiTransport, TransportRequest},
	obs::{self, OpKind, OpOutcome, OpSpan},
	retry::{self, BackoffPolicy},
	token::TokenManager,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

#[cfg(feature = "reqwest")]
/// Dispatcher specialized for the crate's default reqwest transport.
pub type ReqwestDispatcher = RequestDispatcher<ReqwestTransport>;

/// Tuning knobs for [`RequestDispatcher`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DispatchConfig {
	/// Backoff policy governing transient and rate-limited retries.
	pub backoff: BackoffPolicy,
	/// Default overall deadline per request; specs may override it.
	pub deadline: Duration,
	/// Whether a 401 triggers one token invalidation + re-acquisition before the
	/// failure is treated as permanent.
	pub reacquire_on_unauthorized: bool,
}
impl Default for DispatchConfig {
	fn default() -> Self {
		Self {
			backoff: BackoffPolicy::default(),
			deadline: Duration::seconds(30),
			reacquire_on_unauthorized: true,
		}
	}
}

/// Sends logical requests through the transport with retry, rate-limit handling, and
/// token attachment.
///
/// The dispatcher owns no persistent state beyond its configuration; it reads the
/// token cache through the manager and never mutates caller state.
#[derive(Clone)]
pub struct RequestDispatcher<T>
where
	T: ?Sized + ApiTransport,
{
	/// Transport executing the encoded requests.
	pub transport: Arc<T>,
	/// Token manager consulted for every request's auth material.
	pub tokens: Arc<TokenManager<T>>,
	config: DispatchConfig,
}
impl<T> RequestDispatcher<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates a dispatcher over the provided transport and token manager.
	pub fn new(transport: impl Into<Arc<T>>, tokens: Arc<TokenManager<T>>) -> Self {
		Self { transport: transport.into(), tokens, config: DispatchConfig::default() }
	}

	/// Overrides the dispatcher configuration.
	pub fn with_config(mut self, config: DispatchConfig) -> Self {
		self.config = config;

		self
	}

	/// Returns the active configuration.
	pub fn config(&self) -> &DispatchConfig {
		&self.config
	}

	/// Sends a single logical request, classifying and retrying failures.
	pub async fn send(&self, spec: &RequestSpec) -> Result<Response> {
		const KIND: OpKind = OpKind::Dispatch;

		let span = OpSpan::new(KIND, "send");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span.instrument(self.send_inner(spec)).await;

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(KIND, OpOutcome::Failure),
		}

		result
	}

	async fn send_inner(&self, spec: &RequestSpec) -> Result<Response> {
		let deadline = spec.deadline.unwrap_or(self.config.deadline);
		let body = spec.body.encode()?;
		let url = self.request_url(spec)?;
		let max_attempts = self.config.backoff.max_attempts;
		let mut reacquired = false;
		let mut attempt = 0_u32;

		loop {
			attempt += 1;

			let token = self.tokens.acquire(spec.token_kind).await?;
			let request = TransportRequest {
				method: spec.method,
				url: url.clone(),
				authorization: Some(token.authorization_value()),
				content_type: spec.body.content_type(),
				body: body.clone(),
			};
			let outcome = tokio::time::timeout(retry::to_std(deadline), self.transport.execute(request))
				.await
				.map_err(|_| TransportError::Timeout)
				.and_then(|result| result);

			match outcome {
				Ok(response) => match classify(&response) {
					Classification::Success => return Ok(Response::from_transport(response)),
					Classification::RateLimited { retry_after } => {
						let wait = self.rate_limit_wait(attempt, retry_after);

						if attempt >= max_attempts {
							return Err(Error::RateLimited { retry_after: wait, attempts: attempt });
						}

						retry::sleep_for(wait).await;
					},
					Classification::Transient { status } => {
						// A response in hand means the body reached the upstream; only
						// idempotent specs may replay from here.
						if !spec.idempotent || attempt >= max_attempts {
							return Err(Error::Transient {
								message: format!("{} returned status {status}", spec.label()),
								status: Some(status),
								attempts: attempt,
							});
						}

						retry::sleep_for(self.config.backoff.delay_for(attempt)).await;
					},
					Classification::Permanent { status: 401 }
						if self.config.reacquire_on_unauthorized && !reacquired =>
					{
						self.tokens.invalidate(spec.token_kind).await?;

						reacquired = true;
					},
					Classification::Permanent { status } => {
						let envelope = Response::from_transport(response).error_envelope();

						if status == 401 {
							return Err(Error::Authentication {
								reason: envelope
									.map(|e| e.to_string())
									.unwrap_or_else(|| "upstream rejected the token".into()),
								status: Some(status),
							});
						}

						return Err(Error::Permanent { status, envelope });
					},
				},
				Err(transport_error) => {
					let replayable = spec.idempotent || transport_error.before_transmission();

					if !replayable || attempt >= max_attempts {
						return Err(Error::Transient {
							message: format!("{}: {transport_error}", spec.label()),
							status: None,
							attempts: attempt,
						});
					}

					retry::sleep_for(self.config.backoff.delay_for(attempt)).await;
				},
			}
		}
	}

	fn request_url(&self, spec: &RequestSpec) -> Result<Url> {
		let mut url = self.tokens.descriptor.resource_url(&spec.path)?;

		if !spec.query.is_empty() {
			let mut pairs = url.query_pairs_mut();

			for (key, value) in &spec.query {
				pairs.append_pair(key, value);
			}
		}

		Ok(url)
	}

	fn rate_limit_wait(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
		let backoff = self.config.backoff.delay_for(attempt);

		match retry_after {
			Some(signal) if signal > backoff => signal,
			_ => backoff,
		}
	}

	/// Convenience accessor used by higher layers to resolve tokens directly.
	pub async fn acquire_token(&self, kind: TokenKind) -> Result<crate::auth::AccessToken> {
		self.tokens.acquire(kind).await
	}
}
impl<T> Debug for RequestDispatcher<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestDispatcher")
			.field("tokens", &self.tokens)
			.field("config", &self.config)
			.finish()
	}
}
