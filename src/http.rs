//! Transport primitives for upstream API calls.
//!
//! The module exposes [`ApiTransport`] so downstream crates can integrate custom HTTP
//! clients without the rest of the access layer depending on any particular stack.
//! Implementations execute one already-encoded request and hand back the status,
//! rate-limit signals parsed from the response headers, and the raw body; every
//! retry, classification, and decoding decision stays above the trait.

// std
use std::ops::Deref;
// crates.io
#[cfg(feature = "reqwest")]
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, RETRY_AFTER};
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, error::TransportError};

/// HTTP method of an upstream request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	/// GET request.
	Get,
	/// POST request.
	Post,
	/// PUT request.
	Put,
	/// DELETE request.
	Delete,
	/// PATCH request.
	Patch,
}
impl Method {
	/// Returns the canonical method name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Delete => "DELETE",
			Method::Patch => "PATCH",
		}
	}

	/// Default idempotency assumption for the method.
	///
	/// GET, PUT, and DELETE are idempotent per HTTP semantics; POST and PATCH are not.
	/// Request specs may override this per endpoint.
	pub const fn default_idempotency(self) -> bool {
		matches!(self, Method::Get | Method::Put | Method::Delete)
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Fully encoded request handed to an [`ApiTransport`].
#[derive(Clone, Debug)]
pub struct TransportRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute request URL including query parameters.
	pub url: Url,
	/// Rendered `Authorization` header value, if the endpoint requires one.
	pub authorization: Option<String>,
	/// `Content-Type` header value matching the encoded body.
	pub content_type: Option<&'static str>,
	/// Already-encoded request body bytes.
	pub body: Option<Vec<u8>>,
}

/// Rate-limit signals parsed from upstream response headers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RateLimitSignals {
	/// Requests allowed per window, when advertised.
	pub limit: Option<u64>,
	/// Requests remaining in the current window, when advertised.
	pub remaining: Option<u64>,
	/// Relative wait derived from `Retry-After` or the reset header.
	pub retry_after: Option<Duration>,
}

/// Response handed back by an [`ApiTransport`].
#[derive(Clone, Debug)]
pub struct TransportResponse {
	/// HTTP status code.
	pub status: u16,
	/// Rate-limit signals parsed from the response headers.
	pub rate_limit: RateLimitSignals,
	/// Raw response body bytes.
	pub body: Vec<u8>,
}
impl TransportResponse {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

/// Boxed future returned by [`ApiTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports capable of executing upstream API calls.
///
/// The trait is the access layer's only dependency on an HTTP stack. Implementations
/// must distinguish connection-establishment failures ([`TransportError::Connect`])
/// from failures after the request may have been transmitted, because that boundary
/// decides whether a non-idempotent request is safe to retry.
pub trait ApiTransport
where
	Self: 'static + Send + Sync,
{
	/// Executes one request and returns the raw response.
	fn execute(&self, request: TransportRequest) -> TransportFuture<'_>;
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl ApiTransport for ReqwestTransport {
	fn execute(&self, request: TransportRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
				.map_err(TransportError::network)?;
			let mut builder = client.request(method, request.url.clone());

			if let Some(authorization) = request.authorization.as_deref() {
				builder = builder.header(AUTHORIZATION, authorization);
			}
			if let Some(content_type) = request.content_type {
				builder = builder.header(CONTENT_TYPE, content_type);
			}
			if let Some(body) = request.body.clone() {
				builder = builder.body(body);
			}

			let response = builder.send().await.map_err(TransportError::from)?;
			let status = response.status().as_u16();
			let rate_limit = parse_rate_limit(response.headers());
			let body = response.bytes().await.map_err(TransportError::from)?.to_vec();

			Ok(TransportResponse { status, rate_limit, body })
		})
	}
}

#[cfg(feature = "reqwest")]
fn parse_rate_limit(headers: &HeaderMap) -> RateLimitSignals {
	let limit = parse_u64_header(headers, "x-ratelimit-limit");
	let remaining = parse_u64_header(headers, "x-ratelimit-remaining");
	let retry_after =
		parse_retry_after(headers).or_else(|| parse_reset(headers, "x-ratelimit-reset"));

	RateLimitSignals { limit, remaining, retry_after }
}

#[cfg(feature = "reqwest")]
fn parse_u64_header(headers: &HeaderMap, name: &str) -> Option<u64> {
	headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(secs as i64));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

// Reset headers are ambiguous in the wild: some upstreams send seconds-until-reset,
// others a unix timestamp. Values that look like timestamps are converted to a delta.
#[cfg(feature = "reqwest")]
fn parse_reset(headers: &HeaderMap, name: &str) -> Option<Duration> {
	const EPOCH_THRESHOLD: u64 = 100_000_000;

	let raw = parse_u64_header(headers, name)?;

	if raw >= EPOCH_THRESHOLD {
		let delta = raw as i64 - OffsetDateTime::now_utc().unix_timestamp();

		if delta > 0 {
			return Some(Duration::seconds(delta));
		}

		return None;
	}

	Some(Duration::seconds(raw as i64))
}
