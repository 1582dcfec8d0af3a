//! Crate-level error types shared across the token, dispatch, pagination, and mutation layers.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical access-layer error exposed by public APIs.
///
/// Recoverable classifications (transient, rate-limited) are retried inside the
/// dispatcher before one of these surfaces; anything a caller sees here has
/// already exhausted its internal handling.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Token cache backend failure.
	#[error("{0}")]
	Cache(
		#[from]
		#[source]
		crate::cache::CacheError,
	),
	/// Local configuration or response-decoding problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Token exchange failed permanently (bad credentials or bounded retries exhausted).
	#[error("Token exchange failed: {reason}.")]
	Authentication {
		/// Upstream- or crate-supplied reason string.
		reason: String,
		/// HTTP status code observed on the final exchange attempt, when available.
		status: Option<u16>,
	},
	/// Upstream rate limit still in effect after the dispatcher's attempt cap.
	#[error("Rate limited by upstream; retry after {retry_after}.")]
	RateLimited {
		/// Wait the upstream (or backoff policy) suggested for the next attempt.
		retry_after: Duration,
		/// Attempts performed before surfacing.
		attempts: u32,
	},
	/// Transient failure (5xx, network, timeout) that survived every retry.
	#[error("Transient upstream failure after {attempts} attempts: {message}.")]
	Transient {
		/// Human-readable summary of the last observed failure.
		message: String,
		/// HTTP status code of the last attempt, when one was received.
		status: Option<u16>,
		/// Attempts performed before surfacing.
		attempts: u32,
	},
	/// Non-retryable upstream rejection (4xx other than 401/429).
	#[error("Upstream rejected the request with status {status}.")]
	Permanent {
		/// HTTP status code returned by the upstream.
		status: u16,
		/// Parsed error envelope, when the response body carried one.
		envelope: Option<ErrorEnvelope>,
	},
}

/// Configuration and validation failures raised by the access layer.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// A request path could not be joined onto the service base URL.
	#[error("Request path `{path}` does not form a valid URL.")]
	InvalidPath {
		/// The offending path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A request body failed to serialize.
	#[error("Request body could not be encoded.")]
	BodyEncode(#[from] serde_json::Error),
	/// Upstream returned a body that could not be decoded as the expected shape.
	#[error("Upstream response body could not be decoded.")]
	ResponseDecode {
		/// Structured parsing failure with the JSON path that failed.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the response, when available.
		status: Option<u16>,
	},
	/// Listing response did not contain the declared items key.
	#[error("Listing response is missing the `{key}` items key.")]
	MissingItemsKey {
		/// The items key the listing spec declared.
		key: String,
	},
	/// Access token record builder validation failed.
	#[error("Unable to build access token record.")]
	TokenBuild(#[from] crate::auth::AccessTokenBuilderError),
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}

/// Transport-level failures (network, IO).
///
/// The `Connect` variant is kept distinct because a request whose connection never
/// established cannot have reached the upstream, which makes it safe to retry even
/// for non-idempotent operations.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Connection establishment failed; the request body was never transmitted.
	#[error("Connection to the upstream could not be established.")]
	Connect {
		/// Transport-specific connection error.
		#[source]
		source: BoxError,
	},
	/// Network failure after the request may have been transmitted.
	#[error("Network error occurred while calling the upstream.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The request exceeded its deadline.
	#[error("Request deadline elapsed before the upstream responded.")]
	Timeout,
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the upstream.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific connection-establishment error.
	pub fn connect(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Connect { source: Box::new(src) }
	}

	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Returns `true` when the failure occurred strictly before the request body could
	/// have been transmitted.
	pub fn before_transmission(&self) -> bool {
		matches!(self, Self::Connect { .. })
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_connect() {
			Self::connect(e)
		} else if e.is_timeout() {
			Self::Timeout
		} else {
			Self::network(e)
		}
	}
}

/// Upstream error envelope attached to non-2xx JSON responses.
///
/// The upstream wraps failures as `{"error": {"code", "message", "details"}}`; every
/// field is optional in practice, so the struct is lenient about what it accepts.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
	/// Inner error payload.
	#[serde(default)]
	pub error: UpstreamError,
}
impl ErrorEnvelope {
	/// Attempts to parse an envelope from a raw response body.
	///
	/// Returns `None` for empty or non-conforming bodies; a missing envelope is not an
	/// error in its own right.
	pub fn parse(body: &[u8]) -> Option<Self> {
		if body.is_empty() {
			return None;
		}

		serde_json::from_slice(body).ok()
	}
}
impl Display for ErrorEnvelope {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match (&self.error.code, &self.error.message) {
			(Some(code), Some(message)) => write!(f, "{code}: {message}"),
			(Some(code), None) => f.write_str(code),
			(None, Some(message)) => f.write_str(message),
			(None, None) => f.write_str("unspecified upstream error"),
		}
	}
}

/// Inner payload of an [`ErrorEnvelope`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UpstreamError {
	/// Upstream error code string.
	#[serde(default)]
	pub code: Option<String>,
	/// Human-readable message.
	#[serde(default)]
	pub message: Option<String>,
	/// Free-form details payload.
	#[serde(default)]
	pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn envelope_parses_upstream_shape() {
		let body = br#"{"error":{"code":"not_found","message":"No such video.","details":null}}"#;
		let envelope =
			ErrorEnvelope::parse(body).expect("Well-formed envelope should parse successfully.");

		assert_eq!(envelope.error.code.as_deref(), Some("not_found"));
		assert_eq!(envelope.to_string(), "not_found: No such video.");
	}

	#[test]
	fn envelope_parse_tolerates_garbage() {
		assert!(ErrorEnvelope::parse(b"").is_none());
		assert!(ErrorEnvelope::parse(b"<html>busy</html>").is_none());
	}

	#[test]
	fn connect_failures_are_safe_before_transmission() {
		let connect = TransportError::connect(std::io::Error::other("refused"));
		let network = TransportError::network(std::io::Error::other("reset"));

		assert!(connect.before_transmission());
		assert!(!network.before_transmission());
		assert!(!TransportError::Timeout.before_transmission());
	}
}
