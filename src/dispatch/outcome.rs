//! Outcome classification applied uniformly to every dispatched response.

// self
use crate::{
	_prelude::*,
	error::{ConfigError, ErrorEnvelope},
	http::TransportResponse,
};

/// Classification of a completed HTTP exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
	/// 2xx.
	Success,
	/// 429; carries the upstream's retry hint when one was signalled.
	RateLimited {
		/// Wait requested by the upstream, if signalled.
		retry_after: Option<Duration>,
	},
	/// 5xx; safe to retry for idempotent requests.
	Transient {
		/// Status code of the failing response.
		status: u16,
	},
	/// Any other 4xx; never retried.
	Permanent {
		/// Status code of the failing response.
		status: u16,
	},
}

/// Classifies a transport response by status code.
pub fn classify(response: &TransportResponse) -> Classification {
	match response.status {
		status if (200..300).contains(&status) => Classification::Success,
		429 => Classification::RateLimited { retry_after: response.rate_limit.retry_after },
		status if status >= 500 => Classification::Transient { status },
		status => Classification::Permanent { status },
	}
}

/// Decoded response handed back to dispatcher callers.
#[derive(Clone, Debug)]
pub struct Response {
	/// HTTP status code.
	pub status: u16,
	/// Rate-limit signals observed on the response.
	pub rate_limit: crate::http::RateLimitSignals,
	body: Vec<u8>,
}
impl Response {
	pub(crate) fn from_transport(response: TransportResponse) -> Self {
		Self { status: response.status, rate_limit: response.rate_limit, body: response.body }
	}

	/// Raw response body bytes.
	pub fn body(&self) -> &[u8] {
		&self.body
	}

	/// Decodes the body as a JSON value; empty bodies decode to `null`.
	pub fn json_value(&self) -> Result<serde_json::Value, ConfigError> {
		if self.body.is_empty() {
			return Ok(serde_json::Value::Null);
		}

		self.decode()
	}

	/// Decodes the body into a typed value, reporting the failing JSON path on error.
	pub fn decode<T>(&self) -> Result<T, ConfigError>
	where
		T: serde::de::DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| ConfigError::ResponseDecode { source, status: Some(self.status) })
	}

	/// Parses the upstream error envelope from the body, if one is present.
	pub fn error_envelope(&self) -> Option<ErrorEnvelope> {
		ErrorEnvelope::parse(&self.body)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::http::RateLimitSignals;

	fn response(status: u16, retry_after: Option<Duration>) -> TransportResponse {
		TransportResponse {
			status,
			rate_limit: RateLimitSignals { retry_after, ..RateLimitSignals::default() },
			body: Vec::new(),
		}
	}

	#[test]
	fn statuses_classify_per_contract() {
		assert_eq!(classify(&response(200, None)), Classification::Success);
		assert_eq!(classify(&response(204, None)), Classification::Success);
		assert_eq!(classify(&response(429, Some(Duration::seconds(5)))), Classification::RateLimited {
			retry_after: Some(Duration::seconds(5))
		});
		assert_eq!(classify(&response(500, None)), Classification::Transient { status: 500 });
		assert_eq!(classify(&response(503, None)), Classification::Transient { status: 503 });
		assert_eq!(classify(&response(404, None)), Classification::Permanent { status: 404 });
		assert_eq!(classify(&response(401, None)), Classification::Permanent { status: 401 });
	}

	#[test]
	fn empty_bodies_decode_to_null() {
		let decoded = Response::from_transport(response(204, None))
			.json_value()
			.expect("Empty body should decode to null.");

		assert!(decoded.is_null());
	}

	#[test]
	fn typed_decode_reports_json_path() {
		let transport = TransportResponse {
			status: 200,
			rate_limit: RateLimitSignals::default(),
			body: br#"{"video":{"id":"x","length":"not-a-number"}}"#.to_vec(),
		};

		#[derive(serde::Deserialize, Debug)]
		struct Video {
			#[allow(dead_code)]
			length: u64,
		}
		#[derive(serde::Deserialize, Debug)]
		struct Envelope {
			#[allow(dead_code)]
			video: Video,
		}

		let err = Response::from_transport(transport)
			.decode::<Envelope>()
			.expect_err("Mistyped field should fail to decode.");
		let ConfigError::ResponseDecode { source, status } = err else {
			panic!("Decode failure should map to ResponseDecode.");
		};

		assert_eq!(status, Some(200));
		assert_eq!(source.path().to_string(), "video.length");
	}
}
