//! Access token records, freshness checks, and builders.

// self
use crate::{
	_prelude::*,
	auth::{kind::TokenKind, secret::TokenSecret},
};

/// Freshness of an access token at a given instant.
///
/// `Stale` means the token has not expired yet but sits inside the safety margin, so
/// it must not be handed to a caller; the margin absorbs clock skew and in-flight
/// request latency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenFreshness {
	/// Token is usable.
	Fresh,
	/// Token is inside the safety margin before expiry.
	Stale,
	/// Token exceeded its expiry instant.
	Expired,
}

/// Errors produced by [`AccessTokenBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum AccessTokenBuilderError {
	/// Issued when no token value was provided.
	#[error("Access token value is required.")]
	MissingValue,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
}

/// Immutable record describing an issued access token.
#[derive(Serialize, Deserialize, Clone)]
pub struct AccessToken {
	/// Kind of token (which endpoint family it authenticates).
	pub kind: TokenKind,
	/// Token secret; callers must avoid logging it.
	pub value: TokenSecret,
	/// Issued-at instant recorded from the exchange response.
	pub issued_at: OffsetDateTime,
	/// Expiry instant derived from issued_at plus expires_in or absolute expiry.
	pub expires_at: OffsetDateTime,
	/// Scope hint reported by the token endpoint, if any.
	pub scope_hint: Option<String>,
}
impl AccessToken {
	/// Returns a builder for the provided kind.
	pub fn builder(kind: TokenKind) -> AccessTokenBuilder {
		AccessTokenBuilder::new(kind)
	}

	/// Computes the freshness at a given instant under the provided safety margin.
	pub fn freshness_at(&self, instant: OffsetDateTime, margin: Duration) -> TokenFreshness {
		if instant >= self.expires_at {
			return TokenFreshness::Expired;
		}
		if self.expires_at - instant <= margin {
			return TokenFreshness::Stale;
		}

		TokenFreshness::Fresh
	}

	/// Returns `true` if the token may be handed to a caller at the provided instant.
	pub fn is_usable_at(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		matches!(self.freshness_at(instant, margin), TokenFreshness::Fresh)
	}

	/// Convenience helper that checks usability against the current UTC instant.
	pub fn is_usable(&self, margin: Duration) -> bool {
		self.is_usable_at(OffsetDateTime::now_utc(), margin)
	}

	/// Renders this token's `Authorization` header value.
	pub fn authorization_value(&self) -> String {
		self.kind.authorization_value(&self.value)
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("kind", &self.kind)
			.field("value", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("scope_hint", &self.scope_hint)
			.finish()
	}
}

/// Builder for [`AccessToken`].
#[derive(Clone, Debug)]
pub struct AccessTokenBuilder {
	kind: TokenKind,
	value: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	scope_hint: Option<String>,
}
impl AccessTokenBuilder {
	fn new(kind: TokenKind) -> Self {
		Self {
			kind,
			value: None,
			issued_at: None,
			expires_at: None,
			expires_in: None,
			scope_hint: None,
		}
	}

	/// Provides the token value.
	pub fn value(mut self, token: impl Into<String>) -> Self {
		self.value = Some(TokenSecret::new(token));

		self
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Convenience helper that stamps `issued_at` with the current clock.
	pub fn issued_now(self) -> Self {
		self.issued_at(OffsetDateTime::now_utc())
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Attaches the scope hint reported by the token endpoint.
	pub fn scope_hint(mut self, hint: impl Into<String>) -> Self {
		self.scope_hint = Some(hint.into());

		self
	}

	/// Consumes the builder and produces an [`AccessToken`].
	pub fn build(self) -> Result<AccessToken, AccessTokenBuilderError> {
		let value = self.value.ok_or(AccessTokenBuilderError::MissingValue)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at + delta,
			(None, None) => return Err(AccessTokenBuilderError::MissingExpiry),
		};

		Ok(AccessToken {
			kind: self.kind,
			value,
			issued_at,
			expires_at,
			scope_hint: self.scope_hint,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn freshness_covers_margin_and_expiry() {
		let token = AccessToken::builder(TokenKind::Primary)
			.value("access")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_at(macros::datetime!(2025-01-01 01:00 UTC))
			.build()
			.expect("Token builder should succeed for freshness transitions.");
		let margin = Duration::minutes(5);

		assert_eq!(
			token.freshness_at(macros::datetime!(2025-01-01 00:30 UTC), margin),
			TokenFreshness::Fresh
		);
		assert_eq!(
			token.freshness_at(macros::datetime!(2025-01-01 00:56 UTC), margin),
			TokenFreshness::Stale
		);
		assert_eq!(
			token.freshness_at(macros::datetime!(2025-01-01 01:00 UTC), margin),
			TokenFreshness::Expired
		);
		assert!(token.is_usable_at(macros::datetime!(2025-01-01 00:30 UTC), margin));
		assert!(!token.is_usable_at(macros::datetime!(2025-01-01 00:59 UTC), margin));
	}

	#[test]
	fn builder_handles_relative_expiry() {
		let token = AccessToken::builder(TokenKind::Secondary)
			.value("jwt-token")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_in(Duration::minutes(30))
			.build()
			.expect("Token builder should support relative expiry calculations.");

		assert_eq!(token.expires_at, macros::datetime!(2025-01-01 00:30 UTC));
		assert_eq!(token.authorization_value(), "jwt-token");
	}

	#[test]
	fn builder_requires_value_and_expiry() {
		let missing_value = AccessToken::builder(TokenKind::Primary)
			.expires_in(Duration::minutes(30))
			.build()
			.expect_err("Builder should reject a missing token value.");

		assert_eq!(missing_value, AccessTokenBuilderError::MissingValue);

		let missing_expiry = AccessToken::builder(TokenKind::Primary)
			.value("access")
			.build()
			.expect_err("Builder should reject a missing expiry.");

		assert_eq!(missing_expiry, AccessTokenBuilderError::MissingExpiry);
	}

	#[test]
	fn debug_redacts_value() {
		let token = AccessToken::builder(TokenKind::Primary)
			.value("sensitive")
			.expires_in(Duration::hours(1))
			.build()
			.expect("Token builder should succeed for redaction test.");

		assert!(!format!("{token:?}").contains("sensitive"));
	}
}
