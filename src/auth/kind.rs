//! The two token kinds minted from one credential pair.

// self
use crate::{_prelude::*, auth::secret::TokenSecret};

/// Kind of access token an endpoint family requires.
///
/// Both kinds are minted by the same credential exchange; `Secondary` differs only by
/// an extra `token_type` form parameter on the exchange and by how the resulting token
/// is rendered into the `Authorization` header (the secondary endpoint family rejects
/// the `Bearer` prefix).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
	/// Standard bearer token for the management endpoint family.
	Primary,
	/// JWT-style token for the secondary endpoint family.
	Secondary,
}
impl TokenKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			TokenKind::Primary => "primary",
			TokenKind::Secondary => "secondary",
		}
	}

	/// Extra `token_type` value the exchange request must carry, if any.
	pub const fn exchange_token_type(self) -> Option<&'static str> {
		match self {
			TokenKind::Primary => None,
			TokenKind::Secondary => Some("jwt"),
		}
	}

	/// Renders the `Authorization` header value for a token of this kind.
	pub fn authorization_value(self, token: &TokenSecret) -> String {
		match self {
			TokenKind::Primary => format!("Bearer {}", token.expose()),
			// The secondary family expects the raw token, no scheme prefix.
			TokenKind::Secondary => token.expose().to_owned(),
		}
	}
}
impl Display for TokenKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
