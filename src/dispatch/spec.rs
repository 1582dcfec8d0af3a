//! Request specifications declared per logical operation.

// self
use crate::{_prelude::*, auth::TokenKind, error::ConfigError, http::Method};

/// Body encoding declared for an endpoint.
///
/// The variant *is* the declaration: most mutating endpoints speak JSON, but a few
/// (notably the protection-flag toggle) insist on form-encoded bodies, so the
/// encoding is a fixed property of the target endpoint and never inferred from the
/// payload.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
	/// No body.
	Empty,
	/// JSON-encoded body.
	Json(serde_json::Value),
	/// Form-urlencoded body.
	Form(BTreeMap<String, String>),
}
impl RequestBody {
	/// `Content-Type` header value matching the encoding.
	pub const fn content_type(&self) -> Option<&'static str> {
		match self {
			RequestBody::Empty => None,
			RequestBody::Json(_) => Some("application/json"),
			RequestBody::Form(_) => Some("application/x-www-form-urlencoded"),
		}
	}

	/// Encodes the body into raw bytes.
	pub fn encode(&self) -> Result<Option<Vec<u8>>, ConfigError> {
		match self {
			RequestBody::Empty => Ok(None),
			RequestBody::Json(value) => Ok(Some(serde_json::to_vec(value)?)),
			RequestBody::Form(map) => {
				let mut form = url::form_urlencoded::Serializer::new(String::new());

				for (key, value) in map {
					form.append_pair(key, value);
				}

				Ok(Some(form.finish().into_bytes()))
			},
		}
	}
}

/// Declaration of a single logical request.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestSpec {
	/// HTTP method.
	pub method: Method,
	/// Resource path relative to the service base URL.
	pub path: String,
	/// Query parameters in declaration order.
	pub query: Vec<(String, String)>,
	/// Declared body encoding and payload.
	pub body: RequestBody,
	/// Token kind the endpoint family requires.
	pub token_kind: TokenKind,
	/// Whether the dispatcher may replay the request after it may have reached the
	/// upstream.
	pub idempotent: bool,
	/// Per-request deadline override.
	pub deadline: Option<Duration>,
}
impl RequestSpec {
	fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			query: Vec::new(),
			body: RequestBody::Empty,
			token_kind: TokenKind::Primary,
			idempotent: method.default_idempotency(),
			deadline: None,
		}
	}

	/// Declares a GET request.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::Get, path)
	}

	/// Declares a POST request.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::Post, path)
	}

	/// Declares a PUT request.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::Put, path)
	}

	/// Declares a DELETE request.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::Delete, path)
	}

	/// Declares a PATCH request.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::Patch, path)
	}

	/// Appends a query parameter.
	pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((key.into(), value.into()));

		self
	}

	/// Declares a JSON body.
	pub fn with_json(mut self, value: serde_json::Value) -> Self {
		self.body = RequestBody::Json(value);

		self
	}

	/// Declares a form-encoded body.
	pub fn with_form<I, K, V>(mut self, pairs: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		self.body =
			RequestBody::Form(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect());

		self
	}

	/// Overrides the token kind.
	pub fn with_token_kind(mut self, kind: TokenKind) -> Self {
		self.token_kind = kind;

		self
	}

	/// Overrides the idempotency declaration.
	pub fn with_idempotent(mut self, idempotent: bool) -> Self {
		self.idempotent = idempotent;

		self
	}

	/// Overrides the per-request deadline.
	pub fn with_deadline(mut self, deadline: Duration) -> Self {
		self.deadline = Some(deadline);

		self
	}

	/// Short request label for spans and error messages.
	pub fn label(&self) -> String {
		format!("{} {}", self.method, self.path)
	}
}
