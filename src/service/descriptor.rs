// self
use crate::{_prelude::*, error::ConfigError, service::quirks::ServiceQuirks};

const IDENTIFIER_MAX_LEN: usize = 128;

/// Error returned when service identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum ServiceIdError {
	/// The identifier was empty.
	#[error("Service identifier cannot be empty.")]
	Empty,
	/// The identifier contains whitespace characters.
	#[error("Service identifier contains whitespace.")]
	ContainsWhitespace,
	/// The identifier exceeded the allowed character count.
	#[error("Service identifier exceeds {max} characters.")]
	TooLong {
		/// Maximum permitted character count.
		max: usize,
	},
}

/// Identifier for a service descriptor, used in spans and metric labels.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceId(String);
impl ServiceId {
	/// Creates a new identifier after validation.
	pub fn new(value: impl AsRef<str>) -> Result<Self, ServiceIdError> {
		let view = value.as_ref();

		if view.is_empty() {
			return Err(ServiceIdError::Empty);
		}
		if view.chars().any(char::is_whitespace) {
			return Err(ServiceIdError::ContainsWhitespace);
		}
		if view.len() > IDENTIFIER_MAX_LEN {
			return Err(ServiceIdError::TooLong { max: IDENTIFIER_MAX_LEN });
		}

		Ok(Self(view.to_owned()))
	}
}
impl AsRef<str> for ServiceId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl From<ServiceId> for String {
	fn from(value: ServiceId) -> Self {
		value.0
	}
}
impl TryFrom<String> for ServiceId {
	type Error = ServiceIdError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(&value)
	}
}
impl FromStr for ServiceId {
	type Err = ServiceIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}
impl Debug for ServiceId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Service({})", self.0)
	}
}
impl Display for ServiceId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Endpoint set declared by a service descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoints {
	/// Base URL all resource paths are joined onto.
	pub api_base: Url,
	/// Token endpoint used for credential exchanges.
	pub token: Url,
}

/// Immutable service descriptor consumed by every component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
	/// Descriptor identifier.
	pub id: ServiceId,
	/// Endpoint definitions exposed by the upstream.
	pub endpoints: ServiceEndpoints,
	/// Upstream-specific quirks.
	pub quirks: ServiceQuirks,
}
impl ServiceDescriptor {
	/// Creates a new builder for the provided identifier.
	pub fn builder(id: ServiceId) -> ServiceDescriptorBuilder {
		ServiceDescriptorBuilder::new(id)
	}

	/// Joins a resource path onto the API base URL.
	pub fn resource_url(&self, path: &str) -> Result<Url, ConfigError> {
		let base = self.endpoints.api_base.as_str().trim_end_matches('/');
		let suffix = path.trim_start_matches('/');

		Url::parse(&format!("{base}/{suffix}"))
			.map_err(|source| ConfigError::InvalidPath { path: path.to_owned(), source })
	}
}

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ServiceDescriptorError {
	/// API base URL is mandatory.
	#[error("Missing API base URL.")]
	MissingApiBase,
	/// Token endpoint is mandatory.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// Endpoints must use HTTPS.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Quirk parameter names cannot be empty.
	#[error("Quirk parameter `{name}` cannot be empty.")]
	EmptyQuirkParameter {
		/// Which quirk field failed validation.
		name: &'static str,
	},
}

/// Builder for [`ServiceDescriptor`] values.
#[derive(Debug)]
pub struct ServiceDescriptorBuilder {
	/// Identifier for the descriptor being constructed.
	pub id: ServiceId,
	/// Base URL all resource paths are joined onto.
	pub api_base: Option<Url>,
	/// Token endpoint used for credential exchanges.
	pub token_endpoint: Option<Url>,
	/// Upstream-specific quirks.
	pub quirks: ServiceQuirks,
}
impl ServiceDescriptorBuilder {
	/// Creates a new builder seeded with the provided identifier.
	pub fn new(id: ServiceId) -> Self {
		Self { id, api_base: None, token_endpoint: None, quirks: ServiceQuirks::default() }
	}

	/// Sets the API base URL.
	pub fn api_base(mut self, url: Url) -> Self {
		self.api_base = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Overrides the upstream quirks.
	pub fn quirks(mut self, quirks: ServiceQuirks) -> Self {
		self.quirks = quirks;

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ServiceDescriptor, ServiceDescriptorError> {
		let api_base = self.api_base.ok_or(ServiceDescriptorError::MissingApiBase)?;
		let token = self.token_endpoint.ok_or(ServiceDescriptorError::MissingTokenEndpoint)?;
		let descriptor = ServiceDescriptor {
			id: self.id,
			endpoints: ServiceEndpoints { api_base, token },
			quirks: self.quirks,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}

impl ServiceDescriptor {
	fn validate(&self) -> Result<(), ServiceDescriptorError> {
		validate_endpoint("api_base", &self.endpoints.api_base)?;
		validate_endpoint("token", &self.endpoints.token)?;
		validate_quirk("page_param", &self.quirks.page_param)?;
		validate_quirk("page_size_param", &self.quirks.page_size_param)?;
		validate_quirk("detail_param", &self.quirks.detail_param)?;
		validate_quirk("detail_owner_value", &self.quirks.detail_owner_value)?;

		Ok(())
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ServiceDescriptorError> {
	if url.scheme() != "https" {
		Err(ServiceDescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	} else {
		Ok(())
	}
}

fn validate_quirk(name: &'static str, value: &str) -> Result<(), ServiceDescriptorError> {
	if value.is_empty() {
		Err(ServiceDescriptorError::EmptyQuirkParameter { name })
	} else {
		Ok(())
	}
}
