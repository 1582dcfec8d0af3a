//! Mutation target contracts and the built-in resource bindings.
//!
//! A [`MutationTarget`] describes everything resource-specific the coordinator needs:
//! how to build the state-changing request (including its declared encoding), how to
//! build the verification read, and how to extract the mutated field from a read
//! response. The hooks intentionally use crate-owned data types so bindings never
//! depend on any particular HTTP client.

// self
use crate::{dispatch::RequestSpec, service::ServiceQuirks};

/// Resource-specific binding consumed by the mutation coordinator.
pub trait MutationTarget: Send + Sync {
	/// Builds the state-changing request for the resource + value.
	fn mutation_spec(&self, resource_id: &str, value: &serde_json::Value) -> RequestSpec;

	/// Builds the read used to verify the mutation took effect.
	fn verification_spec(&self, resource_id: &str) -> RequestSpec;

	/// Extracts the field under verification from a read response body.
	///
	/// Returning `None` means the field was not observable in this response; the
	/// coordinator treats that as "not yet propagated" and keeps polling.
	fn observed_value(&self, body: &serde_json::Value) -> Option<serde_json::Value>;
}

/// Binding for the protection (public/private) flag on videos.
///
/// This endpoint family is the odd one out twice over: the `PUT` must be
/// form-encoded, and the flag only becomes observable on reads that request the
/// owner detail level.
#[derive(Clone, Debug)]
pub struct ProtectionTarget {
	quirks: ServiceQuirks,
	resource_path: String,
	envelope_key: String,
}
impl ProtectionTarget {
	/// Creates a binding using the provided quirks for the detail-level parameter.
	pub fn new(quirks: ServiceQuirks) -> Self {
		Self { quirks, resource_path: "videos".into(), envelope_key: "video".into() }
	}

	/// Overrides the resource path segment and envelope key.
	pub fn with_resource(
		mut self,
		resource_path: impl Into<String>,
		envelope_key: impl Into<String>,
	) -> Self {
		self.resource_path = resource_path.into();
		self.envelope_key = envelope_key.into();

		self
	}

	fn flag_to_wire(value: &serde_json::Value) -> String {
		match value {
			serde_json::Value::Bool(true) => "private".into(),
			serde_json::Value::Bool(false) => "public".into(),
			other => other.as_str().map(str::to_owned).unwrap_or_else(|| other.to_string()),
		}
	}
}
impl MutationTarget for ProtectionTarget {
	fn mutation_spec(&self, resource_id: &str, value: &serde_json::Value) -> RequestSpec {
		RequestSpec::put(format!("/{}/{resource_id}.json", self.resource_path))
			.with_form([("protect", Self::flag_to_wire(value))])
	}

	fn verification_spec(&self, resource_id: &str) -> RequestSpec {
		RequestSpec::get(format!("/{}/{resource_id}.json", self.resource_path))
			.with_query(&self.quirks.detail_param, &self.quirks.detail_owner_value)
	}

	fn observed_value(&self, body: &serde_json::Value) -> Option<serde_json::Value> {
		let protect = body.get(&self.envelope_key)?.get("protect")?;

		match protect.as_str() {
			Some("private") => Some(serde_json::Value::Bool(true)),
			Some("public") => Some(serde_json::Value::Bool(false)),
			Some(other) => Some(serde_json::Value::String(other.to_owned())),
			None => None,
		}
	}
}

/// Binding for a single JSON metadata field on a resource.
#[derive(Clone, Debug)]
pub struct MetadataTarget {
	resource_path: String,
	envelope_key: String,
	field: String,
}
impl MetadataTarget {
	/// Creates a binding for `field` on the provided resource family.
	pub fn new(
		resource_path: impl Into<String>,
		envelope_key: impl Into<String>,
		field: impl Into<String>,
	) -> Self {
		Self {
			resource_path: resource_path.into(),
			envelope_key: envelope_key.into(),
			field: field.into(),
		}
	}
}
impl MutationTarget for MetadataTarget {
	fn mutation_spec(&self, resource_id: &str, value: &serde_json::Value) -> RequestSpec {
		let mut payload = serde_json::Map::new();

		payload.insert(self.field.clone(), value.clone());

		RequestSpec::put(format!("/{}/{resource_id}.json", self.resource_path))
			.with_json(serde_json::Value::Object(payload))
	}

	fn verification_spec(&self, resource_id: &str) -> RequestSpec {
		RequestSpec::get(format!("/{}/{resource_id}.json", self.resource_path))
	}

	fn observed_value(&self, body: &serde_json::Value) -> Option<serde_json::Value> {
		body.get(&self.envelope_key)?.get(&self.field).cloned()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::dispatch::RequestBody;

	#[test]
	fn protection_mutation_is_form_encoded() {
		let target = ProtectionTarget::new(ServiceQuirks::default());
		let spec = target.mutation_spec("42", &json!(true));

		assert_eq!(spec.path, "/videos/42.json");
		assert!(matches!(&spec.body, RequestBody::Form(map) if map["protect"] == "private"));

		let public = target.mutation_spec("42", &json!(false));

		assert!(matches!(&public.body, RequestBody::Form(map) if map["protect"] == "public"));
	}

	#[test]
	fn protection_verification_requests_owner_detail() {
		let target = ProtectionTarget::new(ServiceQuirks::default());
		let spec = target.verification_spec("42");

		assert!(spec.query.contains(&("detail_level".into(), "owner".into())));
	}

	#[test]
	fn protection_observed_value_maps_wire_flags() {
		let target = ProtectionTarget::new(ServiceQuirks::default());

		assert_eq!(
			target.observed_value(&json!({"video": {"protect": "private"}})),
			Some(json!(true))
		);
		assert_eq!(
			target.observed_value(&json!({"video": {"protect": "public"}})),
			Some(json!(false))
		);
		assert_eq!(target.observed_value(&json!({"video": {}})), None);
	}

	#[test]
	fn metadata_mutation_is_json_encoded() {
		let target = MetadataTarget::new("videos", "video", "title");
		let spec = target.mutation_spec("7", &json!("New title"));

		assert!(matches!(&spec.body, RequestBody::Json(value) if value["title"] == "New title"));
		assert_eq!(
			target.observed_value(&json!({"video": {"title": "New title"}})),
			Some(json!("New title"))
		);
	}
}
