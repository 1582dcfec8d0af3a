// self
use crate::_prelude::*;

/// Upstream-specific quirks that influence how requests are built.
///
/// All of these are observed behavior rather than formal contract, which is exactly
/// why they are configuration values instead of constants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceQuirks {
	/// Query parameter carrying the 1-based page number on listing endpoints.
	pub page_param: String,
	/// Query parameter carrying the page size on listing endpoints.
	pub page_size_param: String,
	/// Query parameter that raises the detail level on item reads.
	pub detail_param: String,
	/// Detail-level value required to observe owner-only fields (the protection flag
	/// is invisible at the default level).
	pub detail_owner_value: String,
	/// Device name the token endpoint expects in the exchange form, if any.
	pub device_name: Option<String>,
}
impl Default for ServiceQuirks {
	fn default() -> Self {
		Self {
			page_param: "p".into(),
			page_size_param: "pagesize".into(),
			detail_param: "detail_level".into(),
			detail_owner_value: "owner".into(),
			device_name: None,
		}
	}
}
