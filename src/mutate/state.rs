//! Per-resource mutation lifecycle state.

// self
use crate::_prelude::*;

/// Lifecycle phase of a resource mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationPhase {
	/// No mutation in progress.
	Idle,
	/// Optimistic value applied locally; upstream write in flight.
	Pending,
	/// Upstream write issued; read-after-write verification in progress.
	Verifying,
	/// Last mutation was verified upstream.
	Confirmed,
	/// Last mutation was rolled back.
	Reverted,
}
impl MutationPhase {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			MutationPhase::Idle => "idle",
			MutationPhase::Pending => "pending",
			MutationPhase::Verifying => "verifying",
			MutationPhase::Confirmed => "confirmed",
			MutationPhase::Reverted => "reverted",
		}
	}

	/// Returns `true` while a mutation cycle is in flight.
	pub const fn in_flight(self) -> bool {
		matches!(self, MutationPhase::Pending | MutationPhase::Verifying)
	}
}
impl Display for MutationPhase {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Mutation state tracked per resource id.
///
/// At most one non-terminal mutation exists per id; a newer cycle supersedes the
/// older one by bumping `generation`, and the stale cycle notices the bump at its
/// next checkpoint instead of touching shared state.
#[derive(Clone, Debug)]
pub struct ResourceMutationState {
	/// Resource identifier this entry tracks.
	pub resource_id: String,
	/// Last value confirmed against the upstream, if known.
	pub last_confirmed: Option<serde_json::Value>,
	/// Optimistically applied value awaiting verification.
	pub pending: Option<serde_json::Value>,
	/// Current lifecycle phase.
	pub phase: MutationPhase,
	/// Monotonic cycle counter used for supersession and cancellation.
	pub generation: u64,
	/// Set when the latest generation bump came from a cancellation rather than a
	/// superseding mutation.
	pub cancel_requested: bool,
}
impl ResourceMutationState {
	/// Creates an idle entry for the provided resource id.
	pub fn new(resource_id: impl Into<String>) -> Self {
		Self {
			resource_id: resource_id.into(),
			last_confirmed: None,
			pending: None,
			phase: MutationPhase::Idle,
			generation: 0,
			cancel_requested: false,
		}
	}

	/// The value a caller should currently display for this resource.
	///
	/// The optimistic pending value while a cycle is in flight, the last confirmed
	/// snapshot otherwise.
	pub fn visible_value(&self) -> Option<&serde_json::Value> {
		if self.phase.in_flight() { self.pending.as_ref() } else { self.last_confirmed.as_ref() }
	}
}
