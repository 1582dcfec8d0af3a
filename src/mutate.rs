//! Optimistic mutation coordination with read-after-write verification.
//!
//! The upstream is not immediately consistent: an accepted write becomes observable
//! only after a propagation delay, and some fields need a raised detail level to be
//! observable at all. [`MutationCoordinator::apply`] therefore makes the new value
//! visible to the caller immediately, issues the write, and then polls the resource
//! until the observed value matches — committing on a match, reverting the
//! caller-visible state when the verification budget runs out or the upstream
//! rejects the write outright. A newer `apply` for the same resource supersedes the
//! in-flight cycle; the stale cycle notices at its next checkpoint and bows out
//! without touching shared state.

pub mod state;
pub mod target;

pub use state::*;
pub use target::*;

// std
use std::time::Instant;
// self
use crate::{
	_prelude::*,
	dispatch::RequestDispatcher,
	http::ApiTransport,
	obs::{self, OpKind, OpOutcome, OpSpan},
	retry::{self, BackoffPolicy},
};

/// Tuning knobs for [`MutationCoordinator`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MutationConfig {
	/// Maximum verification polls per mutation cycle.
	pub verify_attempts: u32,
	/// Backoff policy between verification polls.
	pub verify_backoff: BackoffPolicy,
	/// Deadline applied to each individual verification poll.
	pub verify_poll_deadline: Duration,
	/// Overall cap on verification time before the cycle reverts.
	pub verify_budget: Duration,
}
impl Default for MutationConfig {
	fn default() -> Self {
		Self {
			verify_attempts: 5,
			verify_backoff: BackoffPolicy {
				base: Duration::milliseconds(500),
				cap: Duration::seconds(5),
				max_attempts: 5,
				jitter: 0.25,
			},
			verify_poll_deadline: Duration::seconds(10),
			verify_budget: Duration::seconds(60),
		}
	}
}

/// Why a mutation cycle rolled back.
#[derive(Clone, Debug, PartialEq)]
pub enum RevertReason {
	/// Verification polls exhausted without observing the attempted value.
	VerificationTimeout {
		/// The value the cycle tried to apply.
		attempted: serde_json::Value,
	},
	/// The mutation request itself was rejected permanently.
	Rejected {
		/// HTTP status code of the rejection.
		status: u16,
	},
	/// A newer mutation for the same resource took over.
	Superseded,
	/// The caller cancelled the cycle.
	Cancelled,
}
impl Display for RevertReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			RevertReason::VerificationTimeout { .. } => f.write_str("verification timeout"),
			RevertReason::Rejected { status } =>
				write!(f, "upstream rejected the mutation (status {status})"),
			RevertReason::Superseded => f.write_str("superseded by a newer mutation"),
			RevertReason::Cancelled => f.write_str("cancelled"),
		}
	}
}

/// Terminal result of a mutation cycle.
#[derive(Clone, Debug, PartialEq)]
pub enum MutationOutcome {
	/// The write was verified upstream; the value is now the confirmed snapshot.
	Confirmed(serde_json::Value),
	/// The cycle rolled back; the caller-visible value is the prior snapshot again.
	Reverted {
		/// Resource the cycle was mutating.
		resource_id: String,
		/// Why the cycle rolled back.
		reason: RevertReason,
	},
}

/// Coordinates optimistic mutations and their verification per resource id.
///
/// Entries for different resource ids are fully independent; concurrent `apply`
/// calls on distinct ids proceed in parallel without contention beyond the map lock.
#[derive(Clone)]
pub struct MutationCoordinator<T>
where
	T: ?Sized + ApiTransport,
{
	/// Dispatcher carrying the mutation writes and verification reads.
	pub dispatcher: Arc<RequestDispatcher<T>>,
	config: MutationConfig,
	states: Arc<Mutex<HashMap<String, ResourceMutationState>>>,
}
impl<T> MutationCoordinator<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates a coordinator over the provided dispatcher.
	pub fn new(dispatcher: Arc<RequestDispatcher<T>>) -> Self {
		Self { dispatcher, config: MutationConfig::default(), states: Default::default() }
	}

	/// Overrides the coordinator configuration.
	pub fn with_config(mut self, config: MutationConfig) -> Self {
		self.config = config;

		self
	}

	/// The value a caller should currently display for the resource.
	pub fn visible_value(&self, resource_id: &str) -> Option<serde_json::Value> {
		self.states.lock().get(resource_id).and_then(|state| state.visible_value().cloned())
	}

	/// Current lifecycle phase for the resource (`Idle` when untracked).
	pub fn phase(&self, resource_id: &str) -> MutationPhase {
		self.states.lock().get(resource_id).map(|state| state.phase).unwrap_or(MutationPhase::Idle)
	}

	/// Cancels an in-flight mutation cycle and reverts the caller-visible state.
	///
	/// A no-op when no cycle is in flight.
	pub fn cancel(&self, resource_id: &str) {
		let mut states = self.states.lock();

		if let Some(state) = states.get_mut(resource_id)
			&& state.phase.in_flight()
		{
			state.generation += 1;
			state.cancel_requested = true;
			state.pending = None;
			state.phase = MutationPhase::Reverted;
		}
	}

	/// Applies `new_value` to the resource optimistically, then verifies it against
	/// the upstream before committing.
	pub async fn apply(
		&self,
		target: &dyn MutationTarget,
		resource_id: &str,
		new_value: serde_json::Value,
	) -> Result<MutationOutcome> {
		const KIND: OpKind = OpKind::Mutate;

		let span = OpSpan::new(KIND, "apply");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span.instrument(self.apply_inner(target, resource_id, new_value)).await;

		match &result {
			Ok(MutationOutcome::Confirmed(_)) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Ok(MutationOutcome::Reverted { .. }) | Err(_) =>
				obs::record_op_outcome(KIND, OpOutcome::Failure),
		}

		result
	}

	async fn apply_inner(
		&self,
		target: &dyn MutationTarget,
		resource_id: &str,
		new_value: serde_json::Value,
	) -> Result<MutationOutcome> {
		let snapshot = self.snapshot_if_unknown(target, resource_id).await?;
		let generation = {
			let mut states = self.states.lock();
			let state = states
				.entry(resource_id.to_owned())
				.or_insert_with(|| ResourceMutationState::new(resource_id));

			if state.last_confirmed.is_none() {
				state.last_confirmed = snapshot;
			}

			state.generation += 1;
			state.cancel_requested = false;
			state.pending = Some(new_value.clone());
			// Optimistic: the caller sees `new_value` from this point on.
			state.phase = MutationPhase::Pending;

			state.generation
		};
		let mutation = target.mutation_spec(resource_id, &new_value);

		match self.dispatcher.send(&mutation).await {
			// The write may have landed even when the response was lost or rate
			// limited, so anything non-permanent still goes through verification.
			Ok(_) | Err(Error::Transient { .. }) | Err(Error::RateLimited { .. }) => {},
			Err(Error::Permanent { status, .. }) => {
				self.finish_reverted(resource_id, generation);

				return Ok(MutationOutcome::Reverted {
					resource_id: resource_id.to_owned(),
					reason: RevertReason::Rejected { status },
				});
			},
			Err(other) => {
				self.finish_reverted(resource_id, generation);

				return Err(other);
			},
		}

		if !self.advance_to_verifying(resource_id, generation) {
			return Ok(self.stale_outcome(resource_id));
		}

		self.verify(target, resource_id, generation, new_value).await
	}

	async fn verify(
		&self,
		target: &dyn MutationTarget,
		resource_id: &str,
		generation: u64,
		expected: serde_json::Value,
	) -> Result<MutationOutcome> {
		let read = target
			.verification_spec(resource_id)
			.with_deadline(self.config.verify_poll_deadline);
		let started = Instant::now();
		let budget = retry::to_std(self.config.verify_budget);

		for attempt in 1..=self.config.verify_attempts {
			if !self.is_current(resource_id, generation) {
				return Ok(self.stale_outcome(resource_id));
			}
			if started.elapsed() >= budget {
				break;
			}

			// Transient poll failures are tolerated; the budget and attempt cap bound
			// how long the cycle keeps trying.
			if let Ok(response) = self.dispatcher.send(&read).await
				&& let Ok(body) = response.json_value()
				&& let Some(observed) = target.observed_value(&body)
				&& observed == expected
			{
				if self.commit(resource_id, generation, expected.clone()) {
					return Ok(MutationOutcome::Confirmed(expected));
				}

				return Ok(self.stale_outcome(resource_id));
			}

			if attempt < self.config.verify_attempts {
				retry::sleep_for(self.config.verify_backoff.delay_for(attempt)).await;
			}
		}

		if !self.is_current(resource_id, generation) {
			return Ok(self.stale_outcome(resource_id));
		}

		self.finish_reverted(resource_id, generation);

		Ok(MutationOutcome::Reverted {
			resource_id: resource_id.to_owned(),
			reason: RevertReason::VerificationTimeout { attempted: expected },
		})
	}

	async fn snapshot_if_unknown(
		&self,
		target: &dyn MutationTarget,
		resource_id: &str,
	) -> Result<Option<serde_json::Value>> {
		{
			let states = self.states.lock();

			if let Some(state) = states.get(resource_id)
				&& (state.last_confirmed.is_some() || state.phase.in_flight())
			{
				return Ok(None);
			}
		}

		let read = target
			.verification_spec(resource_id)
			.with_deadline(self.config.verify_poll_deadline);
		let response = self.dispatcher.send(&read).await?;
		let body = response.json_value()?;

		Ok(target.observed_value(&body))
	}

	fn advance_to_verifying(&self, resource_id: &str, generation: u64) -> bool {
		let mut states = self.states.lock();

		match states.get_mut(resource_id) {
			Some(state) if state.generation == generation => {
				state.phase = MutationPhase::Verifying;

				true
			},
			_ => false,
		}
	}

	fn commit(&self, resource_id: &str, generation: u64, value: serde_json::Value) -> bool {
		let mut states = self.states.lock();

		match states.get_mut(resource_id) {
			Some(state) if state.generation == generation => {
				state.last_confirmed = Some(value);
				state.pending = None;
				state.phase = MutationPhase::Confirmed;

				true
			},
			_ => false,
		}
	}

	fn finish_reverted(&self, resource_id: &str, generation: u64) {
		let mut states = self.states.lock();

		if let Some(state) = states.get_mut(resource_id)
			&& state.generation == generation
		{
			state.pending = None;
			state.phase = MutationPhase::Reverted;
		}
	}

	fn is_current(&self, resource_id: &str, generation: u64) -> bool {
		self.states
			.lock()
			.get(resource_id)
			.map(|state| state.generation == generation)
			.unwrap_or(false)
	}

	fn stale_outcome(&self, resource_id: &str) -> MutationOutcome {
		let reason = {
			let states = self.states.lock();

			match states.get(resource_id) {
				Some(state) if state.cancel_requested => RevertReason::Cancelled,
				_ => RevertReason::Superseded,
			}
		};

		MutationOutcome::Reverted { resource_id: resource_id.to_owned(), reason }
	}
}
impl<T> Debug for MutationCoordinator<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MutationCoordinator")
			.field("config", &self.config)
			.field("tracked_resources", &self.states.lock().len())
			.finish()
	}
}
