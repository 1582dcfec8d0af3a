//! Shared exponential backoff policy with jitter.
//!
//! One policy instance drives every retry loop in the crate: dispatcher attempts,
//! bounded token-exchange retries, and mutation verification polls. The jitter is
//! additive on top of the doubling base so inter-attempt delays never decrease while
//! the exponent is still climbing.

// crates.io
use rand::Rng;
// self
use crate::_prelude::*;

/// Exponential backoff policy with additive jitter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
	/// Delay before the second attempt; doubles each attempt after that.
	pub base: Duration,
	/// Upper bound for the un-jittered delay.
	pub cap: Duration,
	/// Maximum total attempts (first try included).
	pub max_attempts: u32,
	/// Jitter fraction in `0.0..=1.0`, applied additively on top of the base delay.
	pub jitter: f64,
}
impl BackoffPolicy {
	/// Computes the delay to sleep after the given 1-based attempt number.
	///
	/// The un-jittered component is `base * 2^(attempt - 1)` capped at `cap`; jitter
	/// adds up to `jitter * component` on top. Keeping the jitter fraction at or
	/// below `1.0` preserves non-decreasing delays across consecutive attempts.
	pub fn delay_for(&self, attempt: u32) -> Duration {
		let exponent = attempt.saturating_sub(1).min(31);
		let component = (self.base * 2_i32.saturating_pow(exponent)).min(self.cap);

		if component.is_negative() || component.is_zero() {
			return Duration::ZERO;
		}

		let fraction = self.jitter.clamp(0.0, 1.0);
		let unit: f64 = rand::rng().random_range(0.0..=1.0);

		component + Duration::seconds_f64(component.as_seconds_f64() * fraction * unit)
	}

	/// Returns `true` once the attempt count has reached the configured cap.
	pub fn is_exhausted(&self, attempt: u32) -> bool {
		attempt >= self.max_attempts
	}
}
impl Default for BackoffPolicy {
	fn default() -> Self {
		Self {
			base: Duration::milliseconds(500),
			cap: Duration::seconds(30),
			max_attempts: 4,
			jitter: 0.5,
		}
	}
}

/// Converts a `time` duration into a `std` duration for timer APIs, clamping
/// negatives to zero.
pub(crate) fn to_std(duration: Duration) -> std::time::Duration {
	duration.try_into().unwrap_or(std::time::Duration::ZERO)
}

/// Sleeps for the provided duration on the tokio timer.
pub(crate) async fn sleep_for(duration: Duration) {
	tokio::time::sleep(to_std(duration)).await;
}
