//! Service descriptor data structures shared by every component.
//!
//! The module exposes validated endpoint metadata, a builder, and quirk toggles so a
//! deployment can describe its upstream in one place instead of scattering constants.

/// Builder API and validation for service descriptors.
pub mod descriptor;
/// Upstream-specific quirk toggles.
pub mod quirks;

pub use descriptor::*;
pub use quirks::*;
