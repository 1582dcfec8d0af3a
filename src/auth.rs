//! Credential material, token kinds, and access token models.

pub mod credential;
pub mod kind;
pub mod record;
pub mod secret;

pub use credential::*;
pub use kind::*;
pub use record::*;
pub use secret::*;
