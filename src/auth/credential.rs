//! Credential pair, fingerprinting, and the opaque secret-store boundary.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::secret::TokenSecret};

/// Errors produced while validating a credential pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialError {
	/// The client identifier was empty.
	#[error("Client identifier cannot be empty.")]
	EmptyClientId,
	/// The client secret was empty.
	#[error("Client secret cannot be empty.")]
	EmptyClientSecret,
	/// The client identifier contains whitespace characters.
	#[error("Client identifier contains whitespace.")]
	ContainsWhitespace,
}

/// Opaque identifier/secret pair used for token exchanges.
///
/// Immutable for the process lifetime; the secret never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	client_id: String,
	client_secret: TokenSecret,
}
impl Credential {
	/// Creates a credential pair after validation.
	pub fn new(
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
	) -> Result<Self, CredentialError> {
		let client_id: String = client_id.into();
		let client_secret: String = client_secret.into();

		if client_id.is_empty() {
			return Err(CredentialError::EmptyClientId);
		}
		if client_id.chars().any(char::is_whitespace) {
			return Err(CredentialError::ContainsWhitespace);
		}
		if client_secret.is_empty() {
			return Err(CredentialError::EmptyClientSecret);
		}

		Ok(Self { client_id, client_secret: TokenSecret::new(client_secret) })
	}

	/// Returns the client identifier.
	pub fn client_id(&self) -> &str {
		&self.client_id
	}

	/// Returns the client secret. Callers must avoid logging it.
	pub fn client_secret(&self) -> &TokenSecret {
		&self.client_secret
	}

	/// Stable fingerprint for cache partitioning.
	///
	/// A base64 (no padding) SHA-256 digest over the identifier and secret, so two
	/// credential sets never share a token cache partition even when one component
	/// matches.
	pub fn fingerprint(&self) -> String {
		let mut hasher = Sha256::new();

		hasher.update(self.client_id.as_bytes());
		hasher.update(b"\n");
		hasher.update(self.client_secret.expose().as_bytes());

		STANDARD_NO_PAD.encode(hasher.finalize())
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.finish()
	}
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialStoreError {
	/// Backend-level failure for the storage engine.
	#[error("Credential store backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Boxed future returned by [`CredentialStore`] operations.
pub type CredentialFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, CredentialStoreError>> + 'a + Send>>;

/// Opaque get/set boundary for wherever credentials actually live (OS keychain,
/// environment, vault). The access layer only ever loads, replaces, or clears the
/// pair; the backing medium is someone else's concern.
pub trait CredentialStore: Send + Sync {
	/// Loads the stored credential pair, if one exists.
	fn load(&self) -> CredentialFuture<'_, Option<Credential>>;

	/// Persists or replaces the stored credential pair.
	fn save(&self, credential: Credential) -> CredentialFuture<'_, ()>;

	/// Removes the stored credential pair.
	fn clear(&self) -> CredentialFuture<'_, ()>;
}

/// Thread-safe in-memory [`CredentialStore`] for local development and tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryCredentialStore(Arc<RwLock<Option<Credential>>>);
impl CredentialStore for MemoryCredentialStore {
	fn load(&self) -> CredentialFuture<'_, Option<Credential>> {
		let slot = self.0.clone();

		Box::pin(async move { Ok(slot.read().clone()) })
	}

	fn save(&self, credential: Credential) -> CredentialFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move {
			*slot.write() = Some(credential);

			Ok(())
		})
	}

	fn clear(&self) -> CredentialFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move {
			*slot.write() = None;

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn credential_validation_rejects_bad_input() {
		assert!(matches!(Credential::new("", "secret"), Err(CredentialError::EmptyClientId)));
		assert!(matches!(
			Credential::new("id with space", "secret"),
			Err(CredentialError::ContainsWhitespace)
		));
		assert!(matches!(Credential::new("id", ""), Err(CredentialError::EmptyClientSecret)));
	}

	#[test]
	fn debug_redacts_secret() {
		let credential =
			Credential::new("client-1", "hunter2").expect("Credential fixture should be valid.");
		let rendered = format!("{credential:?}");

		assert!(rendered.contains("client-1"));
		assert!(!rendered.contains("hunter2"));
	}

	#[test]
	fn fingerprints_partition_by_pair() {
		let a = Credential::new("client-1", "secret-a").expect("First fixture should be valid.");
		let b = Credential::new("client-1", "secret-b").expect("Second fixture should be valid.");
		let a_again =
			Credential::new("client-1", "secret-a").expect("Third fixture should be valid.");

		assert_eq!(a.fingerprint(), a_again.fingerprint());
		assert_ne!(a.fingerprint(), b.fingerprint());
	}

	#[tokio::test]
	async fn memory_store_round_trips() {
		let store = MemoryCredentialStore::default();

		assert!(
			store.load().await.expect("Load should succeed on an empty store.").is_none(),
			"Fresh store should be empty."
		);

		let credential =
			Credential::new("client-1", "secret").expect("Credential fixture should be valid.");

		store.save(credential.clone()).await.expect("Save should succeed.");

		let loaded = store
			.load()
			.await
			.expect("Load should succeed after save.")
			.expect("Stored credential should be present.");

		assert_eq!(loaded.client_id(), "client-1");

		store.clear().await.expect("Clear should succeed.");

		assert!(store.load().await.expect("Load should succeed after clear.").is_none());
	}
}
