//! Token cache contract and the built-in in-memory implementation.
//!
//! The cache is an explicit object owned by a [`TokenManager`](crate::token::TokenManager)
//! instance and passed by reference to dependents. Keys carry the credential
//! fingerprint alongside the token kind, so multiple credential sets can coexist in
//! the same process without sharing entries.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, Credential, TokenKind},
};

/// Boxed future returned by [`TokenCache`] operations.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + 'a + Send>>;

/// Storage contract for cached access tokens.
///
/// Exactly one live token per key is expected at a time; `store` replaces wholesale so
/// readers never observe a partially written entry.
pub trait TokenCache: Send + Sync {
	/// Persists or replaces the token for the provided key.
	fn store(&self, key: CacheKey, token: AccessToken) -> CacheFuture<'_, ()>;

	/// Fetches the token associated with the key, if present.
	fn fetch<'a>(&'a self, key: &'a CacheKey) -> CacheFuture<'a, Option<AccessToken>>;

	/// Removes and returns the token associated with the key.
	fn evict<'a>(&'a self, key: &'a CacheKey) -> CacheFuture<'a, Option<AccessToken>>;
}

/// Error type produced by [`TokenCache`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CacheError {
	/// Backend-level failure for the storage engine.
	#[error("Token cache backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Unique key identifying a cached token.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
	/// Fingerprint of the credential set that minted the token.
	pub credential_fingerprint: String,
	/// Kind of the cached token.
	pub kind: TokenKind,
}
impl CacheKey {
	/// Builds a key for the provided credential and token kind.
	pub fn new(credential: &Credential, kind: TokenKind) -> Self {
		Self { credential_fingerprint: credential.fingerprint(), kind }
	}
}

type CacheMap = Arc<RwLock<HashMap<CacheKey, AccessToken>>>;

/// Thread-safe in-memory [`TokenCache`] implementation.
#[derive(Clone, Debug, Default)]
pub struct MemoryTokenCache(CacheMap);
impl TokenCache for MemoryTokenCache {
	fn store(&self, key: CacheKey, token: AccessToken) -> CacheFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().insert(key, token);

			Ok(())
		})
	}

	fn fetch<'a>(&'a self, key: &'a CacheKey) -> CacheFuture<'a, Option<AccessToken>> {
		let map = self.0.clone();
		let key = key.clone();

		Box::pin(async move { Ok(map.read().get(&key).cloned()) })
	}

	fn evict<'a>(&'a self, key: &'a CacheKey) -> CacheFuture<'a, Option<AccessToken>> {
		let map = self.0.clone();
		let key = key.clone();

		Box::pin(async move { Ok(map.write().remove(&key)) })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn token(kind: TokenKind, value: &str) -> AccessToken {
		AccessToken::builder(kind)
			.value(value)
			.expires_in(Duration::hours(1))
			.build()
			.expect("Token fixture should build successfully.")
	}

	#[tokio::test]
	async fn cache_partitions_by_kind_and_credential() {
		let cache = MemoryTokenCache::default();
		let first =
			Credential::new("client-1", "secret-1").expect("First credential should be valid.");
		let second =
			Credential::new("client-2", "secret-2").expect("Second credential should be valid.");
		let key_primary = CacheKey::new(&first, TokenKind::Primary);
		let key_secondary = CacheKey::new(&first, TokenKind::Secondary);
		let key_other = CacheKey::new(&second, TokenKind::Primary);

		cache
			.store(key_primary.clone(), token(TokenKind::Primary, "bearer"))
			.await
			.expect("Primary store should succeed.");
		cache
			.store(key_secondary.clone(), token(TokenKind::Secondary, "jwt"))
			.await
			.expect("Secondary store should succeed.");

		let primary = cache
			.fetch(&key_primary)
			.await
			.expect("Primary fetch should succeed.")
			.expect("Primary entry should exist.");

		assert_eq!(primary.value.expose(), "bearer");
		assert!(
			cache.fetch(&key_other).await.expect("Other fetch should succeed.").is_none(),
			"A different credential set must not observe the entry."
		);
	}

	#[tokio::test]
	async fn evict_removes_entry() {
		let cache = MemoryTokenCache::default();
		let credential =
			Credential::new("client-1", "secret-1").expect("Credential should be valid.");
		let key = CacheKey::new(&credential, TokenKind::Primary);

		cache
			.store(key.clone(), token(TokenKind::Primary, "bearer"))
			.await
			.expect("Store should succeed.");

		let evicted = cache.evict(&key).await.expect("Evict should succeed.");

		assert!(evicted.is_some());
		assert!(cache.fetch(&key).await.expect("Fetch should succeed.").is_none());
	}
}
