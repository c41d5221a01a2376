//! Thread-safe in-memory [`CredentialStore`] implementation.

// self
use crate::{
	_prelude::*,
	auth::Credential,
	store::{CredentialStore, StoreError},
};

/// Process-local credential slot; the default store for clients and tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<Option<Credential>>>);
impl MemoryStore {
	/// Creates a store pre-populated with `credential`.
	pub fn with_credential(credential: Credential) -> Self {
		Self(Arc::new(RwLock::new(Some(credential))))
	}

	/// Returns a clone of the stored credential, bypassing the `Result` wrapper.
	pub fn snapshot(&self) -> Option<Credential> {
		self.0.read().clone()
	}
}
impl CredentialStore for MemoryStore {
	fn load(&self) -> Result<Option<Credential>, StoreError> {
		Ok(self.snapshot())
	}

	fn replace(&self, credential: Credential) -> Result<(), StoreError> {
		*self.0.write() = Some(credential);

		Ok(())
	}

	fn clear(&self) -> Result<(), StoreError> {
		self.0.write().take();

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn credential(token: &str, role: &str) -> Credential {
		Credential::builder(token).role(role).build().expect("Credential fixture should build.")
	}

	#[test]
	fn replace_swaps_whole_credential() {
		let store = MemoryStore::with_credential(credential("T1", "viewer"));

		store.replace(credential("T2", "admin")).expect("Replace should succeed.");

		let current = store.load().expect("Load should succeed.").expect("Credential should exist.");

		assert_eq!(current.access_token.expose(), "T2");
		assert_eq!(current.role().map(|r| r.as_str()), Some("admin"));
	}

	#[test]
	fn clear_empties_the_slot() {
		let store = MemoryStore::with_credential(credential("T1", "viewer"));

		store.clear().expect("Clear should succeed.");

		assert!(store.snapshot().is_none());
		assert!(store.load().expect("Load should succeed.").is_none());
	}
}
