//! Credential storage contract and built-in store implementations.
//!
//! Stores are synchronous on purpose: the refresh coordinator reads and swaps the credential
//! while holding its state lock, so "observe the generation, read the credential" and
//! "install a credential, bump the generation" each happen as one indivisible step.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::Credential};

/// Storage backend contract for the session credential.
///
/// Only the [`RefreshCoordinator`](crate::coordinator::RefreshCoordinator) mutates a store
/// wired into a client. Every write replaces the whole credential value.
///
/// All three methods run on async executor threads while the coordinator holds its state
/// lock. `load` must answer from memory; `replace` and `clear` may persist but must stay
/// short, since every concurrent request waits on them.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Returns the current credential, if a session is established.
	fn load(&self) -> Result<Option<Credential>, StoreError>;

	/// Installs `credential`, discarding the previous value entirely.
	fn replace(&self, credential: Credential) -> Result<(), StoreError>;

	/// Removes the current credential.
	fn clear(&self) -> Result<(), StoreError>;
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
