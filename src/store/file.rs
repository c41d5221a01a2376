//! File-backed [`CredentialStore`] that keeps a session across process restarts.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::Credential,
	store::{CredentialStore, StoreError},
};

/// Persists the credential to a JSON file after each mutation.
///
/// The file is read once in [`FileStore::open`]; `load` serves the in-memory copy and the
/// disk is touched only on `replace` and `clear`.
///
/// Writes go to a sibling `.tmp` file that is synced and renamed over the target, so a crash
/// leaves either the old or the new credential on disk, never a torn one.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<Option<Credential>>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading an existing session.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		ensure_parent_exists(&path)?;

		let snapshot = load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn persist_locked(&self, contents: Option<&Credential>) -> Result<(), StoreError> {
		let Some(credential) = contents else {
			return match fs::remove_file(&self.path) {
				Ok(()) => Ok(()),
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
				Err(e) => Err(StoreError::Backend {
					message: format!("Failed to remove {}: {e}", self.path.display()),
				}),
			};
		};

		ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(credential).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize credential: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl CredentialStore for FileStore {
	fn load(&self) -> Result<Option<Credential>, StoreError> {
		Ok(self.inner.read().clone())
	}

	fn replace(&self, credential: Credential) -> Result<(), StoreError> {
		let mut guard = self.inner.write();

		self.persist_locked(Some(&credential))?;
		*guard = Some(credential);

		Ok(())
	}

	fn clear(&self) -> Result<(), StoreError> {
		let mut guard = self.inner.write();

		self.persist_locked(None)?;
		guard.take();

		Ok(())
	}
}

fn load_snapshot(path: &Path) -> Result<Option<Credential>, StoreError> {
	if !path.exists() {
		return Ok(None);
	}

	let bytes = fs::read(path).map_err(|e| StoreError::Backend {
		message: format!("Failed to read {}: {e}", path.display()),
	})?;

	if bytes.is_empty() {
		return Ok(None);
	}

	serde_json::from_slice(&bytes).map(Some).map_err(|e| StoreError::Serialization {
		message: format!("Failed to parse {}: {e}", path.display()),
	})
}

fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
			message: format!("Failed to create store directory {}: {e}", parent.display()),
		})?;
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// self
	use super::*;

	fn temp_path(tag: &str) -> PathBuf {
		let unique = format!(
			"session_broker_file_store_{tag}_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	fn credential() -> Credential {
		Credential::builder("persisted-access")
			.role("analyst")
			.subject("u-1")
			.build()
			.expect("Failed to build file-store test credential.")
	}

	#[test]
	fn replace_survives_reopen() {
		let path = temp_path("reopen");
		let store = FileStore::open(&path).expect("Failed to open file store.");

		store.replace(credential()).expect("Failed to persist credential.");
		drop(store);

		let reopened = FileStore::open(&path).expect("Failed to reopen file store.");
		let loaded = reopened
			.load()
			.expect("Failed to load credential.")
			.expect("File store lost credential after reopen.");

		assert_eq!(loaded, credential_with_issued_at(loaded.issued_at));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store {}: {e}", path.display())
		});
	}

	#[test]
	fn load_serves_memory_without_touching_disk() {
		let path = temp_path("memory");
		let store = FileStore::open(&path).expect("Failed to open file store.");

		store.replace(credential()).expect("Failed to persist credential.");
		fs::remove_file(&path).expect("Failed to remove backing file.");

		let loaded = store
			.load()
			.expect("Load should not read the backing file.")
			.expect("Credential should still be held in memory.");

		assert_eq!(loaded.access_token.expose(), "persisted-access");
		assert!(!path.exists());
	}

	#[test]
	fn clear_removes_backing_file() {
		let path = temp_path("clear");
		let store = FileStore::open(&path).expect("Failed to open file store.");

		store.replace(credential()).expect("Failed to persist credential.");

		assert!(path.exists());

		store.clear().expect("Failed to clear credential.");

		assert!(!path.exists());
		assert!(store.load().expect("Failed to load credential.").is_none());
		assert!(
			FileStore::open(&path)
				.expect("Failed to reopen file store.")
				.load()
				.expect("Failed to load credential.")
				.is_none()
		);
	}

	fn credential_with_issued_at(issued_at: OffsetDateTime) -> Credential {
		Credential::builder("persisted-access")
			.role("analyst")
			.subject("u-1")
			.issued_at(issued_at)
			.build()
			.expect("Failed to build file-store comparison credential.")
	}
}
