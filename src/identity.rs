//! Local player identity, keyed by match.
//!
//! The display name a player joined a match with is kept locally and read
//! when a view mounts. The store is an injected capability rather than
//! process-wide state, so views can be driven in tests with
//! [`MemoryIdentityStore`]. A missing name is not an error; the view reports
//! it as [`Presentation::MissingIdentity`](crate::view::Presentation::MissingIdentity).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use crate::error::{Connect4Error, Result};

/// Key-value store mapping match identifiers to local display names.
pub trait IdentityStore: Send + Sync {
    /// Name stored for `match_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Connect4Error::Identity`] if the backing store cannot be read.
    fn player_name(&self, match_id: &str) -> Result<Option<String>>;

    /// Store `name` for `match_id`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`Connect4Error::Identity`] if the backing store cannot be written.
    fn set_player_name(&self, match_id: &str, name: &str) -> Result<()>;
}

/// In-memory [`IdentityStore`].
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    names: RwLock<HashMap<String, String>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor holding a single entry.
    pub fn with_entry(match_id: impl Into<String>, name: impl Into<String>) -> Self {
        let store = Self::new();
        store
            .names
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(match_id.into(), name.into());
        store
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn player_name(&self, match_id: &str) -> Result<Option<String>> {
        let names = self.names.read().unwrap_or_else(PoisonError::into_inner);
        Ok(names.get(match_id).cloned())
    }

    fn set_player_name(&self, match_id: &str, name: &str) -> Result<()> {
        self.names
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(match_id.to_owned(), name.to_owned());
        Ok(())
    }
}

/// [`IdentityStore`] persisted as a JSON object `{ match_id: name }` in one file.
///
/// A file that does not exist yet reads as empty.
#[derive(Debug)]
pub struct JsonFileIdentityStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl JsonFileIdentityStore {
    /// Use the file at `path`. Nothing is read until the first lookup.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, String>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(identity_err(&self.path, e)),
        };
        serde_json::from_str(&text).map_err(|e| identity_err(&self.path, e))
    }
}

impl IdentityStore for JsonFileIdentityStore {
    fn player_name(&self, match_id: &str) -> Result<Option<String>> {
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        let mut names = self.load()?;
        Ok(names.remove(match_id))
    }

    fn set_player_name(&self, match_id: &str, name: &str) -> Result<()> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        let mut names = self.load()?;
        names.insert(match_id.to_owned(), name.to_owned());
        let text = serde_json::to_string_pretty(&names)?;
        std::fs::write(&self.path, text).map_err(|e| identity_err(&self.path, e))?;
        debug!(path = %self.path.display(), match_id, "stored player name");
        Ok(())
    }
}

fn identity_err(path: &Path, e: impl std::fmt::Display) -> Connect4Error {
    Connect4Error::Identity(format!("{}: {e}", path.display()))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn scratch_file(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "connect4-identity-{}-{name}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("names.json");
        let _ = std::fs::remove_file(&path);
        path
    }

    #[test]
    fn memory_store_is_keyed_by_match() {
        let store = MemoryIdentityStore::with_entry("m1", "alice");
        assert_eq!(store.player_name("m1").unwrap().as_deref(), Some("alice"));
        assert_eq!(store.player_name("m2").unwrap(), None);

        store.set_player_name("m2", "bob").unwrap();
        store.set_player_name("m1", "carol").unwrap();
        assert_eq!(store.player_name("m1").unwrap().as_deref(), Some("carol"));
        assert_eq!(store.player_name("m2").unwrap().as_deref(), Some("bob"));
    }

    #[test]
    fn file_store_missing_file_reads_empty() {
        let store = JsonFileIdentityStore::new(scratch_file("missing"));
        assert_eq!(store.player_name("m1").unwrap(), None);
    }

    #[test]
    fn file_store_persists_across_instances() {
        let path = scratch_file("persist");
        JsonFileIdentityStore::new(&path)
            .set_player_name("m1", "alice")
            .unwrap();

        let reopened = JsonFileIdentityStore::new(&path);
        assert_eq!(reopened.path(), path.as_path());
        assert_eq!(reopened.player_name("m1").unwrap().as_deref(), Some("alice"));
    }

    #[test]
    fn file_store_corrupt_file_is_identity_error() {
        let path = scratch_file("corrupt");
        std::fs::write(&path, "not json").unwrap();
        let err = JsonFileIdentityStore::new(&path)
            .player_name("m1")
            .unwrap_err();
        assert!(matches!(err, Connect4Error::Identity(_)));
    }
}
