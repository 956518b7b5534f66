//! # Token Store
//!
//! `get()` never returns an empty token: when nothing is stored the fallback
//! secret is handed out, so every request carries some credential and the
//! backend decides whether to accept it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Default location of the persisted token.
pub fn default_token_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("traffic-dashboard").join("session.token"))
}

/// The session credential holder.
pub struct TokenStore {
    /// File the token persists to, if any.
    path: Option<PathBuf>,
    /// Value used when nothing is stored.
    fallback: String,
    /// Current token; `None` after `clear()`.
    current: Mutex<Option<String>>,
}

impl TokenStore {
    /// Opens a file-backed store, seeding it with `fallback` if empty.
    pub fn open(path: impl Into<PathBuf>, fallback: &str) -> Self {
        let path = path.into();
        let stored = fs::read_to_string(&path)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let store = Self {
            path: Some(path),
            fallback: fallback.to_string(),
            current: Mutex::new(stored.clone()),
        };
        if stored.is_none() {
            log::info!("No stored session token; seeding the fallback credential.");
            store.refresh();
        }
        store
    }

    /// A store that lives only as long as the process.
    pub fn in_memory(fallback: &str) -> Self {
        Self {
            path: None,
            fallback: fallback.to_string(),
            current: Mutex::new(Some(fallback.to_string())),
        }
    }

    /// Current token, or the fallback when nothing is stored.
    pub fn get(&self) -> String {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| self.fallback.clone())
    }

    /// Stores `token` as the session credential.
    pub fn set(&self, token: &str) {
        let token = token.trim();
        if token.is_empty() {
            return;
        }
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        self.persist(Some(token));
    }

    /// Re-applies the fallback and returns it.
    pub fn refresh(&self) -> String {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(self.fallback.clone());
        self.persist(Some(&self.fallback));
        self.fallback.clone()
    }

    /// Forgets the stored token.
    pub fn clear(&self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.persist(None);
    }

    /// True when a token is stored (as opposed to falling back).
    pub fn has_token(&self) -> bool {
        self.current.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    fn persist(&self, token: Option<&str>) {
        let Some(path) = &self.path else { return };
        let result = match token {
            Some(t) => write_token(path, t),
            None => match fs::remove_file(path) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };
        if let Err(e) = result {
            log::warn!("Could not update token file {}: {}", path.display(), e);
        }
    }
}

fn write_token(path: &Path, token: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_seeds_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("token");
        let store = TokenStore::open(&path, "FALLBACK");

        assert_eq!(store.get(), "FALLBACK");
        assert_eq!(fs::read_to_string(&path).unwrap(), "FALLBACK");
    }

    #[test]
    fn test_token_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        TokenStore::open(&path, "FALLBACK").set("issued-by-login");

        let reopened = TokenStore::open(&path, "FALLBACK");
        assert_eq!(reopened.get(), "issued-by-login");
    }

    #[test]
    fn test_clear_falls_back_and_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        let store = TokenStore::open(&path, "FALLBACK");
        store.set("abc");
        store.clear();

        assert!(!store.has_token());
        assert_eq!(store.get(), "FALLBACK");
        assert!(!path.exists());
        // clearing twice is harmless
        store.clear();
    }

    #[test]
    fn test_refresh_restores_fallback() {
        let store = TokenStore::in_memory("FALLBACK");
        store.set("expired");
        assert_eq!(store.refresh(), "FALLBACK");
        assert_eq!(store.get(), "FALLBACK");
        assert!(store.has_token());
    }
}
