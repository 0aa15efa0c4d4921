//! Client identifier rotation with best-effort persistence

use crate::core::types::ClientId;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// Holds the current client identifier
///
/// The persisted copy is a convenience for diagnostics only; the service never
/// relies on it, so read and write failures are logged and otherwise ignored.
#[derive(Debug)]
pub struct ClientIdStore {
    path: Option<PathBuf>,
    current: Mutex<ClientId>,
}

impl ClientIdStore {
    pub fn new(path: Option<PathBuf>) -> Self {
        let stored = path.as_ref().and_then(|p| match fs::read_to_string(p) {
            Ok(text) if !text.trim().is_empty() => Some(ClientId(text.trim().to_string())),
            Ok(_) => None,
            Err(e) => {
                debug!(path = %p.display(), error = %e, "no stored client id");
                None
            }
        });
        let store = Self {
            path,
            current: Mutex::new(stored.clone().unwrap_or_else(ClientId::generate)),
        };
        if stored.is_none() {
            store.persist(&store.current());
        }
        store
    }

    pub fn in_memory() -> Self {
        Self::new(None)
    }

    pub fn current(&self) -> ClientId {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the identifier with a fresh one and return it
    pub fn rotate(&self) -> ClientId {
        let next = ClientId::generate();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = next.clone();
        self.persist(&next);
        debug!(client_id = %next, "rotated client id");
        next
    }

    fn persist(&self, id: &ClientId) {
        if let Some(path) = &self.path {
            if let Err(e) = fs::write(path, id.as_str()) {
                warn!(path = %path.display(), error = %e, "failed to persist client id");
            }
        }
    }
}
