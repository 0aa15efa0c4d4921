//! URL construction for the versioned simulation endpoints

use crate::core::types::SessionId;

const VERSION_PREFIX: &str = "/api/v1";

/// Builds endpoint URLs under `{base}/api/v1/abm/simulations/`
///
/// The base URL may already end in `/api/v1` (deployments behind a proxy
/// often configure it that way); the prefix is never doubled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiPaths {
    root: String,
}

impl ApiPaths {
    pub fn new(base_url: &str) -> Self {
        let trimmed = base_url.trim_end_matches('/');
        let root = if trimmed.ends_with(VERSION_PREFIX) {
            format!("{}/abm/simulations", trimmed)
        } else {
            format!("{}{}/abm/simulations", trimmed, VERSION_PREFIX)
        };
        Self { root }
    }

    pub fn create(&self) -> String {
        format!("{}/create/", self.root)
    }

    pub fn state(&self, id: &SessionId) -> String {
        format!("{}/{}/", self.root, id)
    }

    /// Action endpoint: `start`, `stop`, `step`, `fps`, `reset` or `delete`
    pub fn action(&self, id: &SessionId, action: &str) -> String {
        format!("{}/{}/{}/", self.root, id, action)
    }
}
