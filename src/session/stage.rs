//! Loading stages of a remote simulation
//!
//! The success path is strictly ordered:
//! Idle -> Initializing -> LoadingData -> CreatingAgents -> EstablishingRoutes -> Complete.
//! Failed is reachable from every stage except itself: a loaded session can still
//! be lost server-side. Nothing leaves Failed, and nothing leaves Complete except
//! Failed; only a fresh create moves the manager back to Initializing.

use serde::{Deserialize, Serialize};

/// Position of a session in its load sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadingStage {
    /// No session requested yet
    #[default]
    Idle,
    /// Create accepted, model construction queued
    Initializing,
    /// Geographic and port data being loaded
    LoadingData,
    /// Ships and ports being instantiated
    CreatingAgents,
    /// Shipping routes being computed
    EstablishingRoutes,
    /// Model ready; the session may run
    Complete,
    /// Loading or the session itself failed
    Failed,
}

impl LoadingStage {
    /// Rank along the success path (Failed has no rank)
    fn rank(self) -> Option<u8> {
        match self {
            LoadingStage::Idle => Some(0),
            LoadingStage::Initializing => Some(1),
            LoadingStage::LoadingData => Some(2),
            LoadingStage::CreatingAgents => Some(3),
            LoadingStage::EstablishingRoutes => Some(4),
            LoadingStage::Complete => Some(5),
            LoadingStage::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LoadingStage::Complete | LoadingStage::Failed)
    }

    /// Whether a session at this stage is still loading
    pub fn is_loading(self) -> bool {
        !self.is_terminal() && self != LoadingStage::Idle
    }

    /// Whether moving from `self` to `next` respects monotonic ordering
    ///
    /// Staying put is allowed. Regressions along the success path and any
    /// move out of Failed are not.
    pub fn can_advance_to(self, next: LoadingStage) -> bool {
        if self == next {
            return true;
        }
        match (self.rank(), next.rank()) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(current), Some(target)) => target > current,
        }
    }

    /// User-facing description for status displays
    pub fn description(self) -> &'static str {
        match self {
            LoadingStage::Idle => "Ready to start simulation",
            LoadingStage::Initializing => "Initializing simulation...",
            LoadingStage::LoadingData => "Loading geographical data...",
            LoadingStage::CreatingAgents => "Creating ships and ports...",
            LoadingStage::EstablishingRoutes => "Establishing shipping routes...",
            LoadingStage::Complete => "Simulation loaded successfully",
            LoadingStage::Failed => "Failed to load simulation",
        }
    }
}

impl std::fmt::Display for LoadingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoadingStage::Idle => "IDLE",
            LoadingStage::Initializing => "INITIALIZING",
            LoadingStage::LoadingData => "LOADING_DATA",
            LoadingStage::CreatingAgents => "CREATING_AGENTS",
            LoadingStage::EstablishingRoutes => "ESTABLISHING_ROUTES",
            LoadingStage::Complete => "COMPLETE",
            LoadingStage::Failed => "FAILED",
        };
        f.write_str(name)
    }
}
