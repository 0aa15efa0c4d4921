//! Published session state
//!
//! The single value presentation code renders from. Every mutator keeps the
//! session invariants:
//! - `loading_stage` only moves forward along the success path, or to Failed
//! - `running` is true only while `loading_stage` is Complete
//! - `step_count` never decreases while the session exists

use crate::api::wire::{ModelData, Portrayal, ResponseStatus, SimulationResponse, SimulationState};
use crate::core::types::SessionId;
use crate::session::stage::LoadingStage;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    /// Current session, absent before creation and after teardown
    pub session_id: Option<SessionId>,
    pub running: bool,
    pub step_count: u64,
    /// Frames per unit time
    pub speed: f64,
    /// Drawable entities of the latest snapshot
    pub grid_state: Vec<Portrayal>,
    pub model_data: ModelData,
    /// Last user-facing error, if any
    pub error: Option<String>,
    /// A request or the server-side load is in progress
    pub loading: bool,
    pub loading_stage: LoadingStage,
    /// 0-100
    pub loading_progress: f64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            session_id: None,
            running: false,
            step_count: 0,
            speed: 1.0,
            grid_state: Vec::new(),
            model_data: ModelData::default(),
            error: None,
            loading: false,
            loading_stage: LoadingStage::Idle,
            loading_progress: 0.0,
        }
    }
}

impl SessionState {
    /// Whether `id` is the current session
    pub fn is_current(&self, id: &SessionId) -> bool {
        self.session_id.as_ref() == Some(id)
    }

    /// Drop everything about the session, keeping the last error visible
    pub fn clear(&mut self) {
        let error = self.error.take();
        *self = Self {
            error,
            ..Self::default()
        };
    }

    /// Fresh slate for a create that is about to be issued
    pub fn begin_initialization(&mut self) {
        *self = Self {
            loading: true,
            loading_stage: LoadingStage::Initializing,
            ..Self::default()
        };
    }

    /// Take ownership of a newly created session
    pub fn adopt(&mut self, id: SessionId, response: &SimulationResponse) {
        self.session_id = Some(id);
        self.running = false;
        self.step_count = 0;
        self.error = None;
        self.loading = true;
        self.loading_stage = LoadingStage::Initializing;
        if let Some(stage) = response.loading_stage {
            self.advance_stage(stage);
        }
        if let Some(progress) = response.loading_progress {
            self.set_progress(progress);
        }
        if let Some(fps) = response.fps {
            self.set_speed(fps);
        }
    }

    /// Move to `stage` if ordering allows; returns whether the stage changed
    pub fn advance_stage(&mut self, stage: LoadingStage) -> bool {
        if self.loading_stage == stage {
            return false;
        }
        if !self.loading_stage.can_advance_to(stage) {
            debug!(
                current = %self.loading_stage,
                reported = %stage,
                "ignoring out-of-order loading stage"
            );
            return false;
        }
        self.loading_stage = stage;
        match stage {
            LoadingStage::Complete => {
                self.loading = false;
                self.loading_progress = 100.0;
            }
            LoadingStage::Failed => {
                self.loading = false;
                self.running = false;
            }
            _ => self.loading = true,
        }
        true
    }

    pub fn set_progress(&mut self, progress: f64) {
        if progress.is_finite() {
            self.loading_progress = progress.clamp(0.0, 100.0);
        }
    }

    pub fn set_speed(&mut self, speed: f64) {
        if speed.is_finite() && speed > 0.0 {
            self.speed = speed;
        }
    }

    /// Set the running flag; refused (returns false) unless loading is Complete
    pub fn set_running(&mut self, running: bool) -> bool {
        if running && self.loading_stage != LoadingStage::Complete {
            debug!(stage = %self.loading_stage, "refusing running=true before load completes");
            return false;
        }
        self.running = running;
        true
    }

    pub fn set_step_count(&mut self, step_count: u64) {
        self.step_count = self.step_count.max(step_count);
    }

    /// Apply a state snapshot from the service
    pub fn apply_snapshot(&mut self, snapshot: &SimulationState) {
        match snapshot.status {
            ResponseStatus::Success => {
                if let Some(stage) = snapshot.loading_stage {
                    self.advance_stage(stage);
                }
                if let Some(progress) = snapshot.loading_progress {
                    self.set_progress(progress);
                }
                self.set_step_count(snapshot.step_count);
                self.set_running(snapshot.running);
                if !snapshot.grid_state.is_empty() {
                    self.grid_state = snapshot.grid_state.clone();
                }
                if !snapshot.model_data.0.is_empty() {
                    self.model_data = snapshot.model_data.clone();
                }
                if let Some(fps) = snapshot.fps {
                    self.set_speed(fps);
                }
            }
            ResponseStatus::Initializing => {
                if let Some(stage) = snapshot.loading_stage {
                    self.advance_stage(stage);
                }
                if let Some(progress) = snapshot.loading_progress {
                    self.set_progress(progress);
                }
                if !self.loading_stage.is_terminal() {
                    self.loading = true;
                }
            }
            ResponseStatus::Error | ResponseStatus::Unknown => {
                let message = snapshot
                    .message
                    .clone()
                    .unwrap_or_else(|| "Failed to get simulation state".to_string());
                self.note_error(message);
                if snapshot.loading_stage == Some(LoadingStage::Failed) {
                    self.advance_stage(LoadingStage::Failed);
                }
            }
        }
    }

    /// Terminal failure: record the message and move to Failed
    pub fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.advance_stage(LoadingStage::Failed);
        self.loading = false;
        self.running = false;
    }

    /// Soft failure: record the message without touching the stage
    pub fn note_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Whether the poll loop should fetch state for this session
    pub fn is_pollable(&self) -> bool {
        self.session_id.is_some()
            && (self.running || (self.loading && !self.loading_stage.is_terminal()))
    }

    /// Loaded but not yet running: the autoplay policy should start it
    pub fn awaiting_autostart(&self) -> bool {
        self.session_id.is_some() && self.loading_stage == LoadingStage::Complete && !self.running
    }
}
