//! Simulation session lifecycle: state, guards, retries, polling and teardown

pub mod client_id;
pub mod guards;
pub mod manager;
mod poller;
pub mod retry;
pub mod stage;
pub mod state;
pub mod sweep;

pub use guards::SkipReason;
pub use manager::{Outcome, SessionManager};
pub use retry::{Backoff, RetryPolicy};
pub use stage::LoadingStage;
pub use state::SessionState;
pub use sweep::spawn_sweep;
