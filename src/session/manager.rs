//! Session lifecycle manager
//!
//! Owns the current session, the published [`SessionState`] and the guard
//! flags that keep independently triggered operations (user actions, the
//! poll loop, autostart, teardown, the inactivity sweep) from racing each
//! other. Guard checks always happen synchronously before the first await of
//! an operation, and every state mutation names the session it pertains to so
//! a late reply for a replaced session is dropped.

use crate::api::client::HttpSimulationClient;
use crate::api::service::{ApiResult, SimulationService};
use crate::api::wire::{
    is_initialization_started, CreateRequest, SimulationParams, SimulationState, StartReply,
};
use crate::core::config::{SeaWatchConfig, SessionConfig};
use crate::core::error::{ApiError, Result, SeaWatchError};
use crate::core::types::{ClientId, SessionId};
use crate::session::client_id::ClientIdStore;
use crate::session::guards::{GuardState, SkipReason};
use crate::session::poller;
use crate::session::retry::RetryPolicy;
use crate::session::stage::LoadingStage;
use crate::session::state::SessionState;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const LOADING_TIMEOUT_MESSAGE: &str = "Loading timeout. Please reset to try again.";
pub const AUTOSTART_FAILED_MESSAGE: &str = "Error during auto-start, please try starting manually";
const TIMEOUT_MESSAGE: &str = "Request timed out. The server may be busy, please try again.";

/// User-facing explanation for a session deleted server-side
pub fn expiry_message(config: &SessionConfig) -> String {
    format!(
        "The simulation has been deleted due to {} minutes of inactivity. \
         Reset to create a new simulation.",
        config.inactivity_minutes()
    )
}

/// Result of a lifecycle operation that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The operation ran against the remote service
    Applied,
    /// A guard refused the operation; nothing was sent
    Skipped(SkipReason),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }
}

struct PollerSlot {
    session: SessionId,
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollerSlot {
    fn is_live(&self) -> bool {
        !self.stop.is_cancelled() && !self.handle.is_finished()
    }
}

struct Shared {
    service: Arc<dyn SimulationService>,
    config: SessionConfig,
    state: watch::Sender<SessionState>,
    guards: Mutex<GuardState>,
    client_ids: ClientIdStore,
    /// Parent of every call token; cancelled on unmount
    teardown: Mutex<CancellationToken>,
    poller: Mutex<Option<PollerSlot>>,
}

impl Shared {
    fn guards(&self) -> MutexGuard<'_, GuardState> {
        self.guards.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn poller(&self) -> MutexGuard<'_, Option<PollerSlot>> {
        self.poller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn teardown(&self) -> MutexGuard<'_, CancellationToken> {
        self.teardown.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to the lifecycle manager; clones share one session
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    pub fn new(service: Arc<dyn SimulationService>, config: SessionConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!(error = %e, "session configuration is inconsistent");
        }
        let client_ids = ClientIdStore::new(config.client_id_path.clone());
        let (state, _) = watch::channel(SessionState::default());
        Self {
            shared: Arc::new(Shared {
                service,
                config,
                state,
                guards: Mutex::new(GuardState::new()),
                client_ids,
                teardown: Mutex::new(CancellationToken::new()),
                poller: Mutex::new(None),
            }),
        }
    }

    /// Manager backed by the HTTP client
    pub fn connect(config: &SeaWatchConfig) -> Self {
        let client = HttpSimulationClient::new(&config.api);
        Self::new(Arc::new(client), config.session.clone())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Watch the published state
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Copy of the published state
    pub fn snapshot(&self) -> SessionState {
        self.shared.state.borrow().clone()
    }

    pub fn client_id(&self) -> ClientId {
        self.shared.client_ids.current()
    }

    /// Whether a poll loop is alive for the current session
    pub fn is_polling(&self) -> bool {
        self.shared
            .poller()
            .as_ref()
            .map(PollerSlot::is_live)
            .unwrap_or(false)
    }

    pub fn expiry_message(&self) -> String {
        expiry_message(&self.shared.config)
    }

    fn guards(&self) -> MutexGuard<'_, GuardState> {
        self.shared.guards()
    }

    fn call_token(&self) -> CancellationToken {
        self.shared.teardown().child_token()
    }

    fn publish<F>(&self, mutate: F)
    where
        F: FnOnce(&mut SessionState),
    {
        self.shared.state.send_modify(mutate);
    }

    /// Apply `mutate` only while `id` is still the current session
    fn publish_if_current<F>(&self, id: &SessionId, mutate: F) -> bool
    where
        F: FnOnce(&mut SessionState),
    {
        let applied = self.shared.state.send_if_modified(|state| {
            if state.is_current(id) {
                mutate(state);
                true
            } else {
                false
            }
        });
        if !applied {
            debug!(session_id = %id, "dropping update for replaced session");
        }
        applied
    }

    /// Run `release` against the guards after `delay`
    fn release_later<F>(&self, delay: Duration, release: F)
    where
        F: FnOnce(&mut GuardState) + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            sleep(delay).await;
            release(&mut *shared.guards());
        });
    }

    fn describe(&self, err: &ApiError) -> String {
        match err {
            ApiError::NotFound => self.expiry_message(),
            ApiError::Timeout => TIMEOUT_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    /// Create a new session, replacing the current one
    ///
    /// No-op while another create or reset is in flight or while the manager
    /// is unmounting. Any previous session is stopped and deleted first.
    pub async fn create(&self, params: SimulationParams) -> Result<Outcome> {
        let (creation, protection) = {
            let mut guards = self.guards();
            if guards.unmounting {
                debug!("create skipped while unmounting");
                return Ok(Outcome::Skipped(SkipReason::Unmounting));
            }
            let Some(creation) = guards.try_begin_creation() else {
                debug!("create skipped, another creation in flight");
                return Ok(Outcome::Skipped(SkipReason::CreationInFlight));
            };
            (creation, guards.protect())
        };

        self.release_later(self.shared.config.creation_safety_timeout(), move |guards| {
            if guards.end_creation(creation) {
                warn!("creation did not finish in time, releasing guards");
                guards.release_protection(protection);
            }
        });

        let result = self.establish(params).await;
        self.guards().end_creation(creation);

        match result {
            Ok(Some(id)) => {
                info!(session_id = %id, "simulation created");
                let snapshot = self.snapshot();
                self.spawn_poller(id.clone());
                if snapshot.is_current(&id) && snapshot.loading_stage == LoadingStage::Complete {
                    self.on_loaded(&id, snapshot.awaiting_autostart());
                }
                Ok(Outcome::Applied)
            }
            Ok(None) => {
                self.guards().release_protection(protection);
                Ok(Outcome::Skipped(SkipReason::StaleSession))
            }
            Err(e) => {
                self.guards().release_protection(protection);
                Err(e)
            }
        }
    }

    /// Retire the previous session, then issue the create call
    ///
    /// `Ok(None)` means the new session was abandoned (teardown happened
    /// while the call was in flight).
    async fn establish(&self, params: SimulationParams) -> Result<Option<SessionId>> {
        let config = &self.shared.config;
        let previous = self.snapshot();

        self.stop_poller();
        self.publish(SessionState::begin_initialization);

        if let Some(id) = previous.session_id {
            self.retire(&id, previous.running).await;
            sleep(config.delete_settle()).await;
        }
        sleep(config.pre_create_delay()).await;

        let cancel = self.call_token();
        let service = &self.shared.service;
        let client_ids = &self.shared.client_ids;
        let result = RetryPolicy::for_create(config)
            .run("create", |attempt| {
                let request = CreateRequest {
                    params: params.clone(),
                    client_id: client_ids.rotate(),
                    is_developer_test: config.developer_test,
                };
                debug!(attempt, client_id = %request.client_id, "requesting simulation");
                let cancel = cancel.clone();
                async move { service.create(&request, &cancel).await }
            })
            .await;

        if cancel.is_cancelled() {
            debug!("creation abandoned by teardown");
            if let Ok(Some(orphan)) = result.as_ref().map(|r| r.simulation_id.clone()) {
                self.discard(&orphan).await;
            }
            return Ok(None);
        }

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "simulation creation failed");
                let message = self.describe(&e);
                self.publish(|state| state.fail(message));
                return Err(e.into());
            }
        };

        let Some(id) = response.simulation_id.clone() else {
            let e = ApiError::rejected(None, "No simulation id in response");
            error!("create reply carried no simulation id");
            let message = e.to_string();
            self.publish(|state| state.fail(message));
            return Err(e.into());
        };

        if is_initialization_started(response.message()) {
            info!(session_id = %id, "server reports initialization started");
        }

        let adopted = self.shared.state.send_if_modified(|state| {
            let pending = state.session_id.is_none()
                && state.loading_stage == LoadingStage::Initializing;
            if pending {
                state.adopt(id.clone(), &response);
            }
            pending
        });
        if !adopted {
            warn!(session_id = %id, "state moved on during creation, discarding new simulation");
            self.discard(&id).await;
            return Ok(None);
        }

        self.guards().touch(&id, Instant::now());
        Ok(Some(id))
    }

    /// Best-effort stop and delete of a session being replaced
    async fn retire(&self, id: &SessionId, running: bool) {
        let cancel = self.call_token();
        if running {
            if let Err(e) = self.shared.service.stop(id, &cancel).await {
                debug!(session_id = %id, error = %e, "stop before delete failed");
            }
            sleep(self.shared.config.stop_settle()).await;
        }
        match self.shared.service.delete(id, &cancel).await {
            Ok(_) => info!(session_id = %id, "deleted previous simulation"),
            Err(e) => warn!(session_id = %id, error = %e, "failed to delete previous simulation"),
        }
        self.guards().forget(id);
    }

    async fn discard(&self, id: &SessionId) {
        let cancel = self.shared.teardown().child_token();
        if let Err(e) = self.shared.service.delete(id, &cancel).await {
            warn!(session_id = %id, error = %e, "failed to delete orphaned simulation");
        }
    }

    /// Start the current session
    pub async fn start(&self) -> Result<Outcome> {
        let snapshot = self.snapshot();
        let Some(id) = snapshot.session_id.clone() else {
            return Ok(Outcome::Skipped(SkipReason::NoSession));
        };
        if snapshot.loading_stage.is_loading() {
            debug!(session_id = %id, stage = %snapshot.loading_stage, "start skipped while loading");
            return Ok(Outcome::Skipped(SkipReason::StillLoading));
        }

        let (start, protection) = {
            let mut guards = self.guards();
            if guards.creation_in_flight() {
                return Ok(Outcome::Skipped(SkipReason::CreationInFlight));
            }
            let Some(start) = guards.try_begin_start() else {
                debug!(session_id = %id, "start already in flight");
                return Ok(Outcome::Skipped(SkipReason::StartInFlight));
            };
            (start, guards.protect())
        };

        let result = self.request_start(&id).await;

        let config = &self.shared.config;
        self.release_later(config.start_inflight_release(), move |guards| {
            guards.end_start(start)
        });
        self.release_later(config.start_release(), move |guards| {
            guards.release_protection(protection)
        });
        result
    }

    async fn request_start(&self, id: &SessionId) -> Result<Outcome> {
        let cancel = self.call_token();
        let service = &self.shared.service;
        let reply = RetryPolicy::for_start(&self.shared.config)
            .run("start", |_| {
                let cancel = cancel.clone();
                async move { service.start(id, &cancel).await }
            })
            .await;

        match reply {
            Ok(StartReply::Started(response)) => {
                let applied = self.publish_if_current(id, |state| {
                    state.clear_error();
                    state.set_running(true);
                    if let Some(fps) = response.fps {
                        state.set_speed(fps);
                    }
                });
                if !applied {
                    return Ok(Outcome::Skipped(SkipReason::StaleSession));
                }
                info!(session_id = %id, "simulation started");
                {
                    let mut guards = self.guards();
                    guards.touch(id, Instant::now());
                    guards.reset_autostart_retries(id);
                }
                self.spawn_poller(id.clone());
                self.refresh_quietly(id).await;
                Ok(Outcome::Applied)
            }
            Ok(StartReply::NotReady {
                message,
                loading_stage,
                loading_progress,
            }) => {
                info!(session_id = %id, %message, "start refused, still loading");
                let mut loaded = false;
                self.publish_if_current(id, |state| {
                    if let Some(stage) = loading_stage {
                        state.advance_stage(stage);
                    }
                    if !state.loading_stage.is_terminal() {
                        if let Some(progress) = loading_progress {
                            state.set_progress(progress);
                        }
                        state.loading = true;
                    }
                    loaded =state.loading_stage == LoadingStage::Complete;
                });
                if loaded {
                    // A poll already saw Complete, so no later snapshot will re-arm autoplay
                    self.retry_autostart(id);
                } else {
                    self.spawn_poller(id.clone());
                }
                Ok(Outcome::Skipped(SkipReason::StillLoading))
            }
            Err(ApiError::NotFound) => {
                self.expire(id);
                Err(ApiError::NotFound.into())
            }
            Err(e) => {
                warn!(session_id = %id, error = %e, "start failed");
                let message = self.describe(&e);
                self.publish_if_current(id, |state| state.note_error(message));
                Err(e.into())
            }
        }
    }

    /// Autoplay: start a session that just finished loading
    async fn auto_start(&self, id: &SessionId) {
        let snapshot = self.snapshot();
        if !snapshot.is_current(id) || !snapshot.awaiting_autostart() {
            return;
        }
        info!(session_id = %id, "auto-starting loaded simulation");
        match self.start().await {
            Ok(Outcome::Applied) => {}
            Ok(Outcome::Skipped(reason)) => debug!(session_id = %id, %reason, "auto-start skipped"),
            Err(SeaWatchError::Api(ApiError::NotFound)) => {}
            Err(e) => {
                warn!(session_id = %id, error = %e, "auto-start failed");
                self.publish_if_current(id, |state| state.note_error(AUTOSTART_FAILED_MESSAGE));
            }
        }
    }

    /// Pause the current session
    pub async fn stop(&self) -> Result<Outcome> {
        let Some(id) = self.snapshot().session_id else {
            return Ok(Outcome::Skipped(SkipReason::NoSession));
        };
        let protection = {
            let mut guards = self.guards();
            guards.mark_stopped(&id, Instant::now());
            guards.protect()
        };

        let config = &self.shared.config;
        let cancel = self.call_token();
        let service = &self.shared.service;
        let result = RetryPolicy::for_stop(config)
            .run("stop", |_| {
                let cancel = cancel.clone();
                let id = &id;
                async move { service.stop(id, &cancel).await }
            })
            .await;
        self.release_later(config.stop_release(), move |guards| {
            guards.release_protection(protection)
        });

        match result {
            Ok(_) => {
                if !self.publish_if_current(&id, |state| {
                    state.set_running(false);
                }) {
                    return Ok(Outcome::Skipped(SkipReason::StaleSession));
                }
                info!(session_id = %id, "simulation stopped");
                self.refresh_quietly(&id).await;
                Ok(Outcome::Applied)
            }
            Err(ApiError::NotFound) => {
                debug!(session_id = %id, "stop target already gone");
                self.publish_if_current(&id, |state| {
                    state.set_running(false);
                });
                Ok(Outcome::Applied)
            }
            Err(e) => {
                warn!(session_id = %id, error = %e, "stop failed");
                let message = self.describe(&e);
                self.publish_if_current(&id, |state| state.note_error(message));
                Err(e.into())
            }
        }
    }

    /// Advance a paused session by one step
    pub async fn step(&self) -> Result<Outcome> {
        let snapshot = self.snapshot();
        let Some(id) = snapshot.session_id.clone() else {
            return Ok(Outcome::Skipped(SkipReason::NoSession));
        };
        if snapshot.running {
            return Err(SeaWatchError::StepWhileRunning);
        }
        match snapshot.loading_stage {
            LoadingStage::Complete => {}
            LoadingStage::Failed => return Ok(Outcome::Skipped(SkipReason::NoSession)),
            _ => return Ok(Outcome::Skipped(SkipReason::StillLoading)),
        }

        let operation = self.guards().begin_operation(id.clone());
        let config = &self.shared.config;
        let cancel = self.call_token();
        let service = &self.shared.service;
        let result = RetryPolicy::for_step(config)
            .run("step", |_| {
                let cancel = cancel.clone();
                let id = &id;
                async move { service.step(id, &cancel).await }
            })
            .await;
        self.release_later(config.step_release(), move |guards| {
            guards.end_operation(operation)
        });

        match result {
            Ok(_) => {
                self.guards().touch(&id, Instant::now());
                self.refresh_quietly(&id).await;
                Ok(Outcome::Applied)
            }
            Err(ApiError::NotFound) => {
                self.expire(&id);
                Err(ApiError::NotFound.into())
            }
            Err(e) => {
                warn!(session_id = %id, error = %e, "step failed");
                let message = self.describe(&e);
                self.publish_if_current(&id, |state| state.note_error(message));
                Err(e.into())
            }
        }
    }

    /// Change the simulation speed
    ///
    /// Without a session only the local value changes. Failures after retries
    /// are logged and swallowed.
    pub async fn set_speed(&self, fps: f64) -> Result<Outcome> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(SeaWatchError::InvalidSpeed(fps));
        }
        let previous = self.snapshot().session_id;
        self.publish(|state| state.set_speed(fps));
        let Some(id) = previous else {
            return Ok(Outcome::Applied);
        };

        let cancel = self.call_token();
        let service = &self.shared.service;
        let result = RetryPolicy::for_speed(&self.shared.config)
            .run("speed", |_| {
                let cancel = cancel.clone();
                let id = &id;
                async move { service.set_speed(id, fps, &cancel).await }
            })
            .await;

        match result {
            Ok(response) => {
                if let Some(echoed) = response.fps {
                    self.publish_if_current(&id, |state| state.set_speed(echoed));
                }
                debug!(session_id = %id, fps, "speed updated");
            }
            Err(e) => warn!(session_id = %id, fps, error = %e, "speed change failed"),
        }
        Ok(Outcome::Applied)
    }

    /// Tear down the current session and create a fresh one
    pub async fn reset(&self, params: SimulationParams) -> Result<Outcome> {
        match self.snapshot().session_id {
            Some(id) => info!(session_id = %id, "resetting simulation"),
            None => debug!("no simulation to reset, creating one"),
        }
        self.guards().recovery_attempted = false;
        self.create(params).await
    }

    /// Fetch and apply the current state once
    pub async fn refresh(&self) -> Result<Outcome> {
        let Some(id) = self.snapshot().session_id else {
            return Ok(Outcome::Skipped(SkipReason::NoSession));
        };
        match self.fetch_state(&id).await {
            Ok(()) => Ok(Outcome::Applied),
            Err(e) => {
                self.poll_failed(&id, e.clone());
                Err(e.into())
            }
        }
    }

    async fn refresh_quietly(&self, id: &SessionId) {
        if let Err(e) = self.fetch_state(id).await {
            debug!(session_id = %id, error = %e, "refresh failed");
            if e.is_not_found() {
                self.expire(id);
            }
        }
    }

    async fn fetch_state(&self, id: &SessionId) -> ApiResult<()> {
        let cancel = self.call_token();
        let snapshot = self.shared.service.get_state(id, &cancel).await?;
        self.absorb(id, &snapshot);
        Ok(())
    }

    /// Apply a snapshot and react to the session finishing its load
    fn absorb(&self, id: &SessionId, snapshot: &SimulationState) {
        let mut completed = false;
        let mut awaiting = false;
        let applied = self.publish_if_current(id, |state| {
            let before = state.loading_stage;
            state.apply_snapshot(snapshot);
            completed =
                before != LoadingStage::Complete && state.loading_stage == LoadingStage::Complete;
            awaiting = state.awaiting_autostart();
        });
        if !applied {
            return;
        }

        self.guards().touch(id, Instant::now());
        if completed {
            self.on_loaded(id, awaiting);
        } else if awaiting && self.guards().mark_autostarted(id) {
            self.spawn_autostart(id.clone(), self.shared.config.autostart_delay());
        }
    }

    /// The session reached stage Complete, from a poll or the create reply
    fn on_loaded(&self, id: &SessionId, awaiting: bool) {
        let (autostart, protection) = {
            let mut guards = self.guards();
            guards.recovery_attempted = false;
            (
                awaiting && guards.mark_autostarted(id),
                guards.protection_epoch(),
            )
        };
        info!(session_id = %id, "simulation loaded");
        if let Some(epoch) = protection {
            self.release_later(self.shared.config.complete_release(), move |guards| {
                guards.release_protection(epoch)
            });
        }
        if autostart {
            self.spawn_autostart(id.clone(), self.shared.config.autostart_delay());
        }
    }

    /// Start was refused although the session already reported Complete
    ///
    /// Autoplay is retried a bounded number of times, each after the start
    /// in-flight flag has been released.
    fn retry_autostart(&self, id: &SessionId) {
        let config = &self.shared.config;
        let retry = self.guards().next_autostart_retry(id);
        if retry <= config.max_retries {
            debug!(session_id = %id, retry, "scheduling another auto-start");
            let delay = config.start_inflight_release() + config.autostart_delay();
            self.spawn_autostart(id.clone(), delay);
        } else {
            warn!(session_id = %id, "server kept refusing start, giving up on auto-start");
            self.publish_if_current(id, |state| state.note_error(AUTOSTART_FAILED_MESSAGE));
        }
    }

    /// Handle a failed state fetch; returns whether polling should continue
    fn poll_failed(&self, id: &SessionId, err: ApiError) -> bool {
        if err.is_not_found() {
            self.expire(id);
            return false;
        }
        if self.guards().is_protected() {
            debug!(session_id = %id, error = %err, "poll error while protected");
        } else {
            warn!(session_id = %id, error = %err, "poll failed");
            let message = self.describe(&err);
            self.publish_if_current(id, |state| state.note_error(message));
        }
        true
    }

    /// The session is gone server-side
    fn expire(&self, id: &SessionId) {
        let message = self.expiry_message();
        if self.publish_if_current(id, |state| state.fail(message)) {
            warn!(session_id = %id, "simulation no longer exists server-side");
        }
        self.stop_poller_for(id);
        let mut guards = self.guards();
        guards.forget(id);
        guards.drop_protection();
    }

    /// One poll loop iteration; returns whether the loop should continue
    pub(crate) async fn poll_tick(&self, id: &SessionId) -> bool {
        match self.fetch_state(id).await {
            Ok(()) => true,
            Err(e) => self.poll_failed(id, e),
        }
    }

    /// Loading polls ran out: one recovery reset, then give up
    pub(crate) fn loading_timed_out(&self, id: &SessionId) {
        let first = {
            let mut guards = self.guards();
            let first = !guards.recovery_attempted;
            guards.recovery_attempted = true;
            first
        };
        if first {
            warn!(session_id = %id, "loading timed out, attempting recovery reset");
            self.spawn_recovery();
        } else {
            error!(session_id = %id, "loading timed out again, giving up");
            self.publish_if_current(id, |state| state.fail(LOADING_TIMEOUT_MESSAGE));
            self.guards().drop_protection();
        }
    }

    fn spawn_recovery(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            match manager.create(SimulationParams::default()).await {
                Ok(Outcome::Applied) => info!("recovery reset issued"),
                Ok(Outcome::Skipped(reason)) => debug!(%reason, "recovery reset skipped"),
                Err(e) => {
                    error!(error = %e, "recovery reset failed");
                    manager.publish(|state| state.fail(LOADING_TIMEOUT_MESSAGE));
                }
            }
        });
    }

    fn spawn_autostart(&self, id: SessionId, delay: Duration) {
        let manager = self.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            manager.auto_start(&id).await;
        });
    }

    /// Ensure a poll loop runs for `id`, replacing a loop for any other session
    fn spawn_poller(&self, id: SessionId) {
        let mut slot = self.shared.poller();
        if let Some(existing) = slot.as_ref() {
            if existing.session == id && existing.is_live() {
                return;
            }
            existing.stop.cancel();
        }
        let stop = self.call_token();
        let handle = tokio::spawn(poller::run(self.clone(), id.clone(), stop.clone()));
        *slot = Some(PollerSlot {
            session: id,
            stop,
            handle,
        });
    }

    fn stop_poller(&self) {
        if let Some(slot) = self.shared.poller().take() {
            slot.stop.cancel();
        }
    }

    fn stop_poller_for(&self, id: &SessionId) {
        let mut slot = self.shared.poller();
        if slot.as_ref().map(|p| &p.session == id).unwrap_or(false) {
            if let Some(p) = slot.take() {
                p.stop.cancel();
            }
        }
    }

    /// Delete the current session and clear local state
    ///
    /// Skipped while another cleanup of the same session runs, while the
    /// session is protected or initializing, while an operation is using it,
    /// or shortly after it was stopped.
    pub async fn cleanup(&self) -> Result<Outcome> {
        let snapshot = self.snapshot();
        let Some(id) = snapshot.session_id.clone() else {
            return Ok(Outcome::Skipped(SkipReason::NoSession));
        };
        let config = &self.shared.config;
        let blocked = {
            let mut guards = self.guards();
            let blocked = guards.cleanup_block(
                &id,
                snapshot.loading_stage,
                config.recently_stopped_window(),
                Instant::now(),
            );
            if blocked.is_none() {
                guards.try_begin_cleanup(&id);
            }
            blocked
        };
        if let Some(reason) = blocked {
            debug!(session_id = %id, %reason, "cleanup skipped");
            return Ok(Outcome::Skipped(reason));
        }

        self.stop_poller_for(&id);
        let cancel = self.call_token();
        match self.shared.service.delete(&id, &cancel).await {
            Ok(_) => info!(session_id = %id, "simulation deleted"),
            Err(e) => warn!(session_id = %id, error = %e, "delete failed during cleanup"),
        }
        self.publish_if_current(&id, SessionState::clear);
        self.guards().forget(&id);

        let tracked = id.clone();
        self.release_later(config.cleanup_tracking(), move |guards| {
            guards.end_cleanup(&tracked)
        });
        Ok(Outcome::Applied)
    }

    /// Teardown: cancel everything outstanding and delete the current session
    ///
    /// Create and reset are refused until the unmount cooldown elapses.
    pub async fn unmount(&self) {
        {
            let mut guards = self.guards();
            guards.unmounting = true;
            guards.release_all();
        }
        let cancel = {
            let mut teardown = self.shared.teardown();
            teardown.cancel();
            *teardown = CancellationToken::new();
            teardown.child_token()
        };
        self.stop_poller();

        let previous = self.snapshot().session_id;
        self.publish(SessionState::clear);
        if let Some(id) = previous {
            info!(session_id = %id, "deleting simulation on teardown");
            if let Err(e) = self.shared.service.delete(&id, &cancel).await {
                warn!(session_id = %id, error = %e, "delete on teardown failed");
            }
            self.guards().forget(&id);
        }

        self.release_later(self.shared.config.unmount_reset(), |guards| {
            guards.unmounting = false
        });
    }

    /// Delete every tracked session idle past the inactivity threshold
    ///
    /// Delete outcomes are ignored. Returns how many sessions were swept.
    pub async fn sweep_inactive(&self) -> usize {
        let threshold = self.shared.config.inactivity_timeout();
        let stale = self.guards().inactive(threshold, Instant::now());
        for id in &stale {
            info!(session_id = %id, "deleting inactive simulation");
            let cancel = self.call_token();
            if let Err(e) = self.shared.service.delete(id, &cancel).await {
                debug!(session_id = %id, error = %e, "inactive delete failed");
            }
            if self.snapshot().is_current(id) {
                self.expire(id);
            } else {
                self.guards().forget(id);
            }
        }
        stale.len()
    }
}
