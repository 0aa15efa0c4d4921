//! Scripted in-process stand-in for the remote simulation service

#![allow(dead_code)]

use async_trait::async_trait;
use seawatch_abm::api::wire::{
    CreateRequest, ResponseStatus, SimulationResponse, SimulationState, StartReply,
};
use seawatch_abm::api::{ApiResult, SimulationService};
use seawatch_abm::core::{ApiError, ClientId, SessionConfig, SessionId};
use seawatch_abm::session::{LoadingStage, SessionManager, SessionState};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create(ClientId),
    GetState(SessionId),
    Start(SessionId),
    Stop(SessionId),
    Step(SessionId),
    Speed(SessionId, f64),
    Reset(SessionId),
    Delete(SessionId),
}

#[derive(Debug, Clone)]
struct FakeSim {
    stage: LoadingStage,
    running: bool,
    step_count: u64,
    fps: f64,
}

#[derive(Default)]
struct Inner {
    calls: Vec<Call>,
    sims: HashMap<SessionId, FakeSim>,
    next_id: u32,
    create_script: VecDeque<ApiResult<SimulationResponse>>,
    state_script: VecDeque<ApiResult<SimulationState>>,
    start_script: VecDeque<ApiResult<StartReply>>,
}

/// Fake service keeping a tiny server-side model of each simulation
///
/// Scripted replies are consumed before the model answers.
pub struct MockService {
    inner: Mutex<Inner>,
    initial_stage: LoadingStage,
    create_delay: Duration,
    state_delay: Duration,
}

impl MockService {
    /// Simulations are fully loaded as soon as they are created
    pub fn new() -> Arc<Self> {
        Self::with_stage(LoadingStage::Complete)
    }

    /// Simulations report `stage` forever
    pub fn with_stage(stage: LoadingStage) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
            initial_stage: stage,
            create_delay: Duration::ZERO,
            state_delay: Duration::ZERO,
        })
    }

    pub fn slow_create(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
            initial_stage: LoadingStage::Complete,
            create_delay: delay,
            state_delay: Duration::ZERO,
        })
    }

    /// State replies are computed when requested but delivered `delay` later
    pub fn slow_state(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
            initial_stage: LoadingStage::Complete,
            create_delay: Duration::ZERO,
            state_delay: delay,
        })
    }

    pub fn push_create(&self, reply: ApiResult<SimulationResponse>) {
        self.inner.lock().unwrap().create_script.push_back(reply);
    }

    pub fn push_state(&self, reply: ApiResult<SimulationState>) {
        self.inner.lock().unwrap().state_script.push_back(reply);
    }

    pub fn push_start(&self, reply: ApiResult<StartReply>) {
        self.inner.lock().unwrap().start_script.push_back(reply);
    }

    /// Drop a simulation server-side, as the service's own cleanup would
    pub fn expire(&self, id: &SessionId) {
        self.inner.lock().unwrap().sims.remove(id);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn count(&self, matcher: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| matcher(c)).count()
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Create(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn deleted(&self) -> Vec<SessionId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn live(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.inner.lock().unwrap().sims.keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    fn record(&self, call: Call) {
        self.inner.lock().unwrap().calls.push(call);
    }

    fn sim_state(sim: &FakeSim) -> SimulationState {
        let status = if sim.stage == LoadingStage::Complete {
            ResponseStatus::Success
        } else {
            ResponseStatus::Initializing
        };
        SimulationState {
            status,
            running: sim.running,
            step_count: sim.step_count,
            fps: Some(sim.fps),
            loading_stage: Some(sim.stage),
            loading_progress: Some(if sim.stage == LoadingStage::Complete { 100.0 } else { 40.0 }),
            ..SimulationState::default()
        }
    }

    fn ok(message: &str) -> SimulationResponse {
        SimulationResponse {
            status: ResponseStatus::Success,
            message: Some(message.to_string()),
            ..SimulationResponse::default()
        }
    }
}

#[async_trait]
impl SimulationService for MockService {
    async fn create(
        &self,
        request: &CreateRequest,
        _cancel: &CancellationToken,
    ) -> ApiResult<SimulationResponse> {
        self.record(Call::Create(request.client_id.clone()));
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        let mut inner = self.inner.lock().unwrap();
        let fresh = FakeSim {
            stage: self.initial_stage,
            running: false,
            step_count: 0,
            fps: request.params.fps,
        };
        if let Some(reply) = inner.create_script.pop_front() {
            if let Ok(response) = &reply {
                if let Some(id) = &response.simulation_id {
                    inner.sims.insert(id.clone(), fresh);
                }
            }
            return reply;
        }
        inner.next_id += 1;
        let id = SessionId::new(format!("sim-{}", inner.next_id));
        inner.sims.insert(id.clone(), fresh);
        Ok(SimulationResponse {
            status: ResponseStatus::Initializing,
            message: Some("Simulation initialization started".to_string()),
            simulation_id: Some(id),
            fps: Some(request.params.fps),
            loading_stage: Some(LoadingStage::Initializing),
            loading_progress: Some(0.0),
            ..SimulationResponse::default()
        })
    }

    async fn get_state(
        &self,
        id: &SessionId,
        _cancel: &CancellationToken,
    ) -> ApiResult<SimulationState> {
        self.record(Call::GetState(id.clone()));
        let reply = {
            let mut inner = self.inner.lock().unwrap();
            match inner.state_script.pop_front() {
                Some(reply) => reply,
                None => inner.sims.get(id).map(Self::sim_state).ok_or(ApiError::NotFound),
            }
        };
        if !self.state_delay.is_zero() {
            tokio::time::sleep(self.state_delay).await;
        }
        reply
    }

    async fn start(&self, id: &SessionId, _cancel: &CancellationToken) -> ApiResult<StartReply> {
        self.record(Call::Start(id.clone()));
        let mut inner = self.inner.lock().unwrap();
        if let Some(reply) = inner.start_script.pop_front() {
            return reply;
        }
        let sim = inner.sims.get_mut(id).ok_or(ApiError::NotFound)?;
        if sim.stage != LoadingStage::Complete {
            return Ok(StartReply::NotReady {
                message: "Simulation model is still initializing, please wait".to_string(),
                loading_stage: Some(sim.stage),
                loading_progress: Some(40.0),
            });
        }
        sim.running = true;
        Ok(StartReply::Started(Self::ok("Simulation started")))
    }

    async fn stop(
        &self,
        id: &SessionId,
        _cancel: &CancellationToken,
    ) -> ApiResult<SimulationResponse> {
        self.record(Call::Stop(id.clone()));
        let mut inner = self.inner.lock().unwrap();
        let sim = inner.sims.get_mut(id).ok_or(ApiError::NotFound)?;
        sim.running = false;
        Ok(Self::ok("Simulation stopped"))
    }

    async fn step(
        &self,
        id: &SessionId,
        _cancel: &CancellationToken,
    ) -> ApiResult<SimulationResponse> {
        self.record(Call::Step(id.clone()));
        let mut inner = self.inner.lock().unwrap();
        let sim = inner.sims.get_mut(id).ok_or(ApiError::NotFound)?;
        sim.step_count += 1;
        Ok(Self::ok("Simulation stepped"))
    }

    async fn set_speed(
        &self,
        id: &SessionId,
        fps: f64,
        _cancel: &CancellationToken,
    ) -> ApiResult<SimulationResponse> {
        self.record(Call::Speed(id.clone(), fps));
        let mut inner = self.inner.lock().unwrap();
        let sim = inner.sims.get_mut(id).ok_or(ApiError::NotFound)?;
        sim.fps = fps.clamp(0.5, 10.0);
        Ok(SimulationResponse {
            fps: Some(sim.fps),
            ..Self::ok("Speed updated")
        })
    }

    async fn reset(
        &self,
        id: &SessionId,
        request: &CreateRequest,
        cancel: &CancellationToken,
    ) -> ApiResult<SimulationResponse> {
        self.record(Call::Reset(id.clone()));
        self.create(request, cancel).await
    }

    async fn delete(
        &self,
        id: &SessionId,
        _cancel: &CancellationToken,
    ) -> ApiResult<SimulationResponse> {
        self.record(Call::Delete(id.clone()));
        self.inner.lock().unwrap().sims.remove(id);
        Ok(Self::ok("Simulation deleted"))
    }
}

pub fn manager_with(service: Arc<MockService>, config: SessionConfig) -> SessionManager {
    SessionManager::new(service, config)
}

pub fn manager(service: Arc<MockService>) -> SessionManager {
    manager_with(service, SessionConfig::default())
}

/// Let background tasks (pollers, autostart, delayed releases) run for `secs`
pub async fn advance(secs: f64) {
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
}

pub fn sid(id: &str) -> SessionId {
    SessionId::from(id)
}

pub fn current(manager: &SessionManager) -> SessionState {
    manager.snapshot()
}
