//! Async HTTP client for the remote simulation service
//!
//! A thin wrapper: one method per endpoint, each bounded by the configured
//! request timeout and by the caller's cancellation token. Interpretation of
//! the service's replies (what counts as success, what counts as "not ready")
//! happens here so the lifecycle manager only ever sees typed outcomes.

use crate::api::paths::ApiPaths;
use crate::api::service::{ApiResult, SimulationService};
use crate::api::wire::{
    is_initialization_started, is_not_ready, CreateRequest, ResponseStatus, SimulationResponse,
    SimulationState, SpeedRequest, StartReply,
};
use crate::core::config::ApiConfig;
use crate::core::error::ApiError;
use crate::core::types::SessionId;
use crate::session::stage::LoadingStage;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fields shared by every reply, used to classify failures
trait Envelope {
    fn status(&self) -> ResponseStatus;
    fn message(&self) -> Option<&str>;
    fn loading_stage(&self) -> Option<LoadingStage>;
}

impl Envelope for SimulationResponse {
    fn status(&self) -> ResponseStatus {
        self.status
    }
    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
    fn loading_stage(&self) -> Option<LoadingStage> {
        self.loading_stage
    }
}

impl Envelope for SimulationState {
    fn status(&self) -> ResponseStatus {
        self.status
    }
    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
    fn loading_stage(&self) -> Option<LoadingStage> {
        self.loading_stage
    }
}

/// HTTP implementation of [`SimulationService`]
pub struct HttpSimulationClient {
    client: Client,
    paths: ApiPaths,
    timeout: Duration,
}

impl HttpSimulationClient {
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            client: Client::new(),
            paths: ApiPaths::new(&config.base_url),
            timeout: config.request_timeout(),
        }
    }

    /// Build a client from `SEAWATCH_API_URL`, falling back to the default base URL
    pub fn from_env() -> Self {
        Self::new(&ApiConfig::default().with_env_override())
    }

    /// Override the per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Race a call against its timeout and its cancellation token
    async fn bounded<T, F>(&self, cancel: &CancellationToken, call: F) -> ApiResult<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ApiError::Timeout),
            result = tokio::time::timeout(self.timeout, call) => {
                result.unwrap_or(Err(ApiError::Timeout))
            }
        }
    }

    async fn send<T>(&self, request: RequestBuilder, cancel: &CancellationToken) -> ApiResult<T>
    where
        T: DeserializeOwned + Envelope,
    {
        self.bounded(cancel, async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;
            interpret(status, &body)
        })
        .await
    }

    async fn post_action(
        &self,
        id: &SessionId,
        action: &str,
        cancel: &CancellationToken,
    ) -> ApiResult<SimulationResponse> {
        let request = self.client.post(self.paths.action(id, action));
        self.send(request, cancel).await
    }
}

/// Classify a reply by HTTP status and application status
fn interpret<T>(status: StatusCode, body: &str) -> ApiResult<T>
where
    T: DeserializeOwned + Envelope,
{
    if status == StatusCode::NOT_FOUND {
        return Err(ApiError::NotFound);
    }

    let parsed: Result<T, _> = serde_json::from_str(body);
    match parsed {
        Ok(reply) => {
            let message = reply.message().unwrap_or("");
            if is_initialization_started(message) {
                return Ok(reply);
            }
            if status.is_success() && reply.status() != ResponseStatus::Error {
                return Ok(reply);
            }
            let text = if message.is_empty() {
                generic_failure(status)
            } else {
                message.to_string()
            };
            Err(ApiError::Rejected {
                status: Some(status.as_u16()),
                message: text,
                loading_stage: reply.loading_stage(),
            })
        }
        Err(_) if !status.is_success() => {
            Err(ApiError::rejected(Some(status.as_u16()), generic_failure(status)))
        }
        Err(e) => Err(ApiError::Network(format!("Malformed response: {}", e))),
    }
}

fn generic_failure(status: StatusCode) -> String {
    format!("Request failed with status {}", status.as_u16())
}

#[async_trait]
impl SimulationService for HttpSimulationClient {
    async fn create(
        &self,
        request: &CreateRequest,
        cancel: &CancellationToken,
    ) -> ApiResult<SimulationResponse> {
        let builder = self.client.post(self.paths.create()).json(request);
        self.send(builder, cancel).await
    }

    async fn get_state(
        &self,
        id: &SessionId,
        cancel: &CancellationToken,
    ) -> ApiResult<SimulationState> {
        let builder = self.client.get(self.paths.state(id));
        self.send(builder, cancel).await
    }

    async fn start(&self, id: &SessionId, cancel: &CancellationToken) -> ApiResult<StartReply> {
        match self.post_action(id, "start", cancel).await {
            Ok(response) => Ok(StartReply::Started(response)),
            Err(ApiError::Rejected {
                message,
                loading_stage,
                ..
            }) if is_not_ready(&message) => Ok(StartReply::NotReady {
                message,
                loading_stage,
                loading_progress: None,
            }),
            Err(e) => Err(e),
        }
    }

    async fn stop(
        &self,
        id: &SessionId,
        cancel: &CancellationToken,
    ) -> ApiResult<SimulationResponse> {
        self.post_action(id, "stop", cancel).await
    }

    async fn step(
        &self,
        id: &SessionId,
        cancel: &CancellationToken,
    ) -> ApiResult<SimulationResponse> {
        self.post_action(id, "step", cancel).await
    }

    async fn set_speed(
        &self,
        id: &SessionId,
        fps: f64,
        cancel: &CancellationToken,
    ) -> ApiResult<SimulationResponse> {
        let builder = self
            .client
            .post(self.paths.action(id, "fps"))
            .json(&SpeedRequest { fps });
        self.send(builder, cancel).await
    }

    async fn reset(
        &self,
        id: &SessionId,
        request: &CreateRequest,
        cancel: &CancellationToken,
    ) -> ApiResult<SimulationResponse> {
        let builder = self.client.post(self.paths.action(id, "reset")).json(request);
        self.send(builder, cancel).await
    }

    async fn delete(
        &self,
        id: &SessionId,
        cancel: &CancellationToken,
    ) -> ApiResult<SimulationResponse> {
        match self.post_action(id, "delete", cancel).await {
            Err(ApiError::NotFound) => Ok(SimulationResponse {
                status: ResponseStatus::Success,
                message: Some("Simulation already deleted or does not exist".into()),
                ..SimulationResponse::default()
            }),
            other => other,
        }
    }
}
