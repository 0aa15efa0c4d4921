//! The seam between the lifecycle manager and the transport

use crate::api::wire::{CreateRequest, SimulationResponse, SimulationState, StartReply};
use crate::core::error::ApiError;
use crate::core::types::SessionId;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Remote simulation operations
///
/// Every call takes a cancellation token. Implementations must resolve a
/// cancelled call to [`ApiError::Timeout`] rather than dropping it, and must
/// report HTTP 404 as [`ApiError::NotFound`] (except `delete`, for which a
/// missing session is already the desired outcome).
#[async_trait]
pub trait SimulationService: Send + Sync {
    async fn create(
        &self,
        request: &CreateRequest,
        cancel: &CancellationToken,
    ) -> ApiResult<SimulationResponse>;

    async fn get_state(
        &self,
        id: &SessionId,
        cancel: &CancellationToken,
    ) -> ApiResult<SimulationState>;

    async fn start(&self, id: &SessionId, cancel: &CancellationToken) -> ApiResult<StartReply>;

    async fn stop(
        &self,
        id: &SessionId,
        cancel: &CancellationToken,
    ) -> ApiResult<SimulationResponse>;

    async fn step(
        &self,
        id: &SessionId,
        cancel: &CancellationToken,
    ) -> ApiResult<SimulationResponse>;

    async fn set_speed(
        &self,
        id: &SessionId,
        fps: f64,
        cancel: &CancellationToken,
    ) -> ApiResult<SimulationResponse>;

    async fn reset(
        &self,
        id: &SessionId,
        request: &CreateRequest,
        cancel: &CancellationToken,
    ) -> ApiResult<SimulationResponse>;

    async fn delete(
        &self,
        id: &SessionId,
        cancel: &CancellationToken,
    ) -> ApiResult<SimulationResponse>;
}
