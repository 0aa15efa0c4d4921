//! Remote simulation service: wire types, paths, the service trait and its HTTP client

pub mod client;
pub mod paths;
pub mod service;
pub mod wire;

pub use client::HttpSimulationClient;
pub use service::{ApiResult, SimulationService};
pub use wire::{
    CreateRequest, GridSummary, ModelData, Portrayal, ResponseStatus, SimulationParams,
    SimulationResponse, SimulationState, StartReply,
};
