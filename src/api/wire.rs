//! Request and response bodies of the remote simulation service
//!
//! Field names follow the service's JSON exactly. Anything the service may
//! omit is optional or defaulted so that a sparse response still decodes.

use crate::core::types::{ClientId, SessionId};
use crate::session::stage::LoadingStage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Application-level status carried by every response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Initializing,
    Error,
    #[default]
    #[serde(other)]
    Unknown,
}

/// True when a message announces that server-side initialization has begun
///
/// The service answers a successful create with `"Simulation initialization
/// started"`, and has been seen pairing that text with a non-success status.
/// Such a response is a success. Kept as the single place that decides it so
/// the quirk can be dropped once the service reports it consistently.
pub fn is_initialization_started(message: &str) -> bool {
    message.to_ascii_lowercase().contains("initialization started")
}

/// True when a start was refused only because loading has not finished
///
/// Covers both "Cannot start simulation until initialization is complete"
/// and "Simulation model is still initializing, please wait".
pub fn is_not_ready(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("until initialization is complete") || message.contains("still initializing")
}

/// Parameters of a new simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Country whose ports ban scrubber discharge, or "None"
    pub national_ban: String,
    /// Port-specific policy overrides, or "None"
    pub custom_port_policies: String,
    /// Requested simulation speed in frames per second
    pub fps: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_ships: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ship_wait_time: Option<u32>,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            national_ban: "None".to_string(),
            custom_port_policies: "None".to_string(),
            fps: 1.0,
            width: None,
            height: None,
            num_ships: None,
            ship_wait_time: None,
        }
    }
}

/// Body of create and reset calls
#[derive(Debug, Clone, Serialize)]
pub struct CreateRequest {
    #[serde(flatten)]
    pub params: SimulationParams,
    pub client_id: ClientId,
    pub is_developer_test: bool,
}

/// Body of the speed call
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SpeedRequest {
    pub fps: f64,
}

/// Reply to create, reset, start, stop, step, speed and delete
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationResponse {
    #[serde(default)]
    pub status: ResponseStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub simulation_id: Option<SessionId>,
    #[serde(default)]
    pub fps: Option<f64>,
    #[serde(default)]
    pub running: Option<bool>,
    #[serde(default)]
    pub loading_stage: Option<LoadingStage>,
    #[serde(default)]
    pub loading_progress: Option<f64>,
}

impl SimulationResponse {
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }
}

/// Outcome of a start call
///
/// A start refused because loading is still in progress is an ordinary
/// answer, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum StartReply {
    Started(SimulationResponse),
    NotReady {
        message: String,
        loading_stage: Option<LoadingStage>,
        loading_progress: Option<f64>,
    },
}

/// Full state snapshot returned by the state endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    #[serde(default)]
    pub status: ResponseStatus,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub step_count: u64,
    #[serde(default)]
    pub fps: Option<f64>,
    #[serde(default)]
    pub grid_state: Vec<Portrayal>,
    #[serde(default)]
    pub model_data: ModelData,
    #[serde(default)]
    pub loading_stage: Option<LoadingStage>,
    #[serde(default)]
    pub loading_progress: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// One drawable entity on the simulation grid: a port, ship, trail or terrain cell
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Portrayal {
    #[serde(rename = "Shape")]
    pub shape: String,
    #[serde(rename = "Color")]
    pub color: String,
    #[serde(rename = "Filled", default)]
    pub filled: String,
    #[serde(rename = "Layer", default)]
    pub layer: i32,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_capacity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_capacity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    /// Per-agent metadata (ship id, ship type, docking state, route progress, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Portrayal {
    pub fn is_port(&self) -> bool {
        self.port_name.is_some()
    }

    /// Ships are drawn as circles on the agent layer; trails share the shape on layer 0
    pub fn is_ship(&self) -> bool {
        self.shape == "circle" && self.layer >= 1
    }

    pub fn is_trail(&self) -> bool {
        self.shape == "circle" && self.layer == 0
    }
}

/// Entity counts of a grid snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridSummary {
    pub ports: usize,
    pub ships: usize,
    pub trails: usize,
}

impl GridSummary {
    pub fn of(grid: &[Portrayal]) -> Self {
        grid.iter().fold(Self::default(), |mut acc, p| {
            if p.is_port() {
                acc.ports += 1;
            } else if p.is_ship() {
                acc.ships += 1;
            } else if p.is_trail() {
                acc.trails += 1;
            }
            acc
        })
    }
}

/// Loosely typed aggregate of simulation metrics and chart series
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelData(pub Map<String, Value>);

impl ModelData {
    /// A scalar metric by its service key, e.g. `NumShips`
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn num_ships(&self) -> f64 {
        self.metric("NumShips").unwrap_or_default()
    }

    pub fn num_scrubber_ships(&self) -> f64 {
        self.metric("NumScrubberShips").unwrap_or_default()
    }

    pub fn total_docked_ships(&self) -> f64 {
        self.metric("TotalDockedShips").unwrap_or_default()
    }

    pub fn total_scrubber_water(&self) -> f64 {
        self.metric("TotalScrubberWater").unwrap_or_default()
    }

    /// Port names present in the revenue table, sorted
    pub fn revenue_ports(&self) -> Vec<String> {
        let mut ports: Vec<String> = self
            .0
            .get("PortRevenues")
            .and_then(Value::as_object)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        ports.sort();
        ports
    }

    /// Latest revenue of a port
    ///
    /// The service reports either a plain number or a time series of
    /// `{step, revenue}` points; for a series the last point wins.
    pub fn latest_port_revenue(&self, port: &str) -> Option<f64> {
        let entry = self.0.get("PortRevenues")?.get(port)?;
        match entry {
            Value::Number(n) => n.as_f64(),
            Value::Array(points) => points.last().and_then(|p| match p {
                Value::Number(n) => n.as_f64(),
                other => other.get("revenue").and_then(Value::as_f64),
            }),
            _ => None,
        }
    }
}
