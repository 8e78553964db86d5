//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use serde::{Deserialize, Serialize};

use crate::persistence::PersistenceStats;

// ============================================
// CONTROL DTOs
// ============================================

/// POST /api/v1/control/door
#[derive(Debug, Deserialize)]
pub struct DoorControlRequest {
    /// `lock` or `unlock`
    pub action: String,
    /// Defaults to `remote`
    #[serde(default)]
    pub method: Option<String>,
}

/// POST /api/v1/control/lamp
#[derive(Debug, Deserialize)]
pub struct LampControlRequest {
    /// `on` or `off`
    pub action: String,
    /// Defaults to `manual`
    #[serde(default)]
    pub mode: Option<String>,
}

/// POST /api/v1/control/curtain
///
/// Either a position or an `open`/`close` action is required; the action
/// wins when both are given.
#[derive(Debug, Deserialize)]
pub struct CurtainControlRequest {
    /// Percent open, 0-100
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
}

/// POST /api/v1/control/buzzer
#[derive(Debug, Deserialize)]
pub struct BuzzerControlRequest {
    /// `on` or `off`
    pub action: String,
}

/// Response for every accepted control command
#[derive(Debug, Serialize, Deserialize)]
pub struct ControlResponse {
    pub success: bool,
    pub message: String,
}

impl ControlResponse {
    pub fn sent(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

// ============================================
// HEALTH DTOs
// ============================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "healthy" or "unhealthy"
    pub status: String,
    /// "ok" or "error"
    pub hub: String,
    /// Connected viewers, 0 if the hub is down
    pub viewers: usize,
    pub persistence: PersistenceStats,
    pub uptime_seconds: u64,
    pub version: String,
}
