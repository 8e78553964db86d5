//! Control Routes
//!
//! Manual device commands. Each handler validates the body and hands the
//! command to the publisher; a failed hand-off is reported to the caller.
//!
//! - POST /api/v1/control/door
//! - POST /api/v1/control/lamp
//! - POST /api/v1/control/curtain
//! - POST /api/v1/control/buzzer

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::dto::{
    BuzzerControlRequest, ControlResponse, CurtainControlRequest, DoorControlRequest,
    LampControlRequest,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::automation::AlarmAction;

const DEFAULT_DOOR_METHOD: &str = "remote";
const DEFAULT_MODE: &str = "manual";

/// Curtain position sent for `open`
pub const CURTAIN_OPEN_POSITION: i64 = 100;
/// Curtain position sent for `close`
pub const CURTAIN_CLOSED_POSITION: i64 = 0;

/// POST /api/v1/control/door
pub async fn control_door(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DoorControlRequest>,
) -> ApiResult<Json<ControlResponse>> {
    one_of("action", &req.action, &["lock", "unlock"])?;
    let method = non_blank(req.method.as_deref()).unwrap_or(DEFAULT_DOOR_METHOD);

    state.publisher.publish_door_control(&req.action, method).await?;

    Ok(Json(ControlResponse::sent(format!("Door {} sent", req.action))))
}

/// POST /api/v1/control/lamp
pub async fn control_lamp(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LampControlRequest>,
) -> ApiResult<Json<ControlResponse>> {
    one_of("action", &req.action, &["on", "off"])?;
    let mode = non_blank(req.mode.as_deref()).unwrap_or(DEFAULT_MODE);

    state.publisher.publish_lamp_control(&req.action, mode).await?;

    Ok(Json(ControlResponse::sent(format!("Lamp turned {}", req.action))))
}

/// POST /api/v1/control/curtain
pub async fn control_curtain(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CurtainControlRequest>,
) -> ApiResult<Json<ControlResponse>> {
    let (position, action) = curtain_target(&req)?;
    let mode = non_blank(req.mode.as_deref()).unwrap_or(DEFAULT_MODE);

    state
        .publisher
        .publish_curtain_control(position, mode, action)
        .await?;

    Ok(Json(ControlResponse::sent(format!(
        "Curtain position set to {}",
        position
    ))))
}

/// POST /api/v1/control/buzzer
pub async fn control_buzzer(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BuzzerControlRequest>,
) -> ApiResult<Json<ControlResponse>> {
    let action = match req.action.as_str() {
        "on" => AlarmAction::On,
        "off" => AlarmAction::Off,
        other => {
            return Err(ApiError::Validation(format!(
                "action must be one of on, off (got '{}')",
                other
            )))
        }
    };

    state.publisher.publish_buzzer_manual(action).await?;

    Ok(Json(ControlResponse::sent(format!("Buzzer turned {}", action))))
}

/// Resolve the requested position and the action to forward
fn curtain_target(req: &CurtainControlRequest) -> ApiResult<(i64, Option<&str>)> {
    match non_blank(req.action.as_deref()) {
        Some("open") => Ok((CURTAIN_OPEN_POSITION, Some("open"))),
        Some("close") => Ok((CURTAIN_CLOSED_POSITION, Some("close"))),
        Some(other) => Err(ApiError::Validation(format!(
            "action must be one of open, close (got '{}')",
            other
        ))),
        None => match req.position {
            Some(position) if (0..=100).contains(&position) => Ok((position, None)),
            Some(position) => Err(ApiError::Validation(format!(
                "position must be between 0 and 100 (got {})",
                position
            ))),
            None => Err(ApiError::Validation(
                "either position or action is required".to_string(),
            )),
        },
    }
}

fn one_of(field: &str, value: &str, allowed: &[&str]) -> ApiResult<()> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(ApiError::Validation(format!(
            "{} must be one of {} (got '{}')",
            field,
            allowed.join(", "),
            value
        )))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
