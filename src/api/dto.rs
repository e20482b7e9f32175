use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::models::Severity;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MalfunctionLogDto {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub severity: Severity,
    pub description: String,
    pub motor_state: String,
    pub emergency_stop_active: bool,
    pub acknowledged: bool,
}

impl From<crate::db::models::MalfunctionLogEntry> for MalfunctionLogDto {
    fn from(l: crate::db::models::MalfunctionLogEntry) -> Self {
        Self {
            id: l.id,
            recorded_at: l.recorded_at,
            severity: l.severity,
            description: l.description,
            motor_state: l.motor_state,
            emergency_stop_active: l.emergency_stop_active,
            acknowledged: l.acknowledged,
        }
    }
}

/// Outcome of an acknowledge or delete action.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}
