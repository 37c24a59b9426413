use serde::Serialize;
use utoipa::ToSchema;

/// Whether the service can currently record votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Poll store installed and answering.
    Ok,
    /// No usable poll store; votes and poll creation are refused.
    Degraded,
}

/// Response of the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Storage availability.
    pub status: HealthStatus,
    /// Polls with at least one live subscriber.
    pub open_rooms: usize,
}

impl HealthResponse {
    /// Build a response for `status` with the current room count.
    pub fn new(status: HealthStatus, open_rooms: usize) -> Self {
        Self { status, open_rooms }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_lowercase_status() {
        let value = serde_json::to_value(HealthResponse::new(HealthStatus::Degraded, 2)).unwrap();
        assert_eq!(value, serde_json::json!({"status": "degraded", "openRooms": 2}));
    }
}
