use serde::Serialize;
use utoipa::ToSchema;

/// Whether finished matches currently reach storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    /// No reachable store; results are held in memory.
    Degraded,
}

/// Payload of `GET /healthcheck`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
    /// Identified connections.
    pub online: usize,
    /// Sessions held in memory, including finished ones awaiting storage.
    pub sessions: usize,
}
