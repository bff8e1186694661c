use chrono::{DateTime, Utc};
use serde::Serialize;

/// Point-in-time view of a pool, suitable for logging or health endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub name: String,
    pub max_size: usize,
    pub min_size: usize,
    /// Connections owned by the pool, whether idle or lent out.
    pub available: usize,
    pub idle: usize,
    /// Callers currently parked in `acquire`.
    pub waiting: usize,
    pub in_use: usize,
    pub opened: u64,
    pub retired: u64,
    pub timeouts: u64,
    /// Connections handed straight from `release`/`refresh` to a parked caller.
    pub handoffs: u64,
    pub captured_at: DateTime<Utc>,
}

impl PoolStatus {
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.available >= self.max_size
    }

    #[must_use]
    pub fn below_floor(&self) -> bool {
        self.max_size > 0 && self.available < self.min_size
    }

    /// Render as a single JSON line, falling back to `{}`.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
