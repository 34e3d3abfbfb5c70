use serde::Serialize;

/// Result of one fan-out; delivery counts are for logs and tests only
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryOutcome {
    pub conversation_id: String,
    pub message_id: String,
    pub timestamp: i64,
    /// Pushes issued
    pub attempted: usize,
    pub delivered: usize,
    /// Stale registry records removed after a `Gone` push
    pub stale_removed: usize,
    /// Pushes that failed for any other reason, including timeouts
    pub failed: usize,
}
