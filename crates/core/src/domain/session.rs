use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::flows::states::FunnelState;

/// Durable conversation position of one end user. There is exactly one per
/// identity; it is reset to idle rather than deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub identity: String,
    pub state: FunnelState,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(identity: impl Into<String>) -> Self {
        Self { identity: identity.into(), state: FunnelState::Idle, updated_at: Utc::now() }
    }
}
