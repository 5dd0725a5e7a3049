use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::GatewayError;

/// Opt-in permission for irreversible operations (snapshot delete/rollback, restore).
///
/// Decided once at startup and injected by value; there is no mutation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SafetyGate {
    enabled: bool,
}

impl SafetyGate {
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub const fn disabled() -> Self {
        Self::new(false)
    }

    pub const fn enabled() -> Self {
        Self::new(true)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Admit a destructive action, or reject it without side effects.
    pub fn admit(&self, action: &str) -> Result<(), GatewayError> {
        if self.enabled {
            return Ok(());
        }
        warn!(action, "Destructive action rejected, dangerous mode is off");
        Err(GatewayError::SafetyGateRejected {
            action: action.to_string(),
        })
    }
}
