//! Execution gate: status derivation and leading-edge admission.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Externally visible lifecycle status of a debouncer.
///
/// Derived from state on every change, never assigned directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// `enabled` resolves false; overrides everything else.
    Disabled,
    /// An async execution is in flight.
    Executing,
    /// A trailing execution is scheduled.
    Pending,
    /// At least one async execution has settled and nothing is pending.
    Settled,
    #[default]
    Idle,
}

impl Status {
    /// Priority order: disabled, executing, pending, settled, idle.
    #[must_use]
    pub const fn derive(enabled: bool, is_executing: bool, is_pending: bool, settled: bool) -> Self {
        if !enabled {
            Self::Disabled
        } else if is_executing {
            Self::Executing
        } else if is_pending {
            Self::Pending
        } else if settled {
            Self::Settled
        } else {
            Self::Idle
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Executing => "executing",
            Self::Pending => "pending",
            Self::Settled => "settled",
            Self::Idle => "idle",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A call may execute on the leading edge only when leading is configured and
/// the previous burst has resolved.
#[must_use]
pub const fn admits_leading(leading: bool, can_leading_execute: bool) -> bool {
    leading && can_leading_execute
}
