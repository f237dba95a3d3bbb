//! Turn status and control-transfer reasons.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of driving a dialog stack for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogTurnStatus {
    /// The stack is empty; nothing is running.
    Empty,
    /// The active dialog is waiting for the next inbound activity.
    Waiting,
    /// The stack ran to completion this turn.
    Complete,
    /// The stack was cancelled this turn.
    Cancelled,
}

/// Why a dialog method is being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogReason {
    /// The dialog was started via `begin_dialog`.
    BeginCalled,
    /// The dialog was continued with a new activity.
    ContinueCalled,
    /// A dialog on the stack ended via `end_dialog`.
    EndCalled,
    /// A dialog was replaced via `replace_dialog`.
    ReplaceCalled,
    /// A dialog was cancelled via `cancel_all_dialogs`.
    CancelCalled,
    /// A sequential step advanced itself via `next()`.
    NextCalled,
}

/// Status plus the result forwarded out of a completed or cancelled stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogTurnResult {
    pub status: DialogTurnStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl DialogTurnResult {
    /// Result for an empty stack.
    pub fn empty() -> Self {
        Self {
            status: DialogTurnStatus::Empty,
            result: None,
        }
    }

    /// Result for a dialog pausing until the next activity.
    pub fn waiting() -> Self {
        Self {
            status: DialogTurnStatus::Waiting,
            result: None,
        }
    }

    /// Result for a completed stack, forwarding an optional value.
    pub fn complete(result: Option<Value>) -> Self {
        Self {
            status: DialogTurnStatus::Complete,
            result,
        }
    }

    /// Result for a cancelled stack, forwarding an optional value.
    pub fn cancelled(result: Option<Value>) -> Self {
        Self {
            status: DialogTurnStatus::Cancelled,
            result,
        }
    }
}
