//! Per-turn ambient state shared by every context in the tree.

use serde_json::Value;

use crate::domain::foundation::Activity;
use crate::ports::{MemoryError, TurnMemory};

/// Ambient state for one turn: the inbound activity, the queued outbound
/// responses, the bound memory scopes, and the one-shot marker for the
/// `activity_received` event.
pub struct TurnContext {
    activity: Activity,
    memory: Box<dyn TurnMemory>,
    responses: Vec<Activity>,
    activity_event_emitted: bool,
}

impl TurnContext {
    /// Creates the turn context for an inbound activity.
    pub fn new(activity: Activity, memory: Box<dyn TurnMemory>) -> Self {
        Self {
            activity,
            memory,
            responses: Vec::new(),
            activity_event_emitted: false,
        }
    }

    /// The inbound activity being processed.
    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    /// Read access to the turn's memory scopes.
    pub fn memory(&self) -> &dyn TurnMemory {
        self.memory.as_ref()
    }

    /// Write access to the turn's memory scopes.
    pub fn memory_mut(&mut self) -> &mut dyn TurnMemory {
        self.memory.as_mut()
    }

    /// Reads a memory value at a dotted path.
    pub fn get_value(&self, path: &str) -> Option<Value> {
        self.memory.get_value(path)
    }

    /// Writes a memory value at a dotted path.
    pub fn set_value(&mut self, path: &str, value: Value) -> Result<(), MemoryError> {
        self.memory.set_value(path, value)
    }

    /// Queues an outbound activity.
    pub fn send_activity(&mut self, activity: Activity) {
        self.responses.push(activity);
    }

    /// Queues an outbound message.
    pub fn send_message(&mut self, text: impl Into<String>) {
        self.responses.push(Activity::message(text));
    }

    /// The responses queued so far this turn.
    pub fn responses(&self) -> &[Activity] {
        &self.responses
    }

    /// Drains the queued responses.
    pub fn take_responses(&mut self) -> Vec<Activity> {
        std::mem::take(&mut self.responses)
    }

    /// Claims the one-shot `activity_received` dispatch for this turn.
    ///
    /// Returns true only for the first caller; `continue_dialog` uses this
    /// so re-entrant continues never re-raise the event.
    pub fn claim_activity_event(&mut self) -> bool {
        if self.activity_event_emitted {
            false
        } else {
            self.activity_event_emitted = true;
            true
        }
    }
}
