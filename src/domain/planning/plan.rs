//! Persisted plan state and the mutations rules propose against it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::dialog::DialogState;
use crate::domain::foundation::DialogId;

/// Event names the planning engine raises and routes through its rules.
pub mod planning_events {
    /// The planning dialog was begun this turn.
    pub const BEGIN_DIALOG: &str = "begin_dialog";
    /// The planning dialog is continuing with a fresh activity.
    pub const CONTINUE_DIALOG: &str = "continue_dialog";
    /// A message activity was recognized into intents and entities.
    pub const UTTERANCE_RECOGNIZED: &str = "utterance_recognized";
    /// Nothing claimed the utterance and no plan steps are pending.
    pub const FALLBACK: &str = "fallback";
    /// A fresh plan was installed.
    pub const PLAN_STARTED: &str = "plan_started";
    /// The active plan was pushed aside for a new one.
    pub const PLAN_SAVED: &str = "plan_saved";
    /// The active plan was discarded.
    pub const PLAN_ENDED: &str = "plan_ended";
    /// A saved plan became the active one again.
    pub const PLAN_RESUMED: &str = "plan_resumed";
}

/// One queued unit of work: the dialog to run and the nested stack it
/// runs on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub dialog_id: DialogId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    #[serde(default)]
    pub dialog_state: DialogState,
}

impl PlanStep {
    pub fn new(dialog_id: impl Into<DialogId>, options: Option<Value>) -> Self {
        Self {
            dialog_id: dialog_id.into(),
            options,
            dialog_state: DialogState::new(),
        }
    }

    /// Whether this step's nested stack is already in flight.
    pub fn started(&self) -> bool {
        !self.dialog_state.is_empty()
    }
}

/// An ordered queue of steps, optionally titled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

/// Everything a planning dialog persists inside its own frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanningState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanState>,
    #[serde(default)]
    pub saved_plans: Vec<PlanState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// The kinds of mutation a rule may propose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanChangeKind {
    BeginPlan,
    InsertBefore,
    AppendAfter,
    EndPlan,
}

/// One proposed mutation of the plan queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanChange {
    pub kind: PlanChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialog_id: Option<DialogId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl PlanChange {
    /// Installs a fresh plan, saving any active one.
    pub fn begin_plan(title: impl Into<String>) -> Self {
        Self {
            kind: PlanChangeKind::BeginPlan,
            title: Some(title.into()),
            dialog_id: None,
            options: None,
        }
    }

    /// Pushes a step to the front of the queue.
    pub fn insert_before(dialog_id: impl Into<DialogId>, options: Option<Value>) -> Self {
        Self {
            kind: PlanChangeKind::InsertBefore,
            title: None,
            dialog_id: Some(dialog_id.into()),
            options,
        }
    }

    /// Pushes a step to the back of the queue.
    pub fn append_after(dialog_id: impl Into<DialogId>, options: Option<Value>) -> Self {
        Self {
            kind: PlanChangeKind::AppendAfter,
            title: None,
            dialog_id: Some(dialog_id.into()),
            options,
        }
    }

    /// Ends the active plan, restoring the most recently saved one.
    pub fn end_plan() -> Self {
        Self {
            kind: PlanChangeKind::EndPlan,
            title: None,
            dialog_id: None,
            options: None,
        }
    }
}

/// An ordered batch of changes plus the match metadata `best_match`
/// ranks candidates by.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanChangeList {
    pub changes: Vec<PlanChange>,
    #[serde(default)]
    pub intents_matched: Vec<String>,
    #[serde(default)]
    pub entities_matched: Vec<String>,
}

impl PlanChangeList {
    pub fn new(changes: Vec<PlanChange>) -> Self {
        Self {
            changes,
            intents_matched: Vec::new(),
            entities_matched: Vec::new(),
        }
    }

    pub fn with_intents(mut self, intents: Vec<String>) -> Self {
        self.intents_matched = intents;
        self
    }

    pub fn with_entities(mut self, entities: Vec<String>) -> Self {
        self.entities_matched = entities;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn change_kind_serializes_snake_case() {
        let change = PlanChange::begin_plan("checkout");
        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(value["kind"], json!("begin_plan"));
        assert_eq!(value["title"], json!("checkout"));
    }

    #[test]
    fn fresh_step_is_not_started() {
        let mut step = PlanStep::new("greet", Some(json!({"x": 1})));
        assert!(!step.started());
        step.dialog_state
            .push(crate::domain::dialog::DialogInstance::new(
                crate::domain::foundation::DialogId::new("greet"),
                None,
            ));
        assert!(step.started());
    }

    #[test]
    fn planning_state_round_trips() {
        let state = PlanningState {
            options: Some(json!({"value": 7})),
            plan: Some(PlanState {
                title: Some("main".to_string()),
                steps: vec![PlanStep::new("ask", None)],
            }),
            saved_plans: vec![PlanState::default()],
            result: Some(json!(7)),
        };
        let text = serde_json::to_string(&state).unwrap();
        let back: PlanningState = serde_json::from_str(&text).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn empty_object_deserializes_to_defaults() {
        let state: PlanningState = serde_json::from_value(json!({})).unwrap();
        assert!(state.plan.is_none());
        assert!(state.saved_plans.is_empty());
    }
}
