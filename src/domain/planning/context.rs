//! Queue-and-apply mutation core for plan state.
//!
//! Rules only propose; this context owns the queue and performs every
//! mutation strictly in the order proposed, reporting which lifecycle
//! events the mutations raised so the dialog can route them back through
//! its rules.

use std::collections::VecDeque;

use tracing::debug;

use super::plan::{planning_events, PlanChange, PlanChangeKind, PlanChangeList, PlanState, PlanStep, PlanningState};
use crate::domain::foundation::DialogError;

pub struct PlanningContext<'a> {
    state: &'a mut PlanningState,
    queued: VecDeque<PlanChangeList>,
}

impl<'a> PlanningContext<'a> {
    pub fn new(state: &'a mut PlanningState) -> Self {
        Self {
            state,
            queued: VecDeque::new(),
        }
    }

    pub fn state(&self) -> &PlanningState {
        self.state
    }

    pub fn state_mut(&mut self) -> &mut PlanningState {
        self.state
    }

    /// Whether the active plan has steps waiting to run.
    pub fn has_pending_steps(&self) -> bool {
        self.state
            .plan
            .as_ref()
            .map(|plan| !plan.steps.is_empty())
            .unwrap_or(false)
    }

    /// Adds a change list to the back of the queue.
    pub fn queue_changes(&mut self, changes: PlanChangeList) {
        if !changes.is_empty() {
            self.queued.push_back(changes);
        }
    }

    pub fn has_queued(&self) -> bool {
        !self.queued.is_empty()
    }

    /// Applies every queued change in order, returning the lifecycle
    /// events the mutations raised, in the order they happened.
    pub fn apply_changes(&mut self) -> Result<Vec<&'static str>, DialogError> {
        let mut events = Vec::new();
        while let Some(list) = self.queued.pop_front() {
            for change in list.changes {
                self.apply_one(change, &mut events)?;
            }
        }
        Ok(events)
    }

    fn apply_one(
        &mut self,
        change: PlanChange,
        events: &mut Vec<&'static str>,
    ) -> Result<(), DialogError> {
        match change.kind {
            PlanChangeKind::BeginPlan => {
                if let Some(current) = self.state.plan.take() {
                    debug!(title = ?current.title, "saving active plan");
                    self.state.saved_plans.push(current);
                    events.push(planning_events::PLAN_SAVED);
                }
                self.state.plan = Some(PlanState {
                    title: change.title,
                    steps: Vec::new(),
                });
                events.push(planning_events::PLAN_STARTED);
            }
            PlanChangeKind::InsertBefore | PlanChangeKind::AppendAfter => {
                let dialog_id = change.dialog_id.ok_or_else(|| {
                    DialogError::handler("plan change is missing a dialog id")
                })?;
                if self.state.plan.is_none() {
                    self.state.plan = Some(PlanState::default());
                    events.push(planning_events::PLAN_STARTED);
                }
                let step = PlanStep::new(dialog_id, change.options);
                if let Some(plan) = self.state.plan.as_mut() {
                    match change.kind {
                        PlanChangeKind::InsertBefore => plan.steps.insert(0, step),
                        _ => plan.steps.push(step),
                    }
                }
            }
            PlanChangeKind::EndPlan => {
                if let Some(previous) = self.state.saved_plans.pop() {
                    debug!(title = ?previous.title, "resuming saved plan");
                    self.state.plan = Some(previous);
                    events.push(planning_events::PLAN_RESUMED);
                } else if self.state.plan.take().is_some() {
                    events.push(planning_events::PLAN_ENDED);
                }
            }
        }
        Ok(())
    }
}
