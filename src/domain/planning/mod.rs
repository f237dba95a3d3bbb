//! Rule-directed planning on top of the dialog stack.
//!
//! A [`PlanningDialog`] owns a set of [`PlanningRule`]s. Each turn it
//! walks a fixed dispatch chain (begin/continue, activity received,
//! utterance recognized, fallback), lets rules propose [`PlanChange`]s,
//! applies them through a [`PlanningContext`], and drives the resulting
//! plan's steps as nested dialog stacks.

mod context;
mod dialog;
mod plan;
mod rules;

pub use context::PlanningContext;
pub use dialog::PlanningDialog;
pub use plan::{
    planning_events, PlanChange, PlanChangeKind, PlanChangeList, PlanState, PlanStep,
    PlanningState,
};
pub use rules::{EventRule, IntentRule, PlanningRule, RuleContext};
