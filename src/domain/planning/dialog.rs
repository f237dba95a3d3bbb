//! The planning dialog: rules propose plan changes, the turn loop runs
//! the resulting step queue.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::context::PlanningContext;
use super::plan::{planning_events, PlanStep, PlanState, PlanningState};
use super::rules::{EventRule, PlanningRule, RuleContext};
use crate::domain::dialog::{
    dialog_events, ContainerDialog, Dialog, DialogContext, DialogEvent, DialogInstance, DialogSet,
    DialogReason, DialogTurnResult, DialogTurnStatus, TurnContext,
};
use crate::domain::foundation::{Activity, ActivityKind, DialogError, DialogId};
use crate::ports::{Recognizer, RecognizerResult};

/// How a planning turn left the plan.
#[derive(Debug)]
enum PlanDrive {
    /// A step is waiting on the next activity.
    Waiting,
    /// No plan remains; the dialog should end itself.
    EndOfPlan,
    /// The planning frame itself was removed while a step ran.
    Detached,
}

#[derive(Debug)]
enum StepOutcome {
    Waiting,
    Cancelled,
    Done,
    Detached,
}

/// A dialog whose behavior is a plan: rules watch events and queue
/// steps, the dialog drives the front step's nested stack until the
/// queue drains.
pub struct PlanningDialog {
    id: DialogId,
    dialogs: DialogSet,
    rules: Vec<Arc<dyn PlanningRule>>,
    recognizer: Option<Arc<dyn Recognizer>>,
}

impl PlanningDialog {
    pub fn new(id: impl Into<DialogId>) -> Self {
        Self {
            id: id.into(),
            dialogs: DialogSet::new(),
            rules: Vec::new(),
            recognizer: None,
        }
    }

    /// Builds a planning dialog whose single rule queues `steps` in
    /// order when the dialog begins: the common fixed-script case.
    pub fn sequence(id: impl Into<DialogId>, steps: Vec<PlanStep>) -> Self {
        Self::new(id).add_rule(Arc::new(
            EventRule::new([planning_events::BEGIN_DIALOG]).run_steps(steps),
        ))
    }

    /// Registers a dialog plan steps may target.
    pub fn add_dialog(mut self, dialog: Arc<dyn Dialog>) -> Result<Self, DialogError> {
        self.dialogs.add(dialog)?;
        Ok(self)
    }

    /// Appends a rule; registration order is the first_match order and
    /// the best_match tie-breaker.
    pub fn add_rule(mut self, rule: Arc<dyn PlanningRule>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn Recognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    fn state_from_value(value: Value) -> Result<PlanningState, DialogError> {
        if value.is_null() {
            return Ok(PlanningState::default());
        }
        Ok(serde_json::from_value(value)?)
    }

    fn take_state(&self, dc: &mut DialogContext<'_>) -> Result<PlanningState, DialogError> {
        let instance = dc.active_dialog_mut().ok_or(DialogError::NoActiveDialog)?;
        Self::state_from_value(instance.state.take())
    }

    fn store_state(
        &self,
        dc: &mut DialogContext<'_>,
        guard: Option<String>,
        state: &PlanningState,
    ) -> Result<(), DialogError> {
        if guard.is_none() || dc.unique_instance_id() != guard {
            debug!(dialog = %self.id, "planning frame gone; dropping state");
            return Ok(());
        }
        let instance = dc.active_dialog_mut().ok_or(DialogError::NoActiveDialog)?;
        instance.state = serde_json::to_value(state)?;
        Ok(())
    }

    async fn recognize(&self, activity: &Activity) -> Result<RecognizerResult, DialogError> {
        match &self.recognizer {
            Some(recognizer) => {
                let result = recognizer.recognize(activity).await?;
                if result.intents.is_empty() {
                    Ok(RecognizerResult::none(activity.text.clone()))
                } else {
                    Ok(result)
                }
            }
            None => Ok(RecognizerResult::none(activity.text.clone())),
        }
    }

    async fn run_turn(
        &self,
        dc: &mut DialogContext<'_>,
        state: &mut PlanningState,
        first: &'static str,
        first_value: Option<Value>,
    ) -> Result<PlanDrive, DialogError> {
        debug!(dialog = %self.id, event = first, "running planning turn");
        let mut recognized: Option<RecognizerResult> = None;
        let mut pc = PlanningContext::new(state);
        self.dispatch_chain(dc.turn(), &mut pc, first, first_value, &mut recognized)
            .await?;
        self.drive(dc, &mut pc, &recognized).await
    }

    /// The fixed fall-through sequence of dispatch events for one turn.
    async fn dispatch_chain(
        &self,
        turn: &TurnContext,
        pc: &mut PlanningContext<'_>,
        first: &'static str,
        first_value: Option<Value>,
        recognized: &mut Option<RecognizerResult>,
    ) -> Result<(), DialogError> {
        let mut name = first.to_string();
        let mut value = first_value;
        loop {
            if self
                .match_rules(turn, pc, &name, value.take(), recognized.as_ref())
                .await?
            {
                return Ok(());
            }
            match name.as_str() {
                planning_events::BEGIN_DIALOG | planning_events::CONTINUE_DIALOG => {
                    name = dialog_events::ACTIVITY_RECEIVED.to_string();
                }
                dialog_events::ACTIVITY_RECEIVED => {
                    let activity = turn.activity();
                    match activity.kind {
                        ActivityKind::Message => {
                            let result = self.recognize(activity).await?;
                            debug!(intents = result.intents.len(), "utterance recognized");
                            *recognized = Some(result);
                            name = planning_events::UTTERANCE_RECOGNIZED.to_string();
                        }
                        ActivityKind::Event => {
                            // One shot under the event's own name, no
                            // further fall-through.
                            if let Some(event_name) = activity.name.clone() {
                                self.match_rules(
                                    turn,
                                    pc,
                                    &event_name,
                                    activity.value.clone(),
                                    recognized.as_ref(),
                                )
                                .await?;
                            }
                            return Ok(());
                        }
                        _ => return Ok(()),
                    }
                }
                planning_events::UTTERANCE_RECOGNIZED => {
                    if pc.has_pending_steps() {
                        return Ok(());
                    }
                    name = planning_events::FALLBACK.to_string();
                }
                _ => return Ok(()),
            }
        }
    }

    async fn match_rules(
        &self,
        turn: &TurnContext,
        pc: &mut PlanningContext<'_>,
        name: &str,
        value: Option<Value>,
        recognized: Option<&RecognizerResult>,
    ) -> Result<bool, DialogError> {
        if name == planning_events::UTTERANCE_RECOGNIZED {
            self.best_match(turn, pc, name, value, recognized).await
        } else {
            self.first_match(turn, pc, name, value, recognized).await
        }
    }

    /// Queues the first non-empty change list in registration order.
    async fn first_match(
        &self,
        turn: &TurnContext,
        pc: &mut PlanningContext<'_>,
        name: &str,
        value: Option<Value>,
        recognized: Option<&RecognizerResult>,
    ) -> Result<bool, DialogError> {
        let event = DialogEvent::new(name, value, false);
        let mut winner = None;
        {
            let ctx = RuleContext::new(turn, pc.state(), recognized);
            for rule in &self.rules {
                if !rule.events().iter().any(|candidate| candidate == name) {
                    continue;
                }
                if let Some(changes) = rule.evaluate(&ctx, &event).await? {
                    if !changes.is_empty() {
                        winner = Some(changes);
                        break;
                    }
                }
            }
        }
        match winner {
            Some(changes) => {
                pc.queue_changes(changes);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Collects every candidate, then queues winners by specificity,
    /// discarding candidates whose matched intents were already consumed.
    async fn best_match(
        &self,
        turn: &TurnContext,
        pc: &mut PlanningContext<'_>,
        name: &str,
        value: Option<Value>,
        recognized: Option<&RecognizerResult>,
    ) -> Result<bool, DialogError> {
        let event = DialogEvent::new(name, value, false);
        let mut candidates = Vec::new();
        {
            let ctx = RuleContext::new(turn, pc.state(), recognized);
            for rule in &self.rules {
                if !rule.events().iter().any(|candidate| candidate == name) {
                    continue;
                }
                if let Some(changes) = rule.evaluate(&ctx, &event).await? {
                    if !changes.is_empty() {
                        candidates.push(changes);
                    }
                }
            }
        }
        let winners = Self::rank_candidates(candidates);
        let handled = !winners.is_empty();
        for changes in winners {
            pc.queue_changes(changes);
        }
        Ok(handled)
    }

    /// More matched intents wins; ties go to more matched entities, then
    /// to registration order. Consuming a winner drops every remaining
    /// candidate sharing one of its intents; disjoint candidates (and
    /// candidates with no intents at all) stay eligible.
    fn rank_candidates(
        mut candidates: Vec<super::plan::PlanChangeList>,
    ) -> Vec<super::plan::PlanChangeList> {
        let mut winners = Vec::new();
        while !candidates.is_empty() {
            let mut best = 0;
            for index in 1..candidates.len() {
                let stronger = match candidates[index]
                    .intents_matched
                    .len()
                    .cmp(&candidates[best].intents_matched.len())
                {
                    Ordering::Greater => true,
                    Ordering::Equal => {
                        candidates[index].entities_matched.len()
                            > candidates[best].entities_matched.len()
                    }
                    Ordering::Less => false,
                };
                if stronger {
                    best = index;
                }
            }
            let chosen = candidates.remove(best);
            let consumed: HashSet<String> = chosen.intents_matched.iter().cloned().collect();
            candidates.retain(|candidate| {
                !candidate
                    .intents_matched
                    .iter()
                    .any(|intent| consumed.contains(intent))
            });
            winners.push(chosen);
        }
        winners
    }

    /// Applies queued changes and drives the step queue until something
    /// waits or the plan drains.
    async fn drive(
        &self,
        dc: &mut DialogContext<'_>,
        pc: &mut PlanningContext<'_>,
        recognized: &Option<RecognizerResult>,
    ) -> Result<PlanDrive, DialogError> {
        let mut first_drive = true;
        loop {
            // Mutations first; their lifecycle events go back through the
            // rules, which may queue more.
            while pc.has_queued() {
                let lifecycle = pc.apply_changes()?;
                for event in lifecycle {
                    self.first_match(dc.turn(), pc, event, None, recognized.as_ref())
                        .await?;
                }
            }
            let (has_plan, steps_empty, front_started) = match pc.state().plan.as_ref() {
                None => (false, true, false),
                Some(plan) => (
                    true,
                    plan.steps.is_empty(),
                    plan.steps.first().map(PlanStep::started).unwrap_or(false),
                ),
            };
            if !has_plan {
                return Ok(PlanDrive::EndOfPlan);
            }
            if steps_empty {
                let event = {
                    let state = pc.state_mut();
                    if let Some(previous) = state.saved_plans.pop() {
                        state.plan = Some(previous);
                        planning_events::PLAN_RESUMED
                    } else {
                        state.plan = None;
                        planning_events::PLAN_ENDED
                    }
                };
                self.first_match(dc.turn(), pc, event, None, recognized.as_ref())
                    .await?;
                continue;
            }
            if !first_drive && front_started {
                // This step was mid-flight before the turn's work reached
                // it; its prompt went stale. Re-ask rather than feed it an
                // activity meant for someone else.
                self.reprompt_front(dc, pc).await?;
                return Ok(PlanDrive::Waiting);
            }
            first_drive = false;
            match self.drive_front(dc, pc).await? {
                StepOutcome::Waiting => return Ok(PlanDrive::Waiting),
                StepOutcome::Detached => return Ok(PlanDrive::Detached),
                StepOutcome::Cancelled => {
                    // A cancelled step takes the rest of its plan with it.
                    if let Some(plan) = pc.state_mut().plan.as_mut() {
                        plan.steps.clear();
                    }
                }
                StepOutcome::Done => {
                    if let Some(plan) = pc.state_mut().plan.as_mut() {
                        if !plan.steps.is_empty() {
                            plan.steps.remove(0);
                        }
                    }
                }
            }
        }
    }

    /// Runs the front step's nested stack: continue, or begin when the
    /// continue reports an empty stack.
    async fn drive_front(
        &self,
        dc: &mut DialogContext<'_>,
        pc: &mut PlanningContext<'_>,
    ) -> Result<StepOutcome, DialogError> {
        let guard = dc.unique_instance_id();
        let (dialog_id, options, mut step_state) = {
            let Some(step) = pc
                .state_mut()
                .plan
                .as_mut()
                .and_then(|plan| plan.steps.first_mut())
            else {
                return Ok(StepOutcome::Done);
            };
            (
                step.dialog_id.clone(),
                step.options.clone(),
                std::mem::take(&mut step.dialog_state),
            )
        };
        debug!(dialog = %dialog_id, "driving plan step");
        let result = {
            let mut child = DialogContext::new_child(&self.dialogs, &mut *dc, &mut step_state);
            match child.continue_dialog().await {
                Ok(outcome) if outcome.status == DialogTurnStatus::Empty => {
                    child.begin_dialog(&dialog_id, options).await
                }
                other => other,
            }
        };
        let detached = guard.is_none() || dc.unique_instance_id() != guard;
        if !detached {
            if let Some(step) = pc
                .state_mut()
                .plan
                .as_mut()
                .and_then(|plan| plan.steps.first_mut())
            {
                step.dialog_state = step_state;
            }
        }
        let result = result?;
        if detached {
            debug!(dialog = %self.id, "planning frame gone; abandoning plan");
            return Ok(StepOutcome::Detached);
        }
        Ok(match result.status {
            DialogTurnStatus::Waiting => StepOutcome::Waiting,
            DialogTurnStatus::Cancelled => StepOutcome::Cancelled,
            _ => StepOutcome::Done,
        })
    }

    async fn reprompt_front(
        &self,
        dc: &mut DialogContext<'_>,
        pc: &mut PlanningContext<'_>,
    ) -> Result<(), DialogError> {
        let mut step_state = {
            let Some(step) = pc
                .state_mut()
                .plan
                .as_mut()
                .and_then(|plan| plan.steps.first_mut())
            else {
                return Ok(());
            };
            std::mem::take(&mut step.dialog_state)
        };
        let result = {
            let mut child = DialogContext::new_child(&self.dialogs, &mut *dc, &mut step_state);
            child.reprompt_dialog().await
        };
        if let Some(step) = pc
            .state_mut()
            .plan
            .as_mut()
            .and_then(|plan| plan.steps.first_mut())
        {
            step.dialog_state = step_state;
        }
        result
    }

    async fn cancel_plan_steps(
        dialogs: &DialogSet,
        turn: &mut TurnContext,
        plan: &mut PlanState,
    ) -> Result<(), DialogError> {
        for step in plan.steps.iter_mut() {
            if step.dialog_state.is_empty() {
                continue;
            }
            let mut step_state = std::mem::take(&mut step.dialog_state);
            let result = {
                let mut child = DialogContext::new_root(dialogs, &mut *turn, &mut step_state);
                child.cancel_all_dialogs(false, None, None).await
            };
            step.dialog_state = step_state;
            result?;
        }
        Ok(())
    }
}

#[async_trait]
impl Dialog for PlanningDialog {
    fn id(&self) -> &DialogId {
        &self.id
    }

    fn container(&self) -> Option<&dyn ContainerDialog> {
        Some(self)
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        options: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        let guard = dc.unique_instance_id();
        let mut state = self.take_state(dc)?;
        state.result = options.as_ref().and_then(|opts| opts.get("value")).cloned();
        state.options = options.clone();
        let drive = self
            .run_turn(dc, &mut state, planning_events::BEGIN_DIALOG, options)
            .await;
        self.store_state(dc, guard, &state)?;
        match drive? {
            PlanDrive::Waiting => Ok(DialogTurnResult::waiting()),
            PlanDrive::EndOfPlan => dc.end_dialog(state.result.take()).await,
            PlanDrive::Detached => Ok(DialogTurnResult::cancelled(None)),
        }
    }

    async fn continue_dialog(
        &self,
        dc: &mut DialogContext<'_>,
    ) -> Result<DialogTurnResult, DialogError> {
        let guard = dc.unique_instance_id();
        let mut state = self.take_state(dc)?;
        let drive = self
            .run_turn(dc, &mut state, planning_events::CONTINUE_DIALOG, None)
            .await;
        self.store_state(dc, guard, &state)?;
        match drive? {
            PlanDrive::Waiting => Ok(DialogTurnResult::waiting()),
            PlanDrive::EndOfPlan => dc.end_dialog(state.result.take()).await,
            PlanDrive::Detached => Ok(DialogTurnResult::cancelled(None)),
        }
    }

    async fn resume_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        _reason: DialogReason,
        _result: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        // A dialog an ancestor pushed above us just ended; re-prompt the
        // front step rather than treating it as our own completion.
        if let Some((turn, instance)) = dc.split_active_and_turn() {
            self.reprompt_dialog(turn, instance).await?;
        }
        Ok(DialogTurnResult::waiting())
    }

    async fn reprompt_dialog(
        &self,
        turn: &mut TurnContext,
        instance: &mut DialogInstance,
    ) -> Result<(), DialogError> {
        let mut state = Self::state_from_value(instance.state.take())?;
        let mut outcome = Ok(());
        if let Some(step) = state.plan.as_mut().and_then(|plan| plan.steps.first_mut()) {
            let mut step_state = std::mem::take(&mut step.dialog_state);
            outcome = {
                let mut child = DialogContext::new_root(&self.dialogs, &mut *turn, &mut step_state);
                child.reprompt_dialog().await
            };
            step.dialog_state = step_state;
        }
        instance.state = serde_json::to_value(&state)?;
        outcome
    }

    async fn end_dialog(
        &self,
        turn: &mut TurnContext,
        instance: &mut DialogInstance,
        reason: DialogReason,
    ) -> Result<(), DialogError> {
        if reason != DialogReason::CancelCalled {
            return Ok(());
        }
        // Every nested step stack gets cancelled, saved plans included,
        // before the planning state goes away.
        let mut state = Self::state_from_value(instance.state.take())?;
        let mut outcome = Ok(());
        if let Some(plan) = state.plan.as_mut() {
            outcome = Self::cancel_plan_steps(&self.dialogs, turn, plan).await;
        }
        if outcome.is_ok() {
            for plan in state.saved_plans.iter_mut() {
                outcome = Self::cancel_plan_steps(&self.dialogs, turn, plan).await;
                if outcome.is_err() {
                    break;
                }
            }
        }
        state.plan = None;
        state.saved_plans.clear();
        instance.state = serde_json::to_value(&state)?;
        outcome
    }
}

#[async_trait]
impl ContainerDialog for PlanningDialog {
    async fn emit_at_leaf(
        &self,
        dc: &mut DialogContext<'_>,
        event: DialogEvent,
    ) -> Result<bool, DialogError> {
        let guard = dc.unique_instance_id();
        let mut state = self.take_state(dc)?;
        let result = match state.plan.as_mut().and_then(|plan| plan.steps.first_mut()) {
            Some(step) => {
                let mut step_state = std::mem::take(&mut step.dialog_state);
                let handled = {
                    let mut child =
                        DialogContext::new_child(&self.dialogs, &mut *dc, &mut step_state);
                    child.dispatch_at_leaf(event).await
                };
                step.dialog_state = step_state;
                handled
            }
            None => Ok(false),
        };
        self.store_state(dc, guard, &state)?;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::LayeredMemory;
    use crate::domain::dialog::{AskText, DialogState, SendMessage};
    use crate::domain::planning::{IntentRule, PlanChange};
    use crate::ports::{IntentScore, RecognizerError};
    use serde_json::json;

    fn message_turn(text: &str) -> TurnContext {
        TurnContext::new(Activity::message(text), Box::new(LayeredMemory::new()))
    }

    /// Substring-to-intent recognizer.
    struct MapRecognizer {
        intents: Vec<(&'static str, &'static str)>,
    }

    #[async_trait]
    impl Recognizer for MapRecognizer {
        async fn recognize(&self, activity: &Activity) -> Result<RecognizerResult, RecognizerError> {
            let text = activity.text.clone().unwrap_or_default().to_lowercase();
            let mut result = RecognizerResult::none(activity.text.clone());
            result.intents.clear();
            for (needle, intent) in &self.intents {
                if text.contains(needle) {
                    result
                        .intents
                        .insert((*intent).to_string(), IntentScore { score: 0.9 });
                }
            }
            Ok(result)
        }
    }

    /// Waits on begin and reports every lifecycle hook it sees.
    struct Probe {
        id: DialogId,
    }

    impl Probe {
        fn new(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: DialogId::new(id),
            })
        }
    }

    #[async_trait]
    impl Dialog for Probe {
        fn id(&self) -> &DialogId {
            &self.id
        }

        async fn begin_dialog(
            &self,
            dc: &mut DialogContext<'_>,
            _options: Option<Value>,
        ) -> Result<DialogTurnResult, DialogError> {
            dc.turn_mut().send_message(format!("ask:{}", self.id));
            Ok(DialogTurnResult::waiting())
        }

        async fn continue_dialog(
            &self,
            dc: &mut DialogContext<'_>,
        ) -> Result<DialogTurnResult, DialogError> {
            let text = dc.turn().activity().text_or_empty().to_string();
            dc.end_dialog(Some(Value::String(text))).await
        }

        async fn reprompt_dialog(
            &self,
            turn: &mut TurnContext,
            _instance: &mut DialogInstance,
        ) -> Result<(), DialogError> {
            turn.send_message(format!("re:{}", self.id));
            Ok(())
        }

        async fn end_dialog(
            &self,
            turn: &mut TurnContext,
            _instance: &mut DialogInstance,
            reason: DialogReason,
        ) -> Result<(), DialogError> {
            turn.send_message(format!("ended:{}:{:?}", self.id, reason));
            Ok(())
        }
    }

    fn name_bot() -> PlanningDialog {
        PlanningDialog::sequence(
            "flow",
            vec![PlanStep::new("ask-name", None), PlanStep::new("greet", None)],
        )
        .add_dialog(Arc::new(AskText::new(
            "ask-name",
            "What is your name?",
            "user.name",
        )))
        .unwrap()
        .add_dialog(Arc::new(SendMessage::new("greet", "Hello, {user.name}!")))
        .unwrap()
    }

    fn responses(turn: &TurnContext) -> Vec<&str> {
        turn.responses().iter().map(|a| a.text_or_empty()).collect()
    }

    #[tokio::test]
    async fn sequence_runs_its_steps_across_turns() {
        let mut set = DialogSet::new();
        set.add(Arc::new(name_bot())).unwrap();
        let mut state = DialogState::new();
        {
            let mut turn = message_turn("hi");
            let mut dc = DialogContext::new_root(&set, &mut turn, &mut state);
            let result = dc.begin_dialog(&DialogId::new("flow"), None).await.unwrap();
            assert_eq!(result.status, DialogTurnStatus::Waiting);
            assert_eq!(responses(&turn), vec!["What is your name?"]);
        }

        // Round-trip the persisted stack between turns, like a store does.
        let frozen = serde_json::to_string(&state).unwrap();
        let mut thawed: DialogState = serde_json::from_str(&frozen).unwrap();

        let mut turn = message_turn("Ada");
        let mut dc = DialogContext::new_root(&set, &mut turn, &mut thawed);
        let result = dc.continue_dialog().await.unwrap();

        assert_eq!(result.status, DialogTurnStatus::Complete);
        assert_eq!(responses(&turn), vec!["Hello, Ada!"]);
        assert!(thawed.is_empty());
    }

    #[tokio::test]
    async fn intent_rule_interrupts_and_the_plan_reprompts() {
        let bot = name_bot()
            .add_rule(Arc::new(
                IntentRule::new("help").run_steps(vec![PlanStep::new("help-msg", None)]),
            ))
            .add_dialog(Arc::new(SendMessage::new("help-msg", "Ask me for a name.")))
            .unwrap()
            .with_recognizer(Arc::new(MapRecognizer {
                intents: vec![("help", "help")],
            }));
        let mut set = DialogSet::new();
        set.add(Arc::new(bot)).unwrap();
        let mut state = DialogState::new();
        {
            let mut turn = message_turn("hi");
            let mut dc = DialogContext::new_root(&set, &mut turn, &mut state);
            dc.begin_dialog(&DialogId::new("flow"), None).await.unwrap();
        }

        {
            let mut turn = message_turn("help me out");
            let mut dc = DialogContext::new_root(&set, &mut turn, &mut state);
            let result = dc.continue_dialog().await.unwrap();
            assert_eq!(result.status, DialogTurnStatus::Waiting);
            assert_eq!(
                responses(&turn),
                vec!["Ask me for a name.", "What is your name?"]
            );
        }

        let mut turn = message_turn("Ada");
        let mut dc = DialogContext::new_root(&set, &mut turn, &mut state);
        let result = dc.continue_dialog().await.unwrap();
        assert_eq!(result.status, DialogTurnStatus::Complete);
        assert_eq!(responses(&turn), vec!["Hello, Ada!"]);
    }

    #[tokio::test]
    async fn best_match_applies_the_specific_rule_and_drops_the_overlap() {
        let bot = PlanningDialog::new("orders")
            .add_rule(Arc::new(
                IntentRule::new("order").run_steps(vec![PlanStep::new("generic", None)]),
            ))
            .add_rule(Arc::new(
                IntentRule::new("order")
                    .and_intent("pizza")
                    .run_steps(vec![PlanStep::new("pizza-flow", None)]),
            ))
            .add_dialog(Arc::new(SendMessage::new("generic", "What would you like?")))
            .unwrap()
            .add_dialog(Arc::new(SendMessage::new("pizza-flow", "One pizza coming up.")))
            .unwrap()
            .with_recognizer(Arc::new(MapRecognizer {
                intents: vec![("order", "order"), ("pizza", "pizza")],
            }));
        let mut set = DialogSet::new();
        set.add(Arc::new(bot)).unwrap();
        let mut turn = message_turn("order a pizza");
        let mut state = DialogState::new();
        let mut dc = DialogContext::new_root(&set, &mut turn, &mut state);

        let result = dc.begin_dialog(&DialogId::new("orders"), None).await.unwrap();

        assert_eq!(result.status, DialogTurnStatus::Complete);
        assert_eq!(responses(&turn), vec!["One pizza coming up."]);
    }

    #[tokio::test]
    async fn side_plan_saves_the_main_plan_and_resuming_reprompts() {
        let bot = name_bot()
            .add_rule(Arc::new(
                IntentRule::new("side")
                    .with_change(PlanChange::begin_plan("side"))
                    .run_steps(vec![PlanStep::new("side-note", None)]),
            ))
            .add_dialog(Arc::new(SendMessage::new("side-note", "Noted.")))
            .unwrap()
            .with_recognizer(Arc::new(MapRecognizer {
                intents: vec![("remind", "side")],
            }));
        let mut set = DialogSet::new();
        set.add(Arc::new(bot)).unwrap();
        let mut state = DialogState::new();
        {
            let mut turn = message_turn("hi");
            let mut dc = DialogContext::new_root(&set, &mut turn, &mut state);
            dc.begin_dialog(&DialogId::new("flow"), None).await.unwrap();
        }

        {
            let mut turn = message_turn("remind me later");
            let mut dc = DialogContext::new_root(&set, &mut turn, &mut state);
            let result = dc.continue_dialog().await.unwrap();
            assert_eq!(result.status, DialogTurnStatus::Waiting);
            // Side plan ran, then the restored main plan re-asked.
            assert_eq!(responses(&turn), vec!["Noted.", "What is your name?"]);
        }

        let mut turn = message_turn("Ada");
        let mut dc = DialogContext::new_root(&set, &mut turn, &mut state);
        let result = dc.continue_dialog().await.unwrap();
        assert_eq!(result.status, DialogTurnStatus::Complete);
        assert_eq!(responses(&turn), vec!["Hello, Ada!"]);
    }

    #[tokio::test]
    async fn fallback_fires_only_when_no_steps_are_pending() {
        let fallback_rule = || {
            Arc::new(
                EventRule::new([planning_events::FALLBACK])
                    .run_steps(vec![PlanStep::new("nudge", None)]),
            )
        };

        // Without a plan, an unclaimed utterance reaches the fallback.
        let idle_bot = PlanningDialog::new("idle")
            .add_rule(fallback_rule())
            .add_dialog(Arc::new(SendMessage::new("nudge", "Try asking for help.")))
            .unwrap();
        let mut set = DialogSet::new();
        set.add(Arc::new(idle_bot)).unwrap();
        let mut turn = message_turn("xyzzy");
        let mut state = DialogState::new();
        let mut dc = DialogContext::new_root(&set, &mut turn, &mut state);
        dc.begin_dialog(&DialogId::new("idle"), None).await.unwrap();
        assert_eq!(responses(&turn), vec!["Try asking for help."]);

        // With steps pending, the same utterance feeds the plan instead.
        let busy_bot = name_bot()
            .add_rule(fallback_rule())
            .add_dialog(Arc::new(SendMessage::new("nudge", "Try asking for help.")))
            .unwrap();
        let mut set = DialogSet::new();
        set.add(Arc::new(busy_bot)).unwrap();
        let mut state = DialogState::new();
        {
            let mut turn = message_turn("hi");
            let mut dc = DialogContext::new_root(&set, &mut turn, &mut state);
            dc.begin_dialog(&DialogId::new("flow"), None).await.unwrap();
        }
        let mut turn = message_turn("Ada");
        let mut dc = DialogContext::new_root(&set, &mut turn, &mut state);
        let result = dc.continue_dialog().await.unwrap();
        assert_eq!(result.status, DialogTurnStatus::Complete);
        assert_eq!(responses(&turn), vec!["Hello, Ada!"]);
    }

    #[tokio::test]
    async fn event_activities_dispatch_under_their_own_name() {
        let bot = name_bot()
            .add_rule(Arc::new(
                EventRule::new(["order_placed"]).run_steps(vec![PlanStep::new("confirm", None)]),
            ))
            .add_dialog(Arc::new(SendMessage::new("confirm", "Order confirmed.")))
            .unwrap();
        let mut set = DialogSet::new();
        set.add(Arc::new(bot)).unwrap();
        let mut state = DialogState::new();
        {
            let mut turn = message_turn("hi");
            let mut dc = DialogContext::new_root(&set, &mut turn, &mut state);
            dc.begin_dialog(&DialogId::new("flow"), None).await.unwrap();
        }

        let mut turn = TurnContext::new(
            Activity::event("order_placed", Some(json!({"sku": 7}))),
            Box::new(LayeredMemory::new()),
        );
        let mut dc = DialogContext::new_root(&set, &mut turn, &mut state);
        let result = dc.continue_dialog().await.unwrap();

        assert_eq!(result.status, DialogTurnStatus::Waiting);
        assert_eq!(
            responses(&turn),
            vec!["Order confirmed.", "What is your name?"]
        );
    }

    #[tokio::test]
    async fn teardown_cancels_step_stacks_in_current_and_saved_plans() {
        let bot = PlanningDialog::sequence("flow", vec![PlanStep::new("probe-main", None)])
            .add_dialog(Probe::new("probe-main"))
            .unwrap()
            .add_rule(Arc::new(
                IntentRule::new("side")
                    .with_change(PlanChange::begin_plan("side"))
                    .run_steps(vec![PlanStep::new("probe-side", None)]),
            ))
            .add_dialog(Probe::new("probe-side"))
            .unwrap()
            .with_recognizer(Arc::new(MapRecognizer {
                intents: vec![("remind", "side")],
            }));
        let mut set = DialogSet::new();
        set.add(Arc::new(bot)).unwrap();
        let mut state = DialogState::new();
        {
            let mut turn = message_turn("hi");
            let mut dc = DialogContext::new_root(&set, &mut turn, &mut state);
            dc.begin_dialog(&DialogId::new("flow"), None).await.unwrap();
        }
        {
            let mut turn = message_turn("remind me");
            let mut dc = DialogContext::new_root(&set, &mut turn, &mut state);
            let result = dc.continue_dialog().await.unwrap();
            assert_eq!(result.status, DialogTurnStatus::Waiting);
        }

        let mut turn = message_turn("stop");
        let mut dc = DialogContext::new_root(&set, &mut turn, &mut state);
        let result = dc.cancel_all_dialogs(false, None, None).await.unwrap();

        assert_eq!(result.status, DialogTurnStatus::Cancelled);
        assert!(state.is_empty());
        let texts = responses(&turn);
        assert!(texts.contains(&"ended:probe-side:CancelCalled"));
        assert!(texts.contains(&"ended:probe-main:CancelCalled"));
    }

    #[tokio::test]
    async fn unknown_step_target_fails_with_not_found() {
        let bot = PlanningDialog::sequence("flow", vec![PlanStep::new("ghost", None)]);
        let mut set = DialogSet::new();
        set.add(Arc::new(bot)).unwrap();
        let mut turn = message_turn("hi");
        let mut state = DialogState::new();
        let mut dc = DialogContext::new_root(&set, &mut turn, &mut state);

        let err = dc
            .begin_dialog(&DialogId::new("flow"), None)
            .await
            .unwrap_err();

        assert!(matches!(
            err.root(),
            DialogError::DialogNotFound { id } if id.as_str() == "ghost"
        ));
    }

    #[tokio::test]
    async fn begin_options_value_key_becomes_the_final_result() {
        let bot = PlanningDialog::sequence("flow", vec![PlanStep::new("note", None)])
            .add_dialog(Arc::new(SendMessage::new("note", "Working on it.")))
            .unwrap();
        let mut set = DialogSet::new();
        set.add(Arc::new(bot)).unwrap();
        let mut turn = message_turn("go");
        let mut state = DialogState::new();
        let mut dc = DialogContext::new_root(&set, &mut turn, &mut state);

        let result = dc
            .begin_dialog(&DialogId::new("flow"), Some(json!({"value": {"ticket": 42}})))
            .await
            .unwrap();

        assert_eq!(result.status, DialogTurnStatus::Complete);
        assert_eq!(result.result, Some(json!({"ticket": 42})));
    }
}
