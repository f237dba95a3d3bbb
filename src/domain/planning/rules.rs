//! Rules that watch events and propose plan changes.

use async_trait::async_trait;

use super::plan::{planning_events, PlanChange, PlanChangeList, PlanState, PlanStep, PlanningState};
use crate::domain::dialog::{DialogEvent, TurnContext};
use crate::domain::foundation::DialogError;
use crate::ports::RecognizerResult;

/// What a rule sees while evaluating: the turn, a read-only view of the
/// planning state, and the recognition produced for this turn, if any.
pub struct RuleContext<'a> {
    turn: &'a TurnContext,
    state: &'a PlanningState,
    recognized: Option<&'a RecognizerResult>,
}

impl<'a> RuleContext<'a> {
    pub fn new(
        turn: &'a TurnContext,
        state: &'a PlanningState,
        recognized: Option<&'a RecognizerResult>,
    ) -> Self {
        Self {
            turn,
            state,
            recognized,
        }
    }

    pub fn turn(&self) -> &TurnContext {
        self.turn
    }

    pub fn plan(&self) -> Option<&PlanState> {
        self.state.plan.as_ref()
    }

    pub fn recognized(&self) -> Option<&RecognizerResult> {
        self.recognized
    }
}

/// A planning rule: a fixed set of event names plus an evaluator that
/// may propose changes.
///
/// Rules never mutate anything themselves; a non-empty change list is
/// queued by the planning dialog and applied strictly in order.
#[async_trait]
pub trait PlanningRule: Send + Sync {
    /// Event names this rule subscribes to.
    fn events(&self) -> &[String];

    /// Produces the changes this rule wants for `event`, or `None` to
    /// pass.
    async fn evaluate(
        &self,
        ctx: &RuleContext<'_>,
        event: &DialogEvent,
    ) -> Result<Option<PlanChangeList>, DialogError>;
}

/// Proposes the same fixed changes whenever one of its events fires.
pub struct EventRule {
    events: Vec<String>,
    changes: Vec<PlanChange>,
}

impl EventRule {
    pub fn new<I>(events: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            events: events.into_iter().map(Into::into).collect(),
            changes: Vec::new(),
        }
    }

    /// Adds one raw change.
    pub fn with_change(mut self, change: PlanChange) -> Self {
        self.changes.push(change);
        self
    }

    /// Queues dialogs to run next, ahead of any pending steps, keeping
    /// the order given.
    pub fn run_steps(mut self, steps: Vec<PlanStep>) -> Self {
        for step in steps.into_iter().rev() {
            self.changes
                .push(PlanChange::insert_before(step.dialog_id, step.options));
        }
        self
    }
}

#[async_trait]
impl PlanningRule for EventRule {
    fn events(&self) -> &[String] {
        &self.events
    }

    async fn evaluate(
        &self,
        _ctx: &RuleContext<'_>,
        _event: &DialogEvent,
    ) -> Result<Option<PlanChangeList>, DialogError> {
        if self.changes.is_empty() {
            return Ok(None);
        }
        Ok(Some(PlanChangeList::new(self.changes.clone())))
    }
}

/// Matches a recognized utterance by intent presence, optionally gated
/// on entities being present too.
///
/// Every named intent and entity must appear in the recognition for the
/// rule to fire; what matched feeds `best_match` ranking.
pub struct IntentRule {
    events: Vec<String>,
    intents: Vec<String>,
    entities: Vec<String>,
    changes: Vec<PlanChange>,
}

impl IntentRule {
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            events: vec![planning_events::UTTERANCE_RECOGNIZED.to_string()],
            intents: vec![intent.into()],
            entities: Vec::new(),
            changes: Vec::new(),
        }
    }

    /// Requires a further intent to also be present.
    pub fn and_intent(mut self, intent: impl Into<String>) -> Self {
        self.intents.push(intent.into());
        self
    }

    /// Requires a named entity to be present.
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entities.push(entity.into());
        self
    }

    /// Adds one raw change.
    pub fn with_change(mut self, change: PlanChange) -> Self {
        self.changes.push(change);
        self
    }

    /// Queues dialogs to run next, ahead of any pending steps, keeping
    /// the order given.
    pub fn run_steps(mut self, steps: Vec<PlanStep>) -> Self {
        for step in steps.into_iter().rev() {
            self.changes
                .push(PlanChange::insert_before(step.dialog_id, step.options));
        }
        self
    }
}

#[async_trait]
impl PlanningRule for IntentRule {
    fn events(&self) -> &[String] {
        &self.events
    }

    async fn evaluate(
        &self,
        ctx: &RuleContext<'_>,
        _event: &DialogEvent,
    ) -> Result<Option<PlanChangeList>, DialogError> {
        let Some(recognized) = ctx.recognized() else {
            return Ok(None);
        };
        for intent in &self.intents {
            if !recognized.intents.contains_key(intent) {
                return Ok(None);
            }
        }
        for entity in &self.entities {
            if recognized.entities.get(entity).is_none() {
                return Ok(None);
            }
        }
        if self.changes.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            PlanChangeList::new(self.changes.clone())
                .with_intents(self.intents.clone())
                .with_entities(self.entities.clone()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::LayeredMemory;
    use crate::domain::foundation::Activity;
    use crate::ports::IntentScore;
    use serde_json::json;

    fn turn() -> TurnContext {
        TurnContext::new(Activity::message("book a table"), Box::new(LayeredMemory::new()))
    }

    fn recognition(intents: &[&str], entities: serde_json::Value) -> RecognizerResult {
        let mut result = RecognizerResult::none(Some("book a table".to_string()));
        result.intents.clear();
        for intent in intents {
            result
                .intents
                .insert((*intent).to_string(), IntentScore { score: 0.9 });
        }
        result.entities = entities;
        result
    }

    #[tokio::test]
    async fn event_rule_fires_only_with_changes() {
        let empty = EventRule::new([planning_events::BEGIN_DIALOG]);
        let loaded = EventRule::new([planning_events::BEGIN_DIALOG])
            .run_steps(vec![PlanStep::new("a", None), PlanStep::new("b", None)]);
        let turn = turn();
        let state = PlanningState::default();
        let ctx = RuleContext::new(&turn, &state, None);
        let event = DialogEvent::new(planning_events::BEGIN_DIALOG, None, false);

        assert!(empty.evaluate(&ctx, &event).await.unwrap().is_none());
        let changes = loaded.evaluate(&ctx, &event).await.unwrap().unwrap();
        // Reversed inserts so the authored order lands front-to-back.
        assert_eq!(changes.changes[0].dialog_id.as_ref().unwrap().as_str(), "b");
        assert_eq!(changes.changes[1].dialog_id.as_ref().unwrap().as_str(), "a");
    }

    #[tokio::test]
    async fn intent_rule_requires_every_intent_and_entity() {
        let rule = IntentRule::new("book")
            .and_intent("table")
            .with_entity("date")
            .run_steps(vec![PlanStep::new("reserve", None)]);
        let turn = turn();
        let state = PlanningState::default();
        let event = DialogEvent::new(planning_events::UTTERANCE_RECOGNIZED, None, false);

        let partial = recognition(&["book"], json!({"date": "friday"}));
        let ctx = RuleContext::new(&turn, &state, Some(&partial));
        assert!(rule.evaluate(&ctx, &event).await.unwrap().is_none());

        let missing_entity = recognition(&["book", "table"], json!({}));
        let ctx = RuleContext::new(&turn, &state, Some(&missing_entity));
        assert!(rule.evaluate(&ctx, &event).await.unwrap().is_none());

        let full = recognition(&["book", "table"], json!({"date": "friday"}));
        let ctx = RuleContext::new(&turn, &state, Some(&full));
        let changes = rule.evaluate(&ctx, &event).await.unwrap().unwrap();
        assert_eq!(changes.intents_matched, vec!["book", "table"]);
        assert_eq!(changes.entities_matched, vec!["date"]);
    }

    #[tokio::test]
    async fn intent_rule_passes_without_recognition() {
        let rule = IntentRule::new("book").run_steps(vec![PlanStep::new("reserve", None)]);
        let turn = turn();
        let state = PlanningState::default();
        let ctx = RuleContext::new(&turn, &state, None);
        let event = DialogEvent::new(planning_events::UTTERANCE_RECOGNIZED, None, false);

        assert!(rule.evaluate(&ctx, &event).await.unwrap().is_none());
    }
}
