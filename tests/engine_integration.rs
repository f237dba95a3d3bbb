//! Integration tests for the dialog engine.
//!
//! These tests verify the end-to-end flow:
//! 1. DialogRunner loads (or starts) the session from the store
//! 2. The planning bot recognizes intents and queues plan steps
//! 3. Nested step stacks wait across turns and survive process restarts
//! 4. Completed turns write the memory scopes back through the store
//!
//! Uses the file-backed store with temporary directories, so no external
//! dependencies are required.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;
use tempfile::TempDir;

use colloquy::adapters::recognizer::KeywordRecognizer;
use colloquy::adapters::storage::FileConversationStore;
use colloquy::application::{DialogRunner, RunTurnCommand, TurnOutcome};
use colloquy::domain::dialog::{
    AskText, ComponentDialog, DialogSet, DialogTurnResult, DialogTurnStatus, SendMessage,
    WaterfallDialog, WaterfallStepContext,
};
use colloquy::domain::foundation::{Activity, ConversationId, DialogError, DialogId};
use colloquy::domain::planning::{
    planning_events, EventRule, IntentRule, PlanStep, PlanningDialog,
};
use colloquy::ports::ConversationStore;

// =============================================================================
// Test Infrastructure
// =============================================================================

fn order_bot() -> PlanningDialog {
    let recognizer = KeywordRecognizer::new()
        .with_intent("order", "order")
        .with_intent("pizza", "pizza")
        .with_intent("help", "help");

    PlanningDialog::new("order-bot")
        .add_rule(Arc::new(
            IntentRule::new("order").and_intent("pizza").run_steps(vec![
                PlanStep::new("ask-size", None),
                PlanStep::new("confirm-pizza", None),
            ]),
        ))
        .add_rule(Arc::new(
            IntentRule::new("help").run_steps(vec![PlanStep::new("help-msg", None)]),
        ))
        .add_rule(Arc::new(
            EventRule::new([planning_events::FALLBACK])
                .run_steps(vec![PlanStep::new("fallback-msg", None)]),
        ))
        .with_recognizer(Arc::new(recognizer))
        .add_dialog(Arc::new(AskText::new(
            "ask-size",
            "What size pizza?",
            "conversation.size",
        )))
        .unwrap()
        .add_dialog(Arc::new(SendMessage::new(
            "confirm-pizza",
            "One {conversation.size} pizza coming up.",
        )))
        .unwrap()
        .add_dialog(Arc::new(SendMessage::new(
            "help-msg",
            "Say 'order a pizza' and I will take it from there.",
        )))
        .unwrap()
        .add_dialog(Arc::new(SendMessage::new(
            "fallback-msg",
            "Sorry, I didn't catch that.",
        )))
        .unwrap()
}

/// Builds a fresh runner over the given directory, as a process restart
/// would.
fn order_runner(dir: &TempDir) -> DialogRunner {
    let mut dialogs = DialogSet::new();
    dialogs.add(Arc::new(order_bot())).unwrap();
    let store = Arc::new(FileConversationStore::new(dir.path()));
    DialogRunner::new(dialogs, "order-bot", store)
}

async fn send(runner: &DialogRunner, id: &ConversationId, text: &str) -> TurnOutcome {
    runner
        .run_turn(RunTurnCommand {
            conversation_id: *id,
            activity: Activity::message(text),
        })
        .await
        .unwrap()
}

fn texts(outcome: &TurnOutcome) -> Vec<&str> {
    outcome
        .responses
        .iter()
        .map(|a| a.text_or_empty())
        .collect()
}

// =============================================================================
// Planning bot through the runner
// =============================================================================

#[tokio::test]
async fn order_flow_runs_with_an_interruption_in_the_middle() {
    let dir = TempDir::new().unwrap();
    let runner = order_runner(&dir);
    let id = ConversationId::new();

    let opening = send(&runner, &id, "I want to order a pizza").await;
    assert_eq!(opening.status, DialogTurnStatus::Waiting);
    assert_eq!(texts(&opening), vec!["What size pizza?"]);

    // An interruption runs its step, then the pending question re-asks.
    let help = send(&runner, &id, "help").await;
    assert_eq!(help.status, DialogTurnStatus::Waiting);
    assert_eq!(
        texts(&help),
        vec![
            "Say 'order a pizza' and I will take it from there.",
            "What size pizza?"
        ]
    );

    let sized = send(&runner, &id, "large").await;
    assert_eq!(sized.status, DialogTurnStatus::Complete);
    assert_eq!(texts(&sized), vec!["One large pizza coming up."]);
}

#[tokio::test]
async fn unmatched_input_outside_a_flow_hits_the_fallback() {
    let dir = TempDir::new().unwrap();
    let runner = order_runner(&dir);
    let id = ConversationId::new();

    let outcome = send(&runner, &id, "xyzzy").await;

    assert_eq!(texts(&outcome), vec!["Sorry, I didn't catch that."]);
}

#[tokio::test]
async fn a_waiting_flow_survives_a_process_restart() {
    let dir = TempDir::new().unwrap();
    let id = ConversationId::new();

    {
        let runner = order_runner(&dir);
        let opening = send(&runner, &id, "order a pizza please").await;
        assert_eq!(opening.status, DialogTurnStatus::Waiting);
    }

    // New runner, new store handle, same directory: the reply resumes
    // the persisted stack.
    let runner = order_runner(&dir);
    let sized = send(&runner, &id, "medium").await;

    assert_eq!(sized.status, DialogTurnStatus::Complete);
    assert_eq!(texts(&sized), vec!["One medium pizza coming up."]);

    let store = FileConversationStore::new(dir.path());
    let session = store.load(&id).await.unwrap().unwrap();
    assert!(session.dialog_state.is_empty());
    assert_eq!(session.conversation, json!({"size": "medium"}));
}

// =============================================================================
// Component + waterfall through the runner
// =============================================================================

fn step_ask_name<'a, 'b, 'c>(
    step: &'a mut WaterfallStepContext<'b, 'c>,
) -> BoxFuture<'a, Result<DialogTurnResult, DialogError>> {
    Box::pin(async move { step.begin_dialog(&DialogId::new("ask-name"), None).await })
}

fn step_ask_color<'a, 'b, 'c>(
    step: &'a mut WaterfallStepContext<'b, 'c>,
) -> BoxFuture<'a, Result<DialogTurnResult, DialogError>> {
    Box::pin(async move { step.begin_dialog(&DialogId::new("ask-color"), None).await })
}

fn step_summarize<'a, 'b, 'c>(
    step: &'a mut WaterfallStepContext<'b, 'c>,
) -> BoxFuture<'a, Result<DialogTurnResult, DialogError>> {
    Box::pin(async move {
        let name = step
            .turn()
            .get_value("user.name")
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();
        let color = step
            .turn()
            .get_value("user.color")
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();
        step.turn_mut()
            .send_message(format!("{name} likes {color}"));
        step.end_dialog(Some(json!({"name": name, "color": color})))
            .await
    })
}

fn onboarding_runner(dir: &TempDir) -> DialogRunner {
    let survey = WaterfallDialog::new("survey")
        .add_step(step_ask_name)
        .add_step(step_ask_color)
        .add_step(step_summarize);
    let onboarding = ComponentDialog::new("onboarding")
        .add_dialog(Arc::new(survey))
        .unwrap()
        .add_dialog(Arc::new(AskText::new(
            "ask-name",
            "What is your name?",
            "user.name",
        )))
        .unwrap()
        .add_dialog(Arc::new(AskText::new(
            "ask-color",
            "What is your favorite color?",
            "user.color",
        )))
        .unwrap();

    let mut dialogs = DialogSet::new();
    dialogs.add(Arc::new(onboarding)).unwrap();
    let store = Arc::new(FileConversationStore::new(dir.path()));
    DialogRunner::new(dialogs, "onboarding", store)
}

#[tokio::test]
async fn component_waterfall_collects_a_profile_across_turns() {
    let dir = TempDir::new().unwrap();
    let runner = onboarding_runner(&dir);
    let id = ConversationId::new();

    let first = send(&runner, &id, "hello").await;
    assert_eq!(first.status, DialogTurnStatus::Waiting);
    assert_eq!(texts(&first), vec!["What is your name?"]);

    let second = send(&runner, &id, "Ada").await;
    assert_eq!(second.status, DialogTurnStatus::Waiting);
    assert_eq!(texts(&second), vec!["What is your favorite color?"]);

    let third = send(&runner, &id, "blue").await;
    assert_eq!(third.status, DialogTurnStatus::Complete);
    assert_eq!(texts(&third), vec!["Ada likes blue"]);
    assert_eq!(third.result, Some(json!({"name": "Ada", "color": "blue"})));

    let store = FileConversationStore::new(dir.path());
    let session = store.load(&id).await.unwrap().unwrap();
    assert_eq!(session.user, json!({"name": "Ada", "color": "blue"}));
}
