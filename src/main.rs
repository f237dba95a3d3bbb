//! Colloquy demo bot
//!
//! A stdin REPL around the dialog runner: a small order-taking planning
//! bot showing sequences, interruptions and the fallback rule. Type
//! `quit` to leave.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use colloquy::adapters::recognizer::KeywordRecognizer;
use colloquy::adapters::storage::{FileConversationStore, InMemoryConversationStore};
use colloquy::application::{DialogRunner, RunTurnCommand};
use colloquy::config::{AppConfig, StorageBackend};
use colloquy::domain::dialog::{AskText, DialogSet, DialogTurnStatus, SendMessage};
use colloquy::domain::foundation::{Activity, ConversationId};
use colloquy::domain::planning::{
    planning_events, EventRule, IntentRule, PlanStep, PlanningDialog,
};
use colloquy::ports::ConversationStore;

fn order_bot() -> Result<PlanningDialog, Box<dyn std::error::Error>> {
    let recognizer = KeywordRecognizer::new()
        .with_intent("order", "order")
        .with_intent("pizza", "pizza")
        .with_intent("help", "help");

    let bot = PlanningDialog::new("order-bot")
        .add_rule(Arc::new(
            IntentRule::new("order")
                .and_intent("pizza")
                .run_steps(vec![PlanStep::new("ask-size", None), PlanStep::new("confirm-pizza", None)]),
        ))
        .add_rule(Arc::new(IntentRule::new("order").run_steps(vec![
            PlanStep::new("ask-item", None),
            PlanStep::new("confirm-item", None),
        ])))
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
        )))?
        .add_dialog(Arc::new(SendMessage::new(
            "confirm-pizza",
            "One {conversation.size} pizza coming up.",
        )))?
        .add_dialog(Arc::new(AskText::new(
            "ask-item",
            "What would you like to order?",
            "conversation.item",
        )))?
        .add_dialog(Arc::new(SendMessage::new(
            "confirm-item",
            "Got it: {conversation.item}.",
        )))?
        .add_dialog(Arc::new(SendMessage::new(
            "help-msg",
            "I can take orders. Say 'order a pizza' or just 'order'.",
        )))?
        .add_dialog(Arc::new(SendMessage::new(
            "fallback-msg",
            "Sorry, I didn't catch that. Say 'order' or 'help'.",
        )))?;

    Ok(bot)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.engine.log_level)),
        )
        .init();

    let store: Arc<dyn ConversationStore> = match config.storage.backend {
        StorageBackend::Memory => Arc::new(InMemoryConversationStore::new()),
        StorageBackend::File => Arc::new(FileConversationStore::new(&config.storage.path)),
    };

    let mut dialogs = DialogSet::new();
    dialogs.add(Arc::new(order_bot()?))?;
    let mut runner = DialogRunner::new(dialogs, "order-bot", store);
    if let Some(secs) = config.engine.expire_after_secs {
        runner = runner.with_expiry(chrono::Duration::seconds(secs as i64));
    }

    let conversation = ConversationId::new();
    tracing::info!(conversation = %conversation, "demo bot ready");
    println!("colloquy demo bot (type 'quit' to exit)");
    println!("bot> Welcome! Say 'order a pizza' to get started, or 'help'.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text.eq_ignore_ascii_case("quit") {
            break;
        }

        let cmd = RunTurnCommand {
            conversation_id: conversation,
            activity: Activity::message(text),
        };
        match runner.run_turn(cmd).await {
            Ok(outcome) => {
                for activity in &outcome.responses {
                    println!("bot> {}", activity.text_or_empty());
                }
                if outcome.status == DialogTurnStatus::Complete {
                    tracing::debug!(result = ?outcome.result, "conversation completed");
                }
            }
            Err(err) => eprintln!("error: {err}"),
        }
    }

    Ok(())
}
