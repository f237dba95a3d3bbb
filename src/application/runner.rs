//! DialogRunner - Drives one conversation turn end to end.
//!
//! The runner owns the root dialog set and the conversation store. Per
//! turn it loads (or starts) the session, mounts the memory scopes,
//! drives the root stack, and persists everything back only when the
//! turn succeeded.

use std::sync::Arc;

use chrono::Duration;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::adapters::memory::{scopes, LayeredMemory};
use crate::domain::dialog::{
    dialog_events, DialogContext, DialogSet, DialogTurnResult, DialogTurnStatus,
    TurnContext,
};
use crate::domain::foundation::{Activity, ConversationId, DialogError, DialogId, Timestamp};
use crate::ports::{ConversationStore, StoreError};

/// Command to run one inbound activity against a conversation.
#[derive(Debug, Clone)]
pub struct RunTurnCommand {
    pub conversation_id: ConversationId,
    pub activity: Activity,
}

/// What a completed turn hands back to the embedding application.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub status: DialogTurnStatus,
    pub result: Option<Value>,
    pub responses: Vec<Activity>,
}

/// Errors surfaced by the runner.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The dialog engine failed and no handler recovered the turn.
    #[error(transparent)]
    Dialog(#[from] DialogError),

    /// The conversation store failed.
    #[error("Session storage failed: {0}")]
    Store(#[from] StoreError),
}

/// Runs turns for one root dialog against a conversation store.
pub struct DialogRunner {
    dialogs: DialogSet,
    root_id: DialogId,
    store: Arc<dyn ConversationStore>,
    expire_after: Option<Duration>,
}

impl DialogRunner {
    pub fn new(
        dialogs: DialogSet,
        root_id: impl Into<DialogId>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            dialogs,
            root_id: root_id.into(),
            store,
            expire_after: None,
        }
    }

    /// Sessions idle longer than `window` restart their conversation on
    /// the next turn. The user scope survives the restart.
    pub fn with_expiry(mut self, window: Duration) -> Self {
        self.expire_after = Some(window);
        self
    }

    pub async fn run_turn(&self, cmd: RunTurnCommand) -> Result<TurnOutcome, RunnerError> {
        // 1. Load or start the session
        let mut session = self
            .store
            .load(&cmd.conversation_id)
            .await?
            .unwrap_or_default();

        // 2. Expire a stale conversation, keeping the user scope
        let now = Timestamp::now();
        if let (Some(window), Some(last)) = (self.expire_after, session.last_access) {
            if now.duration_since(&last) > window {
                debug!(conversation = %cmd.conversation_id, "session expired; restarting conversation");
                session.reset_conversation();
            }
        }

        // 3. Mount the memory scopes for this turn
        let memory = LayeredMemory::new()
            .with_scope(scopes::CONVERSATION, session.conversation.clone())
            .with_scope(scopes::USER, session.user.clone());
        let mut turn = TurnContext::new(cmd.activity, Box::new(memory));

        // 4. Drive the root stack, offering the error event on failure
        let result = {
            let mut dc =
                DialogContext::new_root(&self.dialogs, &mut turn, &mut session.dialog_state);
            match Self::drive(&mut dc, &self.root_id).await {
                Ok(result) => result,
                Err(err) => Self::recover(&mut dc, err).await?,
            }
        };

        // 5. Persist the scopes and stamp last access
        session.conversation = turn
            .get_value(scopes::CONVERSATION)
            .unwrap_or_else(|| json!({}));
        session.user = turn.get_value(scopes::USER).unwrap_or_else(|| json!({}));
        session.last_access = Some(now);
        self.store.save(&cmd.conversation_id, &session).await?;

        Ok(TurnOutcome {
            status: result.status,
            result: result.result,
            responses: turn.take_responses(),
        })
    }

    /// Drops a conversation's stored session entirely.
    pub async fn end_conversation(&self, id: &ConversationId) -> Result<(), RunnerError> {
        self.store.clear(id).await?;
        Ok(())
    }

    async fn drive(
        dc: &mut DialogContext<'_>,
        root_id: &DialogId,
    ) -> Result<DialogTurnResult, DialogError> {
        let result = dc.continue_dialog().await?;
        if result.status == DialogTurnStatus::Empty {
            return dc.begin_dialog(root_id, None).await;
        }
        Ok(result)
    }

    /// Offers the error event from the deepest leaf upward; a handler
    /// recovers the turn, otherwise the original error stands.
    async fn recover(
        dc: &mut DialogContext<'_>,
        err: DialogError,
    ) -> Result<DialogTurnResult, RunnerError> {
        let payload = json!({"message": err.to_string()});
        match dc
            .emit_event(dialog_events::ERROR, Some(payload), true, true)
            .await
        {
            Ok(true) => {
                debug!("a dialog handled the error event; turn recovered");
                Ok(DialogTurnResult::waiting())
            }
            Ok(false) => {
                warn!(error = %err, "turn failed with no error handler");
                Err(err.into())
            }
            Err(dispatch_err) => {
                warn!(error = %dispatch_err, "error event dispatch failed");
                Err(err.into())
            }
        }
    }
}
