//! Container dialog that runs a private stack inside one outer frame.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use super::context::DialogContext;
use super::dialog::{ContainerDialog, Dialog};
use super::event::DialogEvent;
use super::instance::{DialogInstance, DialogState};
use super::set::DialogSet;
use super::turn::TurnContext;
use super::turn_result::{DialogReason, DialogTurnResult, DialogTurnStatus};
use crate::domain::foundation::{DialogError, DialogId};

/// Key of the container's instance state that holds the nested stack.
const INNER_STATE_KEY: &str = "dialogs";

/// A dialog composed of other dialogs.
///
/// The component owns a private registry and persists its children's
/// entire stack inside its own frame, so from the outside it looks like a
/// single dialog: it waits while any child waits and ends when the inner
/// stack drains, forwarding the innermost result.
pub struct ComponentDialog {
    id: DialogId,
    dialogs: DialogSet,
    initial: Option<DialogId>,
}

impl ComponentDialog {
    /// Creates an empty component.
    pub fn new(id: impl Into<DialogId>) -> Self {
        Self {
            id: id.into(),
            dialogs: DialogSet::new(),
            initial: None,
        }
    }

    /// Adds a child dialog. The first one added becomes the initial
    /// dialog unless `with_initial` overrides it.
    pub fn add_dialog(mut self, dialog: Arc<dyn Dialog>) -> Result<Self, DialogError> {
        if self.initial.is_none() {
            self.initial = Some(dialog.id().clone());
        }
        self.dialogs.add(dialog)?;
        Ok(self)
    }

    /// Overrides which child runs when the component begins.
    pub fn with_initial(mut self, id: impl Into<DialogId>) -> Self {
        self.initial = Some(id.into());
        self
    }

    fn initial_id(&self) -> Result<&DialogId, DialogError> {
        self.initial
            .as_ref()
            .ok_or_else(|| DialogError::handler(format!("container '{}' has no dialogs", self.id)))
    }

    fn state_from_slot(value: Value) -> Result<DialogState, DialogError> {
        if value.is_null() {
            return Ok(DialogState::new());
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Moves the nested stack out of the active frame, leaving a null
    /// marker until `store_inner_state` writes it back.
    fn take_inner_state(&self, dc: &mut DialogContext<'_>) -> Result<DialogState, DialogError> {
        let instance = dc.active_dialog_mut().ok_or(DialogError::NoActiveDialog)?;
        match instance.state.get_mut(INNER_STATE_KEY) {
            Some(slot) => Self::state_from_slot(slot.take()),
            None => Ok(DialogState::new()),
        }
    }

    /// Writes the nested stack back, unless this component's own frame
    /// was removed while the inner stack ran.
    fn store_inner_state(
        &self,
        dc: &mut DialogContext<'_>,
        guard: Option<String>,
        inner: &DialogState,
    ) -> Result<(), DialogError> {
        if guard.is_none() || dc.unique_instance_id() != guard {
            debug!(dialog = %self.id, "container frame gone; dropping nested stack");
            return Ok(());
        }
        let instance = dc.active_dialog_mut().ok_or(DialogError::NoActiveDialog)?;
        Self::write_inner(instance, inner)
    }

    fn write_inner(instance: &mut DialogInstance, inner: &DialogState) -> Result<(), DialogError> {
        if !instance.state.is_object() {
            instance.state = Value::Object(Map::new());
        }
        if let Some(map) = instance.state.as_object_mut() {
            map.insert(INNER_STATE_KEY.to_string(), serde_json::to_value(inner)?);
        }
        Ok(())
    }

    /// Maps the inner stack's outcome onto the outer stack.
    async fn finish(
        &self,
        dc: &mut DialogContext<'_>,
        inner: DialogTurnResult,
    ) -> Result<DialogTurnResult, DialogError> {
        match inner.status {
            DialogTurnStatus::Waiting => Ok(DialogTurnResult::waiting()),
            DialogTurnStatus::Cancelled => {
                // Remove our own frame without resuming the caller; the
                // cancellation is theirs to observe, not a completion.
                dc.end_active_dialog(DialogReason::CancelCalled, None)
                    .await?;
                Ok(DialogTurnResult::cancelled(inner.result))
            }
            _ => dc.end_dialog(inner.result).await,
        }
    }
}

#[async_trait]
impl Dialog for ComponentDialog {
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
        let initial = self.initial_id()?.clone();
        let guard = dc.unique_instance_id();
        let mut inner = self.take_inner_state(dc)?;
        let result = {
            let mut child = DialogContext::new_child(&self.dialogs, &mut *dc, &mut inner);
            child.begin_dialog(&initial, options).await
        };
        self.store_inner_state(dc, guard, &inner)?;
        self.finish(dc, result?).await
    }

    async fn continue_dialog(
        &self,
        dc: &mut DialogContext<'_>,
    ) -> Result<DialogTurnResult, DialogError> {
        let guard = dc.unique_instance_id();
        let mut inner = self.take_inner_state(dc)?;
        let result = {
            let mut child = DialogContext::new_child(&self.dialogs, &mut *dc, &mut inner);
            child.continue_dialog().await
        };
        self.store_inner_state(dc, guard, &inner)?;
        self.finish(dc, result?).await
    }

    async fn resume_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        _reason: DialogReason,
        _result: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        // An ancestor ran a dialog above us and it just ended. That never
        // completes the component; ask the inner stack to re-prompt.
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
        let mut inner = match instance.state.get_mut(INNER_STATE_KEY) {
            Some(slot) => Self::state_from_slot(slot.take())?,
            None => DialogState::new(),
        };
        let result = {
            let mut child = DialogContext::new_root(&self.dialogs, turn, &mut inner);
            child.reprompt_dialog().await
        };
        Self::write_inner(instance, &inner)?;
        result
    }

    async fn end_dialog(
        &self,
        turn: &mut TurnContext,
        instance: &mut DialogInstance,
        reason: DialogReason,
    ) -> Result<(), DialogError> {
        // Forward cancellation into the nested stack before the frame
        // goes away, so descendants run their own cleanup.
        if reason == DialogReason::CancelCalled {
            let mut inner = match instance.state.get_mut(INNER_STATE_KEY) {
                Some(slot) => Self::state_from_slot(slot.take())?,
                None => return Ok(()),
            };
            let result = {
                let mut child = DialogContext::new_root(&self.dialogs, turn, &mut inner);
                child.cancel_all_dialogs(false, None, None).await
            };
            Self::write_inner(instance, &inner)?;
            result?;
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerDialog for ComponentDialog {
    async fn emit_at_leaf(
        &self,
        dc: &mut DialogContext<'_>,
        event: DialogEvent,
    ) -> Result<bool, DialogError> {
        let guard = dc.unique_instance_id();
        let mut inner = self.take_inner_state(dc)?;
        let result = {
            let mut child = DialogContext::new_child(&self.dialogs, &mut *dc, &mut inner);
            child.dispatch_at_leaf(event).await
        };
        self.store_inner_state(dc, guard, &inner)?;
        result
    }
}
