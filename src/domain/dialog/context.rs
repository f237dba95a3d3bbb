//! The dialog stack machine.
//!
//! A `DialogContext` is a transient per-turn view over one persisted stack.
//! Nested stacks get their own child context whose parent link is used for
//! dialog resolution, event bubbling, and reaching the turn state; the link
//! never owns anything.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, warn};

use super::dialog::Dialog;
use super::event::{dialog_events, DialogEvent};
use super::instance::{DialogInstance, DialogState};
use super::set::DialogSet;
use super::turn::TurnContext;
use super::turn_result::{DialogReason, DialogTurnResult};
use crate::domain::foundation::{DialogError, DialogId, StackDiagnostics};

/// Well-known transient memory locations written by the stack machine.
pub mod memory_paths {
    /// Where `end_dialog` records the result it forwarded.
    pub const LAST_RESULT: &str = "turn.last_result";
}

/// Progress of a cancel sweep across a context chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct CancelSweep {
    /// Whether any frame has been popped so far.
    pub popped: bool,
    /// Whether a frame claimed the cancellation event, halting the sweep.
    pub intercepted: bool,
}

/// The parent side of a nested context link.
///
/// Implemented by `DialogContext` itself; a trait object keeps the child's
/// lifetime independent of the parent's own borrow parameters.
pub trait ParentContext: Send {
    /// Resolves a dialog id through this context and its ancestors.
    fn find_dialog(&self, id: &DialogId) -> Option<Arc<dyn Dialog>>;

    /// Id of this context's active dialog.
    fn active_id(&self) -> Option<&DialogId>;

    /// The turn state shared by the whole context tree.
    fn turn(&self) -> &TurnContext;

    /// Mutable turn state.
    fn turn_mut(&mut self) -> &mut TurnContext;

    /// Dispatches an event to this context's active dialog.
    fn dispatch_event<'s>(
        &'s mut self,
        event: DialogEvent,
    ) -> BoxFuture<'s, Result<bool, DialogError>>;

    /// Continues a cancel sweep at this context and its ancestors.
    fn cancel_cascade<'s>(
        &'s mut self,
        event_name: &'s str,
        event_value: Option<&'s Value>,
        already_popped: bool,
    ) -> BoxFuture<'s, Result<CancelSweep, DialogError>>;
}

enum ContextLink<'a> {
    /// This context is the root of the tree and holds the turn directly.
    Root(&'a mut TurnContext),
    /// This context sits inside a frame of the linked parent.
    Child(&'a mut (dyn ParentContext + 'a)),
}

/// Stack machine over one `DialogState`.
pub struct DialogContext<'a> {
    dialogs: &'a DialogSet,
    link: ContextLink<'a>,
    state: &'a mut DialogState,
}

impl<'a> DialogContext<'a> {
    /// Creates the root context for a turn.
    pub fn new_root(
        dialogs: &'a DialogSet,
        turn: &'a mut TurnContext,
        state: &'a mut DialogState,
    ) -> Self {
        Self {
            dialogs,
            link: ContextLink::Root(turn),
            state,
        }
    }

    /// Creates a context over a stack nested inside `parent`'s active frame.
    pub fn new_child(
        dialogs: &'a DialogSet,
        parent: &'a mut (dyn ParentContext + 'a),
        state: &'a mut DialogState,
    ) -> Self {
        Self {
            dialogs,
            link: ContextLink::Child(parent),
            state,
        }
    }

    /// The stack this context drives.
    pub fn stack(&self) -> &DialogState {
        self.state
    }

    /// Mutable access to the stack.
    pub fn stack_mut(&mut self) -> &mut DialogState {
        self.state
    }

    /// The active (top) frame.
    pub fn active_dialog(&self) -> Option<&DialogInstance> {
        self.state.active()
    }

    /// Mutable view of the active frame.
    pub fn active_dialog_mut(&mut self) -> Option<&mut DialogInstance> {
        self.state.active_mut()
    }

    /// The turn state shared by the whole context tree.
    pub fn turn(&self) -> &TurnContext {
        match &self.link {
            ContextLink::Root(turn) => turn,
            ContextLink::Child(parent) => parent.turn(),
        }
    }

    /// Mutable turn state.
    pub fn turn_mut(&mut self) -> &mut TurnContext {
        match &mut self.link {
            ContextLink::Root(turn) => turn,
            ContextLink::Child(parent) => parent.turn_mut(),
        }
    }

    /// Resolves a dialog id locally, then through the ancestor chain.
    pub fn find_dialog(&self, id: &DialogId) -> Option<Arc<dyn Dialog>> {
        if let Some(dialog) = self.dialogs.find(id) {
            return Some(dialog);
        }
        match &self.link {
            ContextLink::Root(_) => None,
            ContextLink::Child(parent) => parent.find_dialog(id),
        }
    }

    /// Depth-qualified id of the active frame, used to detect mid-flight
    /// removal of a frame a container is about to write state back into.
    pub fn unique_instance_id(&self) -> Option<String> {
        self.state
            .active()
            .map(|instance| format!("{}:{}", self.state.depth(), instance.id))
    }

    /// Pushes a new instance of `id` and runs its `begin_dialog`.
    ///
    /// Resolution happens before the push, so an unknown id fails with the
    /// stack unmodified.
    pub async fn begin_dialog(
        &mut self,
        id: &DialogId,
        options: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        let result = self.begin_inner(id, options).await;
        self.diagnose(result)
    }

    async fn begin_inner(
        &mut self,
        id: &DialogId,
        options: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        let dialog = self
            .find_dialog(id)
            .ok_or_else(|| DialogError::DialogNotFound { id: id.clone() })?;
        debug!(dialog = %id, depth = self.state.depth(), "beginning dialog");
        self.state
            .push(DialogInstance::new(id.clone(), dialog.version()));
        dialog.begin_dialog(self, options).await
    }

    /// Continues the active dialog with the turn's activity.
    pub async fn continue_dialog(&mut self) -> Result<DialogTurnResult, DialogError> {
        let result = self.continue_inner().await;
        self.diagnose(result)
    }

    async fn continue_inner(&mut self) -> Result<DialogTurnResult, DialogError> {
        // One-shot leaf-first activity event, the sanctioned interruption
        // hook. Re-entrant continues in the same turn skip it.
        if self.turn_mut().claim_activity_event() {
            let value = serde_json::to_value(self.turn().activity())?;
            self.emit_inner(dialog_events::ACTIVITY_RECEIVED, Some(value), true, true)
                .await?;
        }
        let Some(id) = self.state.active().map(|instance| instance.id.clone()) else {
            return Ok(DialogTurnResult::empty());
        };
        self.check_version().await?;
        let dialog = self
            .find_dialog(&id)
            .ok_or_else(|| DialogError::DialogNotFound { id: id.clone() })?;
        debug!(dialog = %id, "continuing dialog");
        dialog.continue_dialog(self).await
    }

    /// Ends the active dialog and resumes whatever is beneath it.
    pub async fn end_dialog(
        &mut self,
        result: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        let result = self.end_inner(result).await;
        self.diagnose(result)
    }

    async fn end_inner(
        &mut self,
        result: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        self.end_active_dialog(DialogReason::EndCalled, result.clone())
            .await?;
        match self.state.active().map(|instance| instance.id.clone()) {
            Some(id) => {
                let dialog = self
                    .find_dialog(&id)
                    .ok_or_else(|| DialogError::DialogNotFound { id: id.clone() })?;
                dialog
                    .resume_dialog(self, DialogReason::EndCalled, result)
                    .await
            }
            None => Ok(DialogTurnResult::complete(result)),
        }
    }

    /// Swaps the active dialog for another without resuming anything.
    pub async fn replace_dialog(
        &mut self,
        id: &DialogId,
        options: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        let result = self.replace_inner(id, options).await;
        self.diagnose(result)
    }

    async fn replace_inner(
        &mut self,
        id: &DialogId,
        options: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        debug!(dialog = %id, "replacing active dialog");
        self.end_active_dialog(DialogReason::ReplaceCalled, None)
            .await?;
        self.begin_inner(id, options).await
    }

    /// Cancels every frame on this stack, optionally sweeping ancestor
    /// stacks too.
    ///
    /// Before popping each frame after the first, the frame is offered a
    /// non-bubbling cancellation event (`event_name`, default
    /// `cancel_dialog`); a frame that handles it halts the sweep with the
    /// remainder intact. Returns cancelled if anything was popped anywhere,
    /// otherwise empty.
    pub async fn cancel_all_dialogs(
        &mut self,
        cancel_parents: bool,
        event_name: Option<&str>,
        event_value: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        let name = event_name.unwrap_or(dialog_events::CANCEL_DIALOG);
        let result = self.cancel_inner(cancel_parents, name, event_value).await;
        self.diagnose(result)
    }

    async fn cancel_inner(
        &mut self,
        cancel_parents: bool,
        event_name: &str,
        event_value: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        let mut sweep = CancelSweep::default();
        self.cancel_local(event_name, event_value.as_ref(), &mut sweep)
            .await?;
        if cancel_parents && !sweep.intercepted {
            if let ContextLink::Child(parent) = &mut self.link {
                let above = parent
                    .cancel_cascade(event_name, event_value.as_ref(), sweep.popped)
                    .await?;
                sweep.popped = above.popped;
            }
        }
        if sweep.popped {
            Ok(DialogTurnResult::cancelled(None))
        } else {
            Ok(DialogTurnResult::empty())
        }
    }

    async fn cancel_local(
        &mut self,
        event_name: &str,
        event_value: Option<&Value>,
        sweep: &mut CancelSweep,
    ) -> Result<(), DialogError> {
        while !self.state.is_empty() {
            if sweep.popped {
                let event = DialogEvent::new(event_name, event_value.cloned(), false);
                if self.dispatch_to_active(event).await? {
                    sweep.intercepted = true;
                    return Ok(());
                }
            }
            self.end_active_dialog(DialogReason::CancelCalled, None)
                .await?;
            sweep.popped = true;
        }
        Ok(())
    }

    /// Asks the active dialog to re-send its prompt.
    ///
    /// A `reprompt_dialog` event is offered first; the hook only runs when
    /// no dialog claims the event.
    pub async fn reprompt_dialog(&mut self) -> Result<(), DialogError> {
        let result = self.reprompt_inner().await;
        self.diagnose(result)
    }

    async fn reprompt_inner(&mut self) -> Result<(), DialogError> {
        if self
            .emit_inner(dialog_events::REPROMPT_DIALOG, None, false, false)
            .await?
        {
            return Ok(());
        }
        let Some(id) = self.state.active().map(|instance| instance.id.clone()) else {
            return Ok(());
        };
        let dialog = self
            .find_dialog(&id)
            .ok_or_else(|| DialogError::DialogNotFound { id: id.clone() })?;
        if let Some((turn, instance)) = self.split_active_and_turn() {
            dialog.reprompt_dialog(turn, instance).await?;
        }
        Ok(())
    }

    /// Raises a named event, starting at the active dialog or, with
    /// `from_leaf`, at the deepest active descendant.
    pub async fn emit_event(
        &mut self,
        name: &str,
        value: Option<Value>,
        bubble: bool,
        from_leaf: bool,
    ) -> Result<bool, DialogError> {
        let result = self.emit_inner(name, value, bubble, from_leaf).await;
        self.diagnose(result)
    }

    pub(crate) async fn emit_inner(
        &mut self,
        name: &str,
        value: Option<Value>,
        bubble: bool,
        from_leaf: bool,
    ) -> Result<bool, DialogError> {
        let event = DialogEvent::new(name, value, bubble);
        if from_leaf {
            self.dispatch_at_leaf(event).await
        } else {
            self.dispatch_to_active(event).await
        }
    }

    /// Re-raises an event at the parent context's active dialog.
    ///
    /// Unhandled when this context is the root of the tree.
    pub async fn bubble_to_parent(&mut self, event: &DialogEvent) -> Result<bool, DialogError> {
        match &mut self.link {
            ContextLink::Root(_) => Ok(false),
            ContextLink::Child(parent) => {
                let escalated = DialogEvent::new(event.name.clone(), event.value.clone(), true);
                parent.dispatch_event(escalated).await
            }
        }
    }

    pub(crate) async fn dispatch_to_active(
        &mut self,
        event: DialogEvent,
    ) -> Result<bool, DialogError> {
        let Some(id) = self.state.active().map(|instance| instance.id.clone()) else {
            return Ok(false);
        };
        let Some(dialog) = self.find_dialog(&id) else {
            return Ok(false);
        };
        dialog.on_dialog_event(self, &event).await
    }

    pub(crate) async fn dispatch_at_leaf(
        &mut self,
        event: DialogEvent,
    ) -> Result<bool, DialogError> {
        let Some(id) = self.state.active().map(|instance| instance.id.clone()) else {
            return Ok(false);
        };
        let Some(dialog) = self.find_dialog(&id) else {
            return Ok(false);
        };
        if let Some(container) = dialog.container() {
            container.emit_at_leaf(self, event).await
        } else {
            dialog.on_dialog_event(self, &event).await
        }
    }

    pub(crate) async fn end_active_dialog(
        &mut self,
        reason: DialogReason,
        result: Option<Value>,
    ) -> Result<(), DialogError> {
        let Some(id) = self.state.active().map(|instance| instance.id.clone()) else {
            return Ok(());
        };
        // Cleanup hook runs best-effort against the live frame; the pop
        // itself never depends on resolution succeeding.
        if let Some(dialog) = self.find_dialog(&id) {
            if let Some((turn, instance)) = self.split_active_and_turn() {
                dialog.end_dialog(turn, instance, reason).await?;
            }
        }
        self.state.pop();
        debug!(dialog = %id, reason = ?reason, "popped dialog");
        if reason == DialogReason::EndCalled {
            self.turn_mut()
                .set_value(memory_paths::LAST_RESULT, result.unwrap_or(Value::Null))?;
        }
        Ok(())
    }

    async fn check_version(&mut self) -> Result<(), DialogError> {
        let Some(active) = self.state.active() else {
            return Ok(());
        };
        let id = active.id.clone();
        let persisted = active.version.clone();
        let current = self.find_dialog(&id).and_then(|dialog| dialog.version());
        // Refresh the stored fingerprint first so a handled change does not
        // re-raise on the next turn.
        if let Some(instance) = self.state.active_mut() {
            instance.version = current.clone();
        }
        if let (Some(persisted), Some(current)) = (persisted, current) {
            if persisted != current {
                warn!(dialog = %id, "dialog version changed since state was persisted");
                let handled = self
                    .emit_inner(
                        dialog_events::VERSION_CHANGED,
                        Some(Value::String(id.to_string())),
                        true,
                        false,
                    )
                    .await?;
                if !handled {
                    return Err(DialogError::VersionChanged { id });
                }
            }
        }
        Ok(())
    }

    /// Borrows the turn state and the active frame at once, for hooks that
    /// take both.
    pub fn split_active_and_turn(&mut self) -> Option<(&mut TurnContext, &mut DialogInstance)> {
        let instance = self.state.active_mut()?;
        let turn = match &mut self.link {
            ContextLink::Root(turn) => &mut **turn,
            ContextLink::Child(parent) => parent.turn_mut(),
        };
        Some((turn, instance))
    }

    fn parent_active_id(&self) -> Option<DialogId> {
        match &self.link {
            ContextLink::Root(_) => None,
            ContextLink::Child(parent) => parent.active_id().cloned(),
        }
    }

    fn stack_diagnostics(&self) -> StackDiagnostics {
        StackDiagnostics {
            active_dialog: self.state.active().map(|instance| instance.id.clone()),
            parent_active_dialog: self.parent_active_id(),
            stack: self
                .state
                .dialog_stack
                .iter()
                .map(|instance| instance.id.clone())
                .collect(),
        }
    }

    fn diagnose<T>(&self, result: Result<T, DialogError>) -> Result<T, DialogError> {
        result.map_err(|err| err.with_diagnostics(self.stack_diagnostics()))
    }
}

impl<'a> ParentContext for DialogContext<'a> {
    fn find_dialog(&self, id: &DialogId) -> Option<Arc<dyn Dialog>> {
        DialogContext::find_dialog(self, id)
    }

    fn active_id(&self) -> Option<&DialogId> {
        self.state.active().map(|instance| &instance.id)
    }

    fn turn(&self) -> &TurnContext {
        DialogContext::turn(self)
    }

    fn turn_mut(&mut self) -> &mut TurnContext {
        DialogContext::turn_mut(self)
    }

    fn dispatch_event<'s>(
        &'s mut self,
        event: DialogEvent,
    ) -> BoxFuture<'s, Result<bool, DialogError>> {
        Box::pin(async move { self.dispatch_to_active(event).await })
    }

    fn cancel_cascade<'s>(
        &'s mut self,
        event_name: &'s str,
        event_value: Option<&'s Value>,
        already_popped: bool,
    ) -> BoxFuture<'s, Result<CancelSweep, DialogError>> {
        Box::pin(async move {
            let mut sweep = CancelSweep {
                popped: already_popped,
                intercepted: false,
            };
            self.cancel_local(event_name, event_value, &mut sweep)
                .await?;
            if !sweep.intercepted {
                if let ContextLink::Child(parent) = &mut self.link {
                    let above = parent
                        .cancel_cascade(event_name, event_value, sweep.popped)
                        .await?;
                    sweep = above;
                }
            }
            Ok(sweep)
        })
    }
}
