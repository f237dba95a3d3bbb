//! The dialog capability traits.

use async_trait::async_trait;
use serde_json::Value;

use super::context::DialogContext;
use super::event::DialogEvent;
use super::instance::DialogInstance;
use super::turn::TurnContext;
use super::turn_result::{DialogReason, DialogTurnResult};
use crate::domain::foundation::{DialogError, DialogId};

/// A reusable unit of conversational behavior.
///
/// Identity is supplied explicitly at construction and never derived from
/// the type. The default method bodies give leaf dialogs their standard
/// behavior: `continue_dialog` ends immediately forwarding nothing, and
/// `resume_dialog` ends forwarding the child's result.
#[async_trait]
pub trait Dialog: Send + Sync {
    /// The dialog's registered id.
    fn id(&self) -> &DialogId;

    /// Version fingerprint for persisted-state compatibility checks.
    ///
    /// Dialogs that return `Some` opt into the `version_changed` event when
    /// a persisted instance was created under a different fingerprint.
    fn version(&self) -> Option<String> {
        None
    }

    /// Container capability, when this dialog nests its own stack.
    ///
    /// Used for leaf-first event dispatch; leaf dialogs return `None`.
    fn container(&self) -> Option<&dyn ContainerDialog> {
        None
    }

    /// Starts a new instance of the dialog on the context's stack.
    async fn begin_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        options: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError>;

    /// Continues the active instance with a fresh activity.
    async fn continue_dialog(
        &self,
        dc: &mut DialogContext<'_>,
    ) -> Result<DialogTurnResult, DialogError> {
        dc.end_dialog(None).await
    }

    /// Resumes the dialog after a child it started has ended.
    async fn resume_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        reason: DialogReason,
        result: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        let _ = reason;
        dc.end_dialog(result).await
    }

    /// Re-sends whatever prompt the dialog is waiting on.
    async fn reprompt_dialog(
        &self,
        turn: &mut TurnContext,
        instance: &mut DialogInstance,
    ) -> Result<(), DialogError> {
        let _ = (turn, instance);
        Ok(())
    }

    /// Cleanup hook run as the instance is popped.
    async fn end_dialog(
        &self,
        turn: &mut TurnContext,
        instance: &mut DialogInstance,
        reason: DialogReason,
    ) -> Result<(), DialogError> {
        let _ = (turn, instance, reason);
        Ok(())
    }

    /// Two-phase event dispatch: a pre-bubble hook, escalation to the
    /// parent context while unhandled and the event bubbles, then a
    /// post-bubble hook as the last chance to claim it.
    async fn on_dialog_event(
        &self,
        dc: &mut DialogContext<'_>,
        event: &DialogEvent,
    ) -> Result<bool, DialogError> {
        let mut handled = self.on_pre_bubble_event(dc, event).await?;
        if !handled && event.bubble {
            handled = dc.bubble_to_parent(event).await?;
        }
        if !handled {
            handled = self.on_post_bubble_event(dc, event).await?;
        }
        Ok(handled)
    }

    /// First chance to handle an event, before it escalates.
    async fn on_pre_bubble_event(
        &self,
        dc: &mut DialogContext<'_>,
        event: &DialogEvent,
    ) -> Result<bool, DialogError> {
        let _ = (dc, event);
        Ok(false)
    }

    /// Last chance to handle an event no ancestor claimed.
    async fn on_post_bubble_event(
        &self,
        dc: &mut DialogContext<'_>,
        event: &DialogEvent,
    ) -> Result<bool, DialogError> {
        let _ = (dc, event);
        Ok(false)
    }
}

/// Descent capability for dialogs that nest an entire stack inside one
/// frame of the outer stack.
#[async_trait]
pub trait ContainerDialog: Dialog {
    /// Dispatches an event starting at the deepest active descendant of
    /// this container's nested stack.
    ///
    /// `dc` is the outer context whose active frame belongs to this
    /// container. An empty nested stack leaves the event unhandled.
    async fn emit_at_leaf(
        &self,
        dc: &mut DialogContext<'_>,
        event: DialogEvent,
    ) -> Result<bool, DialogError>;
}
