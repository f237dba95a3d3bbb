//! Sequential-step dialog driven by a persisted step index.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use async_trait::async_trait;

use super::context::DialogContext;
use super::dialog::Dialog;
use super::turn::TurnContext;
use super::turn_result::{DialogReason, DialogTurnResult};
use crate::domain::foundation::{DialogError, DialogId};

/// One step of a waterfall.
///
/// Steps are plain functions over the step context; each invocation must
/// finish by exactly one of starting a child dialog, calling `next`, or
/// ending/replacing/cancelling. Returning without any of those stalls the
/// dialog until the next activity, which is only correct for steps that
/// just sent a prompt.
pub type WaterfallStep = Box<
    dyn for<'a, 'b, 'c> Fn(
            &'a mut WaterfallStepContext<'b, 'c>,
        ) -> BoxFuture<'a, Result<DialogTurnResult, DialogError>>
        + Send
        + Sync,
>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WaterfallState {
    #[serde(default)]
    step_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    options: Option<Value>,
    #[serde(default)]
    values: Map<String, Value>,
}

/// A dialog that runs an ordered list of steps, one activity at a time.
///
/// The step index advances strictly forward and is persisted before any
/// step code runs, so a crash mid-step re-runs that step rather than
/// skipping it. The version fingerprint covers the step count: adding or
/// removing steps invalidates persisted instances.
pub struct WaterfallDialog {
    id: DialogId,
    steps: Vec<WaterfallStep>,
}

impl WaterfallDialog {
    /// Creates an empty waterfall.
    pub fn new(id: impl Into<DialogId>) -> Self {
        Self {
            id: id.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    pub fn add_step<F>(mut self, step: F) -> Self
    where
        F: for<'a, 'b, 'c> Fn(
                &'a mut WaterfallStepContext<'b, 'c>,
            ) -> BoxFuture<'a, Result<DialogTurnResult, DialogError>>
            + Send
            + Sync
            + 'static,
    {
        self.steps.push(Box::new(step));
        self
    }

    /// Number of configured steps.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    fn persisted_state(&self, dc: &DialogContext<'_>) -> Result<WaterfallState, DialogError> {
        let instance = dc.active_dialog().ok_or(DialogError::NoActiveDialog)?;
        Ok(serde_json::from_value(instance.state.clone())?)
    }

    async fn run_step(
        &self,
        dc: &mut DialogContext<'_>,
        index: usize,
        reason: DialogReason,
        result: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        if index >= self.steps.len() {
            // Past the last step: the whole dialog is done.
            return dc.end_dialog(result).await;
        }
        debug!(dialog = %self.id, step = index, reason = ?reason, "running waterfall step");
        // Persist the index before user code can observe or fail the step.
        let (options, values) = {
            let instance = dc
                .active_dialog_mut()
                .ok_or(DialogError::NoActiveDialog)?;
            let mut state: WaterfallState = serde_json::from_value(instance.state.clone())?;
            state.step_index = index;
            instance.state = serde_json::to_value(&state)?;
            (state.options, state.values)
        };
        let mut step = WaterfallStepContext {
            dialog: self,
            dc,
            index,
            reason,
            result,
            options,
            values,
            next_called: false,
            transferred: false,
        };
        let turn_result = (self.steps[index])(&mut step).await?;
        let WaterfallStepContext {
            dc,
            values,
            transferred,
            ..
        } = step;
        if !transferred {
            // The frame is still ours; keep whatever the step accumulated.
            if let Some(instance) = dc.active_dialog_mut() {
                let mut state: WaterfallState = serde_json::from_value(instance.state.clone())?;
                state.values = values;
                instance.state = serde_json::to_value(&state)?;
            }
        }
        Ok(turn_result)
    }
}

#[async_trait]
impl Dialog for WaterfallDialog {
    fn id(&self) -> &DialogId {
        &self.id
    }

    fn version(&self) -> Option<String> {
        Some(format!("{}:{}", self.id, self.steps.len()))
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        options: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        let state = WaterfallState {
            step_index: 0,
            options,
            values: Map::new(),
        };
        let instance = dc
            .active_dialog_mut()
            .ok_or(DialogError::NoActiveDialog)?;
        instance.state = serde_json::to_value(&state)?;
        self.run_step(dc, 0, DialogReason::BeginCalled, None).await
    }

    async fn continue_dialog(
        &self,
        dc: &mut DialogContext<'_>,
    ) -> Result<DialogTurnResult, DialogError> {
        // Only message turns advance the waterfall.
        if !dc.turn().activity().is_message() {
            return Ok(DialogTurnResult::waiting());
        }
        let text = dc.turn().activity().text.clone().unwrap_or_default();
        let state = self.persisted_state(dc)?;
        self.run_step(
            dc,
            state.step_index + 1,
            DialogReason::ContinueCalled,
            Some(Value::String(text)),
        )
        .await
    }

    async fn resume_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        reason: DialogReason,
        result: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        let state = self.persisted_state(dc)?;
        self.run_step(dc, state.step_index + 1, reason, result).await
    }
}

/// Scoped view of one step invocation.
///
/// Values written through `set_value` accumulate across the whole run;
/// they are flushed to the persisted frame before any control transfer and
/// after the step returns without transferring.
pub struct WaterfallStepContext<'b, 'c> {
    dialog: &'b WaterfallDialog,
    dc: &'b mut DialogContext<'c>,
    index: usize,
    reason: DialogReason,
    result: Option<Value>,
    options: Option<Value>,
    values: Map<String, Value>,
    next_called: bool,
    transferred: bool,
}

impl<'b, 'c> WaterfallStepContext<'b, 'c> {
    /// Zero-based index of the running step.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Why this step is running.
    pub fn reason(&self) -> DialogReason {
        self.reason
    }

    /// Result forwarded into this step: the message text on continue, a
    /// child's result on resume, or whatever `next` passed along.
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Options the waterfall was begun with.
    pub fn options(&self) -> Option<&Value> {
        self.options.as_ref()
    }

    /// Values accumulated across the run so far.
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Stores a value for later steps.
    pub fn set_value(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// The turn state.
    pub fn turn(&self) -> &TurnContext {
        self.dc.turn()
    }

    /// Mutable turn state, for queueing responses.
    pub fn turn_mut(&mut self) -> &mut TurnContext {
        self.dc.turn_mut()
    }

    /// Skips to the next step, forwarding `result` to it.
    ///
    /// Strictly one-shot: a second call within the same invocation is a
    /// programming fault, not a no-op.
    pub async fn next(&mut self, result: Option<Value>) -> Result<DialogTurnResult, DialogError> {
        if self.next_called {
            return Err(DialogError::StepAlreadyAdvanced {
                id: self.dialog.id.clone(),
                index: self.index,
            });
        }
        self.next_called = true;
        self.flush_values()?;
        self.transferred = true;
        self.dialog
            .run_step(self.dc, self.index + 1, DialogReason::NextCalled, result)
            .await
    }

    /// Starts a child dialog; its result arrives at the next step.
    pub async fn begin_dialog(
        &mut self,
        id: &DialogId,
        options: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        self.flush_values()?;
        self.transferred = true;
        self.dc.begin_dialog(id, options).await
    }

    /// Ends the waterfall, forwarding `result` to its caller.
    pub async fn end_dialog(
        &mut self,
        result: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        self.flush_values()?;
        self.transferred = true;
        self.dc.end_dialog(result).await
    }

    /// Replaces the waterfall with another dialog.
    pub async fn replace_dialog(
        &mut self,
        id: &DialogId,
        options: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        self.flush_values()?;
        self.transferred = true;
        self.dc.replace_dialog(id, options).await
    }

    /// Cancels this stack.
    pub async fn cancel_all_dialogs(&mut self) -> Result<DialogTurnResult, DialogError> {
        self.flush_values()?;
        self.transferred = true;
        self.dc.cancel_all_dialogs(false, None, None).await
    }

    fn flush_values(&mut self) -> Result<(), DialogError> {
        if let Some(instance) = self.dc.active_dialog_mut() {
            let mut state: WaterfallState = serde_json::from_value(instance.state.clone())?;
            state.values = self.values.clone();
            instance.state = serde_json::to_value(&state)?;
        }
        Ok(())
    }
}
