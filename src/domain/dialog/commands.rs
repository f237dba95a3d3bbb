//! Leaf dialogs packaging one control-flow primitive each.
//!
//! These are the building blocks plans and waterfalls compose: send a
//! line, call or jump to another dialog, end or cancel, ask for text.

use async_trait::async_trait;
use serde_json::Value;

use super::context::DialogContext;
use super::dialog::Dialog;
use super::instance::DialogInstance;
use super::turn::TurnContext;
use super::turn_result::DialogTurnResult;
use crate::domain::foundation::{DialogError, DialogId};

/// Renders `{path}` placeholders against the turn memory.
///
/// Missing paths render as empty; an unterminated brace is kept verbatim.
fn render_template(template: &str, turn: &TurnContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                if let Some(value) = turn.get_value(&after[..end]) {
                    match value {
                        Value::String(text) => out.push_str(&text),
                        other => out.push_str(&other.to_string()),
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Queues one message and ends immediately.
pub struct SendMessage {
    id: DialogId,
    text: String,
}

impl SendMessage {
    pub fn new(id: impl Into<DialogId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

#[async_trait]
impl Dialog for SendMessage {
    fn id(&self) -> &DialogId {
        &self.id
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        _options: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        let text = render_template(&self.text, dc.turn());
        dc.turn_mut().send_message(text);
        dc.end_dialog(None).await
    }
}

/// Begins a target dialog as a child and forwards its result.
pub struct CallDialog {
    id: DialogId,
    target: DialogId,
    options: Option<Value>,
}

impl CallDialog {
    pub fn new(id: impl Into<DialogId>, target: impl Into<DialogId>) -> Self {
        Self {
            id: id.into(),
            target: target.into(),
            options: None,
        }
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }
}

#[async_trait]
impl Dialog for CallDialog {
    fn id(&self) -> &DialogId {
        &self.id
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        _options: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        let target = self.target.clone();
        dc.begin_dialog(&target, self.options.clone()).await
    }
}

/// Replaces itself with a target dialog; the caller is never resumed by
/// the jump itself.
pub struct GotoDialog {
    id: DialogId,
    target: DialogId,
    options: Option<Value>,
}

impl GotoDialog {
    pub fn new(id: impl Into<DialogId>, target: impl Into<DialogId>) -> Self {
        Self {
            id: id.into(),
            target: target.into(),
            options: None,
        }
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }
}

#[async_trait]
impl Dialog for GotoDialog {
    fn id(&self) -> &DialogId {
        &self.id
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        _options: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        let target = self.target.clone();
        dc.replace_dialog(&target, self.options.clone()).await
    }
}

/// Ends immediately, forwarding an optional fixed result.
pub struct EndDialogCommand {
    id: DialogId,
    result: Option<Value>,
}

impl EndDialogCommand {
    pub fn new(id: impl Into<DialogId>) -> Self {
        Self {
            id: id.into(),
            result: None,
        }
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }
}

#[async_trait]
impl Dialog for EndDialogCommand {
    fn id(&self) -> &DialogId {
        &self.id
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        _options: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        dc.end_dialog(self.result.clone()).await
    }
}

/// Cancels the whole stack, ancestors included.
pub struct CancelAllDialogsCommand {
    id: DialogId,
    event_name: Option<String>,
}

impl CancelAllDialogsCommand {
    pub fn new(id: impl Into<DialogId>) -> Self {
        Self {
            id: id.into(),
            event_name: None,
        }
    }

    /// Names the cancellation event offered to frames being swept.
    pub fn with_event(mut self, name: impl Into<String>) -> Self {
        self.event_name = Some(name.into());
        self
    }
}

#[async_trait]
impl Dialog for CancelAllDialogsCommand {
    fn id(&self) -> &DialogId {
        &self.id
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        _options: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        dc.cancel_all_dialogs(true, self.event_name.as_deref(), None)
            .await
    }
}

/// Prompts for a non-empty line of text and stores it in memory.
pub struct AskText {
    id: DialogId,
    prompt: String,
    property: String,
    retry_prompt: Option<String>,
}

impl AskText {
    pub fn new(
        id: impl Into<DialogId>,
        prompt: impl Into<String>,
        property: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            property: property.into(),
            retry_prompt: None,
        }
    }

    /// Sets the line sent when the reply is empty; defaults to the prompt.
    pub fn with_retry(mut self, retry: impl Into<String>) -> Self {
        self.retry_prompt = Some(retry.into());
        self
    }

    fn send_prompt(&self, dc: &mut DialogContext<'_>) {
        let text = render_template(&self.prompt, dc.turn());
        dc.turn_mut().send_message(text);
    }
}

#[async_trait]
impl Dialog for AskText {
    fn id(&self) -> &DialogId {
        &self.id
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        _options: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        self.send_prompt(dc);
        Ok(DialogTurnResult::waiting())
    }

    async fn continue_dialog(
        &self,
        dc: &mut DialogContext<'_>,
    ) -> Result<DialogTurnResult, DialogError> {
        if !dc.turn().activity().is_message() {
            return Ok(DialogTurnResult::waiting());
        }
        let text = dc.turn().activity().text_or_empty().to_string();
        if text.is_empty() {
            let retry = self.retry_prompt.as_deref().unwrap_or(&self.prompt);
            let line = render_template(retry, dc.turn());
            dc.turn_mut().send_message(line);
            return Ok(DialogTurnResult::waiting());
        }
        dc.turn_mut()
            .set_value(&self.property, Value::String(text.clone()))?;
        dc.end_dialog(Some(Value::String(text))).await
    }

    async fn reprompt_dialog(
        &self,
        turn: &mut TurnContext,
        _instance: &mut DialogInstance,
    ) -> Result<(), DialogError> {
        let text = render_template(&self.prompt, turn);
        turn.send_message(text);
        Ok(())
    }
}
