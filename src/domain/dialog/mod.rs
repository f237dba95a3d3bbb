//! Dialog stack domain module.
//!
//! The core stack machine: dialogs, the persisted stack and session
//! envelope, the per-turn context that drives them, and the stock
//! dialog kinds (waterfall, component, command leaves).

mod commands;
mod component;
mod context;
mod dialog;
mod event;
mod instance;
mod session;
mod set;
mod turn;
mod turn_result;
mod waterfall;

pub use commands::{
    AskText, CallDialog, CancelAllDialogsCommand, EndDialogCommand, GotoDialog, SendMessage,
};
pub use component::ComponentDialog;
pub use context::{memory_paths, CancelSweep, DialogContext, ParentContext};
pub use dialog::{ContainerDialog, Dialog};
pub use event::{dialog_events, DialogEvent};
pub use instance::{DialogInstance, DialogState};
pub use session::SessionState;
pub use set::DialogSet;
pub use turn::TurnContext;
pub use turn_result::{DialogReason, DialogTurnResult, DialogTurnStatus};
pub use waterfall::{WaterfallDialog, WaterfallStep, WaterfallStepContext};
