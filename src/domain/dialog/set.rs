//! Registry mapping dialog ids to dialogs.

use std::collections::HashMap;
use std::sync::Arc;

use super::dialog::Dialog;
use crate::domain::foundation::{DialogError, DialogId};

/// A set of registered dialogs.
///
/// Lookup is local only; resolution through enclosing sets happens via the
/// context's parent chain, not here.
#[derive(Default)]
pub struct DialogSet {
    dialogs: HashMap<DialogId, Arc<dyn Dialog>>,
}

impl DialogSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a dialog under its own id.
    ///
    /// # Errors
    /// Returns `DialogError::DuplicateDialog` if the id is already taken.
    pub fn add(&mut self, dialog: Arc<dyn Dialog>) -> Result<(), DialogError> {
        let id = dialog.id().clone();
        if self.dialogs.contains_key(&id) {
            return Err(DialogError::DuplicateDialog { id });
        }
        self.dialogs.insert(id, dialog);
        Ok(())
    }

    /// Looks a dialog up in this set only.
    pub fn find(&self, id: &DialogId) -> Option<Arc<dyn Dialog>> {
        self.dialogs.get(id).cloned()
    }

    /// Number of registered dialogs.
    pub fn len(&self) -> usize {
        self.dialogs.len()
    }

    /// True when no dialog is registered.
    pub fn is_empty(&self) -> bool {
        self.dialogs.is_empty()
    }
}

impl std::fmt::Debug for DialogSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&str> = self.dialogs.keys().map(|id| id.as_str()).collect();
        ids.sort_unstable();
        f.debug_struct("DialogSet").field("dialogs", &ids).finish()
    }
}
