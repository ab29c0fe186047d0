//! Undo for mailbox mutations. Entries remember what was done to which
//! messages; undoing replays the inverse actions through the provider.

use tracing::warn;

use crate::provider::{MailAction, MailProvider};

const MAX_ENTRIES: usize = 50;

/// Undo stack for mailbox actions.
/// Each entry is one user-visible operation: the actions it ran, in order,
/// and the messages they succeeded on.
#[derive(Debug, Clone, PartialEq)]
pub struct UndoEntry {
    pub message_ids: Vec<String>,
    pub actions: Vec<MailAction>,
    pub description: String,
}

impl UndoEntry {
    pub fn new(message_ids: Vec<String>, actions: Vec<MailAction>, description: String) -> Self {
        Self {
            message_ids,
            actions,
            description,
        }
    }

    /// Inverse actions, last action undone first.
    pub fn inverse_steps(&self) -> Vec<MailAction> {
        self.actions.iter().rev().flat_map(MailAction::inverse).collect()
    }
}

#[derive(Debug, Default)]
pub struct UndoStack {
    entries: Vec<UndoEntry>,
}

impl UndoStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry. Entries touching no messages are ignored; the
    /// oldest entry falls off past the cap.
    pub fn push(&mut self, entry: UndoEntry) {
        if entry.message_ids.is_empty() {
            return;
        }
        if self.entries.len() == MAX_ENTRIES {
            self.entries.remove(0);
        }
        self.entries.push(entry);
    }

    pub fn pop(&mut self) -> Option<UndoEntry> {
        self.entries.pop()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Outcome of replaying an entry's inverse through the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct UndoReport {
    pub description: String,
    pub failed: usize,
}

/// Run the inverse of `entry` for each of its messages.
pub async fn replay(provider: &dyn MailProvider, entry: &UndoEntry) -> UndoReport {
    let steps = entry.inverse_steps();
    let mut failed = 0;
    for id in &entry.message_ids {
        for step in &steps {
            if let Err(e) = provider.mutate_message(id, step).await {
                warn!(message_id = %id, error = %e, "undo step failed");
                failed += 1;
            }
        }
    }
    UndoReport {
        description: entry.description.clone(),
        failed,
    }
}
