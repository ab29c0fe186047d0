//! Thread expand/collapse on top of the row store.
//!
//! Expanding a thread is split in two: `expand` synchronously drops a
//! loading placeholder under the header and hands back a [`FetchTicket`];
//! the caller fetches the thread's messages off the UI task and feeds the
//! result to `apply_fetch`, which swaps the placeholder for the messages.
//! Results are matched to the store by thread id, never by index, and are
//! dropped if the thread was collapsed (or re-expanded) in the meantime.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{ProviderError, RowStoreError};
use crate::expansion_store::ExpansionStore;
use crate::message::{MessageMeta, ThreadSummary};
use crate::row::{Row, RowId};
use crate::row_store::RowStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Collapsed,
    Expanding,
    Expanded,
    Collapsing,
}

/// A pending thread fetch. Only the newest ticket for a thread is honoured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub thread_id: String,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// A placeholder is showing; fetch the thread and call `apply_fetch`.
    /// `reconciled` is set when this happened to bring the view in line
    /// with the persisted state rather than in answer to the request.
    Fetch {
        ticket: FetchTicket,
        reconciled: bool,
    },
    /// The thread's rows were removed.
    Collapsed { removed: usize, reconciled: bool },
    /// Already in the requested state.
    NoOp,
    /// No header for this thread is on screen.
    NotShown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchApplied {
    /// Placeholder replaced by this many message rows.
    Applied(usize),
    /// Placeholder replaced by an error row.
    Failed,
    /// Result no longer wanted; nothing changed.
    Stale,
}

enum Request {
    Expand,
    Collapse,
    Toggle,
}

pub struct ThreadRowExpander {
    account: String,
    registry: Arc<dyn ExpansionStore>,
    states: HashMap<String, ThreadState>,
    generations: HashMap<String, u64>,
    next_generation: u64,
}

impl ThreadRowExpander {
    pub fn new(account: impl Into<String>, registry: Arc<dyn ExpansionStore>) -> Self {
        Self {
            account: account.into(),
            registry,
            states: HashMap::new(),
            generations: HashMap::new(),
            next_generation: 1,
        }
    }

    #[cfg(test)]
    pub fn state(&self, thread_id: &str) -> ThreadState {
        self.states
            .get(thread_id)
            .copied()
            .unwrap_or(ThreadState::Collapsed)
    }

    /// Forget per-thread progress after the store was rebuilt. Outstanding
    /// tickets will no longer match.
    pub fn reset(&mut self) {
        self.states.clear();
        self.generations.clear();
    }

    pub fn is_persisted_expanded(&self, thread_id: &str) -> bool {
        match self.registry.get(&self.account, thread_id) {
            Ok(expanded) => expanded,
            Err(e) => {
                warn!(thread_id, error = %e, "reading expansion state failed");
                false
            }
        }
    }

    pub fn expand(
        &mut self,
        rows: &mut RowStore,
        thread_id: &str,
    ) -> Result<ToggleOutcome, RowStoreError> {
        self.request(rows, thread_id, Request::Expand)
    }

    pub fn collapse(
        &mut self,
        rows: &mut RowStore,
        thread_id: &str,
    ) -> Result<ToggleOutcome, RowStoreError> {
        self.request(rows, thread_id, Request::Collapse)
    }

    pub fn toggle(
        &mut self,
        rows: &mut RowStore,
        thread_id: &str,
    ) -> Result<ToggleOutcome, RowStoreError> {
        self.request(rows, thread_id, Request::Toggle)
    }

    fn request(
        &mut self,
        rows: &mut RowStore,
        thread_id: &str,
        request: Request,
    ) -> Result<ToggleOutcome, RowStoreError> {
        let Some(header) = rows.header_index(thread_id) else {
            debug!(thread_id, "expand/collapse for thread not on screen");
            return Ok(ToggleOutcome::NotShown);
        };

        let observed = observed_expanded(rows, header);
        let persisted = match self.registry.get(&self.account, thread_id) {
            Ok(p) => p,
            Err(e) => {
                warn!(thread_id, error = %e, "expansion state unreadable, trusting view");
                observed
            }
        };

        // Bring the view in line with the registry before acting.
        if persisted != observed {
            info!(
                thread_id,
                persisted, observed, "reconciling thread view with persisted state"
            );
            return if persisted {
                self.show_placeholder(rows, header, thread_id)
                    .map(|ticket| ToggleOutcome::Fetch {
                        ticket,
                        reconciled: true,
                    })
            } else {
                self.hide_children(rows, header, thread_id)
                    .map(|removed| ToggleOutcome::Collapsed {
                        removed,
                        reconciled: true,
                    })
            };
        }

        let want_expanded = match request {
            Request::Expand => true,
            Request::Collapse => false,
            Request::Toggle => !observed,
        };
        if want_expanded == observed {
            return Ok(ToggleOutcome::NoOp);
        }

        self.persist(thread_id, want_expanded);
        if want_expanded {
            let ticket = self.show_placeholder(rows, header, thread_id)?;
            Ok(ToggleOutcome::Fetch {
                ticket,
                reconciled: false,
            })
        } else {
            let removed = self.hide_children(rows, header, thread_id)?;
            Ok(ToggleOutcome::Collapsed {
                removed,
                reconciled: false,
            })
        }
    }

    /// Install a fetched thread. Re-resolves the header and the placeholder
    /// by id; anything that no longer lines up makes the result stale.
    pub fn apply_fetch(
        &mut self,
        rows: &mut RowStore,
        ticket: &FetchTicket,
        result: Result<Vec<MessageMeta>, ProviderError>,
    ) -> Result<FetchApplied, RowStoreError> {
        let thread_id = ticket.thread_id.as_str();

        if self.generations.get(thread_id) != Some(&ticket.generation) {
            debug!(thread_id, generation = ticket.generation, "dropping superseded thread fetch");
            return Ok(FetchApplied::Stale);
        }
        if !self.is_persisted_expanded(thread_id) {
            debug!(thread_id, "thread collapsed while fetching, dropping result");
            return Ok(FetchApplied::Stale);
        }
        let Some(header) = rows.header_index(thread_id) else {
            debug!(thread_id, "thread left the view while fetching");
            return Ok(FetchApplied::Stale);
        };
        let placeholder_id = RowId::Placeholder(thread_id.to_string());
        let Some(slot) = rows
            .thread_block(header)
            .and_then(|block| block.into_iter().find(|&i| rows.ids()[i] == placeholder_id))
        else {
            debug!(thread_id, "no placeholder to replace");
            return Ok(FetchApplied::Stale);
        };

        let outcome = match result {
            Ok(messages) if !messages.is_empty() => {
                if let Some(summary) = ThreadSummary::from_messages(thread_id, &messages) {
                    rows.update_at(header, Row::header(summary, true))?;
                }
                let n = messages.len();
                rows.splice(slot, 1, Row::thread_children(messages))?;
                FetchApplied::Applied(n)
            }
            Ok(_) => {
                rows.splice(slot, 1, vec![Row::load_error(thread_id, "thread has no messages")])?;
                FetchApplied::Failed
            }
            Err(e) => {
                warn!(thread_id, error = %e, "thread fetch failed");
                rows.splice(slot, 1, vec![Row::load_error(thread_id, e.to_string())])?;
                FetchApplied::Failed
            }
        };
        self.states.insert(thread_id.to_string(), ThreadState::Expanded);
        Ok(outcome)
    }

    /// After a rebuild, put placeholders under every header the registry
    /// says is expanded. Returns the fetches to start.
    pub fn restore_persisted(&mut self, rows: &mut RowStore) -> Result<Vec<FetchTicket>, RowStoreError> {
        let threads: Vec<String> = rows
            .ids()
            .iter()
            .filter_map(|id| id.as_thread().map(str::to_string))
            .collect();

        let mut tickets = Vec::new();
        for thread_id in threads {
            if !self.is_persisted_expanded(&thread_id) {
                continue;
            }
            let Some(header) = rows.header_index(&thread_id) else {
                continue;
            };
            if rows.thread_block(header).is_some_and(|b| !b.is_empty()) {
                continue;
            }
            tickets.push(self.show_placeholder(rows, header, &thread_id)?);
        }
        Ok(tickets)
    }

    fn persist(&self, thread_id: &str, expanded: bool) {
        if let Err(e) = self.registry.set(&self.account, thread_id, expanded) {
            warn!(thread_id, expanded, error = %e, "saving expansion state failed");
        }
    }

    fn bump_generation(&mut self, thread_id: &str) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.generations.insert(thread_id.to_string(), generation);
        generation
    }

    fn show_placeholder(
        &mut self,
        rows: &mut RowStore,
        header: usize,
        thread_id: &str,
    ) -> Result<FetchTicket, RowStoreError> {
        // Clear leftovers (an old error row) so only the placeholder remains.
        if let Some(block) = rows.thread_block(header) {
            if !block.is_empty() {
                rows.remove_range(block.start, block.len())?;
            }
        }
        set_header_expanded(rows, header, true)?;
        rows.insert_at(header + 1, vec![Row::loading(thread_id)])?;
        self.states.insert(thread_id.to_string(), ThreadState::Expanding);
        let generation = self.bump_generation(thread_id);
        debug!(thread_id, generation, "thread expanding");
        Ok(FetchTicket {
            thread_id: thread_id.to_string(),
            generation,
        })
    }

    fn hide_children(
        &mut self,
        rows: &mut RowStore,
        header: usize,
        thread_id: &str,
    ) -> Result<usize, RowStoreError> {
        self.states.insert(thread_id.to_string(), ThreadState::Collapsing);
        // Any fetch still in flight is now unwanted.
        self.bump_generation(thread_id);

        let removed = match rows.thread_block(header) {
            Some(block) if !block.is_empty() => rows.remove_range(block.start, block.len())?.len(),
            _ => 0,
        };
        set_header_expanded(rows, header, false)?;
        self.states.insert(thread_id.to_string(), ThreadState::Collapsed);
        debug!(thread_id, removed, "thread collapsed");
        Ok(removed)
    }
}

/// Whether the view currently shows thread rows under the header.
fn observed_expanded(rows: &RowStore, header: usize) -> bool {
    let flagged = matches!(rows.row(header), Some(Row::ThreadHeader { expanded: true, .. }));
    let has_children = rows.thread_block(header).is_some_and(|b| !b.is_empty());
    flagged || has_children
}

fn set_header_expanded(rows: &mut RowStore, header: usize, expanded: bool) -> Result<(), RowStoreError> {
    if let Some(Row::ThreadHeader { summary, expanded: current }) = rows.row(header) {
        if *current != expanded {
            let summary = summary.clone();
            rows.update_at(header, Row::header(summary, expanded))?;
        }
    }
    Ok(())
}
