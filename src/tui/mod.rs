pub mod help_overlay;
pub mod label_picker;
pub mod message_table;
pub mod preview;
pub mod status_bar;
pub mod tasks;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{
        DisableMouseCapture, EnableMouseCapture, Event, EventStream, KeyEvent, KeyEventKind,
        MouseButton, MouseEvent, MouseEventKind,
    },
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use futures::StreamExt;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    Frame, Terminal,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::bulk::{apply_batch, plan_batch, BatchReport, BatchTarget, BulkSelection};
use crate::config::Config;
use crate::expander::{FetchApplied, ThreadRowExpander, ToggleOutcome};
use crate::expansion_store::ExpansionStore;
use crate::format::RowFormatter;
use crate::keymap::{Action, InputMode, KeyMapper};
use crate::message::{labels, Label};
use crate::pager::{PageAppender, Pagination};
use crate::provider::{ListQuery, MailAction, MailProvider};
use crate::row::{Row, RowId};
use crate::row_store::RowStore;
use crate::search::{LocalQuery, SearchSnapshotManager};
use crate::undo::{UndoEntry, UndoStack};

use self::help_overlay::HelpOverlay;
use self::label_picker::{filtered_labels, LabelPicker, PickerPurpose};
use self::message_table::MessageTable;
use self::preview::PreviewPane;
use self::status_bar::{BottomBar, TopBar};
use self::tasks::{Background, Listing, UiUpdate};

pub struct App {
    pub config: Config,
    account: String,
    background: Background,

    pub rows: RowStore,
    expander: ThreadRowExpander,
    pager: PageAppender,
    search: SearchSnapshotManager,
    bulk: BulkSelection,
    undo: UndoStack,
    labels: Vec<Label>,

    pub keymap: KeyMapper,
    pub mode: InputMode,
    pub should_quit: bool,

    // What is being shown
    query: ListQuery,
    /// Label view to return to when a provider search is left.
    previous_query: Option<ListQuery>,
    threaded: bool,
    epoch: u64,
    loading: bool,
    /// Results held back while a local filter is showing.
    deferred: Vec<UiUpdate>,

    // Text input
    filter_input: String,
    search_input: String,
    picker_filter: String,
    picker_selected: usize,
    picker_purpose: PickerPurpose,

    // Selection-change notifications
    last_selected: Option<RowId>,
    selection_changes: u64,

    pub scroll_offset: usize,
    pub preview_scroll: u16,
    pub help_scroll: u16,
    list_height: usize,
    /// Screen area of the message list, as last drawn.
    list_area: Rect,
    status_message: Option<String>,
    status_time: Option<Instant>,
}

impl App {
    /// Build the app around `provider`. Background results arrive on the
    /// returned receiver and must be fed back through `apply_update`.
    pub fn new(
        config: Config,
        provider: Arc<dyn MailProvider>,
        registry: Arc<dyn ExpansionStore>,
        formatter: Box<dyn RowFormatter>,
    ) -> (Self, UnboundedReceiver<UiUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let idx = config.default_account_index();
        let account = config.account_name(idx);
        let query = ListQuery::label(config.inbox_label(idx));
        let threaded = config.threaded;

        let app = Self {
            expander: ThreadRowExpander::new(account.clone(), registry),
            account,
            background: Background::new(provider, tx),
            rows: RowStore::new(formatter),
            pager: PageAppender::new(Pagination::new(None)),
            search: SearchSnapshotManager::new(),
            bulk: BulkSelection::new(),
            undo: UndoStack::new(),
            labels: Vec::new(),
            keymap: KeyMapper::new(),
            mode: InputMode::Normal,
            should_quit: false,
            query,
            previous_query: None,
            threaded,
            epoch: 0,
            loading: false,
            deferred: Vec::new(),
            filter_input: String::new(),
            search_input: String::new(),
            picker_filter: String::new(),
            picker_selected: 0,
            picker_purpose: PickerPurpose::Navigate,
            last_selected: None,
            selection_changes: 0,
            scroll_offset: 0,
            preview_scroll: 0,
            help_scroll: 0,
            list_height: 20,
            list_area: Rect::default(),
            status_message: None,
            status_time: None,
            config,
        };
        (app, rx)
    }

    /// Kick off the label list and the first page.
    pub fn start(&mut self) {
        info!(account = %self.account, view = %self.query.describe(), threaded = self.threaded, "starting");
        self.background.load_labels();
        self.reload();
    }

    /// Show `query` instead of the account inbox. Takes effect on the next
    /// reload.
    pub fn set_query(&mut self, query: ListQuery) {
        self.previous_query = None;
        self.query = query;
    }

    // ── Accessors ───────────────────────────────────────────────────

    #[cfg(test)]
    pub fn query(&self) -> &ListQuery {
        &self.query
    }

    #[cfg(test)]
    pub fn bulk(&self) -> &BulkSelection {
        &self.bulk
    }

    #[cfg(test)]
    pub fn filter_active(&self) -> bool {
        self.search.is_active()
    }

    #[cfg(test)]
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    #[cfg(test)]
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    #[cfg(test)]
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    #[cfg(test)]
    pub fn status(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    /// How many times the selected row has changed.
    #[cfg(test)]
    pub fn selection_changes(&self) -> u64 {
        self.selection_changes
    }

    #[cfg(test)]
    pub fn pagination(&self) -> &Pagination {
        self.pager.pagination()
    }

    // ── Status ──────────────────────────────────────────────────────

    fn set_status(&mut self, msg: impl Into<String>) {
        self.status_message = Some(msg.into());
        self.status_time = Some(Instant::now());
    }

    fn clear_stale_status(&mut self) {
        if let Some(t) = self.status_time {
            if t.elapsed() > self.config.status_timeout() {
                self.status_message = None;
                self.status_time = None;
            }
        }
    }

    /// Bookkeeping after every key action and every applied update: marks
    /// on rows that left the store are dropped, then a changed selection is
    /// reported.
    fn settle(&mut self) {
        self.bulk.retain_present(&self.rows);
        self.notify_selection();
    }

    /// Fire the selection-changed notification if the selected row differs
    /// from the last one reported.
    fn notify_selection(&mut self) {
        let current = self.rows.selected_id().cloned();
        if current != self.last_selected {
            self.selection_changes += 1;
            self.preview_scroll = 0;
            debug!(selected = ?current, changes = self.selection_changes, "selection changed");
            self.last_selected = current;
        }
    }

    fn label_name(&self, id: &str) -> String {
        self.labels
            .iter()
            .find(|l| l.id == id)
            .map(|l| l.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Status wording for `action`, with label names in place of ids.
    fn action_verb(&self, action: &MailAction) -> String {
        match action {
            MailAction::ApplyLabel(l) => format!("Labelled {}", self.label_name(l)),
            MailAction::RemoveLabel(l) => format!("Unlabelled {}", self.label_name(l)),
            MailAction::MoveToFolder(l) => format!("Moved to {}", self.label_name(l)),
            other => other.describe(),
        }
    }

    // ── Loading ─────────────────────────────────────────────────────

    /// Throw away the current view and fetch the first page of `query`.
    fn reload(&mut self) {
        self.epoch += 1;
        self.search.discard();
        self.filter_input.clear();
        if self.mode == InputMode::Filter {
            self.mode = InputMode::Normal;
        }
        self.deferred.clear();
        self.bulk.clear();
        self.pager.reset(None);
        self.loading = true;
        self.set_status(format!("Loading {}…", self.query.describe()));
        debug!(epoch = self.epoch, view = %self.query.describe(), "reload");
        self.background.reload(
            self.epoch,
            self.query.clone(),
            self.threaded,
            self.config.page_size,
        );
    }

    fn navigate(&mut self, query: ListQuery) {
        self.set_query(query);
        self.reload();
    }

    fn load_more(&mut self) {
        if self.search.is_active() {
            return;
        }
        if let Some(cursor) = self.pager.pagination_mut().begin_load() {
            debug!(cursor = %cursor, "loading next page");
            self.background.load_page(
                self.epoch,
                self.query.clone(),
                self.threaded,
                cursor,
                self.config.page_size,
            );
        }
    }

    /// Start fetches for threads remembered as expanded.
    fn restore_expanded(&mut self) -> Result<()> {
        if !self.threaded {
            return Ok(());
        }
        for ticket in self.expander.restore_persisted(&mut self.rows)? {
            self.background.fetch_thread(ticket);
        }
        Ok(())
    }

    // ── Background results ──────────────────────────────────────────

    pub fn apply_update(&mut self, update: UiUpdate) {
        if let Err(e) = self.apply_update_inner(update) {
            warn!(error = %e, "applying update failed");
            self.set_status(format!("Error: {}", e));
        }
        self.settle();
    }

    fn apply_update_inner(&mut self, update: UiUpdate) -> Result<()> {
        match update {
            UiUpdate::Reloaded { epoch, result } => {
                if epoch != self.epoch {
                    debug!(epoch, current = self.epoch, "stale reload dropped");
                    return Ok(());
                }
                if self.search.is_active() {
                    self.deferred.push(UiUpdate::Reloaded { epoch, result });
                    return Ok(());
                }
                self.loading = false;
                match result {
                    Ok(listing) => self.install_listing(listing)?,
                    Err(e) => {
                        warn!(error = %e, "reload failed");
                        self.set_status(format!("Load failed: {}", e));
                    }
                }
            }
            UiUpdate::PageLoaded { epoch, result } => {
                if epoch != self.epoch {
                    debug!(epoch, current = self.epoch, "stale page dropped");
                    return Ok(());
                }
                if self.search.is_active() {
                    self.deferred.push(UiUpdate::PageLoaded { epoch, result });
                    return Ok(());
                }
                match result {
                    Ok(listing) => {
                        let report = self
                            .pager
                            .append_page(&mut self.rows, listing.rows, listing.next_cursor)?;
                        if report.selection_repaired {
                            debug!(
                                page = self.pager.pagination().pages(),
                                "selection moved to first row after append"
                            );
                        }
                        self.restore_expanded()?;
                    }
                    Err(e) => {
                        warn!(error = %e, "page load failed");
                        self.pager.pagination_mut().load_failed();
                        self.set_status(format!("Could not load more: {}", e));
                    }
                }
            }
            UiUpdate::ThreadFetched { ticket, result } => {
                if self.search.is_active() {
                    self.deferred.push(UiUpdate::ThreadFetched { ticket, result });
                    return Ok(());
                }
                match self.expander.apply_fetch(&mut self.rows, &ticket, result)? {
                    FetchApplied::Applied(n) => {
                        debug!(thread_id = %ticket.thread_id, messages = n, "thread shown")
                    }
                    FetchApplied::Failed => self.set_status("Could not load thread"),
                    FetchApplied::Stale => {}
                }
            }
            UiUpdate::BatchFinished(report) => {
                self.finish_batch(&report);
                let verb = self.action_verb(&report.action);
                self.undo.push(UndoEntry::new(
                    report.done_message_ids,
                    vec![report.action],
                    verb,
                ));
            }
            UiUpdate::MoveFinished { report, labelled } => {
                self.finish_batch(&report);
                let verb = self.action_verb(&report.action);
                if let MailAction::MoveToFolder(label) = report.action {
                    // Undone as two steps: unarchive, then drop the label.
                    self.undo.push(UndoEntry::new(
                        labelled,
                        vec![MailAction::ApplyLabel(label), MailAction::Archive],
                        verb,
                    ));
                }
            }
            UiUpdate::UndoFinished(report) => {
                if report.failed > 0 {
                    self.set_status(format!(
                        "Undo of \"{}\": {} step(s) failed",
                        report.description, report.failed
                    ));
                } else {
                    self.set_status(format!("Undid: {}", report.description));
                }
                let status = self.status_message.clone();
                self.reload();
                self.status_message = status;
            }
            UiUpdate::LabelsLoaded(result) => match result {
                Ok(labels) => {
                    debug!(count = labels.len(), "labels loaded");
                    self.labels = labels;
                }
                Err(e) => {
                    warn!(error = %e, "label list failed");
                    self.set_status(format!("Could not load labels: {}", e));
                }
            },
        }
        Ok(())
    }

    fn install_listing(&mut self, listing: Listing) -> Result<()> {
        self.expander.reset();
        let count = listing.rows.len();
        let more = listing.next_cursor.is_some();
        self.rows.replace(listing.rows);
        self.pager.reset(listing.next_cursor);
        self.scroll_offset = 0;
        self.restore_expanded()?;
        if self
            .status_message
            .as_deref()
            .is_some_and(|s| s.starts_with("Loading"))
        {
            self.status_message = None;
        }
        info!(rows = count, more, view = %self.query.describe(), "view loaded");
        Ok(())
    }

    fn finish_batch(&mut self, report: &BatchReport) {
        let applied = apply_batch(&mut self.rows, &mut self.bulk, &mut self.search, report);
        debug!(
            removed = applied.removed,
            updated = applied.updated,
            stats = ?self.rows.stats(),
            "batch applied"
        );
        let summary = report.summary_with(&self.action_verb(&report.action));
        if report.is_partial() {
            for (row, err) in &report.failed {
                warn!(row = %row, error = %err, "batch target failed");
            }
        }
        self.set_status(summary);
    }

    // ── Keys and actions ────────────────────────────────────────────

    pub fn handle_key(&mut self, key: KeyEvent) {
        let action = self.keymap.handle(key, &self.mode);
        self.handle_action(action);
    }

    pub fn handle_action(&mut self, action: Action) {
        let result = match self.mode {
            InputMode::Normal => self.normal_action(action),
            InputMode::Filter => self.filter_action(action),
            InputMode::Search => {
                self.search_action(action);
                Ok(())
            }
            InputMode::LabelPicker => {
                self.picker_action(action);
                Ok(())
            }
            InputMode::Help => {
                self.help_action(action);
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "action failed");
            self.set_status(format!("Error: {}", e));
        }
        self.settle();
    }

    pub fn handle_mouse(&mut self, mouse: MouseEvent) {
        if self.mode != InputMode::Normal {
            return;
        }
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => self.click_list(mouse.column, mouse.row),
            MouseEventKind::ScrollDown => {
                self.rows.move_selection(1);
            }
            MouseEventKind::ScrollUp => {
                self.rows.move_selection(-1);
            }
            _ => return,
        }
        self.settle();
    }

    /// Select the list row under screen cell (`column`, `row`). The first
    /// line of the list is the column-title row of the visual table; each
    /// line below it shows visual row `scroll_offset + line`.
    fn click_list(&mut self, column: u16, row: u16) {
        let area = self.list_area;
        let inside = column >= area.x
            && column < area.x + area.width
            && row >= area.y
            && row < area.y + area.height;
        if !inside {
            return;
        }
        let line = (row - area.y) as usize;
        let visual_row = if line == 0 { 0 } else { self.scroll_offset + line };
        match self.rows.select_visual(visual_row) {
            Ok(true) => {}
            Ok(false) => debug!("column titles clicked"),
            Err(e) => debug!(error = %e, "click below the last row"),
        }
    }

    fn normal_action(&mut self, action: Action) -> Result<()> {
        let half_page = (self.list_height / 2).max(1) as isize;
        match action {
            // Navigation
            Action::MoveDown => {
                let at_end = self.rows.selected_index().map(|i| i + 1) == Some(self.rows.len());
                if at_end {
                    self.load_more();
                } else {
                    self.rows.move_selection(1);
                }
            }
            Action::MoveUp => {
                self.rows.move_selection(-1);
            }
            Action::JumpTop => {
                if !self.rows.is_empty() {
                    self.rows.select(0)?;
                }
            }
            Action::JumpBottom => self.rows.select_last(),
            Action::HalfPageDown => {
                self.rows.move_selection(half_page);
            }
            Action::HalfPageUp => {
                self.rows.move_selection(-half_page);
            }
            Action::ScrollPreviewDown => {
                self.preview_scroll = self.preview_scroll.saturating_add(5);
            }
            Action::ScrollPreviewUp => {
                self.preview_scroll = self.preview_scroll.saturating_sub(5);
            }
            Action::LoadMore => {
                if self.pager.pagination().has_more() {
                    self.load_more();
                } else {
                    self.set_status("No more messages");
                }
            }

            // Threads
            Action::ToggleThread | Action::ExpandThread | Action::CollapseThread => {
                self.thread_request(&action)?
            }
            Action::ToggleThreaded => {
                self.threaded = !self.threaded;
                self.reload();
            }

            // Triage
            Action::Archive => self.start_batch(MailAction::Archive),
            Action::Trash => self.start_batch(MailAction::Trash),
            Action::MoveToLabel => self.open_picker(PickerPurpose::Move),
            Action::ApplyLabel => self.open_picker(PickerPurpose::Apply),
            Action::RemoveLabel => self.open_picker(PickerPurpose::Remove),
            Action::Undo => match self.undo.pop() {
                Some(entry) => {
                    self.set_status(format!("Undoing {}…", entry.description));
                    self.background.undo(entry);
                }
                None => self.set_status("Nothing to undo"),
            },

            // Labels
            Action::GoInbox => {
                let inbox = self.config.inbox_label(self.config.default_account_index());
                self.navigate(ListQuery::label(inbox));
            }
            Action::GoStarred => self.navigate(ListQuery::label(labels::STARRED)),
            Action::GoSent => self.navigate(ListQuery::label(labels::SENT)),
            Action::GoTrash => self.navigate(ListQuery::label(labels::TRASH)),
            Action::GoLabelPicker => self.open_picker(PickerPurpose::Navigate),

            // Filter & search
            Action::EnterFilter => {
                if !self.search.is_active() {
                    self.filter_input.clear();
                }
                self.mode = InputMode::Filter;
            }
            Action::EnterSearch => {
                self.search_input.clear();
                self.mode = InputMode::Search;
            }
            Action::ClearView => {
                if self.bulk.is_active() {
                    self.bulk.clear();
                    self.set_status("Selection cleared");
                } else if self.search.is_active() {
                    self.end_filter()?;
                } else if let Some(previous) = self.previous_query.take() {
                    self.query = previous;
                    self.reload();
                }
            }

            // Multi-select
            Action::ToggleSelect | Action::SelectDown => {
                self.toggle_select();
                self.rows.move_selection(1);
            }
            Action::SelectUp => {
                self.toggle_select();
                self.rows.move_selection(-1);
            }

            Action::Reload => self.reload(),
            Action::ShowHelp => {
                self.help_scroll = 0;
                self.mode = InputMode::Help;
            }
            Action::Quit => self.should_quit = true,

            Action::InputChar(_)
            | Action::InputBackspace
            | Action::InputSubmit
            | Action::InputCancel
            | Action::Noop => {}
        }
        Ok(())
    }

    fn thread_request(&mut self, action: &Action) -> Result<()> {
        if self.search.is_active() {
            self.set_status("Leave the filter (Esc) to expand or collapse threads");
            return Ok(());
        }
        let Some(row) = self.rows.selected_row() else {
            return Ok(());
        };
        if matches!(row, Row::FlatMessage(_)) {
            return Ok(());
        }
        let Some(thread_id) = row.thread_id().map(str::to_string) else {
            return Ok(());
        };
        let on_header = row.is_header();

        let outcome = match action {
            Action::ExpandThread => self.expander.expand(&mut self.rows, &thread_id)?,
            Action::ToggleThread if on_header => self.expander.toggle(&mut self.rows, &thread_id)?,
            _ => self.expander.collapse(&mut self.rows, &thread_id)?,
        };

        match outcome {
            ToggleOutcome::Fetch { ticket, .. } => self.background.fetch_thread(ticket),
            ToggleOutcome::Collapsed { .. } => {
                self.rows.select_id(&RowId::thread(thread_id));
            }
            ToggleOutcome::NoOp | ToggleOutcome::NotShown => {}
        }
        Ok(())
    }

    fn toggle_select(&mut self) {
        let Some(row) = self.rows.selected_row() else {
            return;
        };
        if row.is_placeholder() {
            return;
        }
        let id = row.id();
        self.bulk.toggle(id);
    }

    /// Targets for a triage action: the marked rows, or else the selected row.
    fn targets(&self) -> Vec<BatchTarget> {
        if self.bulk.is_active() {
            return plan_batch(&self.rows, &self.bulk);
        }
        let mut current = BulkSelection::new();
        if let Some(id) = self.rows.selected_id() {
            current.insert(id.clone());
        }
        plan_batch(&self.rows, &current)
    }

    fn start_batch(&mut self, action: MailAction) {
        let targets = self.targets();
        if targets.is_empty() {
            self.set_status("Nothing to act on");
            return;
        }
        info!(action = ?action, targets = targets.len(), "batch started");
        self.set_status(format!("{}…", self.action_verb(&action)));
        self.background.run_batch(targets, action);
    }

    fn open_picker(&mut self, purpose: PickerPurpose) {
        if purpose != PickerPurpose::Navigate && self.targets().is_empty() {
            self.set_status("Nothing to act on");
            return;
        }
        if filtered_labels(&self.labels, "", purpose).is_empty() {
            self.set_status("No labels available");
            return;
        }
        self.picker_purpose = purpose;
        self.picker_filter.clear();
        self.picker_selected = 0;
        self.mode = InputMode::LabelPicker;
    }

    fn picker_action(&mut self, action: Action) {
        match action {
            Action::InputChar(c) => {
                self.picker_filter.push(c);
                self.picker_selected = 0;
            }
            Action::InputBackspace => {
                self.picker_filter.pop();
                self.picker_selected = 0;
            }
            Action::MoveDown => {
                let max = filtered_labels(&self.labels, &self.picker_filter, self.picker_purpose).len();
                if self.picker_selected + 1 < max {
                    self.picker_selected += 1;
                }
            }
            Action::MoveUp => self.picker_selected = self.picker_selected.saturating_sub(1),
            Action::InputCancel => self.mode = InputMode::Normal,
            Action::InputSubmit => {
                let picked = filtered_labels(&self.labels, &self.picker_filter, self.picker_purpose)
                    .get(self.picker_selected)
                    .map(|l| l.id.clone());
                self.mode = InputMode::Normal;
                let Some(label) = picked else {
                    return;
                };
                match self.picker_purpose {
                    PickerPurpose::Navigate => self.navigate(ListQuery::label(label)),
                    PickerPurpose::Apply => self.start_batch(MailAction::ApplyLabel(label)),
                    PickerPurpose::Remove => self.start_batch(MailAction::RemoveLabel(label)),
                    PickerPurpose::Move => {
                        let targets = self.targets();
                        self.set_status(format!("Moving to {}…", self.label_name(&label)));
                        self.background.run_move(targets, label);
                    }
                }
            }
            Action::Quit => self.should_quit = true,
            _ => {}
        }
    }

    // ── Local filter ────────────────────────────────────────────────

    fn filter_action(&mut self, action: Action) -> Result<()> {
        match action {
            Action::InputChar(c) => {
                self.filter_input.push(c);
                self.apply_filter();
            }
            Action::InputBackspace => {
                self.filter_input.pop();
                self.apply_filter();
            }
            Action::MoveDown => {
                self.rows.move_selection(1);
            }
            Action::MoveUp => {
                self.rows.move_selection(-1);
            }
            Action::InputSubmit => {
                if self.filter_input.is_empty() {
                    self.end_filter()?;
                }
                self.mode = InputMode::Normal;
            }
            Action::InputCancel => self.end_filter()?,
            Action::Quit => self.should_quit = true,
            _ => {}
        }
        Ok(())
    }

    fn apply_filter(&mut self) {
        if self.search.capture(&self.rows, &self.pager) {
            info!(rows = self.rows.len(), "filter started");
        }
        let query = LocalQuery::parse(&self.filter_input);
        if let Some(shown) = self.search.apply_query(&mut self.rows, &query, &self.labels) {
            debug!(filter = %self.filter_input, shown, "filter applied");
        }
        self.scroll_offset = 0;
    }

    /// Put the unfiltered view back and apply anything that arrived while
    /// the filter was showing.
    fn end_filter(&mut self) -> Result<()> {
        self.filter_input.clear();
        self.mode = InputMode::Normal;
        if let Some(report) = self.search.restore(&mut self.rows, &mut self.pager) {
            info!(rows = report.rows, reselected = report.reselected, "filter cleared");
        }

        let deferred = std::mem::take(&mut self.deferred);
        if !deferred.is_empty() {
            debug!(count = deferred.len(), "applying deferred updates");
        }
        for update in deferred {
            self.apply_update_inner(update)?;
        }
        Ok(())
    }

    // ── Provider search ─────────────────────────────────────────────

    fn search_action(&mut self, action: Action) {
        match action {
            Action::InputChar(c) => self.search_input.push(c),
            Action::InputBackspace => {
                self.search_input.pop();
            }
            Action::InputSubmit => {
                self.mode = InputMode::Normal;
                let q = self.search_input.trim().to_string();
                if q.is_empty() {
                    return;
                }
                if self.previous_query.is_none() {
                    self.previous_query = Some(self.query.clone());
                }
                self.query = ListQuery::search(q);
                self.reload();
            }
            Action::InputCancel => self.mode = InputMode::Normal,
            Action::Quit => self.should_quit = true,
            _ => {}
        }
    }

    fn help_action(&mut self, action: Action) {
        match action {
            Action::MoveDown => self.help_scroll = self.help_scroll.saturating_add(3),
            Action::MoveUp => self.help_scroll = self.help_scroll.saturating_sub(3),
            Action::InputCancel => self.mode = InputMode::Normal,
            _ => {}
        }
    }
}

// ── Drawing ─────────────────────────────────────────────────────────

fn draw(frame: &mut Frame, app: &mut App) {
    let size = frame.area();
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(size);

    let view = app.query.describe();
    let unread = app.rows.rows().iter().filter(|r| r.is_unread()).count();
    let filter = app
        .search
        .is_active()
        .then_some(app.filter_input.as_str());
    let top = TopBar {
        view: &view,
        threaded: app.threaded,
        unread_count: unread,
        total_count: app.rows.len(),
        has_more: app.pager.pagination().has_more(),
        loading: app.loading || app.pager.pagination().is_loading(),
        filter,
    };
    frame.render_widget(top, outer[0]);

    let content = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(outer[1]);

    let table = MessageTable {
        rows: &app.rows,
        offset: app.scroll_offset,
        marked: &app.bulk,
        loading: app.loading,
    };
    frame.render_widget(table, content[0]);
    app.list_area = content[0];

    // One line of the list area is the column header.
    let height = content[0].height.saturating_sub(1) as usize;
    app.list_height = height;
    if let Some(selected) = app.rows.selected_index() {
        let (offset, _) =
            MessageTable::visible_range(selected, app.scroll_offset, height, app.rows.len());
        app.scroll_offset = offset;
    }

    let preview = PreviewPane {
        row: app.rows.selected_row(),
        labels: &app.labels,
        scroll: app.preview_scroll,
    };
    frame.render_widget(preview, content[1]);

    let input = match app.mode {
        InputMode::Filter => app.filter_input.as_str(),
        InputMode::Search => app.search_input.as_str(),
        _ => "",
    };
    let bottom = BottomBar {
        mode: &app.mode,
        pending_key: app.keymap.pending_display(),
        input,
        status_message: app.status_message.as_deref(),
        selection_count: app.bulk.len(),
    };
    frame.render_widget(bottom, outer[2]);

    if app.mode == InputMode::LabelPicker {
        let filtered = filtered_labels(&app.labels, &app.picker_filter, app.picker_purpose);
        let picker = LabelPicker {
            labels: &filtered,
            selected: app.picker_selected,
            filter: &app.picker_filter,
            purpose: app.picker_purpose,
        };
        frame.render_widget(picker, size);
    }
    if app.mode == InputMode::Help {
        let help = HelpOverlay {
            scroll: app.help_scroll,
        };
        frame.render_widget(help, size);
    }
}

// ── Event loop ──────────────────────────────────────────────────────

pub async fn run(mut app: App, updates: UnboundedReceiver<UiUpdate>) -> Result<()> {
    app.start();

    terminal::enable_raw_mode()?;
    io::stdout()
        .execute(EnterAlternateScreen)?
        .execute(EnableMouseCapture)?;
    let result = event_loop(&mut app, updates).await;
    terminal::disable_raw_mode()?;
    io::stdout()
        .execute(DisableMouseCapture)?
        .execute(LeaveAlternateScreen)?;
    info!(selection_changes = app.selection_changes, "exiting");
    result
}

async fn event_loop(app: &mut App, mut updates: UnboundedReceiver<UiUpdate>) -> Result<()> {
    let backend = ratatui::backend::CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let sequence_timeout = Duration::from_millis(1000);
    let mut last_key_time = Instant::now();
    let mut event_stream = EventStream::new();

    loop {
        app.clear_stale_status();
        terminal.draw(|frame| draw(frame, app))?;

        if app.should_quit {
            break;
        }

        // Handle key sequence timeout
        if app.keymap.has_pending() && last_key_time.elapsed() > sequence_timeout {
            app.keymap.cancel_pending();
        }

        let timeout = if app.keymap.has_pending() {
            sequence_timeout
        } else {
            Duration::from_millis(100)
        };

        let event = tokio::select! {
            ev = event_stream.next() => ev.and_then(|r| r.ok()),
            update = updates.recv() => {
                if let Some(update) = update {
                    app.apply_update(update);
                }
                // Drain whatever else is queued before redrawing
                while let Ok(update) = updates.try_recv() {
                    app.apply_update(update);
                }
                continue;
            }
            _ = tokio::time::sleep(timeout) => None,
        };

        match event {
            Some(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                last_key_time = Instant::now();
                app.handle_key(key);
            }
            Some(Event::Mouse(mouse)) => app.handle_mouse(mouse),
            _ => {}
        }
    }
    Ok(())
}
