//! Batched actions over a multi-row selection.
//!
//! A batch runs in three steps. `plan_batch` (UI task) turns the selection
//! into per-row targets. `run_batch` (background task) calls the provider
//! once per message, one at a time, and counts failures without stopping.
//! `apply_batch` (UI task again) folds the report into the view with a
//! single removal and leaves bulk mode.

use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use crate::provider::{MailAction, MailProvider};
use crate::row::{Row, RowId};
use crate::row_store::RowStore;
use crate::search::SearchSnapshotManager;

/// Rows marked for a group action.
#[derive(Debug, Default, Clone)]
pub struct BulkSelection {
    ids: HashSet<RowId>,
}

impl BulkSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark or unmark `id`. Returns true if it is now marked.
    pub fn toggle(&mut self, id: RowId) -> bool {
        if self.ids.remove(&id) {
            false
        } else {
            self.ids.insert(id);
            true
        }
    }

    pub fn insert(&mut self, id: RowId) {
        self.ids.insert(id);
    }

    pub fn contains(&self, id: &RowId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Bulk mode is on while anything is marked.
    pub fn is_active(&self) -> bool {
        !self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Forget marks on rows that are gone from the store.
    pub fn retain_present(&mut self, rows: &RowStore) {
        self.ids.retain(|id| rows.contains(id));
    }

    /// Marked ids in display order.
    pub fn in_display_order(&self, rows: &RowStore) -> Vec<RowId> {
        rows.ids()
            .iter()
            .filter(|id| self.ids.contains(*id))
            .cloned()
            .collect()
    }
}

/// One selected row and the messages an action on it touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTarget {
    pub row: RowId,
    pub message_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub action: MailAction,
    /// Marked rows whose every message was mutated.
    pub succeeded: Vec<RowId>,
    /// Rows with at least one failed message, with the first error.
    pub failed: Vec<(RowId, String)>,
    /// Every message the provider accepted, for undo.
    pub done_message_ids: Vec<String>,
}

impl BatchReport {
    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Status-bar text with the caller's wording for the action, e.g.
    /// "Archived 3/5 (2 failed)".
    pub fn summary_with(&self, verb: &str) -> String {
        if self.is_partial() {
            format!(
                "{} {}/{} ({} failed)",
                verb,
                self.success_count(),
                self.total(),
                self.failed_count()
            )
        } else {
            format!("{} {}", verb, plural(self.success_count()))
        }
    }
}

fn plural(n: usize) -> String {
    if n == 1 {
        "1 message".to_string()
    } else {
        format!("{} messages", n)
    }
}

/// Targets for the marked rows, in display order. Every marked row is its
/// own target, so a thread header and a marked message under it both get
/// reported.
pub fn plan_batch(rows: &RowStore, selection: &BulkSelection) -> Vec<BatchTarget> {
    selection
        .in_display_order(rows)
        .into_iter()
        .filter_map(|id| {
            let row = rows.index_of(&id).and_then(|i| rows.row(i))?;
            let message_ids = row.target_message_ids();
            (!message_ids.is_empty()).then_some(BatchTarget {
                row: id,
                message_ids,
            })
        })
        .collect()
}

/// Run `action` over every target, sequentially. Each message is sent to
/// the provider once even when several targets cover it. A target succeeds
/// when all of its messages did. A failure is recorded and the batch
/// carries on.
pub async fn run_batch(
    provider: &dyn MailProvider,
    targets: Vec<BatchTarget>,
    action: MailAction,
) -> BatchReport {
    let mut report = BatchReport {
        action: action.clone(),
        succeeded: Vec::new(),
        failed: Vec::new(),
        done_message_ids: Vec::new(),
    };
    // Outcome per message already sent: `None` on success, else the error.
    let mut outcomes: HashMap<String, Option<String>> = HashMap::new();

    for target in targets {
        let mut first_error: Option<String> = None;
        for id in &target.message_ids {
            let outcome = match outcomes.get(id) {
                Some(outcome) => outcome.clone(),
                None => {
                    let outcome = match provider.mutate_message(id, &action).await {
                        Ok(()) => {
                            report.done_message_ids.push(id.clone());
                            None
                        }
                        Err(e) => {
                            warn!(message_id = %id, error = %e, "batch step failed");
                            Some(e.to_string())
                        }
                    };
                    outcomes.insert(id.clone(), outcome.clone());
                    outcome
                }
            };
            if let Some(err) = outcome {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            None => report.succeeded.push(target.row),
            Some(err) => report.failed.push((target.row, err)),
        }
    }

    info!(
        action = ?report.action,
        succeeded = report.success_count(),
        failed = report.failed_count(),
        messages = report.done_message_ids.len(),
        "batch finished"
    );
    report
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchApplied {
    pub removed: usize,
    pub updated: usize,
}

/// Fold a finished batch into the view: one removal for actions that take
/// rows out of view, in-place label updates otherwise. The held search
/// snapshot, if any, gets the same treatment. Always leaves bulk mode.
pub fn apply_batch(
    rows: &mut RowStore,
    selection: &mut BulkSelection,
    search: &mut SearchSnapshotManager,
    report: &BatchReport,
) -> BatchApplied {
    let mut applied = BatchApplied {
        removed: 0,
        updated: 0,
    };

    if report.action.removes_row() {
        if !report.succeeded.is_empty() {
            applied.removed = rows.remove_by_ids(&report.succeeded).len();
            search.prune(&report.succeeded);
        }
    } else {
        for id in &report.done_message_ids {
            applied.updated += rows.update_message(id, |m| report.action.apply_to(m));
            search.update_message(id, |m| report.action.apply_to(m));
        }
        for row_id in &report.succeeded {
            if let RowId::Thread(thread_id) = row_id {
                relabel_header(rows, row_id, &report.action);
                search.update_header(thread_id, |s| report.action.apply_to_labels(&mut s.label_ids));
            }
        }
    }

    selection.clear();
    applied
}

fn relabel_header(rows: &mut RowStore, id: &RowId, action: &MailAction) {
    let Some(index) = rows.index_of(id) else {
        return;
    };
    if let Some(Row::ThreadHeader { summary, expanded }) = rows.row(index) {
        let mut summary = summary.clone();
        let expanded = *expanded;
        action.apply_to_labels(&mut summary.label_ids);
        if let Err(e) = rows.update_at(index, Row::header(summary, expanded)) {
            warn!(error = %e, "relabelling thread header failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::tests::make_message;
    use crate::pager::PageAppender;
    use crate::provider::{MemoryProvider, ProviderCall};
    use crate::row_store::tests::{children, flat, header, store};

    fn five_rows() -> (RowStore, BulkSelection) {
        let mut rows = store();
        rows.replace(vec![flat("a"), flat("b"), flat("c"), flat("d"), flat("e")]);
        let mut sel = BulkSelection::new();
        for id in ["a", "b", "c", "d", "e"] {
            sel.toggle(RowId::message(id));
        }
        (rows, sel)
    }

    fn provider_for(ids: &[&str]) -> MemoryProvider {
        MemoryProvider::new(
            ids.iter()
                .map(|id| make_message(id, &format!("t-{}", id), "x"))
                .collect(),
        )
    }

    #[tokio::test]
    async fn partial_failure_removes_only_successes() {
        let (mut rows, mut sel) = five_rows();
        let provider = provider_for(&["a", "b", "c", "d", "e"])
            .fail_mutation("b")
            .fail_mutation("d");
        let mut search = SearchSnapshotManager::new();

        let targets = plan_batch(&rows, &sel);
        let report = run_batch(&provider, targets, MailAction::Archive).await;
        assert_eq!(report.success_count(), 3);
        assert_eq!(report.failed_count(), 2);
        assert!(report.is_partial());
        assert_eq!(report.summary_with("Archived"), "Archived 3/5 (2 failed)");

        let before = rows.stats().id_removals;
        let applied = apply_batch(&mut rows, &mut sel, &mut search, &report);
        assert_eq!(applied.removed, 3);
        assert_eq!(rows.stats().id_removals, before + 1);
        assert_eq!(rows.ids(), &[RowId::message("b"), RowId::message("d")]);
        assert!(!sel.is_active());
    }

    #[tokio::test]
    async fn calls_run_in_display_order() {
        let (rows, sel) = five_rows();
        let provider = provider_for(&["a", "b", "c", "d", "e"]);
        run_batch(&provider, plan_batch(&rows, &sel), MailAction::Trash).await;
        let order: Vec<String> = provider
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                ProviderCall::Mutate(id, _) => Some(id),
                _ => None,
            })
            .collect();
        assert_eq!(order, vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn label_actions_update_rows_in_place() {
        let (mut rows, mut sel) = five_rows();
        let provider = provider_for(&["a", "b", "c", "d", "e"]);
        let mut search = SearchSnapshotManager::new();
        let report = run_batch(
            &provider,
            plan_batch(&rows, &sel),
            MailAction::ApplyLabel("work".into()),
        )
        .await;
        let applied = apply_batch(&mut rows, &mut sel, &mut search, &report);
        assert_eq!(applied.removed, 0);
        assert_eq!(applied.updated, 5);
        assert_eq!(rows.len(), 5);
        assert!(rows.rows().iter().all(|r| r.label_ids().iter().any(|l| l == "work")));
        assert_eq!(rows.stats().id_removals, 0);
    }

    #[tokio::test]
    async fn empty_selection_is_noop() {
        let mut rows = store();
        rows.replace(vec![flat("a")]);
        let sel = BulkSelection::new();
        let provider = provider_for(&["a"]);
        let targets = plan_batch(&rows, &sel);
        assert!(targets.is_empty());
        let report = run_batch(&provider, targets, MailAction::Archive).await;
        assert_eq!(report.total(), 0);
        assert!(provider.calls().is_empty());
    }

    fn thread_rows() -> RowStore {
        let mut rows = store();
        let mut initial = vec![header("t1", &["m1", "m2"], true)];
        initial.extend(children("t1", &["m1", "m2"]));
        initial.push(header("t2", &["m3"], false));
        rows.replace(initial);
        rows
    }

    fn thread_provider() -> MemoryProvider {
        MemoryProvider::new(vec![
            make_message("m1", "t1", "x"),
            make_message("m2", "t1", "x"),
            make_message("m3", "t2", "x"),
        ])
    }

    #[tokio::test]
    async fn thread_with_failing_message_stays() {
        let mut rows = thread_rows();
        let mut sel = BulkSelection::new();
        sel.toggle(RowId::thread("t1"));
        sel.toggle(RowId::thread("t2"));

        let provider = thread_provider().fail_mutation("m2");
        let report = run_batch(&provider, plan_batch(&rows, &sel), MailAction::Archive).await;
        assert_eq!(report.succeeded, vec![RowId::thread("t2")]);
        assert_eq!(report.done_message_ids, vec!["m1", "m3"]);

        let mut search = SearchSnapshotManager::new();
        apply_batch(&mut rows, &mut sel, &mut search, &report);
        assert_eq!(rows.len(), 3);
        assert!(rows.tree_is_well_formed());
    }

    #[tokio::test]
    async fn marked_message_leaves_even_when_its_thread_fails() {
        let mut rows = thread_rows();
        let mut sel = BulkSelection::new();
        sel.toggle(RowId::thread("t1"));
        sel.toggle(RowId::message("m1"));

        let targets = plan_batch(&rows, &sel);
        assert_eq!(targets.len(), 2);

        let provider = thread_provider().fail_mutation("m2");
        let report = run_batch(&provider, targets, MailAction::Archive).await;
        // m1 is sent once, through the header's target.
        let mutations = provider
            .calls()
            .into_iter()
            .filter(|c| matches!(c, ProviderCall::Mutate(..)))
            .count();
        assert_eq!(mutations, 2);
        assert_eq!(report.succeeded, vec![RowId::message("m1")]);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.summary_with("Archived"), "Archived 1/2 (1 failed)");

        let mut search = SearchSnapshotManager::new();
        apply_batch(&mut rows, &mut sel, &mut search, &report);
        assert_eq!(
            rows.ids(),
            &[
                RowId::thread("t1"),
                RowId::message("m2"),
                RowId::thread("t2")
            ]
        );
        assert!(rows.tree_is_well_formed());
    }

    #[tokio::test]
    async fn thread_label_reaches_the_held_snapshot() {
        let mut rows = thread_rows();
        let pager = PageAppender::default();
        let mut search = SearchSnapshotManager::new();
        search.capture(&rows, &pager);

        let mut sel = BulkSelection::new();
        sel.toggle(RowId::thread("t2"));
        let action = MailAction::ApplyLabel("work".into());
        let report = run_batch(&thread_provider(), plan_batch(&rows, &sel), action).await;
        apply_batch(&mut rows, &mut sel, &mut search, &report);

        let held = search.snapshot().unwrap();
        let header = held.rows.iter().find(|r| r.id() == RowId::thread("t2")).unwrap();
        assert!(header.label_ids().contains(&"work".to_string()));
    }

    #[tokio::test]
    async fn batch_during_filter_prunes_snapshot() {
        let (mut rows, mut sel) = five_rows();
        let pager = PageAppender::default();
        let mut search = SearchSnapshotManager::new();
        search.capture(&rows, &pager);

        let provider = provider_for(&["a", "b", "c", "d", "e"]);
        sel.clear();
        sel.toggle(RowId::message("c"));
        let report = run_batch(&provider, plan_batch(&rows, &sel), MailAction::Archive).await;
        apply_batch(&mut rows, &mut sel, &mut search, &report);

        assert!(!rows.contains(&RowId::message("c")));
        let snapshot_ids = search.snapshot().unwrap().ids();
        assert!(!snapshot_ids.contains(&RowId::message("c")));
        assert_eq!(snapshot_ids.len(), 4);
    }

    #[test]
    fn retain_present_drops_removed_ids() {
        let (mut rows, mut sel) = five_rows();
        rows.remove_by_ids(&[RowId::message("a")]);
        sel.retain_present(&rows);
        assert_eq!(sel.len(), 4);
        assert!(!sel.contains(&RowId::message("a")));
    }

    #[test]
    fn toggle_flips_membership() {
        let mut sel = BulkSelection::new();
        assert!(sel.toggle(RowId::message("a")));
        assert!(sel.is_active());
        assert!(!sel.toggle(RowId::message("a")));
        assert!(!sel.is_active());
    }
}
