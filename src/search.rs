//! Live local filtering of the message list.
//!
//! The first filter keystroke snapshots the unfiltered list (rows, page
//! cursor, selected id). Every later keystroke filters that snapshot, not
//! the already-narrowed view, and leaving the filter puts the snapshot back.

use std::collections::HashSet;

use tracing::debug;

use crate::message::{label_names, Label, MessageMeta, ThreadSummary};
use crate::pager::{PageAppender, Pagination};
use crate::row::{Row, RowId};
use crate::row_store::RowStore;

/// A parsed local filter: free-text terms plus `label:` terms, all of which
/// must match. Matching is case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalQuery {
    terms: Vec<String>,
    labels: Vec<String>,
}

impl LocalQuery {
    pub fn parse(input: &str) -> Self {
        let mut query = Self::default();
        for token in input.split_whitespace() {
            let token = token.to_lowercase();
            match token.strip_prefix("label:") {
                Some("") => {}
                Some(label) => query.labels.push(label.to_string()),
                None => query.terms.push(token),
            }
        }
        query
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.labels.is_empty()
    }

    /// `text` must already be lowercased.
    pub fn matches(&self, text: &str, label_names: &[String]) -> bool {
        let names: Vec<String> = label_names.iter().map(|n| n.to_lowercase()).collect();
        self.terms.iter().all(|t| text.contains(t.as_str()))
            && self
                .labels
                .iter()
                .all(|l| names.iter().any(|n| n.contains(l.as_str())))
    }

    pub fn matches_row(&self, row: &Row, known: &[Label]) -> bool {
        match row {
            Row::FlatMessage(meta) | Row::ThreadMessage { meta, .. } => {
                self.matches_message(meta, known)
            }
            Row::ThreadHeader { summary, .. } => {
                let names = label_names(&summary.label_ids, known);
                self.matches(&summary.searchable_text(&names), &names)
            }
            Row::Placeholder { .. } => false,
        }
    }

    fn matches_message(&self, meta: &MessageMeta, known: &[Label]) -> bool {
        let names = label_names(&meta.label_ids, known);
        self.matches(&meta.searchable_text(&names), &names)
    }
}

/// The unfiltered view, held while a filter is active.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSnapshot {
    pub rows: Vec<Row>,
    pub pagination: Pagination,
    pub selected: Option<RowId>,
}

#[cfg(test)]
impl SearchSnapshot {
    pub fn ids(&self) -> Vec<RowId> {
        self.rows.iter().map(Row::id).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreReport {
    pub rows: usize,
    /// The saved selection was found again.
    pub reselected: bool,
}

#[derive(Debug, Default)]
pub struct SearchSnapshotManager {
    snapshot: Option<SearchSnapshot>,
}

impl SearchSnapshotManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.snapshot.is_some()
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> Option<&SearchSnapshot> {
        self.snapshot.as_ref()
    }

    /// Save the live view unless a snapshot is already held. Returns true
    /// when a new snapshot was taken.
    pub fn capture(&mut self, rows: &RowStore, pager: &PageAppender) -> bool {
        if self.snapshot.is_some() {
            return false;
        }
        self.snapshot = Some(SearchSnapshot {
            rows: rows.rows().to_vec(),
            pagination: pager.pagination().clone(),
            selected: rows.selected_id().cloned(),
        });
        debug!(rows = rows.len(), "search snapshot captured");
        true
    }

    /// Replace the live view with the snapshot rows that pass `predicate`.
    /// A thread header and its rows are kept or dropped together, and kept
    /// if any of them passes. Placeholders are not carried into the filtered
    /// view. Returns the number of rows shown, or `None` without a snapshot.
    pub fn apply_filter<F>(&self, rows: &mut RowStore, predicate: F) -> Option<usize>
    where
        F: Fn(&Row) -> bool,
    {
        let snapshot = self.snapshot.as_ref()?;
        let mut filtered = Vec::new();
        for block in blocks(&snapshot.rows) {
            if block.iter().any(|r| predicate(r)) {
                filtered.extend(block.iter().filter(|r| !r.is_placeholder()).cloned());
            }
        }
        let shown = filtered.len();
        rows.replace(filtered);
        Some(shown)
    }

    pub fn apply_query(
        &self,
        rows: &mut RowStore,
        query: &LocalQuery,
        known: &[Label],
    ) -> Option<usize> {
        self.apply_filter(rows, |row| query.matches_row(row, known))
    }

    /// Put the snapshot back and end the filter session.
    pub fn restore(&mut self, rows: &mut RowStore, pager: &mut PageAppender) -> Option<RestoreReport> {
        let snapshot = self.snapshot.take()?;
        rows.replace(snapshot.rows);
        pager.restore(snapshot.pagination);
        let reselected = match &snapshot.selected {
            Some(id) => rows.select_id(id),
            None => false,
        };
        debug!(rows = rows.len(), reselected, "search snapshot restored");
        Some(RestoreReport {
            rows: rows.len(),
            reselected,
        })
    }

    /// Drop rows from the held snapshot. A thread id also drops the
    /// thread's rows.
    pub fn prune(&mut self, ids: &[RowId]) -> usize {
        let Some(snapshot) = self.snapshot.as_mut() else {
            return 0;
        };
        let doomed: HashSet<&RowId> = ids.iter().collect();
        let threads: HashSet<&str> = ids.iter().filter_map(RowId::as_thread).collect();
        let before = snapshot.rows.len();
        snapshot.rows.retain(|row| {
            let id = row.id();
            if doomed.contains(&id) {
                return false;
            }
            !matches!(row.thread_id(), Some(t) if threads.contains(t) && !row.is_header())
        });
        before - snapshot.rows.len()
    }

    /// Apply `f` to every snapshot row showing message `message_id`.
    pub fn update_message<F>(&mut self, message_id: &str, mut f: F)
    where
        F: FnMut(&mut MessageMeta),
    {
        if let Some(snapshot) = self.snapshot.as_mut() {
            for row in &mut snapshot.rows {
                if let Some(meta) = row.message_mut() {
                    if meta.id == message_id {
                        f(meta);
                    }
                }
            }
        }
    }

    /// Apply `f` to the snapshot's header for thread `thread_id`.
    pub fn update_header<F>(&mut self, thread_id: &str, f: F)
    where
        F: FnOnce(&mut ThreadSummary),
    {
        let Some(snapshot) = self.snapshot.as_mut() else {
            return;
        };
        let header = snapshot.rows.iter_mut().find_map(|row| match row {
            Row::ThreadHeader { summary, .. } if summary.thread_id == thread_id => Some(summary),
            _ => None,
        });
        if let Some(summary) = header {
            f(summary);
        }
    }

    /// Abandon the snapshot without restoring it (full reload).
    pub fn discard(&mut self) {
        self.snapshot = None;
    }
}

/// Split rows into top-level blocks: a flat row alone, or a thread header
/// with the rows attached under it.
fn blocks(rows: &[Row]) -> Vec<&[Row]> {
    let mut out = Vec::new();
    let mut start = 0;
    while start < rows.len() {
        let mut end = start + 1;
        if let Row::ThreadHeader { summary, .. } = &rows[start] {
            while end < rows.len() && rows[end].is_child_of(&summary.thread_id) {
                end += 1;
            }
        }
        out.push(&rows[start..end]);
        start = end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::tests::make_message;
    use crate::row_store::tests::{children, flat, header, store};

    fn labelled(id: &str, subject: &str, labels: &[&str]) -> Row {
        let mut meta = make_message(id, id, subject);
        meta.label_ids = labels.iter().map(|l| l.to_string()).collect();
        Row::FlatMessage(meta)
    }

    fn known() -> Vec<Label> {
        vec![Label::new("Label_1", "Work"), Label::new("Label_2", "Home")]
    }

    #[test]
    fn parse_splits_label_tokens() {
        let q = LocalQuery::parse("  label:Work Report label: ");
        assert_eq!(q.labels, vec!["work"]);
        assert_eq!(q.terms, vec!["report"]);
        assert!(LocalQuery::parse("   ").is_empty());
    }

    #[test]
    fn label_and_text_tokens_must_both_match() {
        let mut rows = store();
        rows.replace(vec![
            labelled("X", "report Q1", &["Label_1"]),
            labelled("Y", "report", &["Label_2"]),
        ]);
        let pager = PageAppender::default();
        let mut mgr = SearchSnapshotManager::new();
        mgr.capture(&rows, &pager);

        let shown = mgr
            .apply_query(&mut rows, &LocalQuery::parse("label:work report"), &known())
            .unwrap();
        assert_eq!(shown, 1);
        assert_eq!(rows.ids(), &[RowId::message("X")]);
    }

    #[test]
    fn every_label_token_must_match_some_label() {
        let q = LocalQuery::parse("label:work label:home");
        let both = labelled("a", "x", &["Label_1", "Label_2"]);
        let one = labelled("b", "x", &["Label_1"]);
        assert!(q.matches_row(&both, &known()));
        assert!(!q.matches_row(&one, &known()));
    }

    #[test]
    fn restore_brings_back_cursor_and_selection() {
        let mut rows = store();
        rows.replace(vec![labelled("X", "alpha", &[]), labelled("Y", "beta", &[])]);
        rows.select(1).unwrap();
        let mut pager = PageAppender::new(Pagination::new(Some("tok1".into())));
        let mut mgr = SearchSnapshotManager::new();

        mgr.capture(&rows, &pager);
        mgr.apply_query(&mut rows, &LocalQuery::parse("alpha"), &known());
        assert_eq!(rows.ids(), &[RowId::message("X")]);
        pager.reset(None);

        let report = mgr.restore(&mut rows, &mut pager).unwrap();
        assert!(report.reselected);
        assert_eq!(pager.pagination().cursor(), Some("tok1"));
        assert_eq!(rows.selected_id(), Some(&RowId::message("Y")));
        assert!(!mgr.is_active());
    }

    #[test]
    fn capture_then_restore_is_identity() {
        let mut rows = store();
        let mut initial = vec![flat("a"), header("t1", &["m1", "m2"], true)];
        initial.extend(children("t1", &["m1", "m2"]));
        initial.push(flat("b"));
        rows.replace(initial);
        rows.select(3).unwrap();
        let ids = rows.ids().to_vec();
        let data = rows.rows().to_vec();

        let mut pager = PageAppender::new(Pagination::new(Some("c".into())));
        let mut mgr = SearchSnapshotManager::new();
        mgr.capture(&rows, &pager);
        mgr.restore(&mut rows, &mut pager);

        assert_eq!(rows.ids(), ids.as_slice());
        assert_eq!(rows.rows(), data.as_slice());
        assert_eq!(rows.selected_index(), Some(3));
        assert_eq!(pager.pagination().cursor(), Some("c"));
    }

    #[test]
    fn refinement_filters_the_original_base() {
        let mut rows = store();
        rows.replace(vec![
            labelled("a", "rust report", &[]),
            labelled("b", "go report", &[]),
        ]);
        let pager = PageAppender::default();
        let mut mgr = SearchSnapshotManager::new();

        assert!(mgr.capture(&rows, &pager));
        mgr.apply_query(&mut rows, &LocalQuery::parse("rust"), &known());
        assert_eq!(rows.len(), 1);

        // A second capture keeps the first snapshot.
        assert!(!mgr.capture(&rows, &pager));
        mgr.apply_query(&mut rows, &LocalQuery::parse("report"), &known());
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn thread_blocks_filter_together() {
        let mut rows = store();
        let mut initial = vec![header("t1", &["m1", "m2"], true)];
        let mut kids = children("t1", &["m1", "m2"]);
        if let Some(meta) = kids[1].message_mut() {
            meta.subject = "needle".into();
        }
        initial.extend(kids);
        initial.push(Row::loading("t1"));
        initial.push(flat("other"));
        rows.replace(initial);

        let pager = PageAppender::default();
        let mut mgr = SearchSnapshotManager::new();
        mgr.capture(&rows, &pager);
        mgr.apply_query(&mut rows, &LocalQuery::parse("needle"), &known());
        assert_eq!(
            rows.ids(),
            &[
                RowId::thread("t1"),
                RowId::message("m1"),
                RowId::message("m2")
            ]
        );
        assert!(rows.tree_is_well_formed());
    }

    #[test]
    fn pruned_selection_falls_back_to_first_row() {
        let mut rows = store();
        rows.replace(vec![flat("a"), flat("b"), flat("c")]);
        rows.select(2).unwrap();
        let mut pager = PageAppender::default();
        let mut mgr = SearchSnapshotManager::new();
        mgr.capture(&rows, &pager);

        assert_eq!(mgr.prune(&[RowId::message("c")]), 1);
        let report = mgr.restore(&mut rows, &mut pager).unwrap();
        assert!(!report.reselected);
        assert_eq!(rows.selected_id(), Some(&RowId::message("a")));
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn pruning_a_thread_drops_its_rows() {
        let mut rows = store();
        let mut initial = vec![header("t1", &["m1"], true)];
        initial.extend(children("t1", &["m1"]));
        initial.push(flat("b"));
        rows.replace(initial);
        let pager = PageAppender::default();
        let mut mgr = SearchSnapshotManager::new();
        mgr.capture(&rows, &pager);

        assert_eq!(mgr.prune(&[RowId::thread("t1")]), 2);
        assert_eq!(mgr.snapshot().unwrap().ids(), vec![RowId::message("b")]);
    }

    #[test]
    fn snapshot_rows_receive_label_updates() {
        let mut rows = store();
        rows.replace(vec![flat("a")]);
        let pager = PageAppender::default();
        let mut mgr = SearchSnapshotManager::new();
        mgr.capture(&rows, &pager);
        mgr.update_message("a", |m| m.label_ids.push("Label_1".into()));
        let snap = mgr.snapshot().unwrap();
        assert!(snap.rows[0].label_ids().iter().any(|l| l == "Label_1"));
    }

    #[test]
    fn filter_without_snapshot_does_nothing() {
        let mut rows = store();
        rows.replace(vec![flat("a")]);
        let mgr = SearchSnapshotManager::new();
        assert_eq!(mgr.apply_filter(&mut rows, |_| false), None);
        assert_eq!(rows.len(), 1);
    }
}
