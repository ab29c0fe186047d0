//! The ordered row sequence behind the message list.
//!
//! `RowStore` keeps three parallel structures in lockstep: the row ids, the
//! row data, and the rendered cells of the visual table. The table carries
//! one column-title row above the data, so visual row `i + HEADER_OFFSET`
//! shows model row `i`. That translation happens only inside this module.
//!
//! All mutation goes through the primitives here. They are synchronous and
//! must only be called from the UI task.

use std::collections::HashSet;
use std::ops::Range;

use tracing::{debug, warn};

use crate::error::RowStoreError;
use crate::format::{RenderedRow, RowFormatter};
use crate::message::MessageMeta;
use crate::row::{Row, RowId};

/// Non-data rows above the first data row in the visual table.
pub const HEADER_OFFSET: usize = 1;

/// Rendered cells, column-title row included.
#[derive(Debug, Clone)]
pub struct VisualTable {
    cells: Vec<RenderedRow>,
}

impl VisualTable {
    fn new() -> Self {
        Self {
            cells: vec![RenderedRow::column_header()],
        }
    }

    pub fn row_count(&self) -> usize {
        self.cells.len()
    }

    pub fn cell(&self, visual_row: usize) -> Option<&RenderedRow> {
        self.cells.get(visual_row)
    }

    pub fn column_header(&self) -> Option<&RenderedRow> {
        self.cells.first()
    }

    fn insert_rows(&mut self, visual_row: usize, cells: Vec<RenderedRow>) {
        self.cells.splice(visual_row..visual_row, cells);
    }

    fn remove_rows(&mut self, visual_row: usize, count: usize) {
        self.cells.drain(visual_row..visual_row + count);
    }

    fn set_cell(&mut self, visual_row: usize, cell: RenderedRow) {
        if let Some(slot) = self.cells.get_mut(visual_row) {
            *slot = cell;
        }
    }

    fn clear(&mut self) {
        self.cells.truncate(HEADER_OFFSET);
    }
}

/// Counters for diagnostics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MutationStats {
    pub replaces: usize,
    pub inserts: usize,
    pub range_removals: usize,
    pub id_removals: usize,
    pub widget_rebuilds: usize,
}

pub struct RowStore {
    ids: Vec<RowId>,
    rows: Vec<Row>,
    table: VisualTable,
    selected: Option<usize>,
    formatter: Box<dyn RowFormatter>,
    stats: MutationStats,
}

fn visual(index: usize) -> usize {
    index + HEADER_OFFSET
}

impl RowStore {
    pub fn new(formatter: Box<dyn RowFormatter>) -> Self {
        Self {
            ids: Vec::new(),
            rows: Vec::new(),
            table: VisualTable::new(),
            selected: None,
            formatter,
            stats: MutationStats::default(),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[RowId] {
        &self.ids
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn table(&self) -> &VisualTable {
        &self.table
    }

    #[cfg(test)]
    pub fn visual_row_count(&self) -> usize {
        self.table.row_count()
    }

    pub fn stats(&self) -> MutationStats {
        self.stats
    }

    pub fn index_of(&self, id: &RowId) -> Option<usize> {
        self.ids.iter().position(|i| i == id)
    }

    pub fn contains(&self, id: &RowId) -> bool {
        self.index_of(id).is_some()
    }

    /// Model index of thread `thread_id`'s header row.
    pub fn header_index(&self, thread_id: &str) -> Option<usize> {
        self.ids
            .iter()
            .position(|id| matches!(id, RowId::Thread(t) if t == thread_id))
    }

    /// Range of rows attached below the thread header at `header_index`.
    /// Empty when the thread shows no child rows. `None` if the row is not a
    /// thread header.
    pub fn thread_block(&self, header_index: usize) -> Option<Range<usize>> {
        let thread_id = match self.rows.get(header_index)? {
            Row::ThreadHeader { summary, .. } => summary.thread_id.as_str(),
            _ => return None,
        };
        let start = header_index + 1;
        let len = self.rows[start..]
            .iter()
            .take_while(|r| r.is_child_of(thread_id))
            .count();
        Some(start..start + len)
    }

    // ── Selection ───────────────────────────────────────────────────

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_id(&self) -> Option<&RowId> {
        self.selected.and_then(|i| self.ids.get(i))
    }

    pub fn selected_row(&self) -> Option<&Row> {
        self.selected.and_then(|i| self.rows.get(i))
    }

    pub fn select(&mut self, index: usize) -> Result<(), RowStoreError> {
        if index >= self.len() {
            return Err(RowStoreError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        self.selected = Some(index);
        Ok(())
    }

    /// Select the row with `id`. Returns false (selection unchanged) when
    /// the id is not present.
    pub fn select_id(&mut self, id: &RowId) -> bool {
        match self.index_of(id) {
            Some(i) => {
                self.selected = Some(i);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// If nothing valid is selected, select the first row. Returns true when
    /// the selection was repaired.
    pub fn ensure_selection(&mut self) -> bool {
        let valid = matches!(self.selected, Some(i) if i < self.len());
        if valid {
            return false;
        }
        self.selected = if self.is_empty() { None } else { Some(0) };
        self.selected.is_some()
    }

    /// Move the selection by `delta` rows, clamped to the list. Returns true
    /// if the selected index changed.
    pub fn move_selection(&mut self, delta: isize) -> bool {
        if self.is_empty() {
            return false;
        }
        let current = self.selected.unwrap_or(0) as isize;
        let max = self.len() as isize - 1;
        let next = (current + delta).clamp(0, max) as usize;
        let changed = self.selected != Some(next);
        self.selected = Some(next);
        changed
    }

    pub fn select_last(&mut self) {
        self.selected = self.len().checked_sub(1);
    }

    /// Visual-table row showing model row `index`.
    pub fn visual_row(&self, index: usize) -> usize {
        visual(index)
    }

    /// Selected row in visual-table coordinates.
    pub fn visual_selection(&self) -> Option<usize> {
        self.selected.map(visual)
    }

    /// Select by visual-table row. The column-title row is not selectable;
    /// returns Ok(false) for it.
    pub fn select_visual(&mut self, visual_row: usize) -> Result<bool, RowStoreError> {
        match visual_row.checked_sub(HEADER_OFFSET) {
            Some(index) => self.select(index).map(|_| true),
            None => Ok(false),
        }
    }

    // ── Mutation ────────────────────────────────────────────────────

    /// Discard everything and install `rows`. Selects the first row, if any.
    pub fn replace(&mut self, rows: Vec<Row>) {
        self.ids = rows.iter().map(Row::id).collect();
        self.rows = rows;
        self.selected = if self.rows.is_empty() { None } else { Some(0) };
        self.rebuild_table();
        self.stats.replaces += 1;
        debug!(rows = self.len(), "row store replaced");
        self.check_invariants();
    }

    /// Insert `rows` at model index `index`. `index == len()` appends.
    pub fn insert_at(&mut self, index: usize, rows: Vec<Row>) -> Result<(), RowStoreError> {
        if index > self.len() {
            return Err(RowStoreError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        if rows.is_empty() {
            return Ok(());
        }
        self.insert_run(index, rows);
        self.stats.inserts += 1;
        self.check_invariants();
        Ok(())
    }

    /// Remove `count` rows starting at `index`, returning them.
    pub fn remove_range(&mut self, index: usize, count: usize) -> Result<Vec<Row>, RowStoreError> {
        self.check_range(index, count)?;
        let removed = self.remove_run(index, count);
        self.stats.range_removals += 1;
        self.check_invariants();
        Ok(removed)
    }

    /// Remove `remove` rows at `index` and insert `rows` in their place as
    /// one operation.
    pub fn splice(
        &mut self,
        index: usize,
        remove: usize,
        rows: Vec<Row>,
    ) -> Result<Vec<Row>, RowStoreError> {
        if remove > 0 {
            self.check_range(index, remove)?;
        } else if index > self.len() {
            return Err(RowStoreError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }

        let inserted = rows.len();
        let prev = self.selected;
        let new_ids: Vec<RowId> = rows.iter().map(Row::id).collect();
        let cells: Vec<RenderedRow> = rows.iter().map(|r| self.formatter.format(r)).collect();

        let removed: Vec<Row> = self.rows.splice(index..index + remove, rows).collect();
        self.ids.splice(index..index + remove, new_ids);
        self.table.remove_rows(visual(index), remove);
        self.table.insert_rows(visual(index), cells);

        self.selected = match prev {
            Some(s) if s < index => Some(s),
            Some(s) if s >= index + remove => Some(s - remove + inserted),
            Some(_) if inserted > 0 => Some(index),
            Some(_) => self.fallback_selection(index),
            None => None,
        };
        self.check_invariants();
        Ok(removed)
    }

    /// Remove every row whose id is in `ids`, resolving positions now. A
    /// thread id also removes the rows attached under that header. Unknown
    /// ids are ignored. Returns the ids actually removed.
    pub fn remove_by_ids(&mut self, ids: &[RowId]) -> Vec<RowId> {
        self.stats.id_removals += 1;

        let wanted: HashSet<&RowId> = ids.iter().collect();
        let mut doomed: Vec<usize> = Vec::new();
        for (i, id) in self.ids.iter().enumerate() {
            if wanted.contains(id) {
                doomed.push(i);
                if matches!(id, RowId::Thread(_)) {
                    if let Some(block) = self.thread_block(i) {
                        doomed.extend(block);
                    }
                }
            }
        }
        doomed.sort_unstable();
        doomed.dedup();

        // Contiguous runs, removed from the end toward the start so earlier
        // indices stay valid.
        let mut runs: Vec<(usize, usize)> = Vec::new();
        for &i in &doomed {
            match runs.last_mut() {
                Some((start, count)) if *start + *count == i => *count += 1,
                _ => runs.push((i, 1)),
            }
        }

        let mut removed_ids = Vec::with_capacity(doomed.len());
        for &(start, count) in runs.iter().rev() {
            let removed = self.remove_run(start, count);
            removed_ids.extend(removed.iter().map(Row::id));
        }
        removed_ids.reverse();

        if !removed_ids.is_empty() {
            debug!(
                requested = ids.len(),
                removed = removed_ids.len(),
                runs = runs.len(),
                "removed rows by id"
            );
        }
        self.check_invariants();
        removed_ids
    }

    /// Rewrite the row at `index` in place. The replacement must keep the
    /// same id.
    pub fn update_at(&mut self, index: usize, row: Row) -> Result<(), RowStoreError> {
        let current = self.ids.get(index).ok_or(RowStoreError::IndexOutOfRange {
            index,
            len: self.len(),
        })?;
        let new_id = row.id();
        if *current != new_id {
            return Err(RowStoreError::IdMismatch {
                index,
                expected: current.to_string(),
                found: new_id.to_string(),
            });
        }
        self.table.set_cell(visual(index), self.formatter.format(&row));
        self.rows[index] = row;
        Ok(())
    }

    /// Apply `f` to every row showing message `message_id`. Returns the
    /// number of rows touched.
    pub fn update_message<F>(&mut self, message_id: &str, mut f: F) -> usize
    where
        F: FnMut(&mut MessageMeta),
    {
        let mut touched = 0;
        for index in 0..self.rows.len() {
            let hit = match self.rows[index].message_mut() {
                Some(meta) if meta.id == message_id => {
                    f(meta);
                    true
                }
                _ => false,
            };
            if hit {
                let cell = self.formatter.format(&self.rows[index]);
                self.table.set_cell(visual(index), cell);
                touched += 1;
            }
        }
        touched
    }

    // ── Invariants ──────────────────────────────────────────────────

    /// Verify the parallel structures agree. On a widget mismatch the
    /// table is rebuilt from the model; on an id/data mismatch the ids are
    /// regenerated from the data. Returns true when nothing needed fixing.
    pub fn check_invariants(&mut self) -> bool {
        let mut healthy = true;

        let ids_diverged = self.ids.len() != self.rows.len()
            || (cfg!(debug_assertions)
                && self.ids.iter().zip(&self.rows).any(|(id, row)| *id != row.id()));
        if ids_diverged {
            warn!(
                ids = self.ids.len(),
                rows = self.rows.len(),
                "row ids diverged from row data, regenerating"
            );
            self.ids = self.rows.iter().map(Row::id).collect();
            healthy = false;
        }

        if self.table.row_count() != self.len() + HEADER_OFFSET {
            warn!(
                visual = self.table.row_count(),
                model = self.len(),
                "visual table out of sync with model, rebuilding"
            );
            self.rebuild_table();
            healthy = false;
        }

        if cfg!(debug_assertions) && !self.tree_is_well_formed() {
            warn!("thread rows are not attached under their header");
            healthy = false;
        }

        if let Some(s) = self.selected {
            if s >= self.len() {
                self.selected = self.len().checked_sub(1);
                healthy = false;
            }
        }
        healthy
    }

    /// True if every nested row sits under a header of its own thread with
    /// no foreign row in between.
    pub fn tree_is_well_formed(&self) -> bool {
        let mut open_thread: Option<&str> = None;
        for row in &self.rows {
            match row {
                Row::ThreadHeader { summary, .. } => {
                    open_thread = Some(summary.thread_id.as_str())
                }
                Row::FlatMessage(_) => open_thread = None,
                Row::Placeholder { thread_id: None, .. } => open_thread = None,
                Row::ThreadMessage { .. } | Row::Placeholder { .. } => {
                    if open_thread != row.thread_id() {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Rebuild every cell of the visual table from the model.
    pub fn rebuild_table(&mut self) {
        self.table.clear();
        let cells: Vec<RenderedRow> = self.rows.iter().map(|r| self.formatter.format(r)).collect();
        self.table.insert_rows(HEADER_OFFSET, cells);
        self.stats.widget_rebuilds += 1;
    }

    // ── Internals ───────────────────────────────────────────────────

    fn check_range(&self, index: usize, count: usize) -> Result<(), RowStoreError> {
        if self.is_empty() {
            return Err(RowStoreError::Empty);
        }
        if count == 0 || index >= self.len() || index + count > self.len() {
            return Err(RowStoreError::RangeOutOfBounds {
                index,
                count,
                len: self.len(),
            });
        }
        Ok(())
    }

    fn insert_run(&mut self, index: usize, rows: Vec<Row>) {
        let n = rows.len();
        let cells: Vec<RenderedRow> = rows.iter().map(|r| self.formatter.format(r)).collect();
        let new_ids: Vec<RowId> = rows.iter().map(Row::id).collect();
        self.ids.splice(index..index, new_ids);
        self.rows.splice(index..index, rows);
        self.table.insert_rows(visual(index), cells);

        if let Some(s) = self.selected {
            if s >= index {
                self.selected = Some(s + n);
            }
        }
    }

    fn remove_run(&mut self, index: usize, count: usize) -> Vec<Row> {
        self.ids.drain(index..index + count);
        let removed: Vec<Row> = self.rows.drain(index..index + count).collect();
        self.table.remove_rows(visual(index), count);

        self.selected = match self.selected {
            Some(s) if s < index => Some(s),
            Some(s) if s >= index + count => Some(s - count),
            Some(_) => self.fallback_selection(index),
            None => None,
        };
        removed
    }

    /// Selection after the selected row disappeared from a range starting
    /// at `index`: the row just before the range, else the first row.
    fn fallback_selection(&self, index: usize) -> Option<usize> {
        if self.is_empty() {
            None
        } else if index > 0 {
            Some(index - 1)
        } else {
            Some(0)
        }
    }

    #[cfg(test)]
    pub(crate) fn corrupt_table_for_test(&mut self) {
        self.table.remove_rows(HEADER_OFFSET, 1);
    }
}
