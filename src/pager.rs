//! Infinite-scroll paging: the cursor for the next page and the append
//! step that splices a fetched page onto the end of the row store.

use std::collections::HashSet;

use tracing::debug;

use crate::error::RowStoreError;
use crate::row::{Row, RowId};
use crate::row_store::RowStore;

/// Where the next page of the current listing starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pagination {
    next_cursor: Option<String>,
    pages: usize,
    in_flight: bool,
}

impl Pagination {
    pub fn new(next_cursor: Option<String>) -> Self {
        Self {
            next_cursor,
            pages: 1,
            in_flight: false,
        }
    }

    #[cfg(test)]
    pub fn cursor(&self) -> Option<&str> {
        self.next_cursor.as_deref()
    }

    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    /// Claim the cursor for a fetch. `None` if there is nothing more to load
    /// or a fetch is already running.
    pub fn begin_load(&mut self) -> Option<String> {
        if self.in_flight {
            return None;
        }
        let cursor = self.next_cursor.clone()?;
        self.in_flight = true;
        Some(cursor)
    }

    /// A page fetch failed; the cursor stays so the user can retry.
    pub fn load_failed(&mut self) {
        self.in_flight = false;
    }

    fn advance(&mut self, next_cursor: Option<String>) {
        self.next_cursor = next_cursor;
        self.pages += 1;
        self.in_flight = false;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendReport {
    pub appended: usize,
    pub skipped: usize,
    pub selection_repaired: bool,
}

/// Appends pages to the end of the list.
#[derive(Debug, Default)]
pub struct PageAppender {
    pagination: Pagination,
}

impl PageAppender {
    pub fn new(pagination: Pagination) -> Self {
        Self { pagination }
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    pub fn pagination_mut(&mut self) -> &mut Pagination {
        &mut self.pagination
    }

    /// Start over after a full reload.
    pub fn reset(&mut self, next_cursor: Option<String>) {
        self.pagination = Pagination::new(next_cursor);
    }

    /// Put back a cursor saved earlier (search restore).
    pub fn restore(&mut self, pagination: Pagination) {
        self.pagination = pagination;
    }

    /// Append `page` after the last row. Rows whose id is already present
    /// (overlapping pages) are skipped. If nothing valid is selected
    /// afterwards, the first row of the whole list is selected.
    pub fn append_page(
        &mut self,
        rows: &mut RowStore,
        page: Vec<Row>,
        next_cursor: Option<String>,
    ) -> Result<AppendReport, RowStoreError> {
        let offered = page.len();
        let mut seen: HashSet<RowId> = rows.ids().iter().cloned().collect();
        let fresh: Vec<Row> = page.into_iter().filter(|r| seen.insert(r.id())).collect();

        let appended = fresh.len();
        rows.insert_at(rows.len(), fresh)?;
        self.pagination.advance(next_cursor);
        let selection_repaired = rows.ensure_selection();

        let report = AppendReport {
            appended,
            skipped: offered - appended,
            selection_repaired,
        };
        debug!(
            appended = report.appended,
            skipped = report.skipped,
            more = self.pagination.has_more(),
            "page appended"
        );
        Ok(report)
    }
}
