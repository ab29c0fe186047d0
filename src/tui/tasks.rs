//! Background work for the UI task.
//!
//! Each job runs on its own tokio task against the shared provider and
//! reports back through one channel. Jobs never see the row store; the UI
//! task applies every `UiUpdate` itself, in arrival order.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::bulk::{run_batch, BatchReport, BatchTarget};
use crate::expander::FetchTicket;
use crate::message::{Label, MessageMeta};
use crate::provider::{ListQuery, MailAction, MailProvider, ProviderResult};
use crate::row::{Row, RowId};
use crate::undo::{replay, UndoEntry, UndoReport};

/// One page of rows ready for the store.
#[derive(Debug, Clone)]
pub struct Listing {
    pub rows: Vec<Row>,
    pub next_cursor: Option<String>,
}

#[derive(Debug)]
pub enum UiUpdate {
    /// First page of a full reload issued under `epoch`.
    Reloaded {
        epoch: u64,
        result: ProviderResult<Listing>,
    },
    PageLoaded {
        epoch: u64,
        result: ProviderResult<Listing>,
    },
    ThreadFetched {
        ticket: FetchTicket,
        result: ProviderResult<Vec<MessageMeta>>,
    },
    BatchFinished(BatchReport),
    /// Label-then-archive chain. `labelled` holds every message that got
    /// the label, archived or not.
    MoveFinished {
        report: BatchReport,
        labelled: Vec<String>,
    },
    UndoFinished(UndoReport),
    LabelsLoaded(ProviderResult<Vec<Label>>),
}

/// Fetch one page of the view: flat message rows, or collapsed thread
/// headers in thread view.
pub async fn fetch_listing(
    provider: &dyn MailProvider,
    query: &ListQuery,
    threaded: bool,
    cursor: Option<&str>,
    page_size: usize,
) -> ProviderResult<Listing> {
    if threaded {
        let page = provider.list_threads(query, cursor, page_size).await?;
        return Ok(Listing {
            rows: page
                .threads
                .into_iter()
                .map(|t| Row::header(t, false))
                .collect(),
            next_cursor: page.next_cursor,
        });
    }

    let page = provider.list_messages(query, cursor, page_size).await?;
    let metas = provider.fetch_message_metadata(&page.ids).await?;
    let mut rows = Vec::with_capacity(metas.len());
    for (id, meta) in page.ids.iter().zip(metas) {
        match meta {
            Some(meta) => rows.push(Row::FlatMessage(meta)),
            None => warn!(message_id = %id, "metadata unavailable; row skipped"),
        }
    }
    Ok(Listing {
        rows,
        next_cursor: page.next_cursor,
    })
}

/// Label every target, then archive the ones that took the label.
pub async fn run_move(
    provider: &dyn MailProvider,
    targets: Vec<BatchTarget>,
    label: &str,
) -> (BatchReport, Vec<String>) {
    let labelled = run_batch(
        provider,
        targets.clone(),
        MailAction::ApplyLabel(label.to_string()),
    )
    .await;

    let ok: HashSet<&RowId> = labelled.succeeded.iter().collect();
    let archive_targets: Vec<BatchTarget> =
        targets.into_iter().filter(|t| ok.contains(&t.row)).collect();
    let archived = run_batch(provider, archive_targets, MailAction::Archive).await;

    let mut failed = labelled.failed.clone();
    failed.extend(archived.failed);
    let report = BatchReport {
        action: MailAction::MoveToFolder(label.to_string()),
        succeeded: archived.succeeded,
        failed,
        done_message_ids: archived.done_message_ids,
    };
    (report, labelled.done_message_ids)
}

/// Spawns jobs that report back on the UI channel.
#[derive(Clone)]
pub struct Background {
    provider: Arc<dyn MailProvider>,
    tx: UnboundedSender<UiUpdate>,
}

impl Background {
    pub fn new(provider: Arc<dyn MailProvider>, tx: UnboundedSender<UiUpdate>) -> Self {
        Self { provider, tx }
    }

    fn send(tx: &UnboundedSender<UiUpdate>, update: UiUpdate) {
        if tx.send(update).is_err() {
            debug!("ui task gone; update dropped");
        }
    }

    pub fn reload(&self, epoch: u64, query: ListQuery, threaded: bool, page_size: usize) {
        let provider = Arc::clone(&self.provider);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = fetch_listing(provider.as_ref(), &query, threaded, None, page_size).await;
            Self::send(&tx, UiUpdate::Reloaded { epoch, result });
        });
    }

    pub fn load_page(
        &self,
        epoch: u64,
        query: ListQuery,
        threaded: bool,
        cursor: String,
        page_size: usize,
    ) {
        let provider = Arc::clone(&self.provider);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result =
                fetch_listing(provider.as_ref(), &query, threaded, Some(&cursor), page_size).await;
            Self::send(&tx, UiUpdate::PageLoaded { epoch, result });
        });
    }

    pub fn fetch_thread(&self, ticket: FetchTicket) {
        let provider = Arc::clone(&self.provider);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = provider.fetch_thread_messages(&ticket.thread_id).await;
            Self::send(&tx, UiUpdate::ThreadFetched { ticket, result });
        });
    }

    pub fn run_batch(&self, targets: Vec<BatchTarget>, action: MailAction) {
        let provider = Arc::clone(&self.provider);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let report = run_batch(provider.as_ref(), targets, action).await;
            Self::send(&tx, UiUpdate::BatchFinished(report));
        });
    }

    pub fn run_move(&self, targets: Vec<BatchTarget>, label: String) {
        let provider = Arc::clone(&self.provider);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let (report, labelled) = run_move(provider.as_ref(), targets, &label).await;
            Self::send(&tx, UiUpdate::MoveFinished { report, labelled });
        });
    }

    pub fn undo(&self, entry: UndoEntry) {
        let provider = Arc::clone(&self.provider);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let report = replay(provider.as_ref(), &entry).await;
            Self::send(&tx, UiUpdate::UndoFinished(report));
        });
    }

    pub fn load_labels(&self) {
        let provider = Arc::clone(&self.provider);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = provider.list_labels().await;
            Self::send(&tx, UiUpdate::LabelsLoaded(result));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::tests::mailbox;
    use crate::provider::MemoryProvider;

    #[tokio::test]
    async fn flat_listing_skips_missing_metadata() {
        let provider = MemoryProvider::new(mailbox(4)).fail_metadata("m2");
        let listing = fetch_listing(&provider, &ListQuery::label("INBOX"), false, None, 10)
            .await
            .unwrap();
        let ids: Vec<RowId> = listing.rows.iter().map(Row::id).collect();
        assert_eq!(
            ids,
            vec![RowId::message("m3"), RowId::message("m1"), RowId::message("m0")]
        );
        assert_eq!(listing.next_cursor, None);
    }

    #[tokio::test]
    async fn threaded_listing_yields_collapsed_headers() {
        let provider = MemoryProvider::new(mailbox(6));
        let listing = fetch_listing(&provider, &ListQuery::label("INBOX"), true, None, 2)
            .await
            .unwrap();
        assert_eq!(listing.rows.len(), 2);
        assert!(listing
            .rows
            .iter()
            .all(|r| matches!(r, Row::ThreadHeader { expanded: false, .. })));
        assert!(listing.next_cursor.is_some());
    }

    #[tokio::test]
    async fn listing_error_is_returned() {
        let provider = MemoryProvider::new(mailbox(2))
            .fail_listing(ProviderError::Transport("offline".into()));
        let err = fetch_listing(&provider, &ListQuery::label("INBOX"), false, None, 10)
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::Transport("offline".into()));
    }

    #[tokio::test]
    async fn move_archives_only_labelled_targets() {
        let provider = MemoryProvider::new(mailbox(3)).fail_mutation("m1");
        let targets = vec![
            BatchTarget {
                row: RowId::message("m0"),
                message_ids: vec!["m0".into()],
            },
            BatchTarget {
                row: RowId::message("m1"),
                message_ids: vec!["m1".into()],
            },
        ];
        let (report, labelled) = run_move(&provider, targets, "Label_1").await;
        assert_eq!(report.succeeded, vec![RowId::message("m0")]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(labelled, vec!["m0".to_string()]);
        assert_eq!(provider.labels_of("m0").unwrap(), vec!["Label_1"]);
        assert!(provider.labels_of("m1").unwrap().contains(&"INBOX".to_string()));
    }
}
