//! The mail backend as the row engine sees it.
//!
//! `MailProvider` is the async interface to a Gmail-like service: listing
//! pages of messages or threads, fetching metadata, and mutating labels.
//! `MemoryProvider` implements it over an in-memory mailbox that can be
//! loaded from a JSON file; the binary runs against it and the tests drive
//! it with injected failures.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::{label_names, labels, Label, MessageMeta, ThreadSummary};

/// A mutation applied to one message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MailAction {
    Archive,
    Unarchive,
    Trash,
    Untrash,
    ApplyLabel(String),
    RemoveLabel(String),
    /// Apply the label and take the message out of the inbox.
    MoveToFolder(String),
}

impl MailAction {
    /// Steps that undo this action, in the order they should run.
    pub fn inverse(&self) -> Vec<MailAction> {
        match self {
            MailAction::Archive => vec![MailAction::Unarchive],
            MailAction::Unarchive => vec![MailAction::Archive],
            MailAction::Trash => vec![MailAction::Untrash],
            MailAction::Untrash => vec![MailAction::Trash],
            MailAction::ApplyLabel(l) => vec![MailAction::RemoveLabel(l.clone())],
            MailAction::RemoveLabel(l) => vec![MailAction::ApplyLabel(l.clone())],
            MailAction::MoveToFolder(l) => {
                vec![MailAction::RemoveLabel(l.clone()), MailAction::Unarchive]
            }
        }
    }

    /// True if a successful run takes the message out of the current view.
    /// Label changes only rewrite the row.
    pub fn removes_row(&self) -> bool {
        matches!(
            self,
            MailAction::Archive | MailAction::Trash | MailAction::MoveToFolder(_)
        )
    }

    /// The label effect of this action on a message's metadata.
    pub fn apply_to(&self, meta: &mut MessageMeta) {
        self.apply_to_labels(&mut meta.label_ids);
    }

    /// The label effect of this action on a bare label list.
    pub fn apply_to_labels(&self, label_ids: &mut Vec<String>) {
        let (add, remove): (Option<&str>, Option<&str>) = match self {
            MailAction::Archive => (None, Some(labels::INBOX)),
            MailAction::Unarchive => (Some(labels::INBOX), None),
            MailAction::Trash => (Some(labels::TRASH), Some(labels::INBOX)),
            MailAction::Untrash => (Some(labels::INBOX), Some(labels::TRASH)),
            MailAction::ApplyLabel(l) => (Some(l.as_str()), None),
            MailAction::RemoveLabel(l) => (None, Some(l.as_str())),
            MailAction::MoveToFolder(l) => (Some(l.as_str()), Some(labels::INBOX)),
        };
        if let Some(add) = add {
            if !label_ids.iter().any(|l| l == add) {
                label_ids.push(add.to_string());
            }
        }
        if let Some(remove) = remove {
            label_ids.retain(|l| l != remove);
        }
    }

    /// Past-tense verb for status messages.
    pub fn describe(&self) -> String {
        match self {
            MailAction::Archive => "Archived".to_string(),
            MailAction::Unarchive => "Moved to inbox".to_string(),
            MailAction::Trash => "Trashed".to_string(),
            MailAction::Untrash => "Restored".to_string(),
            MailAction::ApplyLabel(l) => format!("Labelled {}", l),
            MailAction::RemoveLabel(l) => format!("Unlabelled {}", l),
            MailAction::MoveToFolder(l) => format!("Moved to {}", l),
        }
    }
}

/// What a listing call asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Restrict to messages carrying this label id.
    pub label: Option<String>,
    /// Free-text provider search.
    pub q: Option<String>,
}

impl ListQuery {
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            q: None,
        }
    }

    pub fn search(q: impl Into<String>) -> Self {
        Self {
            label: None,
            q: Some(q.into()),
        }
    }

    pub fn describe(&self) -> String {
        match (&self.label, &self.q) {
            (_, Some(q)) => format!("search: {}", q),
            (Some(l), None) => l.clone(),
            (None, None) => "All mail".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePage {
    pub ids: Vec<String>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadPage {
    pub threads: Vec<ThreadSummary>,
    pub next_cursor: Option<String>,
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

#[async_trait]
pub trait MailProvider: Send + Sync {
    async fn list_messages(
        &self,
        query: &ListQuery,
        cursor: Option<&str>,
        page_size: usize,
    ) -> ProviderResult<MessagePage>;

    async fn list_threads(
        &self,
        query: &ListQuery,
        cursor: Option<&str>,
        page_size: usize,
    ) -> ProviderResult<ThreadPage>;

    /// One entry per requested id; `None` where that id could not be
    /// fetched.
    async fn fetch_message_metadata(
        &self,
        ids: &[String],
    ) -> ProviderResult<Vec<Option<MessageMeta>>>;

    /// A thread's messages, oldest first.
    async fn fetch_thread_messages(&self, thread_id: &str) -> ProviderResult<Vec<MessageMeta>>;

    async fn mutate_message(&self, id: &str, action: &MailAction) -> ProviderResult<()>;

    async fn list_labels(&self) -> ProviderResult<Vec<Label>>;
}

// ---------------------------------------------------------------------------
// In-memory mailbox
// ---------------------------------------------------------------------------

/// On-disk shape of a mailbox file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mailbox {
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub messages: Vec<MessageMeta>,
}

/// A recorded provider call.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    ListMessages(ListQuery, Option<String>),
    ListThreads(ListQuery, Option<String>),
    FetchMetadata(Vec<String>),
    FetchThread(String),
    Mutate(String, MailAction),
    ListLabels,
}

#[derive(Default)]
struct Failures {
    mutate: HashSet<String>,
    metadata: HashSet<String>,
    threads: HashSet<String>,
    listing: Option<ProviderError>,
}

pub struct MemoryProvider {
    messages: Mutex<Vec<MessageMeta>>,
    labels: Vec<Label>,
    failures: Mutex<Failures>,
    #[cfg(test)]
    calls: Mutex<Vec<ProviderCall>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn system_labels() -> Vec<Label> {
    vec![
        Label::system(labels::INBOX, "Inbox"),
        Label::system(labels::STARRED, "Starred"),
        Label::system(labels::SENT, "Sent"),
        Label::system(labels::TRASH, "Trash"),
        Label::system(labels::SPAM, "Spam"),
    ]
}

impl MemoryProvider {
    pub fn new(messages: Vec<MessageMeta>) -> Self {
        Self::from_mailbox(Mailbox {
            labels: Vec::new(),
            messages,
        })
    }

    pub fn from_mailbox(mailbox: Mailbox) -> Self {
        let mut all_labels = system_labels();
        for label in mailbox.labels {
            if !all_labels.iter().any(|l| l.id == label.id) {
                all_labels.push(label);
            }
        }
        Self {
            messages: Mutex::new(mailbox.messages),
            labels: all_labels,
            failures: Mutex::new(Failures::default()),
            #[cfg(test)]
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Load a JSON mailbox file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading mailbox {}", path.display()))?;
        let mailbox: Mailbox = serde_json::from_str(&text)
            .with_context(|| format!("parsing mailbox {}", path.display()))?;
        Ok(Self::from_mailbox(mailbox))
    }

    fn check_listing(&self) -> ProviderResult<()> {
        match &lock(&self.failures).listing {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn matches(&self, meta: &MessageMeta, query: &ListQuery) -> bool {
        if let Some(label) = &query.label {
            if !meta.has_label(label) {
                return false;
            }
        } else if meta.has_label(labels::TRASH) || meta.has_label(labels::SPAM) {
            return false;
        }
        match &query.q {
            Some(q) => {
                let names = label_names(&meta.label_ids, &self.labels);
                let text = meta.searchable_text(&names);
                q.split_whitespace()
                    .all(|tok| text.contains(&tok.to_lowercase()))
            }
            None => true,
        }
    }

    /// Matching messages, newest first.
    fn query_messages(&self, query: &ListQuery) -> Vec<MessageMeta> {
        let mut hits: Vec<MessageMeta> = lock(&self.messages)
            .iter()
            .filter(|m| self.matches(m, query))
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.date.cmp(&a.date));
        hits
    }

    fn thread_messages(&self, thread_id: &str) -> Vec<MessageMeta> {
        let mut msgs: Vec<MessageMeta> = lock(&self.messages)
            .iter()
            .filter(|m| m.thread_id == thread_id)
            .cloned()
            .collect();
        msgs.sort_by(|a, b| a.date.cmp(&b.date));
        msgs
    }
}

/// Failure injection and the call log, for tests.
#[cfg(test)]
impl MemoryProvider {
    /// Make `mutate_message` fail for `id`.
    pub fn fail_mutation(self, id: &str) -> Self {
        lock(&self.failures).mutate.insert(id.to_string());
        self
    }

    /// Make `fetch_message_metadata` return `None` for `id`.
    pub fn fail_metadata(self, id: &str) -> Self {
        lock(&self.failures).metadata.insert(id.to_string());
        self
    }

    /// Make `fetch_thread_messages` fail for `thread_id`.
    pub fn fail_thread(self, thread_id: &str) -> Self {
        lock(&self.failures).threads.insert(thread_id.to_string());
        self
    }

    /// Make every listing call fail with `err`.
    pub fn fail_listing(self, err: ProviderError) -> Self {
        lock(&self.failures).listing = Some(err);
        self
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        lock(&self.calls).clone()
    }

    /// Current labels of message `id`.
    pub fn labels_of(&self, id: &str) -> Option<Vec<String>> {
        lock(&self.messages)
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.label_ids.clone())
    }

    fn record(&self, call: ProviderCall) {
        lock(&self.calls).push(call);
    }
}

fn page_bounds(cursor: Option<&str>, page_size: usize, total: usize) -> ProviderResult<(usize, usize)> {
    let start = match cursor {
        Some(c) => c.parse::<usize>().map_err(|_| ProviderError::Rejected {
            id: c.to_string(),
            reason: "malformed page cursor".to_string(),
        })?,
        None => 0,
    };
    let start = start.min(total);
    let end = (start + page_size.max(1)).min(total);
    Ok((start, end))
}

fn next_cursor(end: usize, total: usize) -> Option<String> {
    (end < total).then(|| end.to_string())
}

#[async_trait]
impl MailProvider for MemoryProvider {
    async fn list_messages(
        &self,
        query: &ListQuery,
        cursor: Option<&str>,
        page_size: usize,
    ) -> ProviderResult<MessagePage> {
        #[cfg(test)]
        self.record(ProviderCall::ListMessages(
            query.clone(),
            cursor.map(str::to_string),
        ));
        self.check_listing()?;
        let hits = self.query_messages(query);
        let (start, end) = page_bounds(cursor, page_size, hits.len())?;
        Ok(MessagePage {
            ids: hits[start..end].iter().map(|m| m.id.clone()).collect(),
            next_cursor: next_cursor(end, hits.len()),
        })
    }

    async fn list_threads(
        &self,
        query: &ListQuery,
        cursor: Option<&str>,
        page_size: usize,
    ) -> ProviderResult<ThreadPage> {
        #[cfg(test)]
        self.record(ProviderCall::ListThreads(
            query.clone(),
            cursor.map(str::to_string),
        ));
        self.check_listing()?;

        // Threads ordered by their newest matching message.
        let mut order: Vec<String> = Vec::new();
        for meta in self.query_messages(query) {
            if !order.contains(&meta.thread_id) {
                order.push(meta.thread_id);
            }
        }
        let (start, end) = page_bounds(cursor, page_size, order.len())?;
        let threads = order[start..end]
            .iter()
            .filter_map(|t| ThreadSummary::from_messages(t, &self.thread_messages(t)))
            .collect();
        Ok(ThreadPage {
            threads,
            next_cursor: next_cursor(end, order.len()),
        })
    }

    async fn fetch_message_metadata(
        &self,
        ids: &[String],
    ) -> ProviderResult<Vec<Option<MessageMeta>>> {
        #[cfg(test)]
        self.record(ProviderCall::FetchMetadata(ids.to_vec()));
        let failing = lock(&self.failures).metadata.clone();
        let messages = lock(&self.messages);
        let by_id: HashMap<&str, &MessageMeta> =
            messages.iter().map(|m| (m.id.as_str(), m)).collect();
        Ok(ids
            .iter()
            .map(|id| {
                if failing.contains(id) {
                    None
                } else {
                    by_id.get(id.as_str()).map(|m| (*m).clone())
                }
            })
            .collect())
    }

    async fn fetch_thread_messages(&self, thread_id: &str) -> ProviderResult<Vec<MessageMeta>> {
        #[cfg(test)]
        self.record(ProviderCall::FetchThread(thread_id.to_string()));
        if lock(&self.failures).threads.contains(thread_id) {
            return Err(ProviderError::Transport(format!(
                "thread {} unavailable",
                thread_id
            )));
        }
        let msgs = self.thread_messages(thread_id);
        if msgs.is_empty() {
            return Err(ProviderError::NotFound(thread_id.to_string()));
        }
        Ok(msgs)
    }

    async fn mutate_message(&self, id: &str, action: &MailAction) -> ProviderResult<()> {
        #[cfg(test)]
        self.record(ProviderCall::Mutate(id.to_string(), action.clone()));
        if lock(&self.failures).mutate.contains(id) {
            return Err(ProviderError::Rejected {
                id: id.to_string(),
                reason: "mutation refused".to_string(),
            });
        }
        let mut messages = lock(&self.messages);
        let meta = messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
        action.apply_to(meta);
        Ok(())
    }

    async fn list_labels(&self) -> ProviderResult<Vec<Label>> {
        #[cfg(test)]
        self.record(ProviderCall::ListLabels);
        Ok(self.labels.clone())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::message::tests::make_message;
    use chrono::{Duration, TimeZone, Utc};

    /// Messages m0..m{n-1}, each newer than the last, in threads of two.
    pub(crate) fn mailbox(n: usize) -> Vec<MessageMeta> {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let mut m = make_message(&format!("m{}", i), &format!("t{}", i / 2), "Hello");
                m.date = base + Duration::minutes(i as i64);
                m
            })
            .collect()
    }

    #[tokio::test]
    async fn list_messages_pages_newest_first() {
        let p = MemoryProvider::new(mailbox(5));
        let q = ListQuery::label(labels::INBOX);
        let first = p.list_messages(&q, None, 2).await.unwrap();
        assert_eq!(first.ids, vec!["m4", "m3"]);
        assert_eq!(first.next_cursor.as_deref(), Some("2"));

        let last = p.list_messages(&q, Some("4"), 2).await.unwrap();
        assert_eq!(last.ids, vec!["m0"]);
        assert_eq!(last.next_cursor, None);
    }

    #[tokio::test]
    async fn malformed_cursor_is_rejected() {
        let p = MemoryProvider::new(mailbox(2));
        let err = p
            .list_messages(&ListQuery::default(), Some("abc"), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Rejected { .. }));
    }

    #[tokio::test]
    async fn list_threads_groups_and_orders() {
        let p = MemoryProvider::new(mailbox(5));
        let page = p.list_threads(&ListQuery::default(), None, 10).await.unwrap();
        let ids: Vec<_> = page.threads.iter().map(|t| t.thread_id.as_str()).collect();
        assert_eq!(ids, vec!["t2", "t1", "t0"]);
        assert_eq!(page.threads[1].message_ids, vec!["m2", "m3"]);
    }

    #[tokio::test]
    async fn search_matches_all_tokens() {
        let mut msgs = mailbox(2);
        msgs[0].subject = "Quarterly report".into();
        let p = MemoryProvider::new(msgs);
        let page = p
            .list_messages(&ListQuery::search("REPORT quarterly"), None, 10)
            .await
            .unwrap();
        assert_eq!(page.ids, vec!["m0"]);
    }

    #[tokio::test]
    async fn trash_hidden_from_unlabelled_queries() {
        let p = MemoryProvider::new(mailbox(2));
        p.mutate_message("m1", &MailAction::Trash).await.unwrap();
        let all = p.list_messages(&ListQuery::default(), None, 10).await.unwrap();
        assert_eq!(all.ids, vec!["m0"]);
        let trash = p
            .list_messages(&ListQuery::label(labels::TRASH), None, 10)
            .await
            .unwrap();
        assert_eq!(trash.ids, vec!["m1"]);
    }

    #[tokio::test]
    async fn metadata_reports_per_id_failures() {
        let p = MemoryProvider::new(mailbox(3)).fail_metadata("m1");
        let got = p
            .fetch_message_metadata(&["m0".into(), "m1".into(), "nope".into()])
            .await
            .unwrap();
        assert!(got[0].is_some());
        assert!(got[1].is_none());
        assert!(got[2].is_none());
    }

    #[tokio::test]
    async fn thread_fetch_failure_and_missing() {
        let p = MemoryProvider::new(mailbox(4)).fail_thread("t0");
        assert!(matches!(
            p.fetch_thread_messages("t0").await,
            Err(ProviderError::Transport(_))
        ));
        assert!(matches!(
            p.fetch_thread_messages("zz").await,
            Err(ProviderError::NotFound(_))
        ));
        let msgs = p.fetch_thread_messages("t1").await.unwrap();
        assert_eq!(msgs.len(), 2);
        assert!(msgs[0].date < msgs[1].date);
    }

    #[tokio::test]
    async fn mutation_applies_labels_and_records_calls() {
        let p = MemoryProvider::new(mailbox(1)).fail_mutation("bad");
        p.mutate_message("m0", &MailAction::MoveToFolder("work".into()))
            .await
            .unwrap();
        assert_eq!(p.labels_of("m0").unwrap(), vec!["work"]);
        assert!(p.mutate_message("bad", &MailAction::Archive).await.is_err());
        assert_eq!(p.calls().len(), 2);
    }

    #[test]
    fn inverse_restores_labels() {
        let actions = [
            MailAction::Archive,
            MailAction::Trash,
            MailAction::ApplyLabel("work".into()),
            MailAction::MoveToFolder("work".into()),
        ];
        for action in actions {
            let original = make_message("1", "t", "x");
            let mut meta = original.clone();
            action.apply_to(&mut meta);
            for step in action.inverse() {
                step.apply_to(&mut meta);
            }
            let mut want = original.label_ids.clone();
            want.sort();
            let mut got = meta.label_ids.clone();
            got.sort();
            assert_eq!(got, want, "{:?}", action);
        }
    }

    #[test]
    fn only_moves_remove_rows() {
        assert!(MailAction::Archive.removes_row());
        assert!(MailAction::MoveToFolder("x".into()).removes_row());
        assert!(!MailAction::ApplyLabel("x".into()).removes_row());
        assert!(!MailAction::RemoveLabel("x".into()).removes_row());
    }

    #[test]
    fn load_mailbox_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mail.json");
        let mailbox = Mailbox {
            labels: vec![Label::new("Label_1", "work")],
            messages: mailbox(2),
        };
        std::fs::write(&path, serde_json::to_string(&mailbox).unwrap()).unwrap();
        let p = MemoryProvider::load(&path).unwrap();
        assert!(p.labels.iter().any(|l| l.name == "work"));
        assert!(p.labels.iter().any(|l| l.id == labels::INBOX));
    }
}
