//! Displayable rows of the message list.
//!
//! A row is one of four kinds: a message in a flat listing, a thread header,
//! a message nested under an expanded thread header, or a placeholder shown
//! while a thread's messages load (or after loading failed).

use std::fmt;

use crate::message::{MessageMeta, ThreadSummary};

/// Identity of a row. Message and thread ids live in different namespaces
/// on the provider side and can collide, so the kind is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowId {
    Message(String),
    Thread(String),
    /// Placeholder rows are keyed by the thread they stand in for; a
    /// top-level placeholder uses an empty key.
    Placeholder(String),
}

impl RowId {
    pub fn message(id: impl Into<String>) -> Self {
        RowId::Message(id.into())
    }

    pub fn thread(id: impl Into<String>) -> Self {
        RowId::Thread(id.into())
    }

    pub fn as_thread(&self) -> Option<&str> {
        match self {
            RowId::Thread(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Message(id) => write!(f, "msg:{}", id),
            RowId::Thread(id) => write!(f, "thread:{}", id),
            RowId::Placeholder(id) => write!(f, "placeholder:{}", id),
        }
    }
}

/// Where a nested message sits in its thread, for tree glyphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreePosition {
    Intermediate,
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceholderReason {
    Loading,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    FlatMessage(MessageMeta),
    ThreadHeader {
        summary: ThreadSummary,
        expanded: bool,
    },
    ThreadMessage {
        meta: MessageMeta,
        position: TreePosition,
    },
    Placeholder {
        thread_id: Option<String>,
        reason: PlaceholderReason,
    },
}

impl Row {
    pub fn id(&self) -> RowId {
        match self {
            Row::FlatMessage(meta) | Row::ThreadMessage { meta, .. } => {
                RowId::Message(meta.id.clone())
            }
            Row::ThreadHeader { summary, .. } => RowId::Thread(summary.thread_id.clone()),
            Row::Placeholder { thread_id, .. } => {
                RowId::Placeholder(thread_id.clone().unwrap_or_default())
            }
        }
    }

    pub fn header(summary: ThreadSummary, expanded: bool) -> Self {
        Row::ThreadHeader { summary, expanded }
    }

    pub fn loading(thread_id: &str) -> Self {
        Row::Placeholder {
            thread_id: Some(thread_id.to_string()),
            reason: PlaceholderReason::Loading,
        }
    }

    pub fn load_error(thread_id: &str, message: impl Into<String>) -> Self {
        Row::Placeholder {
            thread_id: Some(thread_id.to_string()),
            reason: PlaceholderReason::Error(message.into()),
        }
    }

    /// Nested rows for a thread's messages, with the last one marked for the
    /// closing tree glyph.
    pub fn thread_children(messages: Vec<MessageMeta>) -> Vec<Row> {
        let n = messages.len();
        messages
            .into_iter()
            .enumerate()
            .map(|(i, meta)| Row::ThreadMessage {
                meta,
                position: if i + 1 == n {
                    TreePosition::Last
                } else {
                    TreePosition::Intermediate
                },
            })
            .collect()
    }

    /// The thread this row belongs to, if any.
    pub fn thread_id(&self) -> Option<&str> {
        match self {
            Row::FlatMessage(_) => None,
            Row::ThreadHeader { summary, .. } => Some(&summary.thread_id),
            Row::ThreadMessage { meta, .. } => Some(&meta.thread_id),
            Row::Placeholder { thread_id, .. } => thread_id.as_deref(),
        }
    }

    /// True for rows that hang under thread `thread_id`'s header.
    pub fn is_child_of(&self, thread_id: &str) -> bool {
        match self {
            Row::ThreadMessage { meta, .. } => meta.thread_id == thread_id,
            Row::Placeholder {
                thread_id: Some(t), ..
            } => t == thread_id,
            _ => false,
        }
    }

    pub fn is_header(&self) -> bool {
        matches!(self, Row::ThreadHeader { .. })
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Row::Placeholder { .. })
    }

    pub fn message(&self) -> Option<&MessageMeta> {
        match self {
            Row::FlatMessage(meta) | Row::ThreadMessage { meta, .. } => Some(meta),
            _ => None,
        }
    }

    pub fn message_mut(&mut self) -> Option<&mut MessageMeta> {
        match self {
            Row::FlatMessage(meta) | Row::ThreadMessage { meta, .. } => Some(meta),
            _ => None,
        }
    }

    /// Message ids a mutation of this row acts on: the message itself, or
    /// every message of a thread header.
    pub fn target_message_ids(&self) -> Vec<String> {
        match self {
            Row::FlatMessage(meta) | Row::ThreadMessage { meta, .. } => vec![meta.id.clone()],
            Row::ThreadHeader { summary, .. } => summary.message_ids.clone(),
            Row::Placeholder { .. } => Vec::new(),
        }
    }

    pub fn is_unread(&self) -> bool {
        match self {
            Row::FlatMessage(meta) | Row::ThreadMessage { meta, .. } => meta.is_unread(),
            Row::ThreadHeader { summary, .. } => summary.unread_count > 0,
            Row::Placeholder { .. } => false,
        }
    }

    pub fn label_ids(&self) -> &[String] {
        match self {
            Row::FlatMessage(meta) | Row::ThreadMessage { meta, .. } => &meta.label_ids,
            Row::ThreadHeader { summary, .. } => &summary.label_ids,
            Row::Placeholder { .. } => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::tests::make_message;

    #[test]
    fn ids_are_namespaced_by_kind() {
        let msg = make_message("x", "x", "same id");
        let summary = ThreadSummary::from_messages("x", &[msg.clone()]).unwrap();
        let flat = Row::FlatMessage(msg);
        let header = Row::header(summary, false);
        assert_ne!(flat.id(), header.id());
        assert_eq!(flat.id(), RowId::message("x"));
        assert_eq!(header.id(), RowId::thread("x"));
        assert_eq!(Row::loading("x").id(), RowId::Placeholder("x".into()));
    }

    #[test]
    fn thread_children_mark_last() {
        let rows = Row::thread_children(vec![
            make_message("1", "t", "a"),
            make_message("2", "t", "b"),
            make_message("3", "t", "c"),
        ]);
        let positions: Vec<_> = rows
            .iter()
            .map(|r| match r {
                Row::ThreadMessage { position, .. } => *position,
                _ => panic!("not a thread message"),
            })
            .collect();
        assert_eq!(
            positions,
            vec![
                TreePosition::Intermediate,
                TreePosition::Intermediate,
                TreePosition::Last
            ]
        );
        assert!(Row::thread_children(Vec::new()).is_empty());
    }

    #[test]
    fn child_membership() {
        let child = Row::thread_children(vec![make_message("1", "t", "a")]).remove(0);
        assert!(child.is_child_of("t"));
        assert!(!child.is_child_of("u"));
        assert!(Row::loading("t").is_child_of("t"));
        assert!(!Row::FlatMessage(make_message("1", "t", "a")).is_child_of("t"));
    }

    #[test]
    fn header_targets_all_thread_messages() {
        let summary = ThreadSummary::from_messages(
            "t",
            &[make_message("1", "t", "a"), make_message("2", "t", "b")],
        )
        .unwrap();
        assert_eq!(Row::header(summary, false).target_message_ids(), vec!["1", "2"]);
        assert!(Row::loading("t").target_message_ids().is_empty());
    }
}
