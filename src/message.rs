use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Well-known system label ids.
pub mod labels {
    pub const INBOX: &str = "INBOX";
    pub const UNREAD: &str = "UNREAD";
    pub const STARRED: &str = "STARRED";
    pub const TRASH: &str = "TRASH";
    pub const SPAM: &str = "SPAM";
    pub const SENT: &str = "SENT";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub name: Option<String>,
    pub email: String,
}

impl Address {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    #[cfg(test)]
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: email.into(),
        }
    }

    /// Name only (for compact list views), falls back to email.
    pub fn short_display(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.email.clone())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} <{}>", name, self.email),
            None => write!(f, "{}", self.email),
        }
    }
}

/// A mailbox label. System labels (INBOX, TRASH, ...) have `is_system` set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_system: bool,
}

impl Label {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_system: false,
        }
    }

    pub fn system(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_system: true,
        }
    }
}

/// Resolve label ids to display names, keeping unknown ids as-is.
pub fn label_names(label_ids: &[String], known: &[Label]) -> Vec<String> {
    label_ids
        .iter()
        .map(|id| {
            known
                .iter()
                .find(|l| &l.id == id)
                .map(|l| l.name.clone())
                .unwrap_or_else(|| id.clone())
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageMeta {
    pub id: String,
    pub thread_id: String,
    #[serde(default)]
    pub subject: String,
    pub from: Address,
    #[serde(default)]
    pub to: Vec<Address>,
    #[serde(default)]
    pub snippet: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub label_ids: Vec<String>,
}

impl MessageMeta {
    pub fn is_unread(&self) -> bool {
        self.has_label(labels::UNREAD)
    }

    pub fn is_starred(&self) -> bool {
        self.has_label(labels::STARRED)
    }

    pub fn has_label(&self, label_id: &str) -> bool {
        self.label_ids.iter().any(|l| l == label_id)
    }

    /// Short form for the message list (name only, falls back to email).
    pub fn from_display(&self) -> String {
        self.from.short_display()
    }

    pub fn to_display(&self) -> String {
        self.to
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn date_display(&self) -> String {
        format_date(self.date, Utc::now())
    }

    /// Everything a local filter may match against, lowercased.
    pub fn searchable_text(&self, label_names: &[String]) -> String {
        let mut parts = vec![
            self.subject.clone(),
            self.from.to_string(),
            self.to_display(),
            self.snippet.clone(),
        ];
        parts.extend(label_names.iter().cloned());
        parts.join(" ").to_lowercase()
    }
}

/// Compact date for list columns: time today, weekday this week, month/day
/// this year, full date otherwise.
pub fn format_date(date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    if now.date_naive() == date.date_naive() {
        date.format("%H:%M").to_string()
    } else if (now - date).num_days() < 7 && date <= now {
        date.format("%a %H:%M").to_string()
    } else if now.format("%Y").to_string() == date.format("%Y").to_string() {
        date.format("%b %d").to_string()
    } else {
        date.format("%Y-%m-%d").to_string()
    }
}

// ---------------------------------------------------------------------------
// Threads
// ---------------------------------------------------------------------------

/// Summary of one thread as shown on a thread header row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub subject: String,
    /// Deduplicated sender display names, oldest first.
    pub senders: Vec<String>,
    #[serde(default)]
    pub snippet: String,
    pub message_ids: Vec<String>,
    pub unread_count: usize,
    /// Union of the labels of every message in the thread.
    #[serde(default)]
    pub label_ids: Vec<String>,
    pub latest: DateTime<Utc>,
}

impl ThreadSummary {
    /// Build a summary from a thread's messages in chronological order.
    /// Returns `None` for an empty slice.
    pub fn from_messages(thread_id: &str, messages: &[MessageMeta]) -> Option<Self> {
        let first = messages.first()?;
        let last = messages.last()?;

        let mut seen = HashSet::new();
        let mut senders = Vec::new();
        let mut label_ids: Vec<String> = Vec::new();
        for msg in messages {
            let name = msg.from_display();
            if seen.insert(name.clone()) {
                senders.push(name);
            }
            for label in &msg.label_ids {
                if !label_ids.contains(label) {
                    label_ids.push(label.clone());
                }
            }
        }

        Some(Self {
            thread_id: thread_id.to_string(),
            subject: first.subject.clone(),
            senders,
            snippet: last.snippet.clone(),
            message_ids: messages.iter().map(|m| m.id.clone()).collect(),
            unread_count: messages.iter().filter(|m| m.is_unread()).count(),
            label_ids,
            latest: messages.iter().map(|m| m.date).max().unwrap_or(last.date),
        })
    }

    pub fn message_count(&self) -> usize {
        self.message_ids.len()
    }

    pub fn senders_display(&self) -> String {
        match self.senders.len() {
            0 => "(unknown)".to_string(),
            1 | 2 => self.senders.join(", "),
            n => format!("{}, {} +{}", self.senders[0], self.senders[1], n - 2),
        }
    }

    pub fn date_display(&self) -> String {
        format_date(self.latest, Utc::now())
    }

    pub fn searchable_text(&self, label_names: &[String]) -> String {
        let mut parts = vec![
            self.subject.clone(),
            self.senders.join(" "),
            self.snippet.clone(),
        ];
        parts.extend(label_names.iter().cloned());
        parts.join(" ").to_lowercase()
    }
}
