use crate::message::MessageMeta;
use crate::row::{PlaceholderReason, Row, TreePosition};

/// Colour class of a rendered row. The widget maps tones to terminal colours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowTone {
    ColumnHeader,
    Normal,
    Unread,
    Thread,
    Placeholder,
    Error,
}

/// Display text for one row of the visual table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedRow {
    pub marker: String,
    pub from: String,
    pub subject: String,
    pub date: String,
    pub tone: RowTone,
}

impl RenderedRow {
    /// The fixed column-title row at the top of the table.
    pub fn column_header() -> Self {
        Self {
            marker: "  ".to_string(),
            from: "From".to_string(),
            subject: "Subject".to_string(),
            date: "Date".to_string(),
            tone: RowTone::ColumnHeader,
        }
    }
}

/// Turns one row into display text.
pub trait RowFormatter: Send + Sync {
    fn format(&self, row: &Row) -> RenderedRow;
}

/// Default formatter: indicator, sender, subject, date.
#[derive(Debug, Default, Clone)]
pub struct ColumnFormatter;

impl ColumnFormatter {
    fn message_marker(meta: &MessageMeta) -> &'static str {
        if meta.is_starred() {
            "* "
        } else if meta.is_unread() {
            "> "
        } else {
            "  "
        }
    }

    fn message_tone(meta: &MessageMeta) -> RowTone {
        if meta.is_unread() {
            RowTone::Unread
        } else {
            RowTone::Normal
        }
    }
}

impl RowFormatter for ColumnFormatter {
    fn format(&self, row: &Row) -> RenderedRow {
        match row {
            Row::FlatMessage(meta) => RenderedRow {
                marker: Self::message_marker(meta).to_string(),
                from: meta.from_display(),
                subject: meta.subject.clone(),
                date: meta.date_display(),
                tone: Self::message_tone(meta),
            },
            Row::ThreadHeader { summary, expanded } => RenderedRow {
                marker: if *expanded { "▾ " } else { "▸ " }.to_string(),
                from: summary.senders_display(),
                subject: if summary.message_count() > 1 {
                    format!("{} [{}]", summary.subject, summary.message_count())
                } else {
                    summary.subject.clone()
                },
                date: summary.date_display(),
                tone: if summary.unread_count > 0 {
                    RowTone::Unread
                } else {
                    RowTone::Thread
                },
            },
            Row::ThreadMessage { meta, position } => {
                let glyph = match position {
                    TreePosition::Intermediate => "├─",
                    TreePosition::Last => "└─",
                };
                RenderedRow {
                    marker: Self::message_marker(meta).to_string(),
                    from: format!("{} {}", glyph, meta.from_display()),
                    subject: meta.subject.clone(),
                    date: meta.date_display(),
                    tone: Self::message_tone(meta),
                }
            }
            Row::Placeholder { reason, .. } => match reason {
                PlaceholderReason::Loading => RenderedRow {
                    marker: "  ".to_string(),
                    from: "└─".to_string(),
                    subject: "Loading…".to_string(),
                    date: String::new(),
                    tone: RowTone::Placeholder,
                },
                PlaceholderReason::Error(msg) => RenderedRow {
                    marker: "! ".to_string(),
                    from: "└─".to_string(),
                    subject: format!("Could not load thread: {}", msg),
                    date: String::new(),
                    tone: RowTone::Error,
                },
            },
        }
    }
}
