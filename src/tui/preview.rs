use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget, Wrap},
};

use crate::message::{label_names, Label, MessageMeta, ThreadSummary};
use crate::row::{PlaceholderReason, Row};

/// Details of the selected row. Message rows show headers and snippet,
/// thread headers a summary of the conversation.
pub struct PreviewPane<'a> {
    pub row: Option<&'a Row>,
    pub labels: &'a [Label],
    pub scroll: u16,
}

impl<'a> PreviewPane<'a> {
    fn field(name: &'a str, value: String) -> Line<'a> {
        Line::from(vec![
            Span::styled(name, Style::default().fg(Color::DarkGray)),
            Span::styled(value, Style::default().fg(Color::White)),
        ])
    }

    fn subject(subject: &'a str) -> Line<'a> {
        Line::from(vec![
            Span::styled("Subject: ", Style::default().fg(Color::DarkGray)),
            Span::styled(
                subject,
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            ),
        ])
    }

    fn label_line(&self, ids: &[String]) -> Line<'a> {
        Self::field("Labels:  ", label_names(ids, self.labels).join(", "))
    }

    fn message_lines(&self, meta: &'a MessageMeta) -> Vec<Line<'a>> {
        vec![
            Self::subject(&meta.subject),
            Self::field("From:    ", meta.from.to_string()),
            Self::field("To:      ", meta.to_display()),
            Self::field("Date:    ", meta.date.format("%Y-%m-%d %H:%M %Z").to_string()),
            self.label_line(&meta.label_ids),
            Line::from(""),
            Line::from(Span::styled(
                meta.snippet.as_str(),
                Style::default().fg(Color::White),
            )),
        ]
    }

    fn thread_lines(&self, summary: &'a ThreadSummary, expanded: bool) -> Vec<Line<'a>> {
        let count = summary.message_count();
        let mut lines = vec![
            Self::subject(&summary.subject),
            Self::field("People:  ", summary.senders.join(", ")),
            Self::field(
                "Thread:  ",
                format!(
                    "{} message{}, {} unread",
                    count,
                    if count == 1 { "" } else { "s" },
                    summary.unread_count
                ),
            ),
            Self::field(
                "Latest:  ",
                summary.latest.format("%Y-%m-%d %H:%M %Z").to_string(),
            ),
            self.label_line(&summary.label_ids),
            Line::from(""),
            Line::from(Span::styled(
                summary.snippet.as_str(),
                Style::default().fg(Color::White),
            )),
        ];
        if !expanded && count > 1 {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "Enter to expand",
                Style::default().fg(Color::DarkGray),
            )));
        }
        lines
    }
}

impl<'a> Widget for PreviewPane<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let row = match self.row {
            Some(r) => r,
            None => {
                let style = Style::default().fg(Color::DarkGray);
                buf.set_string(
                    area.x + 2,
                    area.y + area.height / 2,
                    "No message selected",
                    style,
                );
                return;
            }
        };

        let lines = match row {
            Row::FlatMessage(meta) | Row::ThreadMessage { meta, .. } => self.message_lines(meta),
            Row::ThreadHeader { summary, expanded } => self.thread_lines(summary, *expanded),
            Row::Placeholder { reason, .. } => match reason {
                PlaceholderReason::Loading => vec![Line::from(Span::styled(
                    "Loading thread…",
                    Style::default().fg(Color::DarkGray),
                ))],
                PlaceholderReason::Error(msg) => vec![
                    Line::from(Span::styled(
                        format!("Could not load thread: {}", msg),
                        Style::default().fg(Color::Red),
                    )),
                    Line::from(""),
                    Line::from(Span::styled(
                        "Collapse and expand the thread to retry",
                        Style::default().fg(Color::DarkGray),
                    )),
                ],
            },
        };

        let block = Block::default()
            .borders(Borders::LEFT)
            .border_style(Style::default().fg(Color::DarkGray));

        let paragraph = Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: false })
            .scroll((self.scroll, 0));

        paragraph.render(area, buf);
    }
}
