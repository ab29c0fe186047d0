use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Clear, Widget},
};

use super::message_table::truncate_str;
use crate::message::Label;

/// What the picked label will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerPurpose {
    Navigate,
    Move,
    Apply,
    Remove,
}

impl PickerPurpose {
    pub fn title(&self) -> &'static str {
        match self {
            PickerPurpose::Navigate => "Go to label",
            PickerPurpose::Move => "Move to",
            PickerPurpose::Apply => "Apply label",
            PickerPurpose::Remove => "Remove label",
        }
    }

    /// System labels are only offered for navigation.
    pub fn offers(&self, label: &Label) -> bool {
        matches!(self, PickerPurpose::Navigate) || !label.is_system
    }
}

/// Compute a centered rectangle of the given width and height within `area`.
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect::new(x, y, w, h)
}

/// Labels offered for `purpose` whose name contains `filter` (case-insensitive).
pub fn filtered_labels<'l>(labels: &'l [Label], filter: &str, purpose: PickerPurpose) -> Vec<&'l Label> {
    let filter_lower = filter.to_lowercase();
    labels
        .iter()
        .filter(|l| purpose.offers(l))
        .filter(|l| filter_lower.is_empty() || l.name.to_lowercase().contains(&filter_lower))
        .collect()
}

pub struct LabelPicker<'a> {
    pub labels: &'a [&'a Label],
    pub selected: usize,
    pub filter: &'a str,
    pub purpose: PickerPurpose,
}

impl<'a> Widget for LabelPicker<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let popup_width: u16 = 40;
        let popup_height: u16 = ((self.labels.len() + 4) as u16).min(20);
        let popup = centered_rect(popup_width, popup_height, area);

        Clear.render(popup, buf);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue))
            .title(format!(" {} ", self.purpose.title()))
            .title_style(
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            );
        block.render(popup, buf);

        let inner = Rect::new(
            popup.x + 1,
            popup.y + 1,
            popup.width.saturating_sub(2),
            popup.height.saturating_sub(2),
        );

        if inner.width == 0 || inner.height == 0 {
            return;
        }

        // Filter input line with cursor
        let filter_style = Style::default().fg(Color::White);
        buf.set_string(inner.x, inner.y, "> ", filter_style);
        buf.set_string(inner.x + 2, inner.y, self.filter, filter_style);
        let cursor_x = inner.x + 2 + self.filter.chars().count() as u16;
        if cursor_x < inner.x + inner.width {
            buf.set_string(cursor_x, inner.y, " ", Style::default().bg(Color::Gray));
        }

        if inner.height > 1 {
            let sep: String = "\u{2500}".repeat(inner.width as usize);
            buf.set_string(
                inner.x,
                inner.y + 1,
                &sep,
                Style::default().fg(Color::DarkGray),
            );
        }

        let list_start_y = inner.y + 2;
        let list_height = inner.height.saturating_sub(2) as usize;
        let sel = self.selected.min(self.labels.len().saturating_sub(1));
        let scroll_offset = if sel >= list_height {
            sel - list_height + 1
        } else {
            0
        };

        for (i, label) in self
            .labels
            .iter()
            .skip(scroll_offset)
            .take(list_height)
            .enumerate()
        {
            let y = list_start_y + i as u16;
            let is_selected = scroll_offset + i == sel;

            let base_style = if label.is_system {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default().fg(Color::White)
            };
            let style = if is_selected {
                base_style
                    .bg(Color::Blue)
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD)
            } else {
                base_style
            };
            if is_selected {
                buf.set_style(Rect::new(inner.x, y, inner.width, 1), style);
            }

            let display = truncate_str(&label.name, inner.width.saturating_sub(1) as usize);
            buf.set_string(inner.x + 1, y, &display, style);
        }

        if self.labels.is_empty() && list_start_y < inner.y + inner.height {
            buf.set_string(
                inner.x + 1,
                list_start_y,
                "No matching labels",
                Style::default().fg(Color::DarkGray),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<Label> {
        vec![
            Label::system("INBOX", "Inbox"),
            Label::new("Label_1", "Work"),
            Label::new("Label_2", "Receipts"),
            Label::new("Label_3", "Homework"),
        ]
    }

    #[test]
    fn navigation_offers_system_labels() {
        let all = labels();
        let names: Vec<&str> = filtered_labels(&all, "", PickerPurpose::Navigate)
            .iter()
            .map(|l| l.name.as_str())
            .collect();
        assert_eq!(names, vec!["Inbox", "Work", "Receipts", "Homework"]);
    }

    #[test]
    fn mutations_offer_user_labels_only() {
        let all = labels();
        let names: Vec<&str> = filtered_labels(&all, "WORK", PickerPurpose::Move)
            .iter()
            .map(|l| l.name.as_str())
            .collect();
        assert_eq!(names, vec!["Work", "Homework"]);
        assert!(filtered_labels(&all, "inbox", PickerPurpose::Apply).is_empty());
    }

    #[test]
    fn centered_rect_clamps_to_area() {
        let area = Rect::new(0, 0, 30, 10);
        assert_eq!(centered_rect(40, 20, area), Rect::new(0, 0, 30, 10));
        assert_eq!(centered_rect(10, 4, area), Rect::new(10, 3, 10, 4));
    }
}
