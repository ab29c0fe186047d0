use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::Widget,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::bulk::BulkSelection;
use crate::format::{RenderedRow, RowTone};
use crate::row_store::RowStore;

const FROM_WIDTH: usize = 22;

/// Draws the row store's visual table: the column header on the first
/// line, data rows below it.
pub struct MessageTable<'a> {
    pub rows: &'a RowStore,
    /// First model row shown.
    pub offset: usize,
    pub marked: &'a BulkSelection,
    pub loading: bool,
}

impl<'a> MessageTable<'a> {
    /// Calculate the visible range for scrolling.
    pub fn visible_range(
        selected: usize,
        offset: usize,
        height: usize,
        total: usize,
    ) -> (usize, usize) {
        let mut off = offset.min(total.saturating_sub(1));
        if selected < off {
            off = selected;
        }
        if height > 0 && selected >= off + height {
            off = selected - height + 1;
        }
        let end = (off + height).min(total);
        (off, end)
    }

    fn tone_style(tone: RowTone) -> Style {
        match tone {
            RowTone::ColumnHeader => Style::default()
                .fg(Color::Gray)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
            RowTone::Normal => Style::default().fg(Color::Gray),
            RowTone::Unread => Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
            RowTone::Thread => Style::default().fg(Color::White),
            RowTone::Placeholder => Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
            RowTone::Error => Style::default().fg(Color::Red),
        }
    }

    fn render_cells(cells: &RenderedRow, x: u16, y: u16, width: u16, base: Style, buf: &mut Buffer) {
        let w = width as usize;
        let style = base.patch(Self::tone_style(cells.tone));

        let marker_style = match cells.tone {
            RowTone::Unread => style.fg(Color::Cyan),
            RowTone::Error => style.fg(Color::Red),
            _ => style.fg(Color::DarkGray),
        };
        buf.set_string(x, y, truncate_str(&cells.marker, 2), marker_style);

        let from_width = FROM_WIDTH.min(w.saturating_sub(2));
        buf.set_string(x + 2, y, truncate_str(&cells.from, from_width), style);

        let date_width = cells.date.width();
        let date_x = if w > date_width + 1 {
            x + width - date_width as u16 - 1
        } else {
            x + width.saturating_sub(1)
        };
        buf.set_string(date_x, y, &cells.date, base.patch(Style::default().fg(Color::DarkGray)));

        let subject_start = x + 2 + from_width as u16 + 1;
        let subject_end = date_x.saturating_sub(1);
        if subject_start < subject_end {
            let subject_width = (subject_end - subject_start) as usize;
            buf.set_string(
                subject_start,
                y,
                truncate_str(&cells.subject, subject_width),
                style,
            );
        }
    }
}

impl<'a> Widget for MessageTable<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 {
            return;
        }

        let table = self.rows.table();
        if let Some(header) = table.column_header() {
            Self::render_cells(header, area.x, area.y, area.width, Style::default(), buf);
        }

        let body = Rect::new(area.x, area.y + 1, area.width, area.height.saturating_sub(1));
        if self.rows.is_empty() {
            let text = if self.loading { "Loading…" } else { "No messages" };
            buf.set_string(
                body.x + 2,
                body.y + body.height / 2,
                text,
                Style::default().fg(Color::DarkGray),
            );
            return;
        }

        let height = body.height as usize;
        let selected = self.rows.selected_index().unwrap_or(0);
        let (start, end) = Self::visible_range(selected, self.offset, height, self.rows.len());
        let selected_visual = self.rows.visual_selection();

        for (i, index) in (start..end).enumerate() {
            let visual_row = self.rows.visual_row(index);
            let Some(cell) = table.cell(visual_row) else {
                continue;
            };
            let y = body.y + i as u16;
            let is_selected = selected_visual == Some(visual_row);
            let is_marked = self
                .rows
                .ids()
                .get(index)
                .is_some_and(|id| self.marked.contains(id));

            let base_style = if is_selected {
                Style::default().bg(Color::Indexed(236)).fg(Color::White)
            } else {
                Style::default()
            };
            buf.set_style(Rect::new(body.x, y, body.width, 1), base_style);

            Self::render_cells(cell, body.x, y, body.width, base_style, buf);
            if is_marked {
                buf.set_string(
                    body.x,
                    y,
                    "x ",
                    base_style.fg(Color::Green).add_modifier(Modifier::BOLD),
                );
            }
        }
    }
}

/// Truncate a string to fit within `max_width` terminal columns, adding "~" if needed.
pub fn truncate_str(s: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    if s.width() <= max_width {
        return s.to_string();
    }
    let mut result = String::new();
    let mut used = 0;
    for c in s.chars() {
        let cw = c.width().unwrap_or(0);
        if used + cw > max_width - 1 {
            break;
        }
        result.push(c);
        used += cw;
    }
    result.push('~');
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::RowId;
    use crate::row_store::tests::{flat, store};

    #[test]
    fn renders_titles_then_rows_with_marks() {
        let mut rows = store();
        rows.replace(vec![flat("a"), flat("b"), flat("c")]);
        rows.select(1).unwrap();
        let mut marked = BulkSelection::new();
        marked.toggle(RowId::message("c"));

        let area = Rect::new(0, 0, 60, 5);
        let mut buf = Buffer::empty(area);
        MessageTable {
            rows: &rows,
            offset: 0,
            marked: &marked,
            loading: false,
        }
        .render(area, &mut buf);

        let line = |y: u16| -> String { (0..area.width).map(|x| buf[(x, y)].symbol()).collect() };
        assert!(line(1).contains("Subject a"));
        assert!(line(2).contains("Subject b"));
        assert_eq!(buf[(0, 2)].bg, Color::Indexed(236));
        assert!(line(3).starts_with("x "));
        assert_eq!(buf[(0, 3)].bg, Color::Reset);
    }

    #[test]
    fn visible_range_follows_selection() {
        assert_eq!(MessageTable::visible_range(0, 0, 10, 50), (0, 10));
        assert_eq!(MessageTable::visible_range(12, 0, 10, 50), (3, 13));
        assert_eq!(MessageTable::visible_range(2, 5, 10, 50), (2, 12));
        assert_eq!(MessageTable::visible_range(3, 0, 10, 4), (0, 4));
    }

    #[test]
    fn visible_range_clamps_stale_offset() {
        // Offset left over from a longer list.
        assert_eq!(MessageTable::visible_range(1, 40, 10, 3), (1, 3));
    }

    #[test]
    fn truncate_respects_display_width() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello world", 6), "hello~");
        assert_eq!(truncate_str("日本語テキスト", 5), "日本~");
        assert_eq!(truncate_str("abc", 0), "");
    }
}
