use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget},
};

use super::label_picker::centered_rect;

struct HelpSection {
    title: &'static str,
    keys: &'static [(&'static str, &'static str)],
}

const SECTIONS: &[HelpSection] = &[
    HelpSection {
        title: "Navigation",
        keys: &[
            ("j / Down", "Move down"),
            ("k / Up", "Move up"),
            ("gg", "Jump to top"),
            ("G", "Jump to bottom"),
            ("Ctrl+d", "Half page down"),
            ("Ctrl+u", "Half page up"),
            ("Space", "Scroll preview down"),
            ("Shift+Space", "Scroll preview up"),
            ("n", "Load more"),
        ],
    },
    HelpSection {
        title: "Threads",
        keys: &[
            ("Enter / o", "Expand or collapse"),
            ("Right", "Expand"),
            ("Left", "Collapse"),
            ("t", "Threads / messages view"),
        ],
    },
    HelpSection {
        title: "Triage",
        keys: &[
            ("e", "Archive"),
            ("#", "Trash"),
            ("m", "Move to label"),
            ("l", "Apply label"),
            ("L", "Remove label"),
            ("z", "Undo"),
        ],
    },
    HelpSection {
        title: "Selection",
        keys: &[
            ("x", "Toggle select"),
            ("J", "Select + move down"),
            ("K", "Select + move up"),
            ("Esc", "Clear selection"),
        ],
    },
    HelpSection {
        title: "Labels",
        keys: &[
            ("gi", "Go to inbox"),
            ("gs", "Go to starred"),
            ("gt", "Go to sent"),
            ("g#", "Go to trash"),
            ("gl", "Label picker"),
        ],
    },
    HelpSection {
        title: "Filter & Search",
        keys: &[
            ("/", "Filter loaded rows"),
            ("?", "Search mailbox"),
            ("Esc", "Leave filter or search"),
        ],
    },
    HelpSection {
        title: "Other",
        keys: &[
            ("Ctrl+r", "Reload"),
            ("H / F1", "This help"),
            ("q", "Quit"),
        ],
    },
];

const KEY_COL_WIDTH: usize = 14;

/// All help lines: section titles, key rows and the footer.
fn help_lines() -> Vec<Line<'static>> {
    let title_style = Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD);
    let key_style = Style::default().fg(Color::Cyan);
    let desc_style = Style::default().fg(Color::White);

    let mut lines = Vec::new();
    for (si, section) in SECTIONS.iter().enumerate() {
        if si > 0 {
            lines.push(Line::from(""));
        }
        lines.push(Line::from(Span::styled(format!(" {}", section.title), title_style)));
        for (key, desc) in section.keys {
            lines.push(Line::from(vec![
                Span::styled(format!("  {:width$}", key, width = KEY_COL_WIDTH), key_style),
                Span::styled(*desc, desc_style),
            ]));
        }
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        " j/k:scroll  H/q/Esc:close",
        Style::default().fg(Color::DarkGray),
    )));
    lines
}

/// Largest useful scroll offset for a popup of `height` rows.
pub fn max_scroll(height: u16) -> u16 {
    help_lines().len().saturating_sub(height.saturating_sub(2) as usize) as u16
}

pub struct HelpOverlay {
    pub scroll: u16,
}

impl Widget for HelpOverlay {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let popup_width: u16 = 56;
        let popup_height: u16 = area.height.min(30);
        let popup = centered_rect(popup_width, popup_height, area);

        Clear.render(popup, buf);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Keyboard Shortcuts ")
            .title_style(
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            );

        let scroll = self.scroll.min(max_scroll(popup.height));
        Paragraph::new(help_lines())
            .block(block)
            .scroll((scroll, 0))
            .render(popup, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_text(buf: &Buffer) -> String {
        buf.content().iter().map(|c| c.symbol()).collect()
    }

    #[test]
    fn overlay_lists_bindings() {
        let area = Rect::new(0, 0, 80, 40);
        let mut buf = Buffer::empty(area);
        HelpOverlay { scroll: 0 }.render(area, &mut buf);
        let text = buffer_text(&buf);
        assert!(text.contains("Keyboard Shortcuts"));
        assert!(text.contains("Expand or collapse"));
    }

    #[test]
    fn scroll_is_clamped() {
        let area = Rect::new(0, 0, 80, 12);
        let mut buf = Buffer::empty(area);
        HelpOverlay { scroll: u16::MAX }.render(area, &mut buf);
        let text = buffer_text(&buf);
        assert!(text.contains("H/q/Esc:close"));
    }
}
