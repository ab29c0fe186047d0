use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Widget,
};

use crate::keymap::InputMode;

pub struct TopBar<'a> {
    /// Label name or search description.
    pub view: &'a str,
    pub threaded: bool,
    pub unread_count: usize,
    pub total_count: usize,
    /// More pages are available from the provider.
    pub has_more: bool,
    pub loading: bool,
    /// Active local filter text, if any.
    pub filter: Option<&'a str>,
}

impl<'a> Widget for TopBar<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let style = Style::default().bg(Color::DarkGray).fg(Color::White);
        buf.set_style(area, style);

        let left = format!(" {} ", self.view);
        let mode = if self.threaded { " threads " } else { " messages " };
        let mut spans = vec![
            Span::styled(
                left.as_str(),
                Style::default()
                    .bg(Color::Blue)
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(mode, style.fg(Color::Gray)),
        ];
        if let Some(filter) = self.filter {
            spans.push(Span::styled(
                format!(" filter: {} ", filter),
                Style::default().bg(Color::Yellow).fg(Color::Black),
            ));
        }
        let line = Line::from(spans);
        buf.set_line(area.x, area.y, &line, area.width);

        let more = if self.has_more { "+" } else { "" };
        let right = if self.loading {
            " loading… ".to_string()
        } else if self.unread_count > 0 {
            format!(" {}/{}{} unread ", self.unread_count, self.total_count, more)
        } else {
            format!(" {}{} rows ", self.total_count, more)
        };

        let right_len = right.chars().count() as u16;
        if area.width > right_len + line.width() as u16 {
            let rx = area.x + area.width - right_len;
            buf.set_string(rx, area.y, &right, style);
        }
    }
}

pub struct BottomBar<'a> {
    pub mode: &'a InputMode,
    pub pending_key: Option<&'a str>,
    /// Text being typed in filter or search mode.
    pub input: &'a str,
    pub status_message: Option<&'a str>,
    pub selection_count: usize,
}

impl<'a> BottomBar<'a> {
    fn hints(&self) -> &'static str {
        match self.mode {
            InputMode::Normal if self.selection_count > 0 => {
                "e:archive  #:trash  l/L:label  m:move  x:toggle  Esc:clear"
            }
            InputMode::Normal => {
                "j/k:move  o:thread  e:archive  #:trash  m:move  /:filter  ?:search  H:help  q:quit"
            }
            InputMode::Filter | InputMode::Search => "Enter:keep  Esc:cancel",
            InputMode::LabelPicker => "Up/Down:choose  Enter:pick  Esc:cancel",
            InputMode::Help => "j/k:scroll  Esc:close",
        }
    }
}

impl<'a> Widget for BottomBar<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let style = Style::default().bg(Color::DarkGray).fg(Color::White);
        buf.set_style(area, style);

        let text = match self.mode {
            InputMode::Filter => format!(" /{}", self.input),
            InputMode::Search => format!(" ?{}", self.input),
            _ => {
                if let Some(msg) = self.status_message {
                    format!(" {}", msg)
                } else if let Some(pending) = self.pending_key {
                    format!(" {}… | {}", pending, self.hints())
                } else {
                    format!(" {}", self.hints())
                }
            }
        };
        buf.set_string(area.x, area.y, &text, style);

        if matches!(self.mode, InputMode::Filter | InputMode::Search) {
            let cursor_x = area.x + text.chars().count() as u16;
            if cursor_x < area.x + area.width {
                buf.set_string(cursor_x, area.y, " ", Style::default().bg(Color::Gray));
            }
        }

        if self.selection_count > 0 {
            let right = format!(" {} selected ", self.selection_count);
            let right_len = right.len() as u16;
            if area.width > right_len + text.chars().count() as u16 {
                buf.set_string(
                    area.x + area.width - right_len,
                    area.y,
                    &right,
                    Style::default().bg(Color::Green).fg(Color::Black),
                );
            }
        }
    }
}
