use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, PartialEq)]
pub enum InputMode {
    Normal,
    /// Typing a local filter; the list narrows on every keystroke.
    Filter,
    /// Typing a provider search query.
    Search,
    LabelPicker,
    Help,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    // Navigation
    MoveDown,
    MoveUp,
    JumpTop,
    JumpBottom,
    ScrollPreviewDown,
    ScrollPreviewUp,
    HalfPageDown,
    HalfPageUp,
    LoadMore,

    // Threads
    ToggleThread,
    ExpandThread,
    CollapseThread,
    ToggleThreaded,

    // Triage
    Archive,
    Trash,
    MoveToLabel,
    ApplyLabel,
    RemoveLabel,
    Undo,

    // Label switching (g-prefix sequences)
    GoInbox,
    GoStarred,
    GoSent,
    GoTrash,
    GoLabelPicker,

    // Filter & search
    EnterFilter,
    EnterSearch,
    ClearView,

    // Multi-select
    ToggleSelect,
    SelectDown,
    SelectUp,

    Reload,
    ShowHelp,

    // Text input (shared across input modes)
    InputChar(char),
    InputBackspace,
    InputSubmit,
    InputCancel,

    // System
    Quit,
    Noop,
}

/// Tracks multi-key sequences (e.g., g then g for JumpTop, g then i for GoInbox).
#[derive(Debug, Default)]
pub struct KeyMapper {
    pending: Option<KeyCode>,
}

impl KeyMapper {
    pub fn new() -> Self {
        Self { pending: None }
    }

    /// Process a key event and return an action, considering current input mode.
    pub fn handle(&mut self, key: KeyEvent, mode: &InputMode) -> Action {
        match mode {
            InputMode::Normal => self.handle_normal(key),
            InputMode::Filter | InputMode::Search | InputMode::LabelPicker => {
                self.handle_input(key)
            }
            InputMode::Help => self.handle_help(key),
        }
    }

    fn handle_normal(&mut self, key: KeyEvent) -> Action {
        if let Some(first) = self.pending.take() {
            return self.handle_sequence(first, key);
        }

        match (key.code, key.modifiers) {
            // Navigation
            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, _) => Action::MoveDown,
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, _) => Action::MoveUp,
            (KeyCode::Char('g'), KeyModifiers::NONE) => {
                self.pending = Some(KeyCode::Char('g'));
                Action::Noop
            }
            (KeyCode::Char('G'), KeyModifiers::SHIFT) | (KeyCode::End, _) => Action::JumpBottom,
            (KeyCode::Home, _) => Action::JumpTop,
            (KeyCode::Char(' '), KeyModifiers::NONE) => Action::ScrollPreviewDown,
            (KeyCode::Char(' '), KeyModifiers::SHIFT) => Action::ScrollPreviewUp,
            (KeyCode::Char('d'), KeyModifiers::CONTROL) => Action::HalfPageDown,
            (KeyCode::Char('u'), KeyModifiers::CONTROL) => Action::HalfPageUp,
            (KeyCode::Char('n'), KeyModifiers::NONE) => Action::LoadMore,

            // Threads
            (KeyCode::Enter, _) | (KeyCode::Char('o'), KeyModifiers::NONE) => Action::ToggleThread,
            (KeyCode::Right, _) => Action::ExpandThread,
            (KeyCode::Left, _) => Action::CollapseThread,
            (KeyCode::Char('t'), KeyModifiers::NONE) => Action::ToggleThreaded,

            // Triage
            (KeyCode::Char('e'), KeyModifiers::NONE) => Action::Archive,
            (KeyCode::Char('#'), _) => Action::Trash,
            (KeyCode::Char('m'), KeyModifiers::NONE) => Action::MoveToLabel,
            (KeyCode::Char('l'), KeyModifiers::NONE) => Action::ApplyLabel,
            (KeyCode::Char('L'), KeyModifiers::SHIFT) => Action::RemoveLabel,
            (KeyCode::Char('z'), KeyModifiers::NONE) => Action::Undo,

            // Multi-select
            (KeyCode::Char('x'), KeyModifiers::NONE) => Action::ToggleSelect,
            (KeyCode::Char('J'), KeyModifiers::SHIFT) => Action::SelectDown,
            (KeyCode::Char('K'), KeyModifiers::SHIFT) => Action::SelectUp,

            // Filter & search
            (KeyCode::Char('/'), _) => Action::EnterFilter,
            (KeyCode::Char('?'), _) => Action::EnterSearch,
            (KeyCode::Esc, _) => Action::ClearView,

            (KeyCode::Char('r'), KeyModifiers::CONTROL) => Action::Reload,
            (KeyCode::Char('H'), KeyModifiers::SHIFT) | (KeyCode::F(1), _) => Action::ShowHelp,

            // Quit
            (KeyCode::Char('q'), KeyModifiers::NONE) => Action::Quit,
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Action::Quit,

            _ => Action::Noop,
        }
    }

    fn handle_sequence(&mut self, first: KeyCode, key: KeyEvent) -> Action {
        match (first, key.code) {
            (KeyCode::Char('g'), KeyCode::Char('g')) => Action::JumpTop,
            (KeyCode::Char('g'), KeyCode::Char('i')) => Action::GoInbox,
            (KeyCode::Char('g'), KeyCode::Char('s')) => Action::GoStarred,
            (KeyCode::Char('g'), KeyCode::Char('t')) => Action::GoSent,
            (KeyCode::Char('g'), KeyCode::Char('#')) => Action::GoTrash,
            (KeyCode::Char('g'), KeyCode::Char('l')) => Action::GoLabelPicker,
            _ => Action::Noop,
        }
    }

    fn handle_input(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Esc => Action::InputCancel,
            KeyCode::Enter => Action::InputSubmit,
            KeyCode::Backspace => Action::InputBackspace,
            // Picker navigation
            KeyCode::Down => Action::MoveDown,
            KeyCode::Up => Action::MoveUp,
            KeyCode::Char(c) => {
                // Allow Ctrl+C to quit even in input mode
                if c == 'c' && key.modifiers.contains(KeyModifiers::CONTROL) {
                    return Action::Quit;
                }
                Action::InputChar(c)
            }
            _ => Action::Noop,
        }
    }

    fn handle_help(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => Action::MoveDown,
            KeyCode::Char('k') | KeyCode::Up => Action::MoveUp,
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('H') | KeyCode::F(1) => {
                Action::InputCancel
            }
            _ => Action::Noop,
        }
    }

    /// Cancel any pending sequence (e.g., on timeout).
    pub fn cancel_pending(&mut self) {
        self.pending = None;
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_display(&self) -> Option<&str> {
        match self.pending {
            Some(KeyCode::Char('g')) => Some("g"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn shifted(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::SHIFT)
    }

    #[test]
    fn g_prefix_sequences() {
        let mut km = KeyMapper::new();
        assert_eq!(km.handle(key(KeyCode::Char('g')), &InputMode::Normal), Action::Noop);
        assert!(km.has_pending());
        assert_eq!(km.pending_display(), Some("g"));
        assert_eq!(
            km.handle(key(KeyCode::Char('l')), &InputMode::Normal),
            Action::GoLabelPicker
        );
        assert!(!km.has_pending());

        km.handle(key(KeyCode::Char('g')), &InputMode::Normal);
        assert_eq!(km.handle(key(KeyCode::Char('g')), &InputMode::Normal), Action::JumpTop);
    }

    #[test]
    fn unknown_sequence_is_swallowed() {
        let mut km = KeyMapper::new();
        km.handle(key(KeyCode::Char('g')), &InputMode::Normal);
        assert_eq!(km.handle(key(KeyCode::Char('j')), &InputMode::Normal), Action::Noop);
        assert_eq!(km.handle(key(KeyCode::Char('j')), &InputMode::Normal), Action::MoveDown);
    }

    #[test]
    fn cancel_pending_clears_sequence() {
        let mut km = KeyMapper::new();
        km.handle(key(KeyCode::Char('g')), &InputMode::Normal);
        km.cancel_pending();
        assert_eq!(km.pending_display(), None);
        assert_eq!(km.handle(key(KeyCode::Char('i')), &InputMode::Normal), Action::Noop);
    }

    #[test]
    fn normal_mode_bindings() {
        let mut km = KeyMapper::new();
        let n = InputMode::Normal;
        assert_eq!(km.handle(key(KeyCode::Enter), &n), Action::ToggleThread);
        assert_eq!(km.handle(key(KeyCode::Right), &n), Action::ExpandThread);
        assert_eq!(km.handle(key(KeyCode::Char('e')), &n), Action::Archive);
        assert_eq!(km.handle(shifted('#'), &n), Action::Trash);
        assert_eq!(km.handle(shifted('L'), &n), Action::RemoveLabel);
        assert_eq!(km.handle(shifted('J'), &n), Action::SelectDown);
        assert_eq!(km.handle(key(KeyCode::Char('/')), &n), Action::EnterFilter);
        assert_eq!(km.handle(shifted('?'), &n), Action::EnterSearch);
        assert_eq!(km.handle(key(KeyCode::Esc), &n), Action::ClearView);
        assert_eq!(
            km.handle(KeyEvent::new(KeyCode::Char('r'), KeyModifiers::CONTROL), &n),
            Action::Reload
        );
    }

    #[test]
    fn input_modes_take_text() {
        let mut km = KeyMapper::new();
        for mode in [InputMode::Filter, InputMode::Search, InputMode::LabelPicker] {
            assert_eq!(km.handle(key(KeyCode::Char('j')), &mode), Action::InputChar('j'));
            assert_eq!(km.handle(key(KeyCode::Esc), &mode), Action::InputCancel);
            assert_eq!(km.handle(key(KeyCode::Enter), &mode), Action::InputSubmit);
            assert_eq!(km.handle(key(KeyCode::Down), &mode), Action::MoveDown);
        }
        assert_eq!(
            km.handle(
                KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL),
                &InputMode::Filter
            ),
            Action::Quit
        );
    }

    #[test]
    fn help_mode_scrolls_and_closes() {
        let mut km = KeyMapper::new();
        assert_eq!(km.handle(key(KeyCode::Char('j')), &InputMode::Help), Action::MoveDown);
        assert_eq!(km.handle(key(KeyCode::Char('q')), &InputMode::Help), Action::InputCancel);
        assert_eq!(km.handle(key(KeyCode::Char('e')), &InputMode::Help), Action::Noop);
    }
}
