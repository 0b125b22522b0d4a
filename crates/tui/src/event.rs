use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, MouseEventKind};
use ratatui::{Terminal, backend::CrosstermBackend};

use crate::ui;
use crate::App;

const SCROLL_STEP: usize = 3;

/// What a terminal event asks of the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    Up,
    Down,
    Toggle,
    StartStop,
    Restart,
    Audit,
    ToggleLog,
    ScrollUp(usize),
    ScrollDown(usize),
}

pub fn action_for(ev: &Event) -> Option<Action> {
    match ev {
        Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
            KeyCode::Up => Some(Action::Up),
            KeyCode::Down => Some(Action::Down),
            KeyCode::Char(c) => match c.to_ascii_lowercase() {
                'q' => Some(Action::Quit),
                'k' => Some(Action::Up),
                'j' => Some(Action::Down),
                ' ' => Some(Action::Toggle),
                's' => Some(Action::StartStop),
                'r' => Some(Action::Restart),
                'c' => Some(Action::Audit),
                'l' => Some(Action::ToggleLog),
                _ => None,
            },
            _ => None,
        },
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::ScrollUp => Some(Action::ScrollUp(SCROLL_STEP)),
            MouseEventKind::ScrollDown => Some(Action::ScrollDown(SCROLL_STEP)),
            _ => None,
        },
        _ => None,
    }
}

pub fn apply(app: &mut App, action: Action) {
    match action {
        Action::Quit => app.quit(),
        Action::Up => app.move_up(),
        Action::Down => app.move_down(),
        Action::Toggle => app.toggle_selected(),
        Action::StartStop => app.start_stop(),
        Action::Restart => app.restart_selected(),
        Action::Audit => {
            app.audit_selected();
        }
        Action::ToggleLog => app.toggle_log(),
        Action::ScrollUp(n) => app.scroll_log_up(n),
        Action::ScrollDown(n) => app.scroll_log_down(n),
    }
}

pub fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> anyhow::Result<()> {
    while !app.should_quit {
        app.drain_logs();
        terminal.draw(|f| ui::draw(f, app))?;

        // 100ms poll keeps the log panel live
        if event::poll(Duration::from_millis(100))? {
            if let Some(action) = action_for(&event::read()?) {
                apply(app, action);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEvent, KeyEventState, KeyModifiers, MouseEvent};

    fn key(code: KeyCode, kind: KeyEventKind) -> Event {
        Event::Key(KeyEvent { code, modifiers: KeyModifiers::NONE, kind, state: KeyEventState::NONE })
    }

    fn press(c: char) -> Event {
        key(KeyCode::Char(c), KeyEventKind::Press)
    }

    #[test]
    fn test_keys_ignore_case() {
        assert_eq!(action_for(&press('q')), Some(Action::Quit));
        assert_eq!(action_for(&press('Q')), Some(Action::Quit));
        assert_eq!(action_for(&press('C')), Some(Action::Audit));
        assert_eq!(action_for(&press(' ')), Some(Action::Toggle));
        assert_eq!(action_for(&key(KeyCode::Down, KeyEventKind::Press)), Some(Action::Down));
        assert_eq!(action_for(&press('x')), None);
    }

    #[test]
    fn test_only_presses_count() {
        assert_eq!(action_for(&key(KeyCode::Char('q'), KeyEventKind::Release)), None);
        assert_eq!(action_for(&key(KeyCode::Char('q'), KeyEventKind::Repeat)), None);
    }

    #[test]
    fn test_wheel_scrolls_log() {
        let wheel = |kind| {
            Event::Mouse(MouseEvent { kind, column: 0, row: 0, modifiers: KeyModifiers::NONE })
        };
        assert_eq!(action_for(&wheel(MouseEventKind::ScrollUp)), Some(Action::ScrollUp(SCROLL_STEP)));
        assert_eq!(action_for(&wheel(MouseEventKind::ScrollDown)), Some(Action::ScrollDown(SCROLL_STEP)));
        assert_eq!(action_for(&wheel(MouseEventKind::Moved)), None);
    }
}
