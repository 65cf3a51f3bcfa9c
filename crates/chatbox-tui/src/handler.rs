use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use crate::app::{App, InputMode, Screen, TextInput};
use crate::tui::AppEvent;

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Api(generation, outcome) => app.apply_outcome(generation, outcome),
        AppEvent::Account(event) => app.apply_account(event),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.screen {
        Screen::Login => handle_login(app, key),
        Screen::Chat => match app.input_mode {
            InputMode::Normal => handle_chat_normal(app, key),
            InputMode::Editing => handle_chat_editing(app, key),
        },
    }
}

fn handle_login(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.should_quit = true,
        KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.login.toggle_mode();
        }
        KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => app.login.toggle_field(),
        KeyCode::Enter => app.submit_login(),
        _ => {
            let field = app.login.current_field();
            edit_text(field, key);
        }
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        // Quit
        KeyCode::Char('q') => app.should_quit = true,

        // Sidebar navigation
        KeyCode::Char('j') | KeyCode::Down => app.session_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.session_nav_up(),
        KeyCode::Enter => app.open_selected_session(),

        // Session management
        KeyCode::Char('n') => app.new_session(),
        KeyCode::Char('d') => app.delete_selected_session(),
        KeyCode::Char('r') => app.reload_sessions(),
        KeyCode::Char('L') => app.logout(),

        // Thread scrolling
        KeyCode::PageDown => app.scroll_thread_down(app.thread_height.max(1)),
        KeyCode::PageUp => app.scroll_thread_up(app.thread_height.max(1)),

        // Start typing
        KeyCode::Char('i') | KeyCode::Tab => app.input_mode = InputMode::Editing,

        _ => {}
    }
}

fn handle_chat_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => app.send_input(),
        KeyCode::PageDown => app.scroll_thread_down(app.thread_height.max(1)),
        KeyCode::PageUp => app.scroll_thread_up(app.thread_height.max(1)),
        _ => edit_text(&mut app.input, key),
    }
}

/// Applies a cursor or editing key to a text field
fn edit_text(input: &mut TextInput, key: KeyEvent) {
    match key.code {
        KeyCode::Char('a') if key.modifiers.contains(KeyModifiers::CONTROL) => input.home(),
        KeyCode::Char('e') if key.modifiers.contains(KeyModifiers::CONTROL) => input.end(),
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => input.clear(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => input.insert(c),
        KeyCode::Backspace => input.backspace(),
        KeyCode::Delete => input.delete(),
        KeyCode::Left => input.left(),
        KeyCode::Right => input.right(),
        KeyCode::Home => input.home(),
        KeyCode::End => input.end(),
        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    if app.screen != Screen::Chat {
        return;
    }

    let x = mouse.column;
    let y = mouse.row;

    // Position-based scrolling
    let in_sessions = app.sessions_area.is_some_and(|r| point_in_rect(x, y, r));
    let in_thread = app.thread_area.is_some_and(|r| point_in_rect(x, y, r));

    match mouse.kind {
        MouseEventKind::ScrollDown => {
            if in_sessions {
                app.session_nav_down();
            } else if in_thread {
                app.scroll_thread_down(3);
            }
        }
        MouseEventKind::ScrollUp => {
            if in_sessions {
                app.session_nav_up();
            } else if in_thread {
                app.scroll_thread_up(3);
            }
        }
        _ => {}
    }
}
