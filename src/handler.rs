use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use roleplay_core::input::{InputController, TextInput};
use crate::app::{App, InputMode, LoginField, Screen, ADMIN_FIELDS};
use crate::tui::AppEvent;

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize => {}
        AppEvent::Tick => {
            app.tick_animation();
        }
        AppEvent::Session(id, event) => app.on_session_event(id, event),
        AppEvent::Recognition(id, event) => app.on_recognition(id, event),
        AppEvent::Backend(result) => app.on_backend(result),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // A notice blocks everything until dismissed
    if app.notice.is_some() {
        if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
            app.notice = None;
        }
        return;
    }

    match app.screen {
        Screen::Login => handle_login(app, key),
        Screen::Dashboard => handle_dashboard(app, key),
        Screen::Simulation => match app.input_mode {
            InputMode::Normal => handle_simulation_normal(app, key),
            InputMode::Editing => handle_simulation_editing(app, key),
        },
        Screen::Admin => match app.input_mode {
            InputMode::Normal => handle_admin_normal(app, key),
            InputMode::Editing => handle_admin_editing(app, key),
        },
    }
}

/// Applies a line-editing key to `input`. Returns false if the key is not an edit.
fn edit_text(input: &mut TextInput, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Backspace => input.backspace(),
        KeyCode::Delete => input.delete(),
        KeyCode::Left => input.move_left(),
        KeyCode::Right => input.move_right(),
        KeyCode::Home => input.home(),
        KeyCode::End => input.end(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => input.insert(c),
        _ => return false,
    }
    true
}

fn handle_login(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.should_quit = true,
        KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => app.toggle_login_field(),
        KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.toggle_auth_action();
        }
        KeyCode::Enter => {
            if app.login_focus == LoginField::Username && app.password_input.is_empty() {
                app.login_focus = LoginField::Password;
            } else {
                app.submit_auth();
            }
        }
        _ => {
            edit_text(app.login_input_mut(), key);
        }
    }
}

fn handle_dashboard(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('j') | KeyCode::Down => app.scenario_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scenario_nav_up(),
        KeyCode::Enter | KeyCode::Char('l') => {
            if let Some(scenario) = app.selected_scenario().cloned() {
                app.start_simulation(scenario);
            }
        }
        KeyCode::Char('r') => app.load_scenarios(),
        KeyCode::Char('a') => app.open_admin(),
        KeyCode::Char('v') => app.cycle_voice_mode(),
        KeyCode::Char('L') => app.logout(),
        _ => {}
    }
}

fn handle_simulation_normal(app: &mut App, key: KeyEvent) {
    let Some((concluded, speech)) = app
        .simulation
        .as_ref()
        .map(|v| (v.is_concluded(), v.input.is_speech()))
    else {
        app.leave_simulation();
        return;
    };

    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => app.leave_simulation(),

        // Transcript scrolling
        KeyCode::Char('j') | KeyCode::Down => scroll_transcript(app, 1),
        KeyCode::Char('k') | KeyCode::Up => scroll_transcript(app, -1),
        KeyCode::Char('G') => {
            if let Some(view) = app.simulation.as_mut() {
                view.scroll_to_bottom();
            }
        }

        _ if concluded => {}

        KeyCode::Char('i') | KeyCode::Enter if !speech => app.input_mode = InputMode::Editing,
        KeyCode::Char(' ') | KeyCode::Char('r') => app.toggle_recording(),
        KeyCode::Char('t') => app.toggle_speech_mode(),
        KeyCode::Char('e') => app.request_end(),
        KeyCode::Char('v') => app.cycle_voice_mode(),
        _ => {}
    }
}

fn scroll_transcript(app: &mut App, lines: i16) {
    if let Some(view) = app.simulation.as_mut() {
        view.scroll = view.scroll.saturating_add_signed(lines);
    }
}

fn handle_simulation_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => app.submit_text(),
        KeyCode::Char('e') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.input_mode = InputMode::Normal;
            app.request_end();
        }
        _ => {
            if let Some(view) = app.simulation.as_mut() {
                if let InputController::Text(input) = &mut view.input {
                    edit_text(input, key);
                }
            }
        }
    }
}

fn handle_admin_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Esc => {
            app.screen = Screen::Dashboard;
        }
        KeyCode::Char('i') | KeyCode::Enter => app.input_mode = InputMode::Editing,
        KeyCode::Char('j') | KeyCode::Down => app.admin_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.admin_nav_up(),
        _ => {}
    }
}

fn handle_admin_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Tab | KeyCode::Down => app.admin_next_field(),
        KeyCode::BackTab | KeyCode::Up => app.admin_prev_field(),
        KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.submit_admin_form();
        }
        KeyCode::Enter => {
            if app.admin_focus + 1 == ADMIN_FIELDS.len() {
                app.submit_admin_form();
            } else {
                app.admin_next_field();
            }
        }
        _ => {
            edit_text(app.admin_input_mut(), key);
        }
    }
}

fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    // Determine which area the mouse is in (position-based scrolling)
    let in_list = app.list_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let in_chat = app.chat_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);

    let down = match mouse.kind {
        MouseEventKind::ScrollDown => true,
        MouseEventKind::ScrollUp => false,
        _ => return,
    };

    match app.screen {
        Screen::Dashboard if in_list => {
            if down {
                app.scenario_nav_down();
            } else {
                app.scenario_nav_up();
            }
        }
        Screen::Admin if in_list => {
            if down {
                app.admin_nav_down();
            } else {
                app.admin_nav_up();
            }
        }
        Screen::Simulation if in_chat => scroll_transcript(app, if down { 3 } else { -3 }),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roleplay_core::{ApiClient, Config};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn press(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn login_app() -> (App, mpsc::UnboundedReceiver<AppEvent>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let api = ApiClient::new("http://127.0.0.1:1", None, Duration::from_secs(1)).unwrap();
        let app = App::new(Config::new(), dir.path().join("config.json"), api, tx, None);
        (app, rx, dir)
    }

    #[tokio::test]
    async fn test_ctrl_c_quits_from_anywhere() {
        let (mut app, _rx, _dir) = login_app();
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        handle_event(&mut app, AppEvent::Key(key)).unwrap();
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn test_login_typing_and_field_switch() {
        let (mut app, _rx, _dir) = login_app();
        for c in "ana".chars() {
            handle_event(&mut app, press(KeyCode::Char(c))).unwrap();
        }
        handle_event(&mut app, press(KeyCode::Enter)).unwrap();
        assert_eq!(app.login_focus, LoginField::Password);
        handle_event(&mut app, press(KeyCode::Char('x'))).unwrap();

        assert_eq!(app.username_input.value(), "ana");
        assert_eq!(app.password_input.value(), "x");
    }

    #[tokio::test]
    async fn test_notice_swallows_keys_until_dismissed() {
        let (mut app, _rx, _dir) = login_app();
        app.notice = Some("Login failed".into());

        handle_event(&mut app, press(KeyCode::Char('a'))).unwrap();
        assert!(app.username_input.is_empty());

        handle_event(&mut app, press(KeyCode::Esc)).unwrap();
        assert!(app.notice.is_none());
        assert!(!app.should_quit);
    }

    #[test]
    fn test_point_in_rect() {
        let rect = Rect::new(2, 2, 4, 4);
        assert!(point_in_rect(2, 2, rect));
        assert!(point_in_rect(5, 5, rect));
        assert!(!point_in_rect(6, 5, rect));
    }
}
