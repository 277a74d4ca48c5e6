use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use tokio::sync::mpsc::UnboundedSender;
use crate::app::{App, InputMode};
use crate::markdown;
use crate::tui::AppEvent;

/// Single dispatch point for everything the run loop receives: terminal
/// input, ticks, and the outcomes of spawned backend requests.
pub fn handle_event(
    app: &mut App,
    event: AppEvent,
    events: &UnboundedSender<AppEvent>,
) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key, events),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Paste(text) => handle_paste(app, &text),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::SessionReady {
            generation,
            outcome,
        } => app.apply_session(generation, outcome),
        AppEvent::ReplyReady {
            generation,
            outcome,
        } => app.apply_reply(generation, outcome),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent, events: &UnboundedSender<AppEvent>) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }
    if key.code == KeyCode::Char('n') && key.modifiers.contains(KeyModifiers::CONTROL) {
        start_new_chat(app, events);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key, events),
        InputMode::Editing => handle_editing_mode(app, key, events),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent, events: &UnboundedSender<AppEvent>) {
    match key.code {
        // Quit
        KeyCode::Char('q') => app.should_quit = true,

        // Back to writing
        KeyCode::Char('i') | KeyCode::Enter => {
            app.input_mode = InputMode::Editing;
            app.move_cursor_end();
        }

        // Transcript scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_down();
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_up();
        }
        KeyCode::PageDown => app.scroll_half_page_down(),
        KeyCode::PageUp => app.scroll_half_page_up(),
        KeyCode::Char('g') => app.scroll_to_top(),
        KeyCode::Char('G') => app.scroll_to_bottom(),

        // New chat
        KeyCode::Char('n') => start_new_chat(app, events),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent, events: &UnboundedSender<AppEvent>) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            // Alt+Enter (Shift+Enter where terminals report it) breaks the
            // line; plain Enter submits.
            if key.modifiers.contains(KeyModifiers::ALT)
                || key.modifiers.contains(KeyModifiers::SHIFT)
            {
                app.insert_newline();
            } else {
                submit_message(app, events);
            }
        }
        KeyCode::Backspace => app.delete_back(),
        KeyCode::Delete => app.delete_forward(),
        KeyCode::Left => app.move_cursor_left(),
        KeyCode::Right => app.move_cursor_right(),
        KeyCode::Home => app.move_cursor_home(),
        KeyCode::End => app.move_cursor_end(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.insert_char(c);
        }
        _ => {}
    }
}

fn handle_paste(app: &mut App, text: &str) {
    // Pasted newlines land in the buffer without submitting. Control bytes
    // are stripped the same way reply text is.
    let clean = markdown::sanitize(text);
    app.insert_str(&clean);
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollDown => {
            app.scroll_down();
            app.scroll_down();
            app.scroll_down();
        }
        MouseEventKind::ScrollUp => {
            app.scroll_up();
            app.scroll_up();
            app.scroll_up();
        }
        _ => {}
    }
}

/// Send the input buffer to the backend. The spawned task always reports
/// back with a `ReplyReady`, success or not, so the busy flag cannot stick.
fn submit_message(app: &mut App, events: &UnboundedSender<AppEvent>) {
    let Some(text) = app.take_submission() else {
        return;
    };
    tracing::debug!(chars = text.chars().count(), "sending message");

    let api = app.api.clone();
    let session_id = app.session_id.clone();
    let generation = app.generation;
    let events = events.clone();
    tokio::spawn(async move {
        let outcome = api.chat(&text, session_id.as_deref()).await;
        let _ = events.send(AppEvent::ReplyReady {
            generation,
            outcome,
        });
    });
}

/// Ask the backend for a session token, reporting back as `SessionReady`.
/// Also used at startup.
pub fn start_session(app: &App, events: &UnboundedSender<AppEvent>) {
    let api = app.api.clone();
    let generation = app.generation;
    let events = events.clone();
    tokio::spawn(async move {
        let outcome = api.new_session().await;
        let _ = events.send(AppEvent::SessionReady {
            generation,
            outcome,
        });
    });
}

/// Wipe the transcript and start a fresh session. The old server-side
/// history is cleared best-effort; the old token stays in use until the
/// new one arrives.
pub fn start_new_chat(app: &mut App, events: &UnboundedSender<AppEvent>) {
    tracing::info!("starting a new chat");
    app.reset_conversation();

    if let Some(token) = app.session_id.clone() {
        let api = app.api.clone();
        tokio::spawn(async move {
            if let Err(err) = api.clear_session(&token).await {
                tracing::warn!("failed to clear previous session: {err}");
            }
        });
    }

    start_session(app, events);
}
