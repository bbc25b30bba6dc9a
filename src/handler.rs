use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use aion_core::Mode;
use crate::app::{App, InputMode, VisionField};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Apply a line-editing key to `text`; returns false if the key is not an edit
fn edit_text(text: &mut String, cursor: &mut usize, key: KeyCode) -> bool {
    let char_count = text.chars().count();
    *cursor = (*cursor).min(char_count);

    match key {
        KeyCode::Backspace => {
            if *cursor > 0 {
                *cursor -= 1;
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            if *cursor < char_count {
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
        }
        KeyCode::Left => *cursor = cursor.saturating_sub(1),
        KeyCode::Right => *cursor = (*cursor + 1).min(char_count),
        KeyCode::Home => *cursor = 0,
        KeyCode::End => *cursor = char_count,
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(text, *cursor);
            text.insert(byte_pos, c);
            *cursor += 1;
        }
        _ => return false,
    }
    true
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('c') => {
                app.should_quit = true;
                return;
            }
            KeyCode::Char('t') => {
                app.toggle_mode();
                return;
            }
            _ => {}
        }
    }

    // The failure alert blocks the Vision view until dismissed
    if app.mode == Mode::Vision && app.vision.alert().is_some() {
        if matches!(key.code, KeyCode::Esc | KeyCode::Enter) {
            app.vision.dismiss_alert();
        }
        return;
    }

    match (app.mode, app.input_mode) {
        (Mode::Aion, InputMode::Normal) => handle_chat_normal(app, key),
        (Mode::Aion, InputMode::Editing) => handle_chat_editing(app, key),
        (Mode::Vision, InputMode::Normal) => handle_vision_normal(app, key),
        (Mode::Vision, InputMode::Editing) => handle_vision_editing(app, key),
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Session sidebar
        KeyCode::Char('j') | KeyCode::Down => app.session_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.session_nav_up(),
        KeyCode::Enter => app.open_highlighted_session(),
        KeyCode::Char('n') => app.new_session(),
        KeyCode::Char('d') => app.delete_highlighted_session(),

        // Transcript scroll
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.transcript_scroll = app.transcript_scroll.saturating_sub(app.transcript_height / 2);
        }
        KeyCode::PageUp => {
            app.transcript_scroll = app.transcript_scroll.saturating_sub(app.transcript_height / 2);
        }
        KeyCode::PageDown => {
            app.transcript_scroll = app.transcript_scroll.saturating_add(app.transcript_height / 2);
        }
        KeyCode::Char('G') => app.scroll_transcript_to_bottom(),

        // Prompt suggestions
        KeyCode::Char(c @ '1'..='4') => {
            let index = c as usize - '1' as usize;
            app.use_suggestion(index);
        }

        KeyCode::Char('i') | KeyCode::Char('/') => {
            app.chat_cursor = app.chat.input().chars().count();
            app.input_mode = InputMode::Editing;
        }
        _ => {}
    }
}

fn handle_chat_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => app.submit_chat(),
        code => {
            let mut cursor = app.chat_cursor;
            edit_text(app.chat.input_mut(), &mut cursor, code);
            app.chat_cursor = cursor;
        }
    }
}

fn handle_vision_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('p') | KeyCode::Char('i') => {
            app.vision_field = VisionField::Prompt;
            app.prompt_cursor = app.vision.prompt().chars().count();
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Char('r') => {
            if !app.vision.is_generating() {
                app.vision_field = VisionField::ReferencePath;
                app.reference_cursor = app.reference_path.chars().count();
                app.input_mode = InputMode::Editing;
            }
        }
        KeyCode::Char('g') | KeyCode::Enter => app.start_generation(),
        KeyCode::Char('s') => app.save_generated(),
        KeyCode::Char('c') => app.clear_canvas(),
        _ => {}
    }
}

fn handle_vision_editing(app: &mut App, key: KeyEvent) {
    match (app.vision_field, key.code) {
        (_, KeyCode::Esc) => app.input_mode = InputMode::Normal,
        (VisionField::Prompt, KeyCode::Enter) => app.start_generation(),
        (VisionField::ReferencePath, KeyCode::Enter) => {
            app.load_reference();
            app.input_mode = InputMode::Normal;
        }
        (VisionField::Prompt, code) => {
            // Prompt stays editable while a request runs; it is captured at submit
            let mut cursor = app.prompt_cursor;
            edit_text(app.vision.prompt_mut(), &mut cursor, code);
            app.prompt_cursor = cursor;
        }
        (VisionField::ReferencePath, code) => {
            edit_text(&mut app.reference_path, &mut app.reference_cursor, code);
        }
    }
}
