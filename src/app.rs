use crate::api::{ApiClient, ApiError};

/// Reply shown when a request fails. The transcript always answers, even
/// when the backend does not.
pub const APOLOGY: &str =
    "Sorry, something went wrong while answering. Please try sending your message again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Conversation state
    pub session_id: Option<String>,
    pub generation: u64, // bumped on every new chat; stale task results are dropped
    pub messages: Vec<ChatMessage>,
    pub waiting: bool,

    // Input buffer
    pub input: String,
    pub input_cursor: usize, // cursor position in input, in chars

    // Transcript viewport (height/lines are measured during render)
    pub transcript_scroll: u16,
    pub transcript_height: u16,
    pub transcript_lines: u16,
    pub follow_transcript: bool,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Backend
    pub api: ApiClient,
}

impl App {
    pub fn new(api: ApiClient) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,

            session_id: None,
            generation: 0,
            messages: Vec::new(),
            waiting: false,

            input: String::new(),
            input_cursor: 0,

            transcript_scroll: 0,
            transcript_height: 0,
            transcript_lines: 0,
            follow_transcript: true,

            animation_frame: 0,

            api,
        }
    }

    /// Take the input buffer as an outgoing message. Returns `None` when the
    /// trimmed input is empty or a reply is still outstanding; otherwise the
    /// user turn is recorded, the buffer cleared, and the busy flag set.
    pub fn take_submission(&mut self) -> Option<String> {
        if self.waiting {
            return None;
        }
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return None;
        }

        self.input.clear();
        self.input_cursor = 0;
        self.messages.push(ChatMessage {
            role: ChatRole::User,
            content: text.clone(),
        });
        self.waiting = true;
        self.follow_transcript = true;
        Some(text)
    }

    /// Record the outcome of a chat request. Outcomes from before the last
    /// new-chat reset are dropped.
    pub fn apply_reply(&mut self, generation: u64, outcome: Result<String, ApiError>) {
        if generation != self.generation {
            tracing::debug!(generation, current = self.generation, "dropping stale reply");
            return;
        }

        self.waiting = false;
        self.animation_frame = 0;
        let content = match outcome {
            Ok(reply) => reply,
            Err(err) => {
                tracing::error!("chat request failed: {err}");
                APOLOGY.to_string()
            }
        };
        self.messages.push(ChatMessage {
            role: ChatRole::Assistant,
            content,
        });
        self.follow_transcript = true;
    }

    /// Record the outcome of a session request. On failure the previous
    /// token (if any) stays in place.
    pub fn apply_session(&mut self, generation: u64, outcome: Result<String, ApiError>) {
        if generation != self.generation {
            tracing::debug!(generation, current = self.generation, "dropping stale session");
            return;
        }

        match outcome {
            Ok(token) => {
                tracing::info!(session = %token, "session ready");
                self.session_id = Some(token);
            }
            Err(err) => {
                tracing::warn!("failed to start session, keeping previous token: {err}");
            }
        }
    }

    /// Start over: empty transcript, no outstanding reply. The old session
    /// token stays until a new one arrives, and the generation bump makes
    /// any in-flight reply stale.
    pub fn reset_conversation(&mut self) {
        self.generation += 1;
        self.messages.clear();
        self.waiting = false;
        self.animation_frame = 0;
        self.transcript_scroll = 0;
        self.transcript_lines = 0;
        self.follow_transcript = true;
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.waiting {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Transcript scrolling. Manual movement unpins the view from the
    // bottom; render re-pins it whenever follow_transcript is set.
    pub fn scroll_down(&mut self) {
        self.follow_transcript = false;
        if self.transcript_scroll < self.max_scroll() {
            self.transcript_scroll = self.transcript_scroll.saturating_add(1);
        }
    }

    pub fn scroll_up(&mut self) {
        self.follow_transcript = false;
        self.transcript_scroll = self.transcript_scroll.saturating_sub(1);
    }

    pub fn scroll_half_page_down(&mut self) {
        self.follow_transcript = false;
        let half_page = self.transcript_height / 2;
        self.transcript_scroll = (self.transcript_scroll + half_page).min(self.max_scroll());
    }

    pub fn scroll_half_page_up(&mut self) {
        self.follow_transcript = false;
        let half_page = self.transcript_height / 2;
        self.transcript_scroll = self.transcript_scroll.saturating_sub(half_page);
    }

    pub fn scroll_to_top(&mut self) {
        self.follow_transcript = false;
        self.transcript_scroll = 0;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.follow_transcript = true;
        self.transcript_scroll = self.max_scroll();
    }

    fn max_scroll(&self) -> u16 {
        self.transcript_lines.saturating_sub(self.transcript_height)
    }

    // Input editing. The cursor is tracked in chars; edits convert to a
    // byte index for proper UTF-8 handling.
    pub fn insert_char(&mut self, c: char) {
        let byte_index = char_to_byte_index(&self.input, self.input_cursor);
        self.input.insert(byte_index, c);
        self.input_cursor += 1;
    }

    pub fn insert_newline(&mut self) {
        self.insert_char('\n');
    }

    pub fn insert_str(&mut self, text: &str) {
        let byte_index = char_to_byte_index(&self.input, self.input_cursor);
        self.input.insert_str(byte_index, text);
        self.input_cursor += text.chars().count();
    }

    pub fn delete_back(&mut self) {
        if self.input_cursor > 0 {
            let byte_index = char_to_byte_index(&self.input, self.input_cursor - 1);
            self.input.remove(byte_index);
            self.input_cursor -= 1;
        }
    }

    pub fn delete_forward(&mut self) {
        if self.input_cursor < self.input.chars().count() {
            let byte_index = char_to_byte_index(&self.input, self.input_cursor);
            self.input.remove(byte_index);
        }
    }

    pub fn move_cursor_left(&mut self) {
        self.input_cursor = self.input_cursor.saturating_sub(1);
    }

    pub fn move_cursor_right(&mut self) {
        if self.input_cursor < self.input.chars().count() {
            self.input_cursor += 1;
        }
    }

    pub fn move_cursor_home(&mut self) {
        self.input_cursor = 0;
    }

    pub fn move_cursor_end(&mut self) {
        self.input_cursor = self.input.chars().count();
    }
}

/// Convert a character index to a byte index in a string
pub fn char_to_byte_index(s: &str, char_index: usize) -> usize {
    s.char_indices()
        .nth(char_index)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    fn test_app() -> App {
        App::new(ApiClient::new("http://127.0.0.1:1"))
    }

    fn server_error() -> ApiError {
        ApiError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_blank_input_is_not_submitted() {
        let mut app = test_app();
        app.input = "   \n  ".to_string();

        assert!(app.take_submission().is_none());
        assert!(app.messages.is_empty());
        assert!(!app.waiting);
    }

    #[test]
    fn test_submission_trims_and_records_user_turn() {
        let mut app = test_app();
        app.input = "  what does GRIN2B do?  ".to_string();
        app.input_cursor = app.input.chars().count();

        let text = app.take_submission().unwrap();
        assert_eq!(text, "what does GRIN2B do?");
        assert_eq!(app.messages.len(), 1);
        assert_eq!(app.messages[0].role, ChatRole::User);
        assert_eq!(app.messages[0].content, "what does GRIN2B do?");
        assert!(app.input.is_empty());
        assert_eq!(app.input_cursor, 0);
        assert!(app.waiting);
    }

    #[test]
    fn test_no_second_submission_while_waiting() {
        let mut app = test_app();
        app.input = "first".to_string();
        app.take_submission().unwrap();

        app.input = "second".to_string();
        assert!(app.take_submission().is_none());
        assert_eq!(app.input, "second");
        assert_eq!(app.messages.len(), 1);
    }

    #[test]
    fn test_reply_clears_waiting_and_appends_assistant_turn() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.take_submission().unwrap();

        app.apply_reply(app.generation, Ok("hello!".to_string()));
        assert!(!app.waiting);
        assert_eq!(app.messages.len(), 2);
        assert_eq!(app.messages[1].role, ChatRole::Assistant);
        assert_eq!(app.messages[1].content, "hello!");
    }

    #[test]
    fn test_failed_reply_appends_apology() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.take_submission().unwrap();

        app.apply_reply(app.generation, Err(server_error()));
        assert!(!app.waiting);
        assert_eq!(app.messages[1].content, APOLOGY);

        // The next submission goes through.
        app.input = "again".to_string();
        assert!(app.take_submission().is_some());
    }

    #[test]
    fn test_stale_reply_is_discarded() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.take_submission().unwrap();
        let old_generation = app.generation;

        app.reset_conversation();
        app.apply_reply(old_generation, Ok("late answer".to_string()));

        assert!(app.messages.is_empty());
        assert!(!app.waiting);
    }

    #[test]
    fn test_reset_clears_transcript_and_busy_flag() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.take_submission().unwrap();
        app.apply_reply(app.generation, Ok("hello".to_string()));
        let generation = app.generation;

        app.reset_conversation();
        assert!(app.messages.is_empty());
        assert!(!app.waiting);
        assert_eq!(app.generation, generation + 1);
    }

    #[test]
    fn test_session_token_is_applied() {
        let mut app = test_app();
        app.apply_session(app.generation, Ok("tok-1".to_string()));
        assert_eq!(app.session_id.as_deref(), Some("tok-1"));
    }

    #[test]
    fn test_session_failure_keeps_previous_token() {
        let mut app = test_app();
        app.session_id = Some("tok-1".to_string());
        app.apply_session(app.generation, Err(server_error()));
        assert_eq!(app.session_id.as_deref(), Some("tok-1"));
    }

    #[test]
    fn test_stale_session_token_is_discarded() {
        let mut app = test_app();
        let old_generation = app.generation;
        app.reset_conversation();

        app.apply_session(old_generation, Ok("tok-old".to_string()));
        assert!(app.session_id.is_none());
    }

    #[test]
    fn test_insert_and_delete_handle_multibyte_chars() {
        let mut app = test_app();
        app.insert_char('é');
        app.insert_char('b');
        assert_eq!(app.input, "éb");
        assert_eq!(app.input_cursor, 2);

        app.move_cursor_left();
        app.delete_back();
        assert_eq!(app.input, "b");
        assert_eq!(app.input_cursor, 0);
    }

    #[test]
    fn test_insert_str_moves_cursor_by_chars() {
        let mut app = test_app();
        app.insert_str("héllo");
        assert_eq!(app.input_cursor, 5);

        app.move_cursor_home();
        app.insert_str("a\nb");
        assert_eq!(app.input, "a\nbhéllo");
        assert_eq!(app.input_cursor, 3);
    }

    #[test]
    fn test_cursor_motion_clamps_to_bounds() {
        let mut app = test_app();
        app.move_cursor_left();
        assert_eq!(app.input_cursor, 0);

        app.insert_str("ab");
        app.move_cursor_right();
        assert_eq!(app.input_cursor, 2);

        app.move_cursor_end();
        app.delete_forward();
        assert_eq!(app.input, "ab");
    }

    #[test]
    fn test_animation_only_advances_while_waiting() {
        let mut app = test_app();
        app.tick_animation();
        assert_eq!(app.animation_frame, 0);

        app.input = "hi".to_string();
        app.take_submission().unwrap();
        app.tick_animation();
        app.tick_animation();
        assert_eq!(app.animation_frame, 2);
        app.tick_animation();
        assert_eq!(app.animation_frame, 0);
    }

    #[test]
    fn test_manual_scroll_unpins_follow() {
        let mut app = test_app();
        app.transcript_lines = 40;
        app.transcript_height = 10;
        app.transcript_scroll = 30;

        app.scroll_up();
        assert!(!app.follow_transcript);
        assert_eq!(app.transcript_scroll, 29);

        app.scroll_to_bottom();
        assert!(app.follow_transcript);
        assert_eq!(app.transcript_scroll, 30);
    }

    #[test]
    fn test_scroll_down_stops_at_end() {
        let mut app = test_app();
        app.transcript_lines = 12;
        app.transcript_height = 10;
        app.transcript_scroll = 2;

        app.scroll_down();
        assert_eq!(app.transcript_scroll, 2);
    }
}
