use std::path::{Path, PathBuf};
use std::sync::Arc;

use aion_core::{
    ChatController, Config, EncodedImage, GeminiChatClient, GeminiImageClient, Mode, SessionStore,
    StreamEvent, VisionController,
};
use ratatui::widgets::ListState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// Which text field of the Vision view receives typing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisionField {
    Prompt,
    ReferencePath,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub mode: Mode,
    pub input_mode: InputMode,

    // Chat view
    pub chat: ChatController,
    pub chat_cursor: usize, // cursor position in the chat input, in chars
    pub session_state: ListState,
    pub transcript_scroll: u16,
    pub transcript_height: u16, // Height of transcript area for scroll calculations
    pub transcript_width: u16,  // Width of transcript area for wrap calculations

    // Vision view
    pub vision: VisionController,
    pub vision_field: VisionField,
    pub prompt_cursor: usize,
    pub reference_path: String,
    pub reference_cursor: usize,
    pub download_dir: PathBuf,

    // Footer notice (load/save results)
    pub status_message: Option<String>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    pub chat_model: String,
    pub image_model: String,
}

impl App {
    pub fn new(config: &Config) -> Self {
        let store = SessionStore::open_default();
        let chat_client = GeminiChatClient::from_config(config);
        let image_client = GeminiImageClient::from_config(config);

        if config.resolve_api_key().is_none() {
            tracing::warn!("No API key configured; requests will fail until GEMINI_API_KEY is set");
        }

        let chat_model = chat_client.model().to_string();
        let image_model = image_client.model().to_string();
        let chat = ChatController::new(store, Arc::new(chat_client));
        let vision = VisionController::new(Arc::new(image_client));

        Self::with_controllers(config, chat, vision, chat_model, image_model)
    }

    pub fn with_controllers(
        config: &Config,
        chat: ChatController,
        vision: VisionController,
        chat_model: String,
        image_model: String,
    ) -> Self {
        let mut session_state = ListState::default();
        if !chat.sessions().is_empty() {
            session_state.select(Some(0));
        }

        Self {
            should_quit: false,
            mode: config.default_mode(),
            input_mode: InputMode::Normal,

            chat,
            chat_cursor: 0,
            session_state,
            transcript_scroll: 0,
            transcript_height: 0,
            transcript_width: 0,

            vision,
            vision_field: VisionField::Prompt,
            prompt_cursor: 0,
            reference_path: String::new(),
            reference_cursor: 0,
            download_dir: config.download_dir(),

            status_message: None,
            animation_frame: 0,

            chat_model,
            image_model,
        }
    }

    pub fn toggle_mode(&mut self) {
        self.mode = self.mode.toggle();
        tracing::debug!("Switched to {} view", self.mode.as_str());
        self.input_mode = InputMode::Normal;
        self.status_message = None;
    }

    // Session sidebar
    pub fn session_nav_down(&mut self) {
        let len = self.chat.sessions().len();
        if len > 0 {
            let i = self.session_state.selected().unwrap_or(0);
            self.session_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn session_nav_up(&mut self) {
        let i = self.session_state.selected().unwrap_or(0);
        self.session_state.select(Some(i.saturating_sub(1)));
    }

    fn highlighted_session_id(&self) -> Option<String> {
        self.session_state
            .selected()
            .and_then(|i| self.chat.sessions().get(i))
            .map(|s| s.id.clone())
    }

    pub fn open_highlighted_session(&mut self) {
        if let Some(id) = self.highlighted_session_id() {
            self.chat.select_session(&id);
            self.scroll_transcript_to_bottom();
        }
    }

    pub fn delete_highlighted_session(&mut self) {
        if let Some(id) = self.highlighted_session_id() {
            self.chat.delete_session(&id);
            let len = self.chat.sessions().len();
            if len == 0 {
                self.session_state.select(None);
            } else {
                let i = self.session_state.selected().unwrap_or(0);
                self.session_state.select(Some(i.min(len - 1)));
            }
        }
    }

    pub fn new_session(&mut self) {
        self.chat.create_session();
        self.session_state.select(Some(0));
        self.transcript_scroll = 0;
        self.input_mode = InputMode::Editing;
    }

    /// Fill the chat input with suggestion `index` (shown only on an empty transcript)
    pub fn use_suggestion(&mut self, index: usize) {
        if self.chat.messages().is_empty() && self.chat.use_suggestion(index) {
            self.chat_cursor = self.chat.input().chars().count();
            self.input_mode = InputMode::Editing;
        }
    }

    pub fn submit_chat(&mut self) {
        if !self.chat.submit() {
            return;
        }
        self.chat_cursor = 0;
        self.input_mode = InputMode::Normal;

        // The submitted session may have been created just now
        let active = self.chat.active_id().map(str::to_string);
        let index = self
            .chat
            .sessions()
            .iter()
            .position(|s| Some(&s.id) == active.as_ref());
        self.session_state.select(index);

        // Scroll to bottom so "Thinking..." is visible
        self.scroll_transcript_to_bottom();
    }

    pub fn on_stream_event(&mut self, event: StreamEvent) {
        let visible = self.chat.streaming_session_id() == self.chat.active_id();
        self.chat.apply_stream_event(event);
        if visible {
            self.scroll_transcript_to_bottom();
        }
    }

    // Vision view
    /// Load the reference typed into the path field: a file path or a pasted data URL
    pub fn load_reference(&mut self) {
        let raw = self.reference_path.trim();
        if raw.is_empty() {
            return;
        }

        let (label, loaded) = if raw.starts_with("data:") {
            let label = "pasted image".to_string();
            let loaded = EncodedImage::from_data_url(raw).map(|image| self.vision.select_reference(image));
            (label, loaded)
        } else {
            let path = expand_home(raw);
            let loaded = self.vision.load_reference(&path);
            (path.display().to_string(), loaded)
        };

        self.status_message = Some(match loaded {
            Ok(true) => {
                self.reference_path.clear();
                self.reference_cursor = 0;
                self.vision_field = VisionField::Prompt;
                format!("Loaded reference {}", label)
            }
            Ok(false) => "Busy: wait for the current image to finish".to_string(),
            Err(e) => {
                tracing::warn!("Could not load reference {}: {}", label, e);
                format!("Could not load {}: {}", label, e)
            }
        });
    }

    pub fn start_generation(&mut self) {
        if self.vision.handle_process() {
            self.status_message = None;
            self.input_mode = InputMode::Normal;
        }
    }

    pub fn save_generated(&mut self) {
        if self.vision.canvas().generated_image.is_none() {
            return;
        }
        self.status_message = Some(match self.vision.save_generated(&self.download_dir) {
            Ok(path) => format!("Saved {}", path.display()),
            Err(e) => {
                tracing::warn!("Could not save generated image: {}", e);
                format!("Could not save image: {}", e)
            }
        });
    }

    pub fn clear_canvas(&mut self) {
        if self.vision.clear_canvas() {
            self.prompt_cursor = 0;
            self.status_message = None;
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.chat.is_streaming() || self.vision.is_generating() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Scroll the transcript so the newest text is visible
    pub fn scroll_transcript_to_bottom(&mut self) {
        let wrap_width = if self.transcript_width > 0 {
            self.transcript_width as usize
        } else {
            50
        };

        let mut total_lines: usize = 0;
        for msg in self.chat.messages() {
            let mut lines = 2; // Role line and blank line after message
            for line in msg.content.lines() {
                lines += line.chars().count() / wrap_width + 1;
            }
            if msg.content.is_empty() {
                lines += 1; // "Thinking..." placeholder
            }
            total_lines = total_lines.saturating_add(lines);
        }

        let visible_height = if self.transcript_height > 0 {
            self.transcript_height
        } else {
            20
        };

        // Paragraph scroll offsets are u16; very long transcripts pin to the maximum
        let total_lines = u16::try_from(total_lines).unwrap_or(u16::MAX);
        self.transcript_scroll = total_lines.saturating_sub(visible_height);
    }
}

fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| Path::new(raw).to_path_buf()),
        None => PathBuf::from(raw),
    }
}
