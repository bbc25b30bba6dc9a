pub mod ai;
pub mod chat;
pub mod config;
pub mod error;
pub mod image;
pub mod mode;
pub mod state;
pub mod store;
pub mod vision;

// Re-export main types for convenience
pub use ai::{
    ChatBackend, GeminiChatClient, GeminiImageClient, ImageBackend, ImageOutput, StreamEvent,
    StreamFailure,
};
pub use chat::{ChatController, ChatState};
pub use config::Config;
pub use error::{ConfigError, ImageError, ImageLoadError};
pub use image::EncodedImage;
pub use mode::Mode;
pub use state::{ChatSession, Message, Role};
pub use store::SessionStore;
pub use vision::{Canvas, VisionController, VisionState};
