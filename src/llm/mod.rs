pub mod client;

pub use client::{AiClient, AiError};

/// What the trigger engine decided to ask the backend. Resolved once per
/// message; everything downstream branches on this instead of re-inspecting
/// the message.
#[derive(Debug, Clone)]
pub enum Question {
    Text { question: String },
    Image { image: Vec<u8>, question: String },
    Combined { image: Vec<u8>, question: String },
}

impl Question {
    pub fn has_image(&self) -> bool {
        !matches!(self, Question::Text { .. })
    }

    pub fn question_text(&self) -> &str {
        match self {
            Question::Text { question }
            | Question::Image { question, .. }
            | Question::Combined { question, .. } => question,
        }
    }
}
