pub mod config;
#[cfg(feature = "ollama")]
pub mod ollama;
pub mod provider;
pub mod retry;
pub mod types;

pub use config::{OllamaConfig, Sampling};
pub use provider::{ModelError, ModelProvider, ModelResult};
pub use retry::RetryPolicy;
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, Choice, FinishReason, MessageRole, ModelInfo, Usage,
};

#[cfg(feature = "ollama")]
pub use ollama::OllamaProvider;

pub mod prelude {
    pub use crate::config::*;
    pub use crate::provider::*;
    pub use crate::retry::*;
    pub use crate::types::*;

    #[cfg(feature = "ollama")]
    pub use crate::ollama::*;
}
