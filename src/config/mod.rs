//! Configuration module for StreamLens.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::Prompts;
pub use settings::{
    AuditSettings, DatastoreSettings, GeneralSettings, MemorySettings, ModelSettings,
    PromptSettings, ServerSettings, Settings, ToolServerSettings,
};
