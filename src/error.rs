//! Error types for StreamLens.
//!
//! Every error records the source location where it was raised. Build
//! message errors through the constructors (`StreamLensError::model_run(..)`)
//! and let `?` convert library errors; both capture the caller's location.

use std::panic::Location;
use thiserror::Error;

/// Source location an error was raised at.
pub type Origin = &'static Location<'static>;

/// Library-level error type for StreamLens operations.
#[derive(Error, Debug)]
pub enum StreamLensError {
    #[error("Configuration error: {0}")]
    Config(String, Origin),

    #[error("Tool server error: {0}")]
    ToolProtocol(String, Origin),

    #[error("Model run failed: {0}")]
    ModelRun(String, Origin),

    #[error("Parse error: {0}")]
    Parse(String, Origin),

    #[error("Audit write failed: {0}")]
    AuditWrite(String, Origin),

    #[error("Conversation memory error: {0}")]
    Memory(String, Origin),

    #[error("Tool failed: {0}")]
    Tool(String, Origin),

    #[error("IO error: {0}")]
    Io(#[source] std::io::Error, Origin),

    #[error("JSON error: {0}")]
    Json(#[source] serde_json::Error, Origin),

    #[error("TOML parse error: {0}")]
    TomlParse(#[source] toml::de::Error, Origin),

    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error, Origin),
}

impl StreamLensError {
    #[track_caller]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into(), Location::caller())
    }

    #[track_caller]
    pub fn tool_protocol(msg: impl Into<String>) -> Self {
        Self::ToolProtocol(msg.into(), Location::caller())
    }

    #[track_caller]
    pub fn model_run(msg: impl Into<String>) -> Self {
        Self::ModelRun(msg.into(), Location::caller())
    }

    #[track_caller]
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into(), Location::caller())
    }

    #[track_caller]
    pub fn audit_write(msg: impl Into<String>) -> Self {
        Self::AuditWrite(msg.into(), Location::caller())
    }

    #[track_caller]
    pub fn memory(msg: impl Into<String>) -> Self {
        Self::Memory(msg.into(), Location::caller())
    }

    #[track_caller]
    pub fn tool(msg: impl Into<String>) -> Self {
        Self::Tool(msg.into(), Location::caller())
    }

    /// Where this error was raised.
    pub fn location(&self) -> Origin {
        match self {
            Self::Config(_, at)
            | Self::ToolProtocol(_, at)
            | Self::ModelRun(_, at)
            | Self::Parse(_, at)
            | Self::AuditWrite(_, at)
            | Self::Memory(_, at)
            | Self::Tool(_, at)
            | Self::Io(_, at)
            | Self::Json(_, at)
            | Self::TomlParse(_, at)
            | Self::Database(_, at) => at,
        }
    }
}

impl From<std::io::Error> for StreamLensError {
    #[track_caller]
    fn from(e: std::io::Error) -> Self {
        Self::Io(e, Location::caller())
    }
}

impl From<serde_json::Error> for StreamLensError {
    #[track_caller]
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e, Location::caller())
    }
}

impl From<toml::de::Error> for StreamLensError {
    #[track_caller]
    fn from(e: toml::de::Error) -> Self {
        Self::TomlParse(e, Location::caller())
    }
}

impl From<rusqlite::Error> for StreamLensError {
    #[track_caller]
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e, Location::caller())
    }
}

/// Result type alias for StreamLens operations.
pub type Result<T> = std::result::Result<T, StreamLensError>;
