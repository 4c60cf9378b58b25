pub mod config;
pub mod convo;
pub mod domain;
pub mod errors;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use convo::{
    Command, Conversation, ConversationError, ConversationStatus, Dialogue, DialogueBuilder,
    DialogueError, EndReport, InboundMessage, MessageSink, Progress, SendError, SessionManager,
};
pub use domain::user::{UserId, UserRecord};
pub use errors::{ApplicationError, InterfaceError};
