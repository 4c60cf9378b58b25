//! Thread-based conversation engine.
//!
//! A [`Dialogue`] is a frozen registry of named threads. A [`Conversation`]
//! walks one user through it, and the [`SessionManager`] keeps many of them
//! running side by side.

pub mod context;
pub mod dialogue;
pub mod engine;
pub mod manager;
pub mod pattern;
pub mod session;
pub mod template;

pub use context::{
    hook_fn, response_fn, step_fn, BeforeHook, CallbackError, Command, ConvoContext,
    ResponseCallback, StepCallback,
};
pub use dialogue::{
    Dialogue, DialogueBuilder, DialogueError, Handler, MessageStep, QuestionOptions, QuestionStep,
    Step, Thread,
};
pub use engine::{Conversation, ConversationError, EndReport, MessageSink, Progress, SendError};
pub use manager::{SessionManager, APOLOGY_TEXT};
pub use pattern::{is_affirmative, is_negative, Pattern};
pub use session::{
    ConversationStatus, InboundMessage, Responses, Session, SessionId, SessionKey, Variables,
};
