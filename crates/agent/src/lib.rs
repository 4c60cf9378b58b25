//! The chavruta bot script.
//!
//! `BotRuntime` receives every Slack message. A message from a user with a
//! pending session is handed to that session; anything else is matched
//! against the bot's triggers:
//!
//! - a greeting starts the study dialogue (`study`)
//! - `call me ...` stores a nickname
//! - `shutdown` asks for confirmation and then fires the [`ShutdownSignal`]
//! - `uptime` and similar questions get the identity reply (`identity`)
//!
//! Texts and their commentary come from a [`TextLookup`], by default the
//! Sefaria HTTP API.

pub mod identity;
pub mod lookup;
pub mod runtime;
pub mod shutdown;
pub mod study;

pub use identity::{format_uptime, Identity};
pub use lookup::{Commentary, LookupError, SefariaClient, TextLookup, TextRecord};
pub use runtime::{BotError, BotRuntime, RuntimeSettings};
pub use shutdown::{ShutdownListener, ShutdownSignal};
pub use study::build_study_dialogue;
