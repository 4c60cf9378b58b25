//! Slack Integration - Socket Mode bot interface
//!
//! This crate provides the Slack plumbing for chavruta:
//! - **Socket Mode** (`socket`) - envelope loop with reconnection and acknowledgement
//! - **Events** (`events`) - direct messages and mentions, routed by event type
//! - **Web API** (`api`) - `chat.postMessage` and `reactions.add`
//! - **Hears** (`hears`) - ordered keyword triggers with capture groups
//! - **mrkdwn** (`mrkdwn`) - HTML to Slack formatting helpers
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Enable Socket Mode and subscribe to `message.im` and `app_mention`
//! 3. Set env vars: `CHAVRUTA_SLACK_BOT_TOKEN` (and `CHAVRUTA_SLACK_APP_TOKEN`)
//!
//! # Architecture
//!
//! ```text
//! Slack Envelope → EventDispatcher → MessageHandler → Bot Runtime → Conversation Engine
//!                                                          ↓
//!                                  WebApiClient ← SlackMessageSink
//! ```

pub mod api;
pub mod events;
pub mod hears;
pub mod mrkdwn;
pub mod socket;
