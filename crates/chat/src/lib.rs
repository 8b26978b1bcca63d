//! Chat surface for tagwatch
//!
//! Platform-neutral pieces of the bot; the Telegram wiring lives in the server crate.
//! - **Blocks** (`blocks`) - message templates, inline buttons, MarkdownV2 escaping
//! - **Commands** (`commands`) - `/addrepo`, `/listrepos`, `/delrepo`, `/help`
//! - **Events** (`events`) - update envelopes and the handler dispatcher
//! - **Delivery** (`delivery`) - `ChatSender` and the plain-text fallback
//! - **Polling** (`polling`) - long-poll loop with reconnect backoff
//!
//! # Architecture
//!
//! ```text
//! UpdateTransport → UpdatePollingRunner → EventDispatcher → Handlers → services
//!                                              ↓
//!                               MessageTemplate → ChatSender
//! ```

pub mod blocks;
pub mod commands;
pub mod delivery;
pub mod events;
pub mod polling;

pub use blocks::{escape_markdown_v2, MessageBuilder, MessageTemplate, ParseMode};
pub use delivery::{deliver, ChatSender, DeliveryOutcome, SendError, SentMessage};
pub use events::{ChatEnvelope, ChatEvent, EventDispatcher};
pub use polling::{ReconnectPolicy, TransportError, UpdatePollingRunner, UpdateTransport};
