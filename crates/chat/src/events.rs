use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use tagwatch_core::domain::subscription::ChatId;

use crate::{
    blocks::MessageTemplate,
    commands::{
        normalize_command, CommandParseError, CommandRouteError, CommandRouter, IncomingMessage,
        WatchCommandService,
    },
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatEnvelope {
    pub update_id: i64,
    pub event: ChatEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    Message(IncomingMessage),
    CallbackQuery(CallbackQueryEvent),
    Unsupported { event_type: String },
}

impl ChatEvent {
    pub fn event_type(&self) -> ChatEventType {
        match self {
            Self::Message(_) => ChatEventType::Message,
            Self::CallbackQuery(_) => ChatEventType::CallbackQuery,
            Self::Unsupported { .. } => ChatEventType::Unsupported,
        }
    }

    pub fn chat_id(&self) -> Option<ChatId> {
        match self {
            Self::Message(message) => Some(message.chat_id),
            Self::CallbackQuery(query) => Some(query.chat_id),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChatEventType {
    Message,
    CallbackQuery,
    Unsupported,
}

/// A button press on a message the bot sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackQueryEvent {
    pub callback_id: String,
    pub chat_id: ChatId,
    pub message_id: i64,
    pub user_id: i64,
    pub data: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(MessageTemplate),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Route(#[from] CommandRouteError),
    #[error("button action handler failure: {0}")]
    ButtonAction(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> ChatEventType;
    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<ChatEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

pub struct CommandHandler<S> {
    router: CommandRouter<S>,
    bot_username: Option<String>,
}

impl<S> CommandHandler<S>
where
    S: WatchCommandService,
{
    pub fn new(service: S) -> Self {
        Self { router: CommandRouter::new(service), bot_username: None }
    }

    /// Ignore `/cmd@name` commands meant for another bot in group chats.
    pub fn with_bot_username(mut self, bot_username: impl Into<String>) -> Self {
        self.bot_username = Some(bot_username.into());
        self
    }
}

#[async_trait]
impl<S> EventHandler for CommandHandler<S>
where
    S: WatchCommandService + 'static,
{
    fn event_type(&self) -> ChatEventType {
        ChatEventType::Message
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::Message(message) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let normalized = match normalize_command(message, self.bot_username.as_deref()) {
            Ok(normalized) => normalized,
            Err(CommandParseError::NotACommand | CommandParseError::AddressedElsewhere(_)) => {
                return Ok(HandlerResult::Ignored);
            }
        };

        let reply = self.router.route(normalized).await?;
        Ok(HandlerResult::Responded(reply))
    }
}

#[async_trait]
pub trait ButtonActionService: Send + Sync {
    async fn handle_button(
        &self,
        event: &CallbackQueryEvent,
        ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, EventHandlerError>;
}

pub struct ButtonActionHandler<S> {
    service: S,
}

impl<S> ButtonActionHandler<S>
where
    S: ButtonActionService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for ButtonActionHandler<S>
where
    S: ButtonActionService + 'static,
{
    fn event_type(&self) -> ChatEventType {
        ChatEventType::CallbackQuery
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::CallbackQuery(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let message = self.service.handle_button(event, ctx).await?;
        Ok(match message {
            Some(message) => HandlerResult::Responded(message),
            None => HandlerResult::Processed,
        })
    }
}
