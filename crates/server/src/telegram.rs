//! Telegram Bot API over plain HTTPS: long-poll transport and message sender.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use tagwatch_chat::blocks::{ButtonElement, MessageTemplate};
use tagwatch_chat::commands::IncomingMessage;
use tagwatch_chat::delivery::{ChatSender, SendError, SentMessage};
use tagwatch_chat::events::{CallbackQueryEvent, ChatEnvelope, ChatEvent};
use tagwatch_chat::polling::{TransportError, UpdateTransport};
use tagwatch_core::config::TelegramConfig;
use tagwatch_core::domain::subscription::ChatId;

/// Added to the long-poll timeout to get the HTTP client deadline.
const POLL_GRACE_SECS: u64 = 10;
const ALLOWED_UPDATES: [&str; 2] = ["message", "callback_query"];

#[derive(Debug)]
enum ApiCallError {
    Transport(String),
    Rejected(String),
    Decode(String),
}

impl From<ApiCallError> for SendError {
    fn from(error: ApiCallError) -> Self {
        match error {
            ApiCallError::Transport(message) | ApiCallError::Decode(message) => {
                SendError::Transport(message)
            }
            ApiCallError::Rejected(description) => SendError::Rejected { description },
        }
    }
}

impl From<ApiCallError> for TransportError {
    fn from(error: ApiCallError) -> Self {
        match error {
            ApiCallError::Transport(message) | ApiCallError::Rejected(message) => {
                TransportError::Receive(message)
            }
            ApiCallError::Decode(message) => TransportError::Decode(message),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    chat: Chat,
    #[serde(default)]
    from: Option<User>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    from: User,
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    data: Option<String>,
}

impl Update {
    fn into_envelope(self) -> ChatEnvelope {
        let event = match (self.message, self.callback_query) {
            (Some(Message { message_id, chat, from, text: Some(text) }), _) => {
                ChatEvent::Message(IncomingMessage {
                    chat_id: ChatId(chat.id),
                    message_id,
                    user_id: from.map(|user| user.id),
                    text,
                })
            }
            (None, Some(CallbackQuery { id, from, message: Some(message), data: Some(data) })) => {
                ChatEvent::CallbackQuery(CallbackQueryEvent {
                    callback_id: id,
                    chat_id: ChatId(message.chat.id),
                    message_id: message.message_id,
                    user_id: from.id,
                    data,
                })
            }
            (Some(_), _) => ChatEvent::Unsupported { event_type: "non_text_message".to_owned() },
            (None, Some(_)) => {
                ChatEvent::Unsupported { event_type: "detached_callback_query".to_owned() }
            }
            (None, None) => ChatEvent::Unsupported { event_type: "other".to_owned() },
        };
        ChatEnvelope { update_id: self.update_id, event }
    }
}

#[derive(Debug, Serialize)]
struct GetUpdatesBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: [&'static str; 2],
}

#[derive(Debug, Serialize)]
struct InlineKeyboardButton {
    text: String,
    callback_data: String,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardMarkup {
    inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

impl InlineKeyboardMarkup {
    fn from_template(message: &MessageTemplate) -> Option<Self> {
        let rows = message.keyboard();
        if rows.is_empty() {
            return None;
        }
        let inline_keyboard = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|ButtonElement { label, callback_data }| InlineKeyboardButton {
                        text: label,
                        callback_data,
                    })
                    .collect()
            })
            .collect();
        Some(Self { inline_keyboard })
    }
}

#[derive(Debug, Serialize)]
struct SendMessageBody {
    chat_id: i64,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup>,
}

#[derive(Debug, Serialize)]
struct EditMessageTextBody {
    chat_id: i64,
    message_id: i64,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup>,
}

#[derive(Debug, Serialize)]
struct AnswerCallbackQueryBody<'a> {
    callback_query_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct SentMessageResult {
    message_id: i64,
}

pub struct TelegramBotApi {
    client: Client,
    api_base_url: String,
    bot_token: SecretString,
    poll_timeout_secs: u64,
}

impl TelegramBotApi {
    pub fn new(config: &TelegramConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + POLL_GRACE_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            bot_token: config.bot_token.clone(),
            poll_timeout_secs: config.poll_timeout_secs,
        }
    }

    /// Username of the bot behind the token, without the leading `@`.
    pub async fn bot_username(&self) -> Result<Option<String>, SendError> {
        let me: User = self.call("getMe", &serde_json::json!({})).await?;
        debug!(event_name = "chat.telegram.identity", bot_id = me.id, "resolved bot identity");
        Ok(me.username)
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, ApiCallError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/bot{}/{method}", self.api_base_url, self.bot_token.expose_secret());

        // reqwest errors embed the URL, which carries the bot token.
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|error| ApiCallError::Transport(error.without_url().to_string()))?;

        let payload: ApiResponse<T> = response
            .json()
            .await
            .map_err(|error| ApiCallError::Decode(error.without_url().to_string()))?;

        if !payload.ok {
            return Err(ApiCallError::Rejected(
                payload.description.unwrap_or_else(|| format!("{method} returned ok=false")),
            ));
        }

        payload
            .result
            .ok_or_else(|| ApiCallError::Decode(format!("{method} response had no result")))
    }
}

#[async_trait]
impl UpdateTransport for TelegramBotApi {
    async fn next_batch(
        &self,
        offset: Option<i64>,
    ) -> Result<Option<Vec<ChatEnvelope>>, TransportError> {
        let body = GetUpdatesBody {
            offset,
            timeout: self.poll_timeout_secs,
            allowed_updates: ALLOWED_UPDATES,
        };
        let updates: Vec<Update> = self.call("getUpdates", &body).await?;
        Ok(Some(updates.into_iter().map(Update::into_envelope).collect()))
    }
}

#[async_trait]
impl ChatSender for TelegramBotApi {
    async fn send_message(
        &self,
        chat_id: ChatId,
        message: &MessageTemplate,
    ) -> Result<SentMessage, SendError> {
        let body = SendMessageBody {
            chat_id: chat_id.0,
            text: message.text(),
            parse_mode: message.parse_mode.api_value(),
            reply_markup: InlineKeyboardMarkup::from_template(message),
        };
        let sent: SentMessageResult = self.call("sendMessage", &body).await?;
        Ok(SentMessage { message_id: sent.message_id })
    }

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: i64,
        message: &MessageTemplate,
    ) -> Result<(), SendError> {
        let body = EditMessageTextBody {
            chat_id: chat_id.0,
            message_id,
            text: message.text(),
            parse_mode: message.parse_mode.api_value(),
            reply_markup: InlineKeyboardMarkup::from_template(message),
        };
        let _: serde_json::Value = self.call("editMessageText", &body).await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), SendError> {
        let _: bool = self
            .call("answerCallbackQuery", &AnswerCallbackQueryBody { callback_query_id: callback_id })
            .await?;
        Ok(())
    }
}
