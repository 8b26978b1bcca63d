use async_trait::async_trait;
use thiserror::Error;

use tagwatch_core::domain::repository::RepositoryName;
use tagwatch_core::domain::subscription::ChatId;

use crate::blocks::{self, MessageTemplate};

pub const ADD_REPO_USAGE: &str =
    "/addrepo <registry_repo> <local_repo_path> <service_base_url> <api_token>";
pub const DEL_REPO_USAGE: &str = "/delrepo <registry_repo>";

/// A text message as received from the chat platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: ChatId,
    pub message_id: i64,
    pub user_id: Option<i64>,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandEnvelope {
    /// Lowercase command name without the leading `/` or `@bot` suffix.
    pub command: String,
    pub args: Vec<String>,
    pub chat_id: ChatId,
    pub user_id: Option<i64>,
    pub request_id: String,
}

#[derive(Clone, Debug)]
pub struct AddRepoRequest {
    pub repository: RepositoryName,
    pub local_repo_path: String,
    /// Always ends in `/`.
    pub service_base_url: String,
    pub api_token: String,
}

#[derive(Clone, Debug)]
pub enum ChatCommand {
    Help,
    AddRepo(AddRepoRequest),
    ListRepos,
    DelRepo { repository: RepositoryName },
    Usage { summary: &'static str, usage: &'static str },
    Rejected { reason: String },
    Unknown { command: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("message is not a command")]
    NotACommand,
    #[error("command is addressed to `{0}`")]
    AddressedElsewhere(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error("command service failed: {0}")]
    Service(String),
}

/// Splits `/cmd@bot arg1 arg2` into an envelope. Commands addressed to a
/// different bot are refused when `bot_username` is known.
pub fn normalize_command(
    message: &IncomingMessage,
    bot_username: Option<&str>,
) -> Result<CommandEnvelope, CommandParseError> {
    let text = message.text.trim();
    let Some(rest) = text.strip_prefix('/') else {
        return Err(CommandParseError::NotACommand);
    };

    let mut parts = rest.split_whitespace();
    let head = parts.next().unwrap_or_default();
    if head.is_empty() {
        return Err(CommandParseError::NotACommand);
    }

    let (command, mention) = match head.split_once('@') {
        Some((command, mention)) => (command, Some(mention)),
        None => (head, None),
    };
    if let (Some(mention), Some(bot_username)) = (mention, bot_username) {
        if !mention.eq_ignore_ascii_case(bot_username.trim_start_matches('@')) {
            return Err(CommandParseError::AddressedElsewhere(mention.to_owned()));
        }
    }

    Ok(CommandEnvelope {
        command: command.to_ascii_lowercase(),
        args: parts.map(str::to_owned).collect(),
        chat_id: message.chat_id,
        user_id: message.user_id,
        request_id: format!("msg-{}-{}", message.chat_id, message.message_id),
    })
}

pub fn classify_command(envelope: &CommandEnvelope) -> ChatCommand {
    match envelope.command.as_str() {
        "start" | "help" => ChatCommand::Help,
        "addrepo" => parse_add_repo(&envelope.args),
        "listrepos" => ChatCommand::ListRepos,
        "delrepo" => {
            let Some(raw) = envelope.args.first() else {
                return ChatCommand::Usage {
                    summary: "Please provide the registry repository name.",
                    usage: DEL_REPO_USAGE,
                };
            };
            match RepositoryName::parse(raw) {
                Ok(repository) => ChatCommand::DelRepo { repository },
                Err(error) => ChatCommand::Rejected { reason: error.to_string() },
            }
        }
        other => ChatCommand::Unknown { command: other.to_owned() },
    }
}

fn parse_add_repo(args: &[String]) -> ChatCommand {
    let [repository, local_repo_path, service_base_url, api_token, ..] = args else {
        return ChatCommand::Usage {
            summary: "Please provide all four arguments.",
            usage: ADD_REPO_USAGE,
        };
    };

    let repository = match RepositoryName::parse(repository) {
        Ok(repository) => repository,
        Err(error) => return ChatCommand::Rejected { reason: error.to_string() },
    };

    let Some(service_base_url) = normalize_base_url(service_base_url) else {
        return ChatCommand::Rejected {
            reason: "Invalid service base URL. It must start with http:// or https://".to_owned(),
        };
    };

    ChatCommand::AddRepo(AddRepoRequest {
        repository,
        local_repo_path: local_repo_path.clone(),
        service_base_url,
        api_token: api_token.clone(),
    })
}

/// Accepts only http(s) URLs and guarantees a trailing `/`.
pub fn normalize_base_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return None;
    }
    if trimmed.ends_with('/') {
        Some(trimmed.to_owned())
    } else {
        Some(format!("{trimmed}/"))
    }
}

pub struct CommandRouter<S> {
    service: S,
}

impl<S> CommandRouter<S>
where
    S: WatchCommandService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub async fn route(
        &self,
        envelope: CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        match classify_command(&envelope) {
            ChatCommand::Help => Ok(blocks::help_message()),
            ChatCommand::AddRepo(request) => self.service.add_repository(request, &envelope).await,
            ChatCommand::ListRepos => self.service.list_repositories(&envelope).await,
            ChatCommand::DelRepo { repository } => {
                self.service.remove_repository(repository, &envelope).await
            }
            ChatCommand::Usage { summary, usage } => Ok(blocks::usage_message(summary, usage)),
            ChatCommand::Rejected { reason } => Ok(blocks::notice_message(&reason)),
            ChatCommand::Unknown { command } => Ok(blocks::notice_message(&format!(
                "Unsupported command /{command}. Try /help."
            ))),
        }
    }
}

#[async_trait]
pub trait WatchCommandService: Send + Sync {
    async fn add_repository(
        &self,
        request: AddRepoRequest,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn list_repositories(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn remove_repository(
        &self,
        repository: RepositoryName,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError>;
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tagwatch_core::domain::repository::RepositoryName;
    use tagwatch_core::domain::subscription::ChatId;

    use super::{
        classify_command, normalize_base_url, normalize_command, AddRepoRequest, ChatCommand,
        CommandEnvelope, CommandParseError, CommandRouteError, CommandRouter, IncomingMessage,
        WatchCommandService,
    };
    use crate::blocks::{self, MessageTemplate};

    fn message(text: &str) -> IncomingMessage {
        IncomingMessage { chat_id: ChatId(42), message_id: 7, user_id: Some(9), text: text.into() }
    }

    fn envelope(text: &str) -> CommandEnvelope {
        normalize_command(&message(text), Some("tagwatch_bot")).expect("command")
    }

    #[derive(Default)]
    struct RecordingService {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WatchCommandService for RecordingService {
        async fn add_repository(
            &self,
            request: AddRepoRequest,
            _envelope: &CommandEnvelope,
        ) -> Result<MessageTemplate, CommandRouteError> {
            self.calls.lock().expect("lock").push(format!("add {}", request.repository));
            Ok(blocks::notice_message("added"))
        }

        async fn list_repositories(
            &self,
            envelope: &CommandEnvelope,
        ) -> Result<MessageTemplate, CommandRouteError> {
            self.calls.lock().expect("lock").push(format!("list {}", envelope.chat_id));
            Ok(blocks::notice_message("listed"))
        }

        async fn remove_repository(
            &self,
            repository: RepositoryName,
            _envelope: &CommandEnvelope,
        ) -> Result<MessageTemplate, CommandRouteError> {
            self.calls.lock().expect("lock").push(format!("del {repository}"));
            Err(CommandRouteError::Service("store offline".into()))
        }
    }

    #[test]
    fn normalizes_command_name_and_arguments() {
        let envelope = envelope("  /AddRepo@TagWatch_Bot nginx org/web https://git.example.org tok ");
        assert_eq!(envelope.command, "addrepo");
        assert_eq!(envelope.args, vec!["nginx", "org/web", "https://git.example.org", "tok"]);
        assert_eq!(envelope.request_id, "msg-42-7");
    }

    #[test]
    fn plain_text_and_other_bots_are_not_commands() {
        assert_eq!(
            normalize_command(&message("hello"), None),
            Err(CommandParseError::NotACommand)
        );
        assert_eq!(normalize_command(&message("/"), None), Err(CommandParseError::NotACommand));
        assert_eq!(
            normalize_command(&message("/help@other_bot"), Some("tagwatch_bot")),
            Err(CommandParseError::AddressedElsewhere("other_bot".into()))
        );
        assert!(normalize_command(&message("/help@other_bot"), None).is_ok());
    }

    #[test]
    fn addrepo_requires_four_arguments() {
        assert!(matches!(
            classify_command(&envelope("/addrepo nginx org/web https://x.example")),
            ChatCommand::Usage { .. }
        ));
    }

    #[test]
    fn addrepo_normalizes_repository_and_base_url() {
        let ChatCommand::AddRepo(request) =
            classify_command(&envelope("/addrepo NGINX Org/Web https://git.example.org/api tok"))
        else {
            panic!("expected addrepo");
        };
        assert_eq!(request.repository.as_str(), "library/nginx");
        assert_eq!(request.local_repo_path, "Org/Web");
        assert_eq!(request.service_base_url, "https://git.example.org/api/");
        assert_eq!(request.api_token, "tok");
    }

    #[test]
    fn addrepo_rejects_non_http_base_url() {
        assert!(matches!(
            classify_command(&envelope("/addrepo nginx org/web ftp://git.example.org tok")),
            ChatCommand::Rejected { .. }
        ));
        assert_eq!(normalize_base_url("http://a/"), Some("http://a/".into()));
        assert_eq!(normalize_base_url("git.example.org"), None);
    }

    #[test]
    fn delrepo_without_argument_returns_usage() {
        assert!(matches!(classify_command(&envelope("/delrepo")), ChatCommand::Usage { .. }));
        assert!(matches!(
            classify_command(&envelope("/delrepo a/b/c")),
            ChatCommand::Rejected { .. }
        ));
    }

    #[tokio::test]
    async fn router_dispatches_to_service_and_renders_local_replies() {
        let router = CommandRouter::new(RecordingService::default());

        let help = router.route(envelope("/start")).await.expect("help");
        assert!(help.fallback_text.contains("/addrepo"));

        router.route(envelope("/addrepo redis org/cache https://git.example.org t")).await.expect("add");
        router.route(envelope("/listrepos")).await.expect("list");
        let removal = router.route(envelope("/delrepo redis")).await;
        assert_eq!(removal, Err(CommandRouteError::Service("store offline".into())));

        let unknown = router.route(envelope("/deploy now")).await.expect("unknown reply");
        assert!(unknown.fallback_text.contains("/help"));

        let calls = router.service.calls.lock().expect("lock").clone();
        assert_eq!(calls, vec!["add library/redis", "list 42", "del library/redis"]);
    }
}
