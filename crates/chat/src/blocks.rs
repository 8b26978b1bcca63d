use serde::Serialize;

use tagwatch_core::domain::repository::RepositoryName;
use tagwatch_core::domain::subscription::Subscription;
use tagwatch_core::errors::DeployError;
use tagwatch_core::watch::TagDelta;

/// Characters Telegram reserves in MarkdownV2 text.
const MARKDOWN_V2_RESERVED: &[char] = &[
    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

pub const BUTTON_LABEL_MAX_CHARS: usize = 20;
const BUTTON_LABEL_KEEP_CHARS: usize = 17;

pub fn escape_markdown_v2(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + text.len() / 4);
    for ch in text.chars() {
        if MARKDOWN_V2_RESERVED.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum ParseMode {
    #[default]
    MarkdownV2,
    Plain,
}

impl ParseMode {
    /// Value for the Bot API `parse_mode` field; `None` means no formatting.
    pub fn api_value(&self) -> Option<&'static str> {
        match self {
            Self::MarkdownV2 => Some("MarkdownV2"),
            Self::Plain => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    /// Escaped when rendered as MarkdownV2.
    Plain { text: String },
    /// Already valid MarkdownV2.
    Markdown { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self::Markdown { text: text.into() }
    }

    fn render(&self, parse_mode: ParseMode) -> String {
        match (self, parse_mode) {
            (Self::Plain { text }, ParseMode::MarkdownV2) => escape_markdown_v2(text),
            (Self::Plain { text } | Self::Markdown { text }, _) => text.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ButtonElement {
    pub label: String,
    pub callback_data: String,
}

impl ButtonElement {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self { label: label.into(), callback_data: callback_data.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    /// Rendered as one inline keyboard row.
    Actions { block_id: String, elements: Vec<ButtonElement> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub parse_mode: ParseMode,
    pub blocks: Vec<Block>,
}

impl MessageTemplate {
    /// Message body: sections separated by blank lines.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                Block::Section { text, .. } => Some(text.render(self.parse_mode)),
                Block::Actions { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn keyboard(&self) -> Vec<Vec<ButtonElement>> {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                Block::Actions { elements, .. } if !elements.is_empty() => Some(elements.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn has_buttons(&self) -> bool {
        !self.keyboard().is_empty()
    }

    /// Unformatted, button-free variant used when a rich send is rejected.
    pub fn plain_fallback(&self) -> MessageTemplate {
        MessageBuilder::new(self.fallback_text.clone())
            .parse_mode(ParseMode::Plain)
            .section("fallback.body.v1", |section| {
                section.plain(self.fallback_text.clone());
            })
            .build()
    }
}

pub struct MessageBuilder {
    fallback_text: String,
    parse_mode: ParseMode,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self {
            fallback_text: fallback_text.into(),
            parse_mode: ParseMode::MarkdownV2,
            blocks: Vec::new(),
        }
    }

    pub fn parse_mode(mut self, parse_mode: ParseMode) -> Self {
        self.parse_mode = parse_mode;
        self
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn actions<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ActionsBuilder),
    {
        let mut builder = ActionsBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Actions { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate {
            fallback_text: self.fallback_text,
            parse_mode: self.parse_mode,
            blocks: self.blocks,
        }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn markdown(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::markdown(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<ButtonElement>,
}

impl ActionsBuilder {
    pub fn button(&mut self, button: ButtonElement) -> &mut Self {
        self.elements.push(button);
        self
    }

    fn build(self) -> Vec<ButtonElement> {
        self.elements
    }
}

/// `Deploy <tag>`, with tags longer than 20 characters cut to 17 plus `...`.
pub fn deploy_button_label(tag_name: &str) -> String {
    if tag_name.chars().count() > BUTTON_LABEL_MAX_CHARS {
        let head: String = tag_name.chars().take(BUTTON_LABEL_KEEP_CHARS).collect();
        format!("Deploy {head}...")
    } else {
        format!("Deploy {tag_name}")
    }
}

pub fn new_tags_notification(delta: &TagDelta) -> MessageTemplate {
    let repository = delta.repository.as_str();
    let escaped_repository = escape_markdown_v2(repository);

    let mut fallback = format!("New tags for {repository}:\n");
    for tag in &delta.deployable {
        fallback.push_str(&format!("- Tag: {}, Updated: {}\n", tag.name, tag.last_updated_label()));
    }
    for excluded in &delta.informational {
        fallback.push_str(&format!("- Tag: {} (no deploy button)\n", excluded.tag.name));
    }

    let header = if delta.deployable.is_empty() {
        format!("🔔 New non\\-deployable tags found for *{escaped_repository}*:")
    } else {
        format!("🔔 New deployable tags found for *{escaped_repository}*:")
    };

    let mut builder = MessageBuilder::new(fallback.trim_end().to_owned())
        .section("tags.new.header.v1", |section| {
            section.markdown(header);
        });

    for tag in &delta.deployable {
        let body = format!(
            "🏷️ *Tag:* `{}`\n   *Updated:* {}",
            escape_markdown_v2(&tag.name),
            escape_markdown_v2(&tag.last_updated_label())
        );
        builder = builder.section("tags.new.deployable.v1", |section| {
            section.markdown(body);
        });
    }

    if !delta.informational.is_empty() {
        let lines = delta
            .informational
            .iter()
            .map(|excluded| format!("  \\- Tag: `{}`", escape_markdown_v2(&excluded.tag.name)))
            .collect::<Vec<_>>()
            .join("\n");
        let title = if delta.deployable.is_empty() { "Tags:" } else { "Also new, no deploy button:" };
        builder = builder.section("tags.new.informational.v1", |section| {
            section.markdown(format!("{}\n{lines}", escape_markdown_v2(title)));
        });
    }

    for tag in &delta.deployable {
        let token = delta.deploy_token(tag);
        builder = builder.actions("tags.new.deploy.v1", |actions| {
            actions.button(ButtonElement::new(deploy_button_label(&tag.name), token.encode()));
        });
    }

    builder.build()
}

pub fn help_message() -> MessageTemplate {
    let lines = [
        "Welcome to the container tag watcher!",
        "",
        "/addrepo <registry_repo> <local_repo_path> <service_base_url> <api_token>",
        "  Watch a repository. Example:",
        "  /addrepo grafana/grafana gano/grafana https://my.repo.org/api/v1/repos/ your_token",
        "  registry_repo: e.g. grafana/grafana or python (official images)",
        "  local_repo_path: e.g. gano/grafana (used for the deploy API path)",
        "  service_base_url: e.g. https://my.repo.org/api/v1/repos/",
        "  api_token: token for the deploy service",
        "/listrepos  Show tracked repositories",
        "/delrepo <registry_repo>  Stop watching a repository",
        "/help  Show this message",
    ];
    let body = lines.join("\n");
    MessageBuilder::new(body.clone())
        .section("help.body.v1", |section| {
            section.plain(body);
        })
        .build()
}

pub fn usage_message(summary: &str, usage: &str) -> MessageTemplate {
    MessageBuilder::new(format!("{summary}\nUsage: {usage}"))
        .section("command.usage.v1", |section| {
            section.markdown(format!(
                "{}\nUsage: `{}`",
                escape_markdown_v2(summary),
                escape_markdown_v2(usage)
            ));
        })
        .build()
}

/// Single-section message with no formatting of its own.
pub fn notice_message(text: &str) -> MessageTemplate {
    MessageBuilder::new(text)
        .section("notice.body.v1", |section| {
            section.plain(text);
        })
        .build()
}

pub fn error_message(summary: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new(format!("Error: {summary} (ref {correlation_id})"))
        .section("error.summary.v1", |section| {
            section.markdown(format!("⚠️ *Error:* {}", escape_markdown_v2(summary)));
        })
        .section("error.reference.v1", |section| {
            section.markdown(format!("Reference: `{}`", escape_markdown_v2(correlation_id)));
        })
        .build()
}

pub fn subscription_added_message(subscription: &Subscription) -> MessageTemplate {
    let repository = subscription.repository().as_str();
    let path = subscription.deploy.local_repo_path.as_deref().unwrap_or("Not set");
    let base_url = subscription.deploy.service_base_url.as_deref().unwrap_or("Not set");
    let count = subscription.last_seen_tags.len();

    let body = format!(
        "Watching registry repo: {repository}.\nLocal API path: {path}.\nService base URL: {base_url}.\nAPI token configured. Currently tracking {count} tags."
    );
    notice_message(&body)
}

pub fn subscription_list_message(subscriptions: &[Subscription]) -> MessageTemplate {
    if subscriptions.is_empty() {
        return notice_message("You are not tracking any repositories yet. Use /addrepo to add one.");
    }

    let mut fallback = String::from("You are tracking the following repositories:\n");
    let mut builder = MessageBuilder::new(String::new()).section("subscriptions.header.v1", |section| {
        section.plain("You are tracking the following repositories:");
    });

    for subscription in subscriptions {
        let repository = subscription.repository().as_str();
        let path = subscription.deploy.local_repo_path.as_deref().unwrap_or("Not set");
        let base_url = subscription.deploy.service_base_url.as_deref().unwrap_or("Not set");
        let token = if subscription.deploy.has_token() { "Set" } else { "Not set" };

        fallback.push_str(&format!(
            "- Registry: {repository}\n  Local API Path: {path}\n  Service Base URL: {base_url}\n  API Token: {token}\n"
        ));
        builder = builder.section("subscriptions.entry.v1", |section| {
            section.markdown(format!(
                "\\- Registry: *{}*\n  Local API Path: `{}`\n  Service Base URL: `{}`\n  API Token: {token}",
                escape_markdown_v2(repository),
                escape_markdown_v2(path),
                escape_markdown_v2(base_url)
            ));
        });
    }

    let mut message = builder.build();
    message.fallback_text = fallback.trim_end().to_owned();
    message
}

pub fn subscription_removed_message(repository: &RepositoryName, removed: bool) -> MessageTemplate {
    if removed {
        notice_message(&format!("Repository {repository} removed from your tracking list."))
    } else {
        notice_message(&format!("Repository {repository} not found in your tracking list."))
    }
}

pub fn deploy_incomplete_message(repository: &str) -> MessageTemplate {
    notice_message(&format!(
        "Deployment configuration incomplete for registry repository {repository}. Please check local path, service URL, and API token settings."
    ))
}

pub fn deploy_attempt_message(tag_name: &str, local_repo_path: &str, url: &str) -> MessageTemplate {
    notice_message(&format!(
        "🚀 Attempting to create tag for {tag_name} on repo {local_repo_path} via {url}..."
    ))
}

pub fn deploy_succeeded_message(repository: &str, tag_name: &str, status_code: u16) -> MessageTemplate {
    notice_message(&format!(
        "✅ Successfully triggered deployment for {repository}:{tag_name}. Service responded with {status_code}."
    ))
}

pub fn deploy_failed_message(repository: &str, tag_name: &str, error: &DeployError) -> MessageTemplate {
    let text = match error {
        DeployError::Status { .. } => format!(
            "⚠️ Failed to trigger deployment for {repository}:{tag_name}. Service responded with: {error}"
        ),
        DeployError::Transport(_) => format!(
            "⚠️ Failed to call deployment service for {repository}:{tag_name}. Error: {error}."
        ),
        DeployError::IncompleteConfiguration { .. } => {
            return deploy_incomplete_message(repository);
        }
    };
    notice_message(&text)
}

pub fn unknown_action_message(action: &str) -> MessageTemplate {
    notice_message(&format!("Unknown action: {action}"))
}
