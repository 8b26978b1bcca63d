//! Command and button services backing the chat handlers.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use tagwatch_chat::blocks::{self, MessageTemplate};
use tagwatch_chat::commands::{
    AddRepoRequest, CommandEnvelope, CommandRouteError, WatchCommandService,
};
use tagwatch_chat::delivery::{deliver, ChatSender};
use tagwatch_chat::events::{ButtonActionService, CallbackQueryEvent, EventContext, EventHandlerError};
use tagwatch_core::domain::deploy::{DeployRequest, DeployRun, DeployState, DeployTrigger};
use tagwatch_core::domain::repository::RepositoryName;
use tagwatch_core::domain::subscription::{
    ChatId, DeployTarget, Subscription, SubscriptionKey,
};
use tagwatch_core::errors::{ApplicationError, DomainError, InterfaceError, RegistryError};
use tagwatch_core::watch::action::{ActionToken, ActionKind};
use tagwatch_core::watch::TagSource;
use tagwatch_db::{RepositoryError, SubscriptionRepository};

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

#[derive(Debug)]
pub enum SubscribeOutcome {
    Added(Subscription),
    AlreadyTracked(RepositoryName),
}

pub struct SubscriptionService {
    store: Arc<dyn SubscriptionRepository>,
    tags: Arc<dyn TagSource>,
}

impl SubscriptionService {
    pub fn new(store: Arc<dyn SubscriptionRepository>, tags: Arc<dyn TagSource>) -> Self {
        Self { store, tags }
    }

    /// Seeds the subscription with the repository's current tags so the next
    /// cycle only reports tags published after this call. Any registry failure
    /// leaves the store untouched.
    pub async fn subscribe(
        &self,
        chat_id: ChatId,
        request: AddRepoRequest,
    ) -> Result<SubscribeOutcome, ApplicationError> {
        let key = SubscriptionKey::new(chat_id, request.repository.clone());
        if self.store.find(&key).await.map_err(persistence)?.is_some() {
            return Ok(SubscribeOutcome::AlreadyTracked(request.repository));
        }

        let current = self.tags.fetch_tags(&request.repository).await?;
        let subscription = Subscription::new(
            key,
            current.into_iter().map(|tag| tag.name).collect(),
            DeployTarget::new(request.local_repo_path, request.service_base_url, request.api_token),
        );
        self.store.save(subscription.clone()).await.map_err(persistence)?;

        info!(
            event_name = "watch.subscription.added",
            chat_id = %chat_id,
            repository = %subscription.repository(),
            seeded_tags = subscription.last_seen_tags.len(),
            "subscription added"
        );
        Ok(SubscribeOutcome::Added(subscription))
    }

    pub async fn unsubscribe(
        &self,
        chat_id: ChatId,
        repository: &RepositoryName,
    ) -> Result<bool, ApplicationError> {
        let key = SubscriptionKey::new(chat_id, repository.clone());
        let removed = self.store.remove(&key).await.map_err(persistence)?;
        if removed {
            info!(
                event_name = "watch.subscription.removed",
                chat_id = %chat_id,
                repository = %repository,
                "subscription removed"
            );
        }
        Ok(removed)
    }

    pub async fn list(&self, chat_id: ChatId) -> Result<Vec<Subscription>, ApplicationError> {
        self.store.list_for_chat(chat_id).await.map_err(persistence)
    }
}

fn failure_reply(error: ApplicationError, envelope: &CommandEnvelope) -> MessageTemplate {
    let mapped: InterfaceError = error.into_interface(envelope.request_id.clone());
    warn!(
        event_name = "chat.command.failed",
        command = %envelope.command,
        chat_id = %envelope.chat_id,
        correlation_id = %mapped.correlation_id(),
        error = %mapped,
        "command failed"
    );
    blocks::error_message(mapped.user_message(), mapped.correlation_id())
}

#[async_trait]
impl WatchCommandService for SubscriptionService {
    async fn add_repository(
        &self,
        request: AddRepoRequest,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let repository = request.repository.clone();
        match self.subscribe(envelope.chat_id, request).await {
            Ok(SubscribeOutcome::Added(subscription)) => {
                Ok(blocks::subscription_added_message(&subscription))
            }
            Ok(SubscribeOutcome::AlreadyTracked(repository)) => Ok(blocks::notice_message(
                &format!("Registry repository {repository} is already in your tracking list."),
            )),
            Err(ApplicationError::Registry(error)) => {
                if let RegistryError::Transient { message, .. } = &error {
                    warn!(
                        event_name = "watch.subscription.fetch_failed",
                        repository = %repository,
                        error = %message,
                        "could not fetch tags while subscribing"
                    );
                }
                Ok(blocks::notice_message(&format!(
                    "Could not fetch tags for registry repository {repository}. Please ensure it exists and is public."
                )))
            }
            Err(error) => Ok(failure_reply(error, envelope)),
        }
    }

    async fn list_repositories(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        match self.list(envelope.chat_id).await {
            Ok(subscriptions) => Ok(blocks::subscription_list_message(&subscriptions)),
            Err(error) => Ok(failure_reply(error, envelope)),
        }
    }

    async fn remove_repository(
        &self,
        repository: RepositoryName,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        match self.unsubscribe(envelope.chat_id, &repository).await {
            Ok(removed) => Ok(blocks::subscription_removed_message(&repository, removed)),
            Err(error) => Ok(failure_reply(error, envelope)),
        }
    }
}

/// Handles `deploy:<repo>:<tag>` button presses.
pub struct DeployActionService {
    store: Arc<dyn SubscriptionRepository>,
    trigger: Arc<dyn DeployTrigger>,
    sender: Arc<dyn ChatSender>,
}

impl DeployActionService {
    pub fn new(
        store: Arc<dyn SubscriptionRepository>,
        trigger: Arc<dyn DeployTrigger>,
        sender: Arc<dyn ChatSender>,
    ) -> Self {
        Self { store, trigger, sender }
    }

    async fn edit(&self, event: &CallbackQueryEvent, message: &MessageTemplate) {
        if let Err(error) = self.sender.edit_message(event.chat_id, event.message_id, message).await
        {
            warn!(
                event_name = "chat.message.edit_failed",
                chat_id = %event.chat_id,
                message_id = event.message_id,
                error = %error,
                "failed to edit notification"
            );
        }
    }

    async fn notify(&self, chat_id: ChatId, message: &MessageTemplate) {
        // Failures are already logged by `deliver`.
        let _ = deliver(self.sender.as_ref(), chat_id, message).await;
    }

    /// Runs one press through the deploy state machine and returns the state it ended in.
    pub async fn press(
        &self,
        event: &CallbackQueryEvent,
        token: ActionToken,
        ctx: &EventContext,
    ) -> Result<DeployState, DomainError> {
        let mut run = DeployRun::sent(token.repository.clone(), token.tag_name.clone());
        run.transition_to(DeployState::Pressed)?;

        info!(
            event_name = "deploy.button.pressed",
            user_id = event.user_id,
            chat_id = %event.chat_id,
            repository = %run.repository,
            tag = %run.tag_name,
            correlation_id = %ctx.correlation_id,
            "deploy button pressed"
        );

        let key = SubscriptionKey::new(event.chat_id, run.repository.clone());
        let subscription = match self.store.find(&key).await {
            Ok(subscription) => subscription,
            Err(error) => {
                warn!(
                    event_name = "deploy.subscription.lookup_failed",
                    repository = %run.repository,
                    error = %error,
                    "could not read subscription"
                );
                None
            }
        };

        let endpoint = match subscription.map(|found| found.deploy.resolve(&run.repository)) {
            Some(Ok(endpoint)) => endpoint,
            Some(Err(_)) | None => {
                self.edit(event, &blocks::deploy_incomplete_message(run.repository.as_str())).await;
                return Ok(run.state());
            }
        };

        self.edit(
            event,
            &blocks::deploy_attempt_message(&run.tag_name, &endpoint.local_repo_path, &endpoint.url),
        )
        .await;
        run.transition_to(DeployState::Requesting)?;

        let request = DeployRequest { endpoint, tag_name: run.tag_name.clone() };
        match self.trigger.trigger(&request).await {
            Ok(outcome) => {
                run.transition_to(DeployState::Succeeded)?;
                self.notify(
                    event.chat_id,
                    &blocks::deploy_succeeded_message(
                        run.repository.as_str(),
                        &run.tag_name,
                        outcome.status_code,
                    ),
                )
                .await;
            }
            Err(error) => {
                run.transition_to(DeployState::Failed)?;
                self.notify(
                    event.chat_id,
                    &blocks::deploy_failed_message(run.repository.as_str(), &run.tag_name, &error),
                )
                .await;
            }
        }

        info!(
            event_name = "deploy.run.finished",
            repository = %run.repository,
            tag = %run.tag_name,
            state = run.state().as_str(),
            correlation_id = %ctx.correlation_id,
            "deploy run finished"
        );
        Ok(run.state())
    }
}

#[async_trait]
impl ButtonActionService for DeployActionService {
    async fn handle_button(
        &self,
        event: &CallbackQueryEvent,
        ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, EventHandlerError> {
        if let Err(error) = self.sender.answer_callback(&event.callback_id).await {
            warn!(
                event_name = "chat.callback.answer_failed",
                callback_id = %event.callback_id,
                error = %error,
                "failed to answer callback query"
            );
        }

        let token = match ActionToken::parse(&event.data) {
            Ok(token) => token,
            Err(error) => {
                warn!(
                    event_name = "chat.callback.unknown_action",
                    data = %event.data,
                    error = %error,
                    "unknown action in callback query"
                );
                let kind = ActionToken::raw_kind(&event.data);
                let label = if ActionKind::parse(kind).is_some() { event.data.as_str() } else { kind };
                self.edit(event, &blocks::unknown_action_message(label)).await;
                return Ok(None);
            }
        };

        self.press(event, token, ctx)
            .await
            .map_err(|error| EventHandlerError::ButtonAction(error.to_string()))?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use tagwatch_chat::blocks::MessageTemplate;
    use tagwatch_chat::commands::{normalize_command, CommandRouter, IncomingMessage};
    use tagwatch_chat::delivery::{ChatSender, SendError, SentMessage};
    use tagwatch_chat::events::{ButtonActionService, CallbackQueryEvent, EventContext};
    use tagwatch_core::domain::deploy::{DeployOutcome, DeployRequest, DeployState, DeployTrigger};
    use tagwatch_core::domain::repository::RepositoryName;
    use tagwatch_core::domain::subscription::{ChatId, DeployTarget, Subscription, SubscriptionKey};
    use tagwatch_core::domain::tag::Tag;
    use tagwatch_core::errors::{ApplicationError, DeployError, RegistryError};
    use tagwatch_core::watch::action::ActionToken;
    use tagwatch_core::watch::TagSource;
    use tagwatch_db::{InMemorySubscriptionRepository, SubscriptionRepository};

    use super::{DeployActionService, SubscribeOutcome, SubscriptionService};

    #[derive(Default)]
    struct FakeRegistry {
        tags: HashMap<String, Result<Vec<Tag>, RegistryError>>,
    }

    impl FakeRegistry {
        fn with(mut self, repository: &str, result: Result<Vec<Tag>, RegistryError>) -> Self {
            self.tags.insert(repository.to_owned(), result);
            self
        }
    }

    #[async_trait]
    impl TagSource for FakeRegistry {
        async fn fetch_tags(&self, repository: &RepositoryName) -> Result<Vec<Tag>, RegistryError> {
            self.tags
                .get(repository.as_str())
                .cloned()
                .unwrap_or(Err(RegistryError::NotFound { repository: repository.clone() }))
        }
    }

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingSender {
        async fn texts(&self) -> Vec<(String, String)> {
            self.sent.lock().await.clone()
        }
    }

    #[async_trait]
    impl ChatSender for RecordingSender {
        async fn send_message(
            &self,
            _chat_id: ChatId,
            message: &MessageTemplate,
        ) -> Result<SentMessage, SendError> {
            self.sent.lock().await.push(("send".into(), message.fallback_text.clone()));
            Ok(SentMessage { message_id: 1 })
        }

        async fn edit_message(
            &self,
            _chat_id: ChatId,
            _message_id: i64,
            message: &MessageTemplate,
        ) -> Result<(), SendError> {
            self.sent.lock().await.push(("edit".into(), message.fallback_text.clone()));
            Ok(())
        }

        async fn answer_callback(&self, callback_id: &str) -> Result<(), SendError> {
            self.sent.lock().await.push(("answer".into(), callback_id.to_owned()));
            Ok(())
        }
    }

    struct ScriptedTrigger {
        results: Mutex<VecDeque<Result<DeployOutcome, DeployError>>>,
        requests: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedTrigger {
        fn new(results: Vec<Result<DeployOutcome, DeployError>>) -> Self {
            Self { results: Mutex::new(results.into()), requests: Mutex::default() }
        }
    }

    #[async_trait]
    impl DeployTrigger for ScriptedTrigger {
        async fn trigger(&self, request: &DeployRequest) -> Result<DeployOutcome, DeployError> {
            self.requests
                .lock()
                .await
                .push((request.endpoint.url.clone(), request.tag_name.clone()));
            self.results
                .lock()
                .await
                .pop_front()
                .unwrap_or(Ok(DeployOutcome { status_code: 201 }))
        }
    }

    fn repo(name: &str) -> RepositoryName {
        RepositoryName::parse(name).expect("valid name")
    }

    fn add_request(repository: &str) -> tagwatch_chat::commands::AddRepoRequest {
        tagwatch_chat::commands::AddRepoRequest {
            repository: repo(repository),
            local_repo_path: "Gano/Grafana".into(),
            service_base_url: "https://git.example.org/api/v1/repos/".into(),
            api_token: "t0k".into(),
        }
    }

    fn press_event(data: &str) -> CallbackQueryEvent {
        CallbackQueryEvent {
            callback_id: "cb-1".into(),
            chat_id: ChatId(3),
            message_id: 50,
            user_id: 11,
            data: data.into(),
        }
    }

    #[tokio::test]
    async fn subscribe_seeds_current_tags() {
        let store = Arc::new(InMemorySubscriptionRepository::default());
        let registry =
            FakeRegistry::default().with("grafana/grafana", Ok(vec![Tag::new("11.0"), Tag::new("11.1")]));
        let service = SubscriptionService::new(store.clone(), Arc::new(registry));

        let outcome = service.subscribe(ChatId(3), add_request("grafana/grafana")).await.expect("subscribe");
        let SubscribeOutcome::Added(subscription) = outcome else {
            panic!("expected new subscription");
        };
        assert_eq!(subscription.last_seen_tags, vec!["11.0", "11.1"]);
        assert_eq!(subscription.deploy.local_repo_path.as_deref(), Some("Gano/Grafana"));

        let again = service.subscribe(ChatId(3), add_request("grafana/grafana")).await.expect("repeat");
        assert!(matches!(again, SubscribeOutcome::AlreadyTracked(_)));
    }

    #[tokio::test]
    async fn subscribing_to_missing_repository_leaves_store_unchanged() {
        let store = Arc::new(InMemorySubscriptionRepository::default());
        let registry = FakeRegistry::default().with(
            "library/flaky",
            Err(RegistryError::Transient { repository: repo("flaky"), message: "timeout".into() }),
        );
        let service = SubscriptionService::new(store.clone(), Arc::new(registry));

        let missing = service.subscribe(ChatId(3), add_request("ghost/image")).await;
        assert!(matches!(missing, Err(ApplicationError::Registry(RegistryError::NotFound { .. }))));

        let flaky = service.subscribe(ChatId(3), add_request("flaky")).await;
        assert!(matches!(flaky, Err(ApplicationError::Registry(RegistryError::Transient { .. }))));

        assert!(store.list_all().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn command_router_end_to_end_over_service() {
        let store = Arc::new(InMemorySubscriptionRepository::default());
        let registry = FakeRegistry::default().with("library/redis", Ok(vec![Tag::new("7.4")]));
        let router = CommandRouter::new(SubscriptionService::new(store.clone(), Arc::new(registry)));

        let command = |text: &str| {
            normalize_command(
                &IncomingMessage { chat_id: ChatId(3), message_id: 1, user_id: None, text: text.into() },
                None,
            )
            .expect("command")
        };

        let added = router
            .route(command("/addrepo redis org/cache https://git.example.org tok"))
            .await
            .expect("add");
        assert!(added.fallback_text.contains("Currently tracking 1 tags"));

        let missing =
            router.route(command("/addrepo nope org/x https://git.example.org tok")).await.expect("reply");
        assert!(missing.fallback_text.contains("Please ensure it exists and is public"));

        let listed = router.route(command("/listrepos")).await.expect("list");
        assert!(listed.fallback_text.contains("library/redis"));
        assert!(listed.fallback_text.contains("Service Base URL: https://git.example.org/"));

        let removed = router.route(command("/delrepo redis")).await.expect("del");
        assert!(removed.fallback_text.contains("removed"));
        let again = router.route(command("/delrepo redis")).await.expect("del");
        assert!(again.fallback_text.contains("not found"));
    }

    async fn deploy_fixture(
        target: DeployTarget,
        results: Vec<Result<DeployOutcome, DeployError>>,
    ) -> (DeployActionService, Arc<RecordingSender>, Arc<ScriptedTrigger>) {
        let store = Arc::new(InMemorySubscriptionRepository::default());
        store
            .save(Subscription::new(SubscriptionKey::new(ChatId(3), repo("grafana/grafana")), vec![], target))
            .await
            .expect("seed");
        let sender = Arc::new(RecordingSender::default());
        let trigger = Arc::new(ScriptedTrigger::new(results));
        (DeployActionService::new(store, trigger.clone(), sender.clone()), sender, trigger)
    }

    #[tokio::test]
    async fn successful_press_walks_state_machine_and_reports_status() {
        let (service, sender, trigger) = deploy_fixture(
            DeployTarget::new("gano/grafana", "https://git.example.org/api/v1/repos/", "t0k"),
            vec![Ok(DeployOutcome { status_code: 201 })],
        )
        .await;

        let token = ActionToken::parse("deploy:grafana/grafana:11.2.0").expect("token");
        let state = service
            .press(&press_event("deploy:grafana/grafana:11.2.0"), token, &EventContext::default())
            .await
            .expect("press");
        assert_eq!(state, DeployState::Succeeded);

        let requests = trigger.requests.lock().await.clone();
        assert_eq!(
            requests,
            vec![(
                "https://git.example.org/api/v1/repos/gano/grafana/tags".to_owned(),
                "11.2.0".to_owned()
            )]
        );

        let texts = sender.texts().await;
        assert_eq!(texts[0].0, "edit");
        assert!(texts[0].1.contains("Attempting to create tag for 11.2.0"));
        assert_eq!(texts[1].0, "send");
        assert!(texts[1].1.contains("Service responded with 201"));
    }

    #[tokio::test]
    async fn failed_webhook_reports_error() {
        let (service, sender, _trigger) = deploy_fixture(
            DeployTarget::new("gano/grafana", "https://git.example.org/", "t0k"),
            vec![Err(DeployError::Status { status: 500, reason: "Internal Server Error".into() })],
        )
        .await;

        service
            .handle_button(&press_event("deploy:grafana/grafana:11.2.0"), &EventContext::default())
            .await
            .expect("handled");

        let texts = sender.texts().await;
        assert_eq!(texts[0], ("answer".to_owned(), "cb-1".to_owned()));
        assert!(texts.last().expect("message").1.contains("HTTP error 500: Internal Server Error"));
    }

    #[tokio::test]
    async fn incomplete_configuration_stops_before_webhook() {
        let mut target = DeployTarget::new("gano/grafana", "https://git.example.org/", "t0k");
        target.api_token = None;
        let (service, sender, trigger) = deploy_fixture(target, vec![]).await;

        let token = ActionToken::parse("deploy:grafana/grafana:11.2.0").expect("token");
        let state = service
            .press(&press_event("deploy:grafana/grafana:11.2.0"), token, &EventContext::default())
            .await
            .expect("press");

        assert_eq!(state, DeployState::Pressed);
        assert!(trigger.requests.lock().await.is_empty());
        assert!(sender.texts().await[0].1.contains("Deployment configuration incomplete"));
    }

    #[tokio::test]
    async fn press_for_untracked_repository_is_incomplete() {
        let (service, sender, trigger) = deploy_fixture(DeployTarget::default(), vec![]).await;

        service
            .handle_button(&press_event("deploy:library/nginx:1.0"), &EventContext::default())
            .await
            .expect("handled");

        assert!(trigger.requests.lock().await.is_empty());
        assert!(sender.texts().await[1].1.contains("configuration incomplete"));
    }

    #[tokio::test]
    async fn unknown_action_is_reported() {
        let (service, sender, _trigger) = deploy_fixture(DeployTarget::default(), vec![]).await;

        service
            .handle_button(&press_event("rollback:library/nginx:1.0"), &EventContext::default())
            .await
            .expect("handled");

        assert_eq!(sender.texts().await[1], ("edit".to_owned(), "Unknown action: rollback".to_owned()));
    }
}
