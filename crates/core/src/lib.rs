pub mod config;
pub mod domain;
pub mod errors;
pub mod watch;

pub use domain::deploy::{DeployOutcome, DeployRequest, DeployRun, DeployState, DeployTrigger};
pub use domain::repository::RepositoryName;
pub use domain::subscription::{ChatId, DeployEndpoint, DeployTarget, Subscription, SubscriptionKey};
pub use domain::tag::Tag;
pub use errors::{
    ApplicationError, DeployError, DomainError, InterfaceError, RegistryError,
};
pub use watch::action::{ActionKind, ActionToken, ACTION_TOKEN_MAX_BYTES};
pub use watch::{compute_delta, is_deployable, Exclusion, ExcludedTag, TagDelta, TagSource};
