pub mod repositories;

pub use repositories::{
    InMemorySubscriptionRepository, JsonFileSubscriptionRepository, RepositoryError,
    SubscriptionRepository,
};
