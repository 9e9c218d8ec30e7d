pub mod cache;
pub mod config;
pub mod controller;
mod error;
pub mod history;
pub mod messaging;
pub mod models;
pub mod orchestrator;
pub mod processor;
pub mod repo;
pub mod selector;
pub mod vip;

pub use cache::{cached, CacheHost, CacheKey, TtlCache};
pub use config::AppConfig;
pub use controller::ServerController;
pub use error::{DatastoreError, Error, Result};
pub use history::LayerHistory;
pub use messaging::{MessageSender, PlayerMatcher, PlayerProperties};
pub use models::{
    EnvironmentGroup, MapGroup, ServerParameters, ServerRecord, VipInfo, WeightingParameters,
};
pub use orchestrator::Orchestrator;
pub use processor::{VotemapProcessor, VotemapSettings};
pub use repo::{JsonFileRepository, ServerRepository};
pub use selector::MapSelector;
pub use vip::VipManager;
