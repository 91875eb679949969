pub mod live;
pub mod loader;
pub mod model;

pub use live::LiveConfig;
pub use loader::{load_from_file, watch, ConfigError};
pub use model::{
    AuthConfig, CacheConfig, ConfigFile, ConfigSnapshot, KeyConfig, LimitsConfig, LoggingConfig,
    ProviderConfig, ProviderKindConfig, RoutingConfig,
};
