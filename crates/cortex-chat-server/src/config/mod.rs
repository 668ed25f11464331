pub mod settings;

pub use settings::{PlatformConfig, RoutingConfig, ServerConfig, SessionDefaults, Settings};
