pub mod cache;
pub mod error;
pub mod mirror;
pub mod service_config;

pub use cache::TtlCache;
pub use error::MirrorError;
pub use mirror::{ConfigMirror, CONFIG_SERVICE_SLUG};
pub use service_config::{to_target, DenyReason, ServiceConfig, Target};
