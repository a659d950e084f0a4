pub mod allocator_config;
pub mod glint_config;
pub mod logging_config;
pub mod module_config;
pub mod paths;

pub use allocator_config::AllocatorConfig;
pub use glint_config::{ConfigLoadError, GlintConfig};
pub use logging_config::LoggingConfig;
pub use module_config::ModuleConfig;
pub use paths::ProjectPaths;
