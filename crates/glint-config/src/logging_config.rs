use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to a file in the data directory
    #[serde(default)]
    pub file: bool,

    /// Default filter directive when RUST_LOG is not set (e.g. "info,timers=debug")
    #[serde(default)]
    pub filter: Option<String>,
}
