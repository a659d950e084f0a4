use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Mount point of the removable storage holding user scripts (default: /sdcard)
    #[serde(default = "default_mount_path")]
    pub mount_path: PathBuf,

    /// Script file extension, with or without the leading dot (default: lua)
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Module required at startup (default: main)
    #[serde(default = "default_entry")]
    pub entry: String,
}

fn default_mount_path() -> PathBuf {
    PathBuf::from("/sdcard")
}

fn default_extension() -> String {
    "lua".to_string()
}

fn default_entry() -> String {
    "main".to_string()
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            mount_path: default_mount_path(),
            extension: default_extension(),
            entry: default_entry(),
        }
    }
}

impl ModuleConfig {
    /// The extension without any leading dot
    pub fn bare_extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }
}
