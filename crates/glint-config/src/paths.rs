use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Platform-specific locations for glint's configuration and data.
///
/// On Linux this follows the XDG Base Directory spec
/// (`~/.config/glint`, `~/.local/share/glint`), on macOS and Windows the
/// platform conventions chosen by `directories`.
pub struct ProjectPaths {
    dirs: ProjectDirs,
}

impl ProjectPaths {
    /// Resolve the paths for the given application name.
    ///
    /// Returns `None` when no home directory can be determined.
    pub fn new(name: &str) -> Option<Self> {
        ProjectDirs::from("", "", name).map(|dirs| Self { dirs })
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Path {
        self.dirs.config_dir()
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> &Path {
        self.dirs.data_dir()
    }

    /// Directory for log files
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_contain_name() {
        if let Some(paths) = ProjectPaths::new("glint") {
            assert!(paths.config_dir().to_string_lossy().contains("glint"));
            assert!(paths.data_dir().to_string_lossy().contains("glint"));
            assert!(paths.log_dir().ends_with("logs"));
        }
    }
}
