use serde::{Deserialize, Serialize};

/// Placement policy and pool sizes for the script heap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// Minimum request size that prefers the extended pool (default: 16 bytes)
    #[serde(default = "default_threshold_bytes")]
    pub threshold_bytes: usize,

    /// Whether large requests try the extended pool first (default: true)
    #[serde(default = "default_prefer_extended")]
    pub prefer_extended: bool,

    /// Size of the small, fast near pool in bytes (default: 320 KiB)
    #[serde(default = "default_near_capacity")]
    pub near_capacity: usize,

    /// Size of the larger, slower extended pool in bytes (default: 8 MiB)
    #[serde(default = "default_extended_capacity")]
    pub extended_capacity: usize,
}

fn default_threshold_bytes() -> usize {
    16
}

fn default_prefer_extended() -> bool {
    true
}

fn default_near_capacity() -> usize {
    320 * 1024
}

fn default_extended_capacity() -> usize {
    8 * 1024 * 1024
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: default_threshold_bytes(),
            prefer_extended: default_prefer_extended(),
            near_capacity: default_near_capacity(),
            extended_capacity: default_extended_capacity(),
        }
    }
}
