use murmure_shared::constants::EXTERNAL_SIZE_THRESHOLD;

/// Tunables of the encryption core.
///
/// Defaults match the production wire contract; tests shrink the threshold
/// to exercise the externalized path without megabyte payloads.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Serialized envelope size at or above which the payload is
    /// externalized instead of fanned out per device.
    pub external_threshold: usize,
    /// When set, service (bot) participants of a group only receive a
    /// message if it @-mentions them.
    pub services_must_be_mentioned: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            external_threshold: EXTERNAL_SIZE_THRESHOLD,
            services_must_be_mentioned: true,
        }
    }
}
