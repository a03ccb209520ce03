use std::time::Duration;

/// The configuration of the room system
#[derive(Debug, Clone)]
pub struct Config {
    /// How many previously played tracks a room remembers
    pub history_size: usize,
    /// How many chat messages a room keeps before dropping the oldest
    pub chat_log_size: usize,
    /// How long a metadata lookup may take before a placeholder is used
    pub resolve_timeout: Duration,
    /// The number of characters in a generated room id
    pub room_id_length: usize,
    /// Prefix of the name given to sessions that never registered one
    pub guest_name_prefix: String,
}

impl Config {
    /// Returns a generated display name for an unregistered session
    pub fn guest_name(&self, suffix: u32) -> String {
        format!("{}{}", self.guest_name_prefix, suffix)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_size: 20,
            chat_log_size: 100,
            // The oEmbed endpoint usually answers well within a second
            resolve_timeout: Duration::from_secs(5),
            // Short enough to read out loud
            room_id_length: 6,
            guest_name_prefix: "Guest".to_string(),
        }
    }
}
