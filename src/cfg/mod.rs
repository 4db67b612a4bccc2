use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, Default)]
/// Configuration regarding the discord bot configuration
/// this includes the token of the discord bot.
pub struct DiscordConfig {
    pub token: String,
}

#[derive(Deserialize, Debug, Clone)]
/// Controls how and when birthdays are announced.
/// Check each field for the documentation and usages.
pub struct BirthdayConfig {
    /// Name of the text channel the announcements are sent to.
    /// A guild without a channel of this name is skipped.
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Time between two birthday checks.
    /// This uses the humantime syntax, e.g. "30m".
    /// Checks are aligned on this period measured from the top of the
    /// hour, so it must divide an hour or be a whole number of hours.
    #[serde(default = "default_period")]
    pub period: String,
}

impl Default for BirthdayConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            period: default_period(),
        }
    }
}

fn default_channel() -> String {
    "birthdays".to_string()
}

fn default_period() -> String {
    "30m".to_string()
}

#[derive(Deserialize, Debug, Clone, Default)]
/// Specifies the configuration for the database.
pub struct StorageConfig {
    /// Relative or absolute path to the database file.
    /// this file is versionned and need to be saved on a real disk.
    pub path: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
/// Main configuration structure
/// This does not have any particular meaning; It just contains
/// all the configuration blocks.
pub struct Config {
    pub discord: DiscordConfig,
    pub birthday: BirthdayConfig,
    pub storage: StorageConfig,
}
