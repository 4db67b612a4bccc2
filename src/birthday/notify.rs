use std::sync::Arc;

use log::{debug, error};
use poise::serenity_prelude::{Cache, ChannelId, ChannelType, CreateMessage, GuildId, Http, UserId};

use super::GreetEvent;

/// Delivers greet events to the announcement channel of every guild the
/// user is a member of.
pub struct Notifier {
    http: Arc<Http>,
    cache: Arc<Cache>,
    channel: String,
}

impl Notifier {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>, channel: String) -> Self {
        Self { http, cache, channel }
    }

    /// Best-effort delivery: a guild with a failing send is logged and
    /// the remaining guilds still receive the message. No retries.
    pub async fn deliver(&self, greet: &GreetEvent) -> Result<(), anyhow::Error> {
        let destinations = self.destinations(greet.user);
        if destinations.is_empty() {
            debug!("no announcement channel reachable for {}", greet.user);
            return Ok(());
        }

        let content = greeting(greet);
        for (guild, channel) in destinations {
            if let Err(err) = channel
                .send_message(&self.http, CreateMessage::new().content(content.clone()))
                .await
            {
                error!(
                    "failed to deliver the greeting for {} in guild {}: {}",
                    greet.user, guild, err
                );
            }
        }

        Ok(())
    }

    /// Announcement channels of the guilds the user belongs to.
    /// Guilds without a text channel of the configured name are skipped.
    fn destinations(&self, user: UserId) -> Vec<(GuildId, ChannelId)> {
        let mut found = Vec::new();

        for guild_id in self.cache.guilds() {
            let guild = match self.cache.guild(guild_id) {
                Some(guild) => guild,
                None => continue,
            };
            if !guild.members.contains_key(&user) {
                continue;
            }

            let channel = guild
                .channels
                .values()
                .find(|channel| channel.kind == ChannelType::Text && channel.name == self.channel);

            match channel {
                Some(channel) => found.push((guild_id, channel.id)),
                None => debug!("guild {} has no #{} channel, skipping", guild_id, self.channel),
            }
        }

        found
    }
}

fn greeting(greet: &GreetEvent) -> String {
    format!(
        "Happy Birthday <@{}>! 🎉🎂\nYou're now {} Years old!",
        greet.user, greet.age
    )
}
