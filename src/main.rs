use std::sync::Arc;

use anyhow::Context;
use config::{Config, Environment, File};

use crate::bot::Bot;

mod birthday;
mod bot;
mod cfg;
mod commands;

/// Loads the configuration using the `config` crate
fn load_config() -> Result<cfg::Config, anyhow::Error> {
    let settings = Config::builder()
        .add_source(File::with_name("config"))
        .add_source(Environment::with_prefix("BIRTHDAY"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[tokio::main]
/// Entrypoint for the birthday discord bot.
/// It stores the birthday and timezone of each member and wishes them a
/// happy birthday in the configured channel at their local midnight.
async fn main() -> Result<(), anyhow::Error> {
    // Initialize the logger
    pretty_env_logger::init();

    // load the config
    let config = Arc::from(load_config().context("failed to load the configuration")?);

    let bot = Bot::new(config).await?;
    bot.start().await
}
