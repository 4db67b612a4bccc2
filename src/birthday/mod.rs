use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, Utc};
use log::info;
use poise::serenity_prelude::{Cache, Http, UserId};
use tokio::time::sleep;

use crate::bot::Bot;

pub mod notify;
pub mod scheduler;
pub mod store;
pub mod upcoming;

/// One birthday match produced by a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GreetEvent {
    pub user: UserId,
    pub age: i32,
}

/// Long-running loop driving the periodic birthday checks.
/// Waits for the next period boundary, runs one tick, repeats; a
/// shutdown signal cancels the wait. Ticks never overlap since the next
/// boundary is only computed once the previous pass finished.
pub async fn scheduler_task(
    bot: Arc<Bot>,
    http: Arc<Http>,
    cache: Arc<Cache>,
) -> Result<(), anyhow::Error> {
    let mut shutdown = bot.shutdown.resubscribe();
    let config = &bot.data.config;

    let period = Duration::from_std(
        humantime::parse_duration(&config.birthday.period)
            .context("invalid format in the period duration")?,
    )
    .context("failed to get a duration from standard")?;

    let notifier = notify::Notifier::new(http, cache, config.birthday.channel.clone());

    loop {
        // calculate the next boundary and wait
        let current_time = Utc::now();
        let next = scheduler::next_tick(current_time, period)?;

        let sleep_time = next - current_time;
        info!(
            "waiting {}s, next birthday check at {}",
            sleep_time.num_seconds(),
            next
        );

        let wait = sleep(
            sleep_time
                .to_std()
                .context("failed to convert a chrono duration to a std duration")?,
        );

        tokio::select! {
            _ = wait => {
                scheduler::run_tick(&bot.data.store, &notifier, Utc::now()).await;
            },
            _ = shutdown.recv() => {
                return Ok(());
            }
        }
    }
}
