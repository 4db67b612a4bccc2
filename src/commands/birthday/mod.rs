use anyhow::Context as _;
use chrono::{
    DateTime, Datelike, Duration, FixedOffset, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc,
};
use chrono_tz::Tz;
use futures::{Stream, StreamExt};
use poise::serenity_prelude::{Colour, CreateEmbed, UserId};
use poise::CreateReply;
use thiserror::Error;

use crate::birthday::{store::BirthdayRecord, upcoming};
use crate::bot::CommandContext;

const SUCCESS: Colour = Colour::DARK_GREEN;
const ERROR: Colour = Colour::RED;
const WARNING: Colour = Colour::ORANGE;
const INFO: Colour = Colour::BLURPLE;

const MINIMUM_AGE: i32 = 13;

/// Rejections of the `set` subcommand. The display strings are the
/// replies shown to the user; these never reach the logs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SetError {
    #[error("Timezone not found")]
    UnknownTimezone,
    #[error("That's not a valid calendar date")]
    InvalidDate,
    #[error("You can't set a birthday in the future")]
    FutureDate,
    #[error("You must be at least {MINIMUM_AGE} years old to set a birthday")]
    UnderAge,
}

/// Validates the submitted date and zone against `now` and returns the
/// birthday as local midnight with the offset in effect at that date.
fn validate(
    day: u32,
    month: u32,
    year: i32,
    timezone: &str,
    now: DateTime<Utc>,
) -> Result<(DateTime<FixedOffset>, Tz), SetError> {
    let tz: Tz = timezone.parse().map_err(|_| SetError::UnknownTimezone)?;

    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or(SetError::InvalidDate)?;
    let birthday = local_midnight(tz, date).ok_or(SetError::InvalidDate)?;

    if birthday > now {
        return Err(SetError::FutureDate);
    }

    let today = now.with_timezone(&tz).date_naive();
    let mut age = today.year() - year;
    if (today.month(), today.day()) < (month, day) {
        age -= 1;
    }
    if age < MINIMUM_AGE {
        return Err(SetError::UnderAge);
    }

    Ok((birthday.fixed_offset(), tz))
}

/// Local midnight on `date`, or the first representable local time
/// after it when a DST transition skips midnight (America/Santiago and
/// a few other zones switch at 00:00). A repeated midnight resolves to
/// the earlier of the two instants.
fn local_midnight(tz: Tz, date: NaiveDate) -> Option<DateTime<Tz>> {
    let mut time = date.and_time(NaiveTime::MIN);

    // real gaps are at most two hours wide
    for _ in 0..8 {
        match tz.from_local_datetime(&time) {
            LocalResult::Single(local) => return Some(local),
            LocalResult::Ambiguous(earliest, _) => return Some(earliest),
            LocalResult::None => time += Duration::minutes(15),
        }
    }

    None
}

async fn autocomplete_timezone(
    _ctx: CommandContext<'_>,
    partial: &str,
) -> impl Stream<Item = String> {
    let query = partial.to_lowercase().replace(' ', "_");

    futures::stream::iter(chrono_tz::TZ_VARIANTS)
        .map(|tz| tz.name().to_string())
        .filter(move |name| futures::future::ready(name.to_lowercase().contains(&query)))
        .take(25)
}

#[poise::command(
    slash_command,
    rename = "birthday",
    subcommands("set", "delete", "show", "upcoming")
)]
pub async fn root(_: CommandContext<'_>) -> Result<(), anyhow::Error> {
    unreachable!();
}

#[poise::command(slash_command)]
/// Set your birthday
pub async fn set(
    ctx: CommandContext<'_>,
    #[description = "Day of your birthday"]
    #[min = 1]
    #[max = 31]
    day: u32,
    #[description = "Month of your birthday"]
    #[min = 1]
    #[max = 12]
    month: u32,
    #[description = "Year of your birthday"] year: i32,
    #[description = "Your timezone (Type to search)"]
    #[autocomplete = "autocomplete_timezone"]
    timezone: String,
) -> Result<(), anyhow::Error> {
    let (birthday, tz) = match validate(day, month, year, &timezone, Utc::now()) {
        Ok(validated) => validated,
        Err(err) => {
            let embed = CreateEmbed::new().description(err.to_string()).colour(ERROR);
            ctx.send(CreateReply::default().embed(embed).ephemeral(true))
                .await?;
            return Ok(());
        }
    };

    let record = BirthdayRecord {
        user: ctx.author().id,
        birthday,
        timezone: tz,
    };
    {
        let mut guard = ctx.data().store.write().await;
        let store = guard.as_mut().context("storage is unavailable")?;
        store.upsert(record)?;
    }

    let embed = CreateEmbed::new()
        .title("Birthday set")
        .colour(SUCCESS)
        .field("Date", format!("<t:{}:d>", birthday.timestamp()), true)
        .field("Timezone", tz.name(), true);
    ctx.send(CreateReply::default().embed(embed).ephemeral(true))
        .await?;

    Ok(())
}

#[poise::command(slash_command)]
/// Delete your birthday
pub async fn delete(ctx: CommandContext<'_>) -> Result<(), anyhow::Error> {
    let removed = {
        let mut guard = ctx.data().store.write().await;
        let store = guard.as_mut().context("storage is unavailable")?;
        store.delete(ctx.author().id)?
    };

    let embed = match removed {
        Some(_) => CreateEmbed::new().description("Birthday deleted").colour(ERROR),
        None => CreateEmbed::new()
            .description("You haven't set a birthday yet")
            .colour(WARNING),
    };
    ctx.send(CreateReply::default().embed(embed).ephemeral(true))
        .await?;

    Ok(())
}

#[poise::command(slash_command)]
/// Show your birthday
pub async fn show(ctx: CommandContext<'_>) -> Result<(), anyhow::Error> {
    let record = {
        let guard = ctx.data().store.read().await;
        let store = guard.as_ref().context("storage is unavailable")?;
        store.get(ctx.author().id).cloned()
    };

    let embed = match record {
        Some(record) => CreateEmbed::new()
            .title("Your birthday")
            .colour(INFO)
            .field("Date", format!("<t:{}:d>", record.birthday.timestamp()), true)
            .field("Timezone", record.timezone.name(), true),
        None => CreateEmbed::new()
            .description("You haven't set a birthday yet")
            .colour(WARNING),
    };
    ctx.send(CreateReply::default().embed(embed).ephemeral(true))
        .await?;

    Ok(())
}

#[poise::command(slash_command, guild_only)]
/// Show upcoming birthdays
pub async fn upcoming(ctx: CommandContext<'_>) -> Result<(), anyhow::Error> {
    // roster of the invoking guild, collected before any await point
    let members: Vec<UserId> = {
        let guild = ctx.guild().context("not invoked in a guild")?;
        guild.members.keys().copied().collect()
    };

    let records: Vec<BirthdayRecord> = {
        let guard = ctx.data().store.read().await;
        let store = guard.as_ref().context("storage is unavailable")?;
        store.find_many(&members).into_iter().cloned().collect()
    };

    if records.is_empty() {
        let embed = CreateEmbed::new()
            .description("No upcoming birthdays")
            .colour(WARNING);
        ctx.send(CreateReply::default().embed(embed)).await?;
        return Ok(());
    }

    let mut embed = CreateEmbed::new().title("Upcoming Birthdays").colour(INFO);
    for (bucket, entries) in upcoming::agenda(&records, Utc::now()) {
        for entry in entries {
            embed = embed.field(
                bucket.to_string(),
                format!(
                    "- <@{}> <t:{}:d> ({})",
                    entry.user,
                    entry.next_occurrence.timestamp(),
                    entry.timezone.name()
                ),
                false,
            );
        }
    }
    ctx.send(CreateReply::default().embed(embed)).await?;

    Ok(())
}
