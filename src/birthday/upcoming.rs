use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use log::warn;
use poise::serenity_prelude::UserId;

use super::store::BirthdayRecord;

/// Human time-distance to a next occurrence. The derived `Ord` gives the
/// display order: today first, then day buckets, then month buckets,
/// each ascending by count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Bucket {
    Today,
    Days(i64),
    Months(i64),
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Today => write!(f, "Today"),
            Self::Days(1) => write!(f, "In 1 Day"),
            Self::Days(days) => write!(f, "In {} Days", days),
            Self::Months(1) => write!(f, "In 1 Month"),
            Self::Months(months) => write!(f, "In {} Months", months),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgendaEntry {
    pub user: UserId,
    /// Next occurrence of the birthday, local midnight in the user's zone.
    pub next_occurrence: DateTime<Utc>,
    pub timezone: Tz,
}

/// Groups the given records by time-distance buckets, sorted nearest
/// first. Entries keep the scan order of `records` within a bucket.
/// An empty input yields an empty agenda, which callers report as
/// "no upcoming birthdays" rather than an error.
pub fn agenda(records: &[BirthdayRecord], now: DateTime<Utc>) -> Vec<(Bucket, Vec<AgendaEntry>)> {
    let mut buckets: BTreeMap<Bucket, Vec<AgendaEntry>> = BTreeMap::new();

    for record in records {
        let next = match next_occurrence(record, now) {
            Some(next) => next,
            None => {
                warn!("skipping the record of {}: no next occurrence", record.user);
                continue;
            }
        };

        buckets
            .entry(bucket_for(&next, now))
            .or_default()
            .push(AgendaEntry {
                user: record.user,
                next_occurrence: next.with_timezone(&Utc),
                timezone: record.timezone,
            });
    }

    buckets.into_iter().collect()
}

/// The stored birthday re-anchored to the current year, or the next one
/// if that moment has already passed.
fn next_occurrence(record: &BirthdayRecord, now: DateTime<Utc>) -> Option<DateTime<Tz>> {
    let local = record.birthday.with_timezone(&record.timezone);

    let this_year = reanchor(&local, now.year())?;
    if this_year < now {
        reanchor(&local, now.year() + 1)
    } else {
        Some(this_year)
    }
}

/// Feb 29 birthdays roll over to Mar 1 in common years.
fn reanchor(local: &DateTime<Tz>, year: i32) -> Option<DateTime<Tz>> {
    local.with_year(year).or_else(|| {
        local
            .with_day(1)
            .and_then(|d| d.with_month(3))
            .and_then(|d| d.with_year(year))
    })
}

fn bucket_for(next: &DateTime<Tz>, now: DateTime<Utc>) -> Bucket {
    let days = (next.with_timezone(&Utc) - now).num_days();

    if days == 0 {
        Bucket::Today
    } else if days <= 30 {
        Bucket::Days(days)
    } else {
        let months =
            i64::from(next.year() - now.year()) * 12 + i64::from(next.month()) - i64::from(now.month());
        Bucket::Months(months)
    }
}
