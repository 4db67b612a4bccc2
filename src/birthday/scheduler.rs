use anyhow::{ensure, Context};
use chrono::{DateTime, Duration, Timelike, Utc};
use log::{debug, error, info};
use tokio::sync::RwLock;

use super::{notify::Notifier, store::Store, GreetEvent};

/// First period boundary strictly after `after`, measured from the top
/// of the hour. For a 30 minute period this is the next :00 or :30
/// wall-clock mark, so ticks land at deterministic times instead of
/// drifting with the process start. The period must divide an hour or
/// be a whole number of hours; anything else would make consecutive
/// boundaries unevenly spaced, since each one is measured from the
/// hour it falls in.
pub fn next_tick(after: DateTime<Utc>, period: Duration) -> Result<DateTime<Utc>, anyhow::Error> {
    let step = period.num_seconds();
    ensure!(step > 0, "the tick period must be positive");
    ensure!(
        3600 % step == 0 || step % 3600 == 0,
        "the tick period must divide an hour or be a whole number of hours"
    );

    let hour_start = after
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .context("failed to truncate to the top of the hour")?;
    let elapsed = (after - hour_start).num_seconds();

    Ok(hour_start + Duration::seconds((elapsed / step + 1) * step))
}

/// One pass of the birthday check: collect the records due at `now`
/// under a read guard, then hand one greet event per match to the
/// notifier. A failing delivery is logged and never blocks the rest of
/// the batch.
pub async fn run_tick(store: &RwLock<Option<Store>>, notifier: &Notifier, now: DateTime<Utc>) {
    let due: Vec<GreetEvent> = {
        let guard = store.read().await;
        let store = match guard.as_ref() {
            Some(store) => store,
            None => {
                debug!("storage is unavailable, skipping the birthday check");
                return;
            }
        };

        store
            .find_due_at(now)
            .into_iter()
            .map(|record| GreetEvent {
                user: record.user,
                age: record.age_at(now),
            })
            .collect()
    };

    if due.is_empty() {
        debug!("no birthdays due at {}", now);
        return;
    }

    info!("{} birthday(s) due at {}", due.len(), now);
    for greet in due {
        if let Err(err) = notifier.deliver(&greet).await {
            error!("failed to announce the birthday of {}: {:?}", greet.user, err);
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 12, hour, minute, second).unwrap()
    }

    #[test]
    fn first_tick_lands_on_the_next_half_hour_mark() {
        let period = Duration::minutes(30);

        assert_eq!(next_tick(at(12, 0, 0), period).unwrap(), at(12, 30, 0));
        assert_eq!(next_tick(at(12, 0, 1), period).unwrap(), at(12, 30, 0));
        assert_eq!(next_tick(at(12, 29, 59), period).unwrap(), at(12, 30, 0));
        assert_eq!(next_tick(at(12, 31, 0), period).unwrap(), at(13, 0, 0));
        assert_eq!(next_tick(at(12, 59, 59), period).unwrap(), at(13, 0, 0));
    }

    #[test]
    fn boundary_is_strictly_after_start() {
        let period = Duration::minutes(30);

        // starting exactly on a mark schedules the next one
        assert_eq!(next_tick(at(12, 30, 0), period).unwrap(), at(13, 0, 0));
        assert_eq!(next_tick(at(13, 0, 0), period).unwrap(), at(13, 30, 0));
    }

    #[test]
    fn other_periods_align_from_the_top_of_the_hour() {
        let period = Duration::minutes(15);

        assert_eq!(next_tick(at(12, 7, 13), period).unwrap(), at(12, 15, 0));
        assert_eq!(next_tick(at(12, 46, 0), period).unwrap(), at(13, 0, 0));
    }

    #[test]
    fn hour_multiple_periods_stay_a_fixed_interval_apart() {
        let period = Duration::hours(2);

        let first = next_tick(at(12, 7, 13), period).unwrap();
        assert_eq!(first, at(14, 0, 0));
        assert_eq!(next_tick(first, period).unwrap(), at(16, 0, 0));
    }

    #[test]
    fn zero_period_is_rejected() {
        assert!(next_tick(at(12, 0, 0), Duration::zero()).is_err());
    }

    #[test]
    fn uneven_periods_are_rejected() {
        // 45m boundaries would be measured from a different hour each
        // time, giving unevenly spaced ticks
        assert!(next_tick(at(12, 0, 0), Duration::minutes(45)).is_err());
        assert!(next_tick(at(12, 0, 0), Duration::minutes(90)).is_err());
    }
}
