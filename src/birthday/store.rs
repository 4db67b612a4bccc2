use std::{collections::HashMap, fs, io};

use anyhow::bail;
use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc};
use chrono_tz::Tz;
use poise::serenity_prelude::UserId;
use serde::{Deserialize, Serialize};

use crate::cfg::Config;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// This struct is stored on disk and indexed by the user id.
/// One record per user; setting a birthday again overwrites it.
pub struct BirthdayRecord {
    /// Discord user the birthday belongs to.
    pub user: UserId,
    /// Moment of birth (local midnight on the set date), kept with
    /// the utc offset that was in effect in the zone when it was set.
    pub birthday: DateTime<FixedOffset>,
    /// Authoritative zone used to reconstruct the local wall clock.
    pub timezone: Tz,
}

impl BirthdayRecord {
    /// A record is due when `instant`, seen from the record's own zone,
    /// lands on the same month, day, hour and minute as the stored
    /// birthday seen from that zone. The zone conversion resolves the
    /// historical offset of the stored instant, so records set across a
    /// DST transition keep matching their original wall clock.
    pub fn is_due_at(&self, instant: DateTime<Utc>) -> bool {
        let local_now = instant.with_timezone(&self.timezone);
        let local_birthday = self.birthday.with_timezone(&self.timezone);

        (local_now.month(), local_now.day()) == (local_birthday.month(), local_birthday.day())
            && (local_now.hour(), local_now.minute())
                == (local_birthday.hour(), local_birthday.minute())
    }

    /// Calendar-year subtraction in the record's zone.
    /// This is knowingly approximate around leap days; the person turns
    /// "N years old" the moment their local date matches.
    pub fn age_at(&self, instant: DateTime<Utc>) -> i32 {
        let local_now = instant.with_timezone(&self.timezone);
        let local_birthday = self.birthday.with_timezone(&self.timezone);

        local_now.year() - local_birthday.year()
    }
}

pub type Data = HashMap<UserId, BirthdayRecord>;

#[derive(Debug)]
pub struct Store {
    data: Data,
    save_path: String,
}

impl Store {
    pub fn open(config: &Config) -> Result<Self, anyhow::Error> {
        let path = shellexpand::full_with_context_no_errors(
            &config.storage.path,
            || dirs::home_dir().and_then(|p| p.to_str().map(|s| s.to_string())),
            |f| std::env::var(f).ok(),
        )
        .to_string();

        Self::at_path(path)
    }

    fn at_path(path: String) -> Result<Self, anyhow::Error> {
        match fs::read(&path) {
            Ok(r) => Ok(Self {
                data: postcard::from_bytes(&r)?,
                save_path: path,
            }),
            Err(err) => match err.kind() {
                // The only case where we can accept an error is when the db does not exists
                io::ErrorKind::NotFound => Ok(Self {
                    data: Data::default(),
                    save_path: path,
                }),
                _ => bail!(err),
            },
        }
    }

    fn persist(&self) -> Result<(), anyhow::Error> {
        let data = postcard::to_allocvec(&self.data)?;
        fs::write(&self.save_path, data)?;

        Ok(())
    }

    /// Replaces any existing record for the same user.
    /// Validation is the caller's responsibility.
    pub fn upsert(&mut self, record: BirthdayRecord) -> Result<(), anyhow::Error> {
        self.data.insert(record.user, record);
        self.persist()
    }

    pub fn get(&self, user: UserId) -> Option<&BirthdayRecord> {
        self.data.get(&user)
    }

    /// Removes the record and returns it, or `None` when nothing was set.
    pub fn delete(&mut self, user: UserId) -> Result<Option<BirthdayRecord>, anyhow::Error> {
        let removed = self.data.remove(&user);
        if removed.is_some() {
            self.persist()?;
        }

        Ok(removed)
    }

    /// Full scan applying the per-record due predicate.
    pub fn find_due_at(&self, instant: DateTime<Utc>) -> Vec<&BirthdayRecord> {
        self.data
            .values()
            .filter(|record| record.is_due_at(instant))
            .collect()
    }

    /// Records for the given users, in query order.
    pub fn find_many(&self, users: &[UserId]) -> Vec<&BirthdayRecord> {
        users.iter().filter_map(|user| self.data.get(user)).collect()
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;
    use chrono_tz::Tz;

    use super::*;

    fn record(user: u64, year: i32, month: u32, day: u32, tz: Tz) -> BirthdayRecord {
        BirthdayRecord {
            user: UserId::new(user),
            birthday: tz
                .with_ymd_and_hms(year, month, day, 0, 0, 0)
                .unwrap()
                .fixed_offset(),
            timezone: tz,
        }
    }

    fn temp_store(dir: &tempfile::TempDir) -> Store {
        let path = dir.path().join("birthdays.db");
        Store::at_path(path.to_str().unwrap().to_string()).unwrap()
    }

    #[test]
    fn set_show_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = temp_store(&dir);

        let rec = record(1, 1990, 6, 15, Tz::Europe__Berlin);
        store.upsert(rec.clone()).unwrap();

        assert_eq!(store.get(UserId::new(1)), Some(&rec));
        assert_eq!(store.get(UserId::new(2)), None);
    }

    #[test]
    fn upsert_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = temp_store(&dir);

        store.upsert(record(1, 1990, 6, 15, Tz::Europe__Berlin)).unwrap();
        let updated = record(1, 1991, 1, 2, Tz::Asia__Tokyo);
        store.upsert(updated.clone()).unwrap();

        assert_eq!(store.get(UserId::new(1)), Some(&updated));
        assert_eq!(store.find_many(&[UserId::new(1)]).len(), 1);
    }

    #[test]
    fn delete_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = temp_store(&dir);

        assert_eq!(store.delete(UserId::new(1)).unwrap(), None);

        store.upsert(record(1, 1990, 6, 15, Tz::UTC)).unwrap();
        assert!(store.delete(UserId::new(1)).unwrap().is_some());
        assert_eq!(store.get(UserId::new(1)), None);
    }

    #[test]
    fn reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("birthdays.db");
        let path = path.to_str().unwrap().to_string();

        let rec = record(7, 1985, 12, 31, Tz::Pacific__Auckland);
        {
            let mut store = Store::at_path(path.clone()).unwrap();
            store.upsert(rec.clone()).unwrap();
        }

        let store = Store::at_path(path).unwrap();
        assert_eq!(store.get(UserId::new(7)), Some(&rec));
    }

    #[test]
    fn find_many_preserves_query_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = temp_store(&dir);

        store.upsert(record(1, 1990, 1, 1, Tz::UTC)).unwrap();
        store.upsert(record(2, 1991, 2, 2, Tz::UTC)).unwrap();
        store.upsert(record(3, 1992, 3, 3, Tz::UTC)).unwrap();

        let users = [UserId::new(3), UserId::new(9), UserId::new(1)];
        let found: Vec<UserId> = store.find_many(&users).iter().map(|r| r.user).collect();

        assert_eq!(found, vec![UserId::new(3), UserId::new(1)]);
    }

    #[test]
    fn due_matches_local_wall_clock() {
        let rec = record(1, 2000, 7, 4, Tz::America__New_York);

        // local midnight on July 4th is 04:00 utc during EDT
        let due = Utc.with_ymd_and_hms(2026, 7, 4, 4, 0, 0).unwrap();
        assert!(rec.is_due_at(due));

        let wrong_hour = Utc.with_ymd_and_hms(2026, 7, 4, 5, 0, 0).unwrap();
        assert!(!rec.is_due_at(wrong_hour));

        let wrong_day = Utc.with_ymd_and_hms(2026, 7, 5, 4, 0, 0).unwrap();
        assert!(!rec.is_due_at(wrong_day));
    }

    #[test]
    fn due_across_dst_transition() {
        // Oct 29 2000 was the CEST -> CET switch day; local midnight
        // was still +02:00 when this record was set.
        let rec = record(1, 2000, 10, 29, Tz::Europe__Berlin);

        // In 2026 the switch lands on Oct 25, so local midnight on
        // Oct 29 is 23:00 utc the day before.
        let due = Utc.with_ymd_and_hms(2026, 10, 28, 23, 0, 0).unwrap();
        assert!(rec.is_due_at(due));

        // 22:00 utc was midnight under the original offset, but local
        // wall clock in 2026 says 23:00 the day before.
        let stale_offset = Utc.with_ymd_and_hms(2026, 10, 28, 22, 0, 0).unwrap();
        assert!(!rec.is_due_at(stale_offset));
    }

    #[test]
    fn find_due_at_filters_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = temp_store(&dir);

        store.upsert(record(1, 2000, 7, 4, Tz::UTC)).unwrap();
        store.upsert(record(2, 2000, 7, 4, Tz::America__New_York)).unwrap();
        store.upsert(record(3, 2000, 12, 25, Tz::UTC)).unwrap();

        let due = store.find_due_at(Utc.with_ymd_and_hms(2026, 7, 4, 0, 0, 0).unwrap());
        let users: Vec<UserId> = due.iter().map(|r| r.user).collect();

        assert_eq!(users, vec![UserId::new(1)]);
    }

    #[test]
    fn age_is_calendar_year_subtraction() {
        let rec = record(1, 2000, 7, 4, Tz::America__New_York);
        let now = Utc.with_ymd_and_hms(2026, 7, 4, 4, 0, 0).unwrap();

        assert_eq!(rec.age_at(now), 26);
    }
}
