//! Consecutive-day streaks.
//!
//! Days are calendar days in the calculator's time zone. A streak stays
//! alive through today as long as yesterday had a session; once a full day
//! is missed it drops to zero.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::session::SessionRecord;

/// Streak arithmetic over a set of sessions. Pure; recompute after every
/// change to the session set.
#[derive(Debug, Clone)]
pub struct StreakCalculator<Tz: TimeZone> {
    tz: Tz,
}

impl<Tz: TimeZone> StreakCalculator<Tz> {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Distinct calendar days with at least one session.
    pub fn active_days(&self, records: &[SessionRecord]) -> BTreeSet<NaiveDate> {
        records
            .iter()
            .map(|r| r.date.with_timezone(&self.tz).date_naive())
            .collect()
    }

    /// Streak as of `now`.
    pub fn current(&self, records: &[SessionRecord], now: DateTime<Utc>) -> u32 {
        let days = self.active_days(records);
        let today = now.with_timezone(&self.tz).date_naive();
        let Some(yesterday) = today.pred_opt() else {
            return 0;
        };
        if !days.contains(&yesterday) {
            return 0;
        }

        let start = if days.contains(&today) { today } else { yesterday };
        run_ending_at(&days, start)
    }

    /// Longest run of consecutive active days ever recorded.
    pub fn longest(&self, records: &[SessionRecord]) -> u32 {
        let days = self.active_days(records);
        let mut longest = 0;
        let mut run = 0;
        let mut previous: Option<NaiveDate> = None;
        for day in days {
            run = match previous.and_then(|p| p.succ_opt()) {
                Some(next) if next == day => run + 1,
                _ => 1,
            };
            longest = longest.max(run);
            previous = Some(day);
        }
        longest
    }
}

/// Streak in `now`'s own time zone.
pub fn current_streak<Tz: TimeZone>(records: &[SessionRecord], now: &DateTime<Tz>) -> u32 {
    StreakCalculator::new(now.timezone()).current(records, now.with_timezone(&Utc))
}

fn run_ending_at(days: &BTreeSet<NaiveDate>, start: NaiveDate) -> u32 {
    let mut count = 0;
    let mut day = Some(start);
    while let Some(d) = day.filter(|d| days.contains(d)) {
        count += 1;
        day = d.pred_opt();
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionType, ShotType};
    use chrono::{Duration, FixedOffset};
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 15, 20, 0, 0).unwrap()
    }

    fn on_day(days_ago: i64) -> SessionRecord {
        SessionRecord::new(
            now() - Duration::days(days_ago),
            5,
            300,
            ShotType::Layups,
            SessionType::Freestyle,
        )
    }

    fn streak(days_ago: &[i64]) -> u32 {
        let records: Vec<_> = days_ago.iter().map(|d| on_day(*d)).collect();
        StreakCalculator::new(Utc).current(&records, now())
    }

    #[test]
    fn today_yesterday_and_day_before_count_three() {
        assert_eq!(streak(&[0, 1, 2]), 3);
    }

    #[test]
    fn missing_yesterday_breaks_the_streak() {
        assert_eq!(streak(&[0, 2]), 0);
        assert_eq!(streak(&[0]), 0);
    }

    #[test]
    fn no_sessions_no_streak() {
        assert_eq!(streak(&[]), 0);
    }

    #[test]
    fn yesterday_alone_keeps_a_streak_of_one() {
        assert_eq!(streak(&[1]), 1);
        assert_eq!(streak(&[1, 2, 3, 5]), 3);
    }

    #[test]
    fn several_sessions_on_one_day_count_once() {
        assert_eq!(streak(&[0, 0, 1, 1, 1]), 2);
    }

    #[test]
    fn days_follow_the_calculator_time_zone() {
        // 23:30 UTC is already the next day in UTC+2.
        let late = Utc.with_ymd_and_hms(2025, 7, 13, 23, 30, 0).unwrap();
        let record = SessionRecord::new(late, 1, 60, ShotType::Deep, SessionType::Drill);
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();

        assert_eq!(StreakCalculator::new(Utc).current(&[record.clone()], now()), 0);
        assert_eq!(StreakCalculator::new(tz).current(&[record.clone()], now()), 1);
        assert_eq!(current_streak(&[record], &now().with_timezone(&tz)), 1);
    }

    #[test]
    fn longest_run() {
        let records: Vec<_> = [0, 1, 4, 5, 6, 7, 9].iter().map(|d| on_day(*d)).collect();
        assert_eq!(StreakCalculator::new(Utc).longest(&records), 4);
        assert_eq!(StreakCalculator::new(Utc).longest(&[]), 0);
    }

    proptest! {
        #[test]
        fn duplicated_sessions_never_change_the_streak(
            days in prop::collection::vec(0i64..30, 0..20),
            dup in prop::collection::vec(any::<prop::sample::Index>(), 0..10),
        ) {
            let records: Vec<_> = days.iter().map(|d| on_day(*d)).collect();
            let mut doubled = records.clone();
            if !records.is_empty() {
                for idx in &dup {
                    doubled.push(idx.get(&records).clone());
                }
            }
            let calc = StreakCalculator::new(Utc);
            prop_assert_eq!(calc.current(&records, now()), calc.current(&doubled, now()));
            prop_assert!(calc.current(&records, now()) <= calc.longest(&records));
        }
    }
}
