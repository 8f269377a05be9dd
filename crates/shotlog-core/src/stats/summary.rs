//! Aggregate session statistics.

use std::collections::BTreeMap;

use chrono::{NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::session::{SessionRecord, ShotType};

/// Totals for one shot type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotTypeBreakdown {
    pub shot_type: ShotType,
    pub sessions: u64,
    pub makes: u64,
    pub seconds: u64,
    pub makes_per_minute: f64,
}

/// Totals over a set of sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SessionSummary {
    pub total_sessions: u64,
    pub total_makes: u64,
    pub total_seconds: u64,
    /// Mean makes per session
    pub average_makes: f64,
    /// Makes per minute across all recorded time
    pub makes_per_minute: f64,
    pub best_session_makes: u32,
    /// Only shot types that appear, in canonical order
    pub by_shot_type: Vec<ShotTypeBreakdown>,
}

/// One point of the per-day trend series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub sessions: u64,
    pub makes: u64,
    pub seconds: u64,
}

#[derive(Default)]
struct Totals {
    sessions: u64,
    makes: u64,
    seconds: u64,
}

impl Totals {
    fn add(&mut self, record: &SessionRecord) {
        self.sessions += 1;
        self.makes += record.makes as u64;
        self.seconds += record.length as u64;
    }
}

fn per_minute(makes: u64, seconds: u64) -> f64 {
    if seconds == 0 {
        return 0.0;
    }
    makes as f64 / (seconds as f64 / 60.0)
}

pub fn summarize(records: &[SessionRecord]) -> SessionSummary {
    let mut overall = Totals::default();
    let mut by_type: BTreeMap<usize, Totals> = BTreeMap::new();
    let mut best = 0;

    for record in records {
        overall.add(record);
        best = best.max(record.makes);
        let rank = ShotType::ALL
            .iter()
            .position(|t| *t == record.shot_type)
            .unwrap_or(ShotType::ALL.len());
        by_type.entry(rank).or_default().add(record);
    }

    let by_shot_type = by_type
        .into_iter()
        .filter_map(|(rank, totals)| {
            let shot_type = *ShotType::ALL.get(rank)?;
            Some(ShotTypeBreakdown {
                shot_type,
                sessions: totals.sessions,
                makes: totals.makes,
                seconds: totals.seconds,
                makes_per_minute: per_minute(totals.makes, totals.seconds),
            })
        })
        .collect();

    SessionSummary {
        total_sessions: overall.sessions,
        total_makes: overall.makes,
        total_seconds: overall.seconds,
        average_makes: if overall.sessions == 0 {
            0.0
        } else {
            overall.makes as f64 / overall.sessions as f64
        },
        makes_per_minute: per_minute(overall.makes, overall.seconds),
        best_session_makes: best,
        by_shot_type,
    }
}

/// Per-day totals for every day in `from..=to`, zero-filled, in `tz`.
pub fn daily_trend<Tz: TimeZone>(
    records: &[SessionRecord],
    tz: &Tz,
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<DailyTotal> {
    let mut per_day: BTreeMap<NaiveDate, Totals> = BTreeMap::new();
    for record in records {
        let day = record.date.with_timezone(tz).date_naive();
        if day >= from && day <= to {
            per_day.entry(day).or_default().add(record);
        }
    }

    from.iter_days()
        .take_while(|day| *day <= to)
        .map(|date| {
            let totals = per_day.remove(&date).unwrap_or_default();
            DailyTotal {
                date,
                sessions: totals.sessions,
                makes: totals.makes,
                seconds: totals.seconds,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionType;
    use chrono::{Duration, Utc};

    fn at(day: u32, makes: u32, length: u32, shot_type: ShotType) -> SessionRecord {
        let date = Utc.with_ymd_and_hms(2025, 8, day, 12, 0, 0).unwrap();
        SessionRecord::new(date, makes, length, shot_type, SessionType::Freestyle)
    }

    #[test]
    fn empty_summary_is_all_zero() {
        assert_eq!(summarize(&[]), SessionSummary::default());
    }

    #[test]
    fn totals_and_rates() {
        let records = vec![
            at(1, 30, 600, ShotType::FreeThrows),
            at(2, 10, 300, ShotType::ThreePointers),
            at(2, 20, 300, ShotType::FreeThrows),
        ];
        let summary = summarize(&records);

        assert_eq!(summary.total_sessions, 3);
        assert_eq!(summary.total_makes, 60);
        assert_eq!(summary.total_seconds, 1200);
        assert!((summary.average_makes - 20.0).abs() < 1e-9);
        assert!((summary.makes_per_minute - 3.0).abs() < 1e-9);
        assert_eq!(summary.best_session_makes, 30);

        let kinds: Vec<_> = summary.by_shot_type.iter().map(|b| b.shot_type).collect();
        assert_eq!(kinds, vec![ShotType::FreeThrows, ShotType::ThreePointers]);
        assert_eq!(summary.by_shot_type[0].makes, 50);
        assert!((summary.by_shot_type[1].makes_per_minute - 2.0).abs() < 1e-9);
    }

    #[test]
    fn trend_is_zero_filled_and_bounded() {
        let records = vec![
            at(1, 5, 60, ShotType::Deep),
            at(3, 7, 60, ShotType::Deep),
            at(3, 1, 60, ShotType::Layups),
            at(9, 100, 60, ShotType::Layups),
        ];
        let from = NaiveDate::from_ymd_opt(2025, 8, 1).unwrap();
        let trend = daily_trend(&records, &Utc, from, from + Duration::days(3));

        let makes: Vec<_> = trend.iter().map(|d| d.makes).collect();
        assert_eq!(makes, vec![5, 0, 8, 0]);
        assert_eq!(trend[2].sessions, 2);
        assert_eq!(trend[3].date, NaiveDate::from_ymd_opt(2025, 8, 4).unwrap());
    }
}
