//! The persisted unit of work: one recorded shooting session.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shot category a session was recorded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShotType {
    Layups,
    FreeThrows,
    Midrange,
    ThreePointers,
    Deep,
    AllShots,
}

impl ShotType {
    pub const ALL: [ShotType; 6] = [
        ShotType::Layups,
        ShotType::FreeThrows,
        ShotType::Midrange,
        ShotType::ThreePointers,
        ShotType::Deep,
        ShotType::AllShots,
    ];

    /// Canonical wire/storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShotType::Layups => "layups",
            ShotType::FreeThrows => "freeThrows",
            ShotType::Midrange => "midrange",
            ShotType::ThreePointers => "threePointers",
            ShotType::Deep => "deep",
            ShotType::AllShots => "allShots",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ShotType::Layups => "Layups",
            ShotType::FreeThrows => "Free Throws",
            ShotType::Midrange => "Midrange",
            ShotType::ThreePointers => "Threes",
            ShotType::Deep => "Deep",
            ShotType::AllShots => "All Shots",
        }
    }
}

impl fmt::Display for ShotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShotType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ShotType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown shot type '{s}'"))
    }
}

/// Which recording flow produced a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    /// Also the fallback for payloads from older senders.
    #[default]
    Freestyle,
    Challenge,
    Drill,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Freestyle => "freestyle",
            SessionType::Challenge => "challenge",
            SessionType::Drill => "drill",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "freestyle" => Ok(SessionType::Freestyle),
            "challenge" => Ok(SessionType::Challenge),
            "drill" => Ok(SessionType::Drill),
            other => Err(format!("unknown session type '{other}'")),
        }
    }
}

/// A completed shooting session.
///
/// `makes` and `length` are unsigned, so the non-negativity invariants hold
/// by construction. `date` is fixed at creation and never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub makes: u32,
    /// Seconds.
    pub length: u32,
    pub shot_type: ShotType,
    pub session_type: SessionType,
}

/// Composite identity used to recognise a redelivered session that carries
/// no explicit id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub date_secs: i64,
    pub makes: u32,
    pub length: u32,
    pub shot_type: ShotType,
}

impl SessionRecord {
    pub fn new(
        date: DateTime<Utc>,
        makes: u32,
        length: u32,
        shot_type: ShotType,
        session_type: SessionType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            makes,
            length,
            shot_type,
            session_type,
        }
    }

    /// Build a manually entered session for `selected_day`.
    ///
    /// The calendar day comes from the user's selection; the time of day comes
    /// from `now` so back-dated entries still order against each other.
    pub fn manual<Tz: TimeZone>(
        selected_day: NaiveDate,
        now: &DateTime<Tz>,
        makes: u32,
        length: u32,
        shot_type: ShotType,
    ) -> Self {
        Self::new(
            backdate(selected_day, now),
            makes,
            length,
            shot_type,
            SessionType::Freestyle,
        )
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            date_secs: self.date.timestamp(),
            makes: self.makes,
            length: self.length,
            shot_type: self.shot_type,
        }
    }

    /// Makes per minute, 0.0 for zero-length sessions.
    pub fn makes_per_minute(&self) -> f64 {
        if self.length == 0 {
            return 0.0;
        }
        self.makes as f64 / (self.length as f64 / 60.0)
    }
}

/// Combine a calendar day with the wall-clock time of `now` in `now`'s zone.
///
/// Falls back to `now` itself if the combined local time does not exist
/// (for example inside a DST gap).
pub fn backdate<Tz: TimeZone>(selected_day: NaiveDate, now: &DateTime<Tz>) -> DateTime<Utc> {
    let naive = selected_day.and_time(now.time());
    now.timezone()
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| now.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Timelike};

    #[test]
    fn shot_type_names_round_trip() {
        for shot in ShotType::ALL {
            assert_eq!(shot.as_str().parse::<ShotType>().unwrap(), shot);
            let json = serde_json::to_string(&shot).unwrap();
            assert_eq!(json, format!("\"{}\"", shot.as_str()));
        }
        assert!("hookShots".parse::<ShotType>().is_err());
    }

    #[test]
    fn session_type_defaults_to_freestyle() {
        assert_eq!(SessionType::default(), SessionType::Freestyle);
        assert_eq!("drill".parse::<SessionType>().unwrap(), SessionType::Drill);
    }

    #[test]
    fn manual_entry_keeps_time_of_day() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2025, 3, 10, 18, 42, 7).unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();

        let record = SessionRecord::manual(day, &now, 12, 600, ShotType::Midrange);
        let local = record.date.with_timezone(&tz);

        assert_eq!(local.date_naive(), day);
        assert_eq!((local.hour(), local.minute(), local.second()), (18, 42, 7));
        assert_eq!(record.session_type, SessionType::Freestyle);
    }

    #[test]
    fn ids_are_unique() {
        let now = Utc::now();
        let a = SessionRecord::new(now, 1, 1, ShotType::Deep, SessionType::Drill);
        let b = SessionRecord::new(now, 1, 1, ShotType::Deep, SessionType::Drill);
        assert_ne!(a.id, b.id);
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn makes_per_minute_handles_zero_length() {
        let now = Utc::now();
        let mut record = SessionRecord::new(now, 30, 0, ShotType::Layups, SessionType::Freestyle);
        assert_eq!(record.makes_per_minute(), 0.0);
        record.length = 120;
        assert!((record.makes_per_minute() - 15.0).abs() < f64::EPSILON);
    }
}
