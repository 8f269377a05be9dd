use chrono::{Days, Local, Utc};
use clap::Subcommand;
use serde_json::json;
use shotlog_core::stats::{daily_trend, summarize, StreakCalculator};
use shotlog_core::{Database, SessionStore, ShotType};

/// Longest trend window, one row per day.
const MAX_TREND_DAYS: u32 = 3660;

#[derive(Subcommand)]
pub enum StatsAction {
    /// Current and longest daily streak
    Streak,
    /// Totals, averages and per-shot-type breakdown
    Summary {
        #[arg(long)]
        shot_type: Option<ShotType>,
        /// Only the last N days
        #[arg(long)]
        days: Option<u32>,
    },
    /// Makes per day
    Trend {
        #[arg(long, default_value = "7", value_parser = clap::value_parser!(u32).range(1..=MAX_TREND_DAYS as i64))]
        days: u32,
    },
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let mut records = db.query_all()?;

    match action {
        StatsAction::Streak => {
            let calc = StreakCalculator::new(Local);
            let stats = json!({
                "current": calc.current(&records, Utc::now()),
                "longest": calc.longest(&records),
                "active_days": calc.active_days(&records).len(),
            });
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        StatsAction::Summary { shot_type, days } => {
            if let Some(shot_type) = shot_type {
                records.retain(|r| r.shot_type == shot_type);
            }
            if let Some(days) = days {
                let since = Utc::now()
                    .checked_sub_days(Days::new(days.into()))
                    .ok_or_else(|| format!("--days {days} reaches past the earliest date"))?;
                records.retain(|r| r.date >= since);
            }
            println!("{}", serde_json::to_string_pretty(&summarize(&records))?);
        }
        StatsAction::Trend { days } => {
            let to = Local::now().date_naive();
            let from = to
                .checked_sub_days(Days::new((days - 1).into()))
                .ok_or_else(|| format!("--days {days} reaches past the earliest date"))?;
            let trend = daily_trend(&records, &Local, from, to);
            println!("{}", serde_json::to_string_pretty(&trend)?);
        }
    }
    Ok(())
}
