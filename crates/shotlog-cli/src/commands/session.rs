use chrono::{Local, NaiveDate};
use clap::Subcommand;
use shotlog_core::{Config, Database, SessionRecord, SessionStore, ShotType};
use uuid::Uuid;

use super::format_session;

#[derive(Subcommand)]
pub enum SessionAction {
    /// Add a session by hand
    Add {
        /// Shot type (layups, freeThrows, midrange, threePointers, deep, allShots)
        #[arg(long)]
        shot_type: ShotType,
        #[arg(long)]
        makes: u32,
        /// Length in seconds
        #[arg(long)]
        length: u32,
        /// Day of the session (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// List stored sessions, newest first
    List {
        #[arg(long)]
        shot_type: Option<ShotType>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change makes or length of a stored session
    Edit {
        id: Uuid,
        #[arg(long)]
        makes: Option<u32>,
        /// Length in seconds
        #[arg(long)]
        length: Option<u32>,
    },
    /// Delete a stored session
    Delete { id: Uuid },
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        SessionAction::Add {
            shot_type,
            makes,
            length,
            date,
        } => {
            let now = Local::now();
            let day = date.unwrap_or_else(|| now.date_naive());
            let record = SessionRecord::manual(day, &now, makes, length, shot_type);
            db.insert(&record)?;
            println!("{}", record.id);
        }
        SessionAction::List { shot_type, json } => {
            let mut records = db.query_all()?;
            if let Some(shot_type) = shot_type {
                records.retain(|r| r.shot_type == shot_type);
            }
            records.sort_by(|a, b| b.date.cmp(&a.date));

            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("no sessions");
            } else {
                let config = Config::load_or_default();
                for record in &records {
                    println!("{}", format_session(record, &config.display.date_format));
                }
            }
        }
        SessionAction::Edit { id, makes, length } => {
            if makes.is_none() && length.is_none() {
                return Err("nothing to change, pass --makes and/or --length".into());
            }
            let mut record = db.get(id)?.ok_or_else(|| format!("no session {id}"))?;
            if let Some(makes) = makes {
                record.makes = makes;
            }
            if let Some(length) = length {
                record.length = length;
            }
            db.update(&record)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        SessionAction::Delete { id } => {
            if !db.delete(id)? {
                return Err(format!("no session {id}").into());
            }
            println!("deleted {id}");
        }
    }
    Ok(())
}
