use std::path::PathBuf;

use clap::Subcommand;
use serde_json::Value;
use shotlog_core::delivery::PayloadMap;
use shotlog_core::{Config, Database, ReceiveOutcome, SessionReceiver};

#[derive(Subcommand)]
pub enum InboxAction {
    /// Store sessions from payload files (one object or an array per file)
    Receive {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

pub fn run(action: InboxAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        InboxAction::Receive { files } => {
            let config = Config::load_or_default();
            let db = Database::open()?;
            let receiver = SessionReceiver::new(&db).with_dedup(config.delivery.dedup);

            let mut rejected = 0;
            for file in &files {
                for payload in read_payloads(file)? {
                    match receiver.receive(&payload) {
                        Ok(ReceiveOutcome::Inserted(record)) => println!("stored {}", record.id),
                        Ok(ReceiveOutcome::Duplicate { id }) => println!("duplicate {id}"),
                        Err(e) => {
                            rejected += 1;
                            eprintln!("{}: {e}", file.display());
                        }
                    }
                }
            }
            if rejected > 0 {
                return Err(format!("{rejected} payload(s) rejected").into());
            }
        }
    }
    Ok(())
}

fn read_payloads(path: &PathBuf) -> Result<Vec<PayloadMap>, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content)?;
    let items = match value {
        Value::Array(items) => items,
        other => vec![other],
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map),
            other => Err(format!("{}: expected an object, got {other}", path.display()).into()),
        })
        .collect()
}
