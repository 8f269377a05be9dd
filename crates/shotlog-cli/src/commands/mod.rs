pub mod config;
pub mod inbox;
pub mod record;
pub mod session;
pub mod stats;

use shotlog_core::SessionRecord;

/// One human-readable line per session.
pub fn format_session(record: &SessionRecord, date_format: &str) -> String {
    let local = record.date.with_timezone(&chrono::Local);
    format!(
        "{}  {}  {:<12} {:<9} {:>4} makes  {:>3}:{:02}",
        record.id,
        local.format(date_format),
        record.shot_type.display_name(),
        record.session_type.as_str(),
        record.makes,
        record.length / 60,
        record.length % 60,
    )
}
