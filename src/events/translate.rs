use super::Event;
use crate::directory::LogEntry;

/// Separates the log record header from the logger category and message.
const SEPARATOR: &str = " - ";

/// Translate a raw log record into an event carrying `index`.
///
/// The record is expected to look like
/// `<header> - <Logger>.<category> <message>`. Only the field between the
/// first and the second separator is kept. Everything up to and including
/// its first `.` is dropped and the remainder is prefixed with the host that
/// produced it. Lines without the separator are not log records and produce
/// nothing.
pub fn translate(entry: &LogEntry, index: u64) -> Option<Event> {
    let record = entry.text.split(SEPARATOR).nth(1)?;
    let message = match record.find('.') {
        Some(dot) => &record[dot + 1..],
        None => record,
    };
    Some(Event {
        index,
        description: format!(
            "[{}/{}] - {}",
            entry.host_name,
            entry.host_address,
            message.trim_end()
        ),
    })
}
