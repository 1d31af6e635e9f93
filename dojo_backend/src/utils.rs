//! Shared helpers and constants.

use chrono::{DateTime, Local, Utc};

pub const APP_NAME: &str = "dojo_backend";

/// Current wall-clock time in epoch milliseconds, the unit every stored
/// timestamp uses.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Converts a stored epoch-millisecond timestamp into the server's local
/// calendar. Out-of-range values clamp to the epoch.
pub fn local_datetime(millis: i64) -> DateTime<Local> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or_default()
        .with_timezone(&Local)
}

pub fn print_banner() {
    println!("{APP_NAME} v{}", env!("CARGO_PKG_VERSION"));
}
