use chrono::Utc;

/// Milliseconds since the Unix epoch, as stamped on chat messages and probe replies.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
