//! Clock utilities.
//!
//! Discovery freshness checks, token expiry, and record TTLs all compare
//! against Unix seconds from this module. Validation helpers take `now`
//! as a parameter so tests can simulate arbitrary clocks; only the
//! long-running loops call these directly.

/// Returns the current Unix timestamp in seconds.
pub fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Returns the current Unix timestamp in milliseconds.
pub fn now_timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
