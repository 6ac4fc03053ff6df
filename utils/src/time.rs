//! Time formatting helpers.

use kyc_types::Timestamp;

/// Format a duration in seconds for people: `45s`, `14m 05s`, `2h 03m`.
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Time left until `expires_at`, or `expired`.
pub fn format_remaining(expires_at: Timestamp, now: Timestamp) -> String {
    match expires_at.remaining_from(now) {
        0 => "expired".to_string(),
        secs => format_duration(secs),
    }
}
