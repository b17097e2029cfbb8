//! Time formatting helpers.

/// Format a duration in seconds to a human-readable string.
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Time left until `deadline` as seen at `now`, or `"closed"` once past it.
pub fn format_remaining(deadline: u64, now: u64) -> String {
    match deadline.checked_sub(now) {
        Some(left) => format_duration(left),
        None => "closed".to_string(),
    }
}
