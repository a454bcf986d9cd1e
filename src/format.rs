use crate::scoring::Direction;

/// `45s`, `5m 0s`
pub fn format_short(secs: u64) -> String {
    if secs < 60 {
        return format!("{secs}s");
    }
    format!("{}m {}s", secs / 60, secs % 60)
}

/// `05:00`, minutes keep growing past an hour
pub fn format_clock(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Rounded to whole seconds for display
pub fn format_error(direction: Direction, signed_error: f64) -> String {
    let rounded = signed_error.abs().round() as u64;
    match direction {
        Direction::OnTime => Direction::OnTime.to_string(),
        _ if rounded == 0 => format!("{direction} by <1s"),
        _ => format!("{direction} by {}", format_short(rounded)),
    }
}

pub fn plural(count: u32, singular: &str) -> String {
    if count == 1 {
        format!("{count} {singular}")
    } else {
        format!("{count} {singular}s")
    }
}
