use crate::schedule::{ScheduleError, Timestamp};

pub const fn const_unwrap<T: Copy>(x: Option<T>) -> T {
    if let Some(x) = x { x } else { panic!("Failed to const unwrap.") }
}

// Seconds of `H:MM:SS`; `None` on bad fields or a total beyond `Timestamp`.
fn clock_seconds(hours: &str, minutes: &str, seconds: &str) -> Option<Timestamp> {
    if minutes.len() != 2 || seconds.len() != 2 {
        return None;
    }
    let (hours, minutes, seconds): (Timestamp, Timestamp, Timestamp) =
        (hours.parse().ok()?, minutes.parse().ok()?, seconds.parse().ok()?);
    if minutes >= 60 || seconds >= 60 {
        return None;
    }
    hours.checked_mul(3600)?.checked_add(minutes * 60 + seconds)
}

/// Parses seconds of the service day from `HH:MM:SS` (hours may exceed 23) or from plain seconds.
pub fn parse_time(s: &str) -> Result<Timestamp, ScheduleError> {
    let s = s.trim();
    let mut fields = s.split(':');
    let time = match (fields.next(), fields.next(), fields.next(), fields.next()) {
        (Some(plain), None, ..) => plain.parse().ok(),
        (Some(hours), Some(minutes), Some(seconds), None) => clock_seconds(hours, minutes, seconds),
        _ => None,
    };
    time.ok_or_else(|| ScheduleError::InvalidTime(s.to_owned()))
}

pub fn get_time_str(time: Timestamp) -> String {
    let minutes = time / 60;
    format!("{:02}:{:02}:{:02}", minutes / 60, minutes % 60, time % 60)
}
