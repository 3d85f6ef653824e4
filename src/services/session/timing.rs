use time::{Duration, OffsetDateTime};

/// The moment an attempt must be submitted: its own duration from the stored start, but never
/// after the assignment window closes.
pub(crate) fn deadline(
    started_at: OffsetDateTime,
    duration_minutes: i32,
    window_end: OffsetDateTime,
) -> OffsetDateTime {
    let duration_deadline = started_at + Duration::minutes(i64::from(duration_minutes));
    duration_deadline.min(window_end)
}

/// Whole seconds left, rounded up so the display only shows zero once the deadline is reached.
pub(crate) fn remaining_seconds(deadline: OffsetDateTime, now: OffsetDateTime) -> i64 {
    let millis = (deadline - now).whole_milliseconds();
    if millis <= 0 {
        return 0;
    }
    ((millis + 999) / 1000) as i64
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    const START: OffsetDateTime = datetime!(2025-04-01 09:00 UTC);
    const WINDOW_END: OffsetDateTime = datetime!(2025-04-01 18:00 UTC);

    #[test]
    fn remaining_hits_zero_exactly_at_deadline() {
        let due = deadline(START, 45, WINDOW_END);
        assert_eq!(due, datetime!(2025-04-01 09:45 UTC));

        assert_eq!(remaining_seconds(due, due), 0);
        assert_eq!(remaining_seconds(due, due - Duration::seconds(1)), 1);
        assert_eq!(remaining_seconds(due, due - Duration::milliseconds(400)), 1);
        assert_eq!(remaining_seconds(due, due + Duration::minutes(3)), 0);
        assert_eq!(remaining_seconds(due, START), 45 * 60);
    }

    #[test]
    fn window_end_caps_the_deadline() {
        let late_start = datetime!(2025-04-01 17:40 UTC);
        assert_eq!(deadline(late_start, 45, WINDOW_END), WINDOW_END);
    }
}
