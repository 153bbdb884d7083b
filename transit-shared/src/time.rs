use chrono::{DateTime, FixedOffset, Utc};

/// Departure times arrive with the caller's offset and are stored in UTC.
pub fn to_utc(at: DateTime<FixedOffset>) -> DateTime<Utc> {
    at.with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_is_normalised() {
        let local = DateTime::parse_from_rfc3339("2026-03-01T08:30:00+05:30").unwrap();
        assert_eq!(to_utc(local).to_rfc3339(), "2026-03-01T03:00:00+00:00");
    }
}
