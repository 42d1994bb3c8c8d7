use time::{macros::format_description, Date, Month, PrimitiveDateTime, Time};

const MONTHS: [(&str, Month); 12] = [
    ("Jan", Month::January),
    ("Feb", Month::February),
    ("Mar", Month::March),
    ("Apr", Month::April),
    ("May", Month::May),
    ("Jun", Month::June),
    ("Jul", Month::July),
    ("Aug", Month::August),
    ("Sep", Month::September),
    ("Oct", Month::October),
    ("Nov", Month::November),
    ("Dec", Month::December),
];

/// Parse the provider's primary `YYYY-MM-DDTHH:MM:SS` timestamp.
///
/// Fractional seconds or offsets are rejected.
pub fn parse_primary(raw: &str) -> Option<PrimitiveDateTime> {
    let format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    PrimitiveDateTime::parse(raw, &format).ok()
}

/// Parse the display form `"<day> <Mon> <year> <HH:MM>"`, e.g. `"1 Dec 2025 08:15"`.
pub fn parse_fallback(raw: &str) -> Option<PrimitiveDateTime> {
    let parts: Vec<&str> = raw.split_whitespace().collect();
    let [day, month, year, clock] = parts.as_slice() else {
        return None;
    };

    let month = month_from_abbrev(month)?;
    let day: u8 = day.parse().ok()?;
    let year: i32 = year.parse().ok()?;

    let (hour, minute) = clock.split_once(':')?;
    let hour: u8 = hour.parse().ok()?;
    let minute: u8 = minute.parse().ok()?;

    let date = Date::from_calendar_date(year, month, day).ok()?;
    let time = Time::from_hms(hour, minute, 0).ok()?;
    Some(PrimitiveDateTime::new(date, time))
}

fn month_from_abbrev(abbrev: &str) -> Option<Month> {
    MONTHS
        .iter()
        .find(|(name, _)| *name == abbrev)
        .map(|(_, month)| *month)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn primary_format_is_exact() {
        assert_eq!(parse_primary("2025-12-01T08:00:00"), Some(datetime!(2025-12-01 08:00:00)));
        assert_eq!(parse_primary("2025-12-01T08:00:00.000"), None);
        assert_eq!(parse_primary("2025-12-01 08:00:00"), None);
        assert_eq!(parse_primary("2025-02-30T08:00:00"), None);
    }

    #[test]
    fn fallback_translates_month_abbreviations() {
        assert_eq!(parse_fallback("1 Dec 2025 08:15"), Some(datetime!(2025-12-01 08:15:00)));
        assert_eq!(parse_fallback("15 Mar 2024 23:45"), Some(datetime!(2024-03-15 23:45:00)));
        assert_eq!(parse_fallback("  07  Jul 2025   9:05 "), Some(datetime!(2025-07-07 09:05:00)));
    }

    #[test]
    fn fallback_rejects_malformed_input() {
        assert_eq!(parse_fallback("1 Foo 2025 08:15"), None);
        assert_eq!(parse_fallback("1 dec 2025 08:15"), None);
        assert_eq!(parse_fallback("1 Dec 2025"), None);
        assert_eq!(parse_fallback("1 Dec 2025 08:15 extra"), None);
        assert_eq!(parse_fallback("31 Feb 2025 08:15"), None);
        assert_eq!(parse_fallback("1 Dec 2025 25:00"), None);
        assert_eq!(parse_fallback("1 Dec 2025 0815"), None);
    }
}
