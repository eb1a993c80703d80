use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound, Utc};

use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get an optional column value.
pub fn get_opt<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    get(row, idx, table, column)
}

/// Parse a string into an enum, returning CorruptRow on failure.
pub fn parse_enum<T: std::str::FromStr>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    raw.parse().map_err(|_| StoreError::CorruptRow {
        table,
        column,
        detail: format!("unknown variant: {raw}"),
    })
}

pub fn parse_timestamp(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow {
            table,
            column,
            detail: format!("invalid timestamp {raw}: {e}"),
        })
}

pub fn parse_date(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<NaiveDate, StoreError> {
    raw.parse().map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: format!("invalid date {raw}: {e}"),
    })
}

/// Current time at the precision timestamps are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width UTC timestamp so text ordering matches time ordering.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanes_core::Priority;

    #[test]
    fn parse_enum_success() {
        let p: Priority = parse_enum("URGENT", "todos", "priority").unwrap();
        assert_eq!(p, Priority::Urgent);
    }

    #[test]
    fn parse_enum_failure() {
        let result: Result<Priority, _> = parse_enum("urgent", "todos", "priority");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "todos", column: "priority", .. })
        ));
    }

    #[test]
    fn timestamps_roundtrip_at_micro_precision() {
        let now = Utc::now();
        let text = format_timestamp(now);
        assert!(text.ends_with('Z'), "got: {text}");
        let parsed = parse_timestamp(&text, "todos", "created_at").unwrap();
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn now_survives_storage_unchanged() {
        let now = now();
        let stored = parse_timestamp(&format_timestamp(now), "todos", "updated_at").unwrap();
        assert_eq!(stored, now);
    }

    #[test]
    fn formatted_timestamps_sort_as_text() {
        let a = DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::milliseconds(1500);
        let b = DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(2);
        assert!(format_timestamp(a) < format_timestamp(b));
    }

    #[test]
    fn bad_timestamp_is_corrupt() {
        let result = parse_timestamp("yesterday", "sessions", "expires_at");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "sessions", column: "expires_at", .. })
        ));
    }

    #[test]
    fn dates() {
        assert_eq!(
            parse_date("2026-03-01", "todos", "due_date").unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
        );
        assert!(parse_date("03/01/2026", "todos", "due_date").is_err());
    }
}
