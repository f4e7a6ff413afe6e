use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};

/// Drops sub-second precision.
pub fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(0)
}

/// Formats a timestamp the way it is persisted: ISO 8601, UTC, whole seconds
/// (e.g. "2025-12-16T10:30:00Z").
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    truncate_to_seconds(ts).to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses a persisted timestamp back into UTC.
/// Supports various formats: RFC 3339, ISO 8601 without offset (assumed UTC),
/// SQLite datetime, and whatever `dateparser` recognises as a last resort.
pub fn parse_timestamp(timestamp_str: &str) -> Result<DateTime<Utc>, String> {
    let trimmed = timestamp_str.trim();
    if trimmed.is_empty() {
        return Err("empty value".to_string());
    }

    // e.g. "2025-12-16T10:30:00Z" or "2025-12-16T10:30:00+00:00"
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    // e.g. "2025-12-16T10:30:00" or "2025-12-16T10:30:00.123456"
    if let Ok(naive_dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive_dt.and_utc());
    }

    // e.g. "2025-12-16 10:30:00"
    if let Ok(naive_dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(naive_dt.and_utc());
    }

    dateparser::parse_with_timezone(trimmed, &Utc).map_err(|e| e.to_string())
}
