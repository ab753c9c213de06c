//! Column conversion helpers shared by the row mappers.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use uuid::Uuid;

fn conversion<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

pub(crate) fn uuid(idx: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| conversion(idx, e))
}

pub(crate) fn timestamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion(idx, e))
}

pub(crate) fn date(idx: usize, s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| conversion(idx, e))
}

pub(crate) fn json_list(idx: usize, s: &str) -> rusqlite::Result<Vec<String>> {
    json(idx, s)
}

pub(crate) fn json<T: serde::de::DeserializeOwned>(idx: usize, s: &str) -> rusqlite::Result<T> {
    serde_json::from_str(s).map_err(|e| conversion(idx, e))
}

/// Parse a text column into one of the string-backed domain enums.
pub(crate) fn parsed<T>(idx: usize, s: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    s.parse::<T>().map_err(|e| {
        conversion(
            idx,
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        )
    })
}

/// Fixed-width RFC-3339 so TEXT ordering matches chronological ordering.
pub(crate) fn stamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn now() -> String {
    stamp(&Utc::now())
}
