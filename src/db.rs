use crate::types::{CounsellorError, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteSynchronous};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub type DbPool = SqlitePool;

pub async fn init_db<P: AsRef<Path>>(path: P) -> Result<DbPool> {
    let path_str = match path.as_ref().to_str() {
        Some(s) => s,
        None => {
            return Err(CounsellorError::internal(
                "Invalid database path: Path contains non-UTF8 characters",
            )
            .into())
        }
    };

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path_str))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(5000))
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(options).await?;

    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
        return Err(CounsellorError::internal(format!("Migration failed: {}", e)).into());
    }

    verify_schema_version(&pool).await;

    Ok(pool)
}

async fn verify_schema_version(pool: &DbPool) {
    let version_row: std::result::Result<(String,), sqlx::Error> =
        sqlx::query_as("SELECT value FROM schema_metadata WHERE key = 'schema_version'")
            .fetch_one(pool)
            .await;

    match version_row {
        Ok((version,)) => {
            tracing::info!("Database initialized. Schema version: {}", version);
        }
        Err(e) => {
            tracing::warn!("Could not verify schema version: {}", e);
        }
    }
}

/// Timestamps are stored as RFC 3339 text with millisecond precision.
pub fn now_text() -> String {
    to_text(Utc::now())
}

pub fn to_text(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(e) => Err(CounsellorError::Protocol(format!("bad timestamp {:?}: {}", raw, e)).into()),
    }
}

pub fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}

pub fn parse_opt_date(raw: Option<String>) -> Result<Option<NaiveDate>> {
    match raw {
        Some(s) => match NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
            Ok(d) => Ok(Some(d)),
            Err(e) => Err(CounsellorError::Protocol(format!("bad date {:?}: {}", s, e)).into()),
        },
        None => Ok(None),
    }
}

pub fn date_text(d: Option<NaiveDate>) -> Option<String> {
    d.map(|d| d.format("%Y-%m-%d").to_string())
}

/// JSON-array columns (`programs`, `preferred_countries`).
pub fn parse_string_list(raw: &str) -> Result<Vec<String>> {
    Ok(serde_json::from_str(raw)?)
}

pub fn string_list_text(items: &[String]) -> Result<String> {
    Ok(serde_json::to_string(items)?)
}

/// Parses an optional text-enum column.
pub fn parse_opt_enum<T>(raw: Option<String>) -> Result<Option<T>>
where
    T: FromStr<Err = CounsellorError>,
{
    match raw {
        Some(s) => Ok(Some(s.parse::<T>()?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_text_round_trip() {
        let now = Utc::now();
        let parsed = match parse_ts(&to_text(now)) {
            Ok(p) => p,
            Err(e) => panic!("Failed to parse timestamp: {:?}", e),
        };
        assert_eq!(parsed.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn test_bad_date_is_protocol_error() {
        match parse_opt_date(Some("31/12/2026".into())) {
            Err(e) => assert!(matches!(e.inner, CounsellorError::Protocol(_))),
            Ok(v) => panic!("Expected error, got {:?}", v),
        }
    }
}
