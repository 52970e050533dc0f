//! Database query modules.
//!
//! This module organizes all database operations into logical groups:
//! - users: User account CRUD
//! - auth_tokens: Bearer token management
//! - images: Image record CRUD and storage statistics

pub mod auth_tokens;
pub mod images;
pub mod users;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use uuid::Uuid;

/// Read a TEXT column holding a UUID.
pub(crate) fn uuid_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a TEXT column holding an RFC 3339 timestamp.
pub(crate) fn timestamp_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a non-negative INTEGER column into an unsigned type.
pub(crate) fn unsigned_column<T: TryFrom<i64>>(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: i64 = row.get(idx)?;
    T::try_from(raw).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, raw))
}
