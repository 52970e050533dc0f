//! User database queries.
//!
//! This module provides CRUD operations for user accounts.

use chrono::Utc;
use pixshare_common::{Error, Result, UserId};
use rusqlite::Connection;

use super::{timestamp_column, uuid_column};
use crate::models::User;

const USER_COLUMNS: &str = "id, username, password_hash, is_admin, created_at";

fn parse_user_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId::from(uuid_column(row, 0)?),
        username: row.get(1)?,
        password_hash: row.get(2)?,
        is_admin: row.get::<_, i32>(3)? != 0,
        created_at: timestamp_column(row, 4)?,
    })
}

/// Create a new user.
///
/// # Arguments
///
/// * `conn` - Database connection
/// * `username` - Unique username
/// * `password_hash` - Hashed password
/// * `is_admin` - Whether the user has admin privileges
///
/// # Returns
///
/// * `Ok(User)` - The created user
/// * `Err(Error)` - If the username already exists or database error occurs
pub fn create_user(
    conn: &Connection,
    username: &str,
    password_hash: &str,
    is_admin: bool,
) -> Result<User> {
    let id = UserId::new();
    let created_at = Utc::now();

    conn.execute(
        "INSERT INTO users (id, username, password_hash, is_admin, created_at)
         VALUES (:id, :username, :password_hash, :is_admin, :created_at)",
        rusqlite::named_params! {
            ":id": id.to_string(),
            ":username": username,
            ":password_hash": password_hash,
            ":is_admin": is_admin,
            ":created_at": created_at.to_rfc3339(),
        },
    )
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint failed") {
            Error::InvalidInput(format!("Username '{}' already exists", username))
        } else {
            Error::database(e.to_string())
        }
    })?;

    Ok(User {
        id,
        username: username.to_string(),
        password_hash: password_hash.to_string(),
        is_admin,
        created_at,
    })
}

/// Get a user by ID.
///
/// # Returns
///
/// * `Ok(Some(User))` - The user if found
/// * `Ok(None)` - If the user does not exist
/// * `Err(Error)` - If a database error occurs
pub fn get_user(conn: &Connection, id: UserId) -> Result<Option<User>> {
    let result = conn.query_row(
        &format!("SELECT {} FROM users WHERE id = :id", USER_COLUMNS),
        rusqlite::named_params! { ":id": id.to_string() },
        parse_user_row,
    );

    match result {
        Ok(user) => Ok(Some(user)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Get a user by username.
pub fn get_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
    let result = conn.query_row(
        &format!("SELECT {} FROM users WHERE username = :username", USER_COLUMNS),
        rusqlite::named_params! { ":username": username },
        parse_user_row,
    );

    match result {
        Ok(user) => Ok(Some(user)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Count all user accounts.
pub fn count_users(conn: &Connection) -> Result<u64> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(count.max(0) as u64)
}
