//! Authentication token database queries.
//!
//! Bearer tokens are issued at login and looked up on every authenticated
//! API request.

use chrono::Utc;
use pixshare_common::{Error, Result, UserId};
use rusqlite::Connection;

use super::{timestamp_column, uuid_column};
use crate::models::{AuthToken, User};

/// Store a newly issued token for a user.
///
/// # Arguments
///
/// * `conn` - Database connection
/// * `user_id` - ID of the user this token belongs to
/// * `token` - Opaque token string generated by the caller
///
/// # Returns
///
/// * `Ok(AuthToken)` - The stored token
/// * `Err(Error)` - If a database error occurs
pub fn create_token(conn: &Connection, user_id: UserId, token: &str) -> Result<AuthToken> {
    let now = Utc::now();

    conn.execute(
        "INSERT INTO auth_tokens (token, user_id, created_at, last_activity)
         VALUES (:token, :user_id, :created_at, :last_activity)",
        rusqlite::named_params! {
            ":token": token,
            ":user_id": user_id.to_string(),
            ":created_at": now.to_rfc3339(),
            ":last_activity": now.to_rfc3339(),
        },
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(AuthToken {
        token: token.to_string(),
        user_id,
        created_at: now,
        last_activity: now,
    })
}

/// Get an authentication token and its associated user.
///
/// # Returns
///
/// * `Ok(Some((AuthToken, User)))` - The token and user if found
/// * `Ok(None)` - If the token does not exist
/// * `Err(Error)` - If a database error occurs
pub fn get_token_with_user(conn: &Connection, token: &str) -> Result<Option<(AuthToken, User)>> {
    let result = conn.query_row(
        "SELECT
            t.token, t.user_id, t.created_at, t.last_activity,
            u.id, u.username, u.password_hash, u.is_admin, u.created_at
         FROM auth_tokens t
         INNER JOIN users u ON t.user_id = u.id
         WHERE t.token = :token",
        rusqlite::named_params! { ":token": token },
        |row| {
            let auth_token = AuthToken {
                token: row.get(0)?,
                user_id: UserId::from(uuid_column(row, 1)?),
                created_at: timestamp_column(row, 2)?,
                last_activity: timestamp_column(row, 3)?,
            };

            let user = User {
                id: UserId::from(uuid_column(row, 4)?),
                username: row.get(5)?,
                password_hash: row.get(6)?,
                is_admin: row.get::<_, i32>(7)? != 0,
                created_at: timestamp_column(row, 8)?,
            };

            Ok((auth_token, user))
        },
    );

    match result {
        Ok(data) => Ok(Some(data)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Delete an authentication token (logout).
///
/// # Returns
///
/// * `Ok(true)` - If the token was deleted
/// * `Ok(false)` - If the token did not exist
pub fn delete_token(conn: &Connection, token: &str) -> Result<bool> {
    let rows_affected = conn
        .execute(
            "DELETE FROM auth_tokens WHERE token = :token",
            rusqlite::named_params! { ":token": token },
        )
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(rows_affected > 0)
}

/// Update the last activity timestamp for a token.
pub fn update_token_activity(conn: &Connection, token: &str) -> Result<()> {
    let now = Utc::now();

    conn.execute(
        "UPDATE auth_tokens SET last_activity = :last_activity WHERE token = :token",
        rusqlite::named_params! {
            ":token": token,
            ":last_activity": now.to_rfc3339(),
        },
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(())
}
