//! User database queries.
//!
//! Credentials are opaque: the store keeps a SHA-256 digest and compares
//! digests for equality. Nothing else about password policy lives here.

use cinesync_common::{Error, Result, UserId};
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::models::User;

/// Hash a password into its stored credential form.
pub fn hash_credential(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

fn parse_user_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId::new(row.get(0)?),
        username: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: row.get(3)?,
    })
}

/// Create a new user with an already-hashed credential.
///
/// Fails with `InvalidInput` when the username is empty or taken.
pub fn create_user(conn: &Connection, username: &str, password_hash: &str) -> Result<User> {
    let username = username.trim();
    if username.is_empty() {
        return Err(Error::invalid_input("username must not be empty"));
    }

    if get_user_by_username(conn, username)?.is_some() {
        return Err(Error::invalid_input(format!(
            "username '{}' is already taken",
            username
        )));
    }

    conn.execute(
        "INSERT INTO users (username, password_hash) VALUES (?, ?)",
        [username, password_hash],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    let id = UserId::new(conn.last_insert_rowid());
    get_user(conn, id)?.ok_or_else(|| Error::internal("user vanished after insert"))
}

/// Get a user by id.
pub fn get_user(conn: &Connection, id: UserId) -> Result<Option<User>> {
    conn.query_row(
        "SELECT id, username, password_hash, created_at FROM users WHERE id = ?",
        [id.get()],
        parse_user_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// Get a user by username.
pub fn get_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
    conn.query_row(
        "SELECT id, username, password_hash, created_at FROM users WHERE username = ?",
        [username.trim()],
        parse_user_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// Return the user when the password's digest matches the stored one.
pub fn verify_credentials(conn: &Connection, username: &str, password: &str) -> Result<Option<User>> {
    let user = get_user_by_username(conn, username)?;
    Ok(user.filter(|u| u.password_hash == hash_credential(password)))
}
