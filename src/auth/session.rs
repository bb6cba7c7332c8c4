use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::format_timestamp;
use crate::error::AppResult;
use crate::state::DbPool;

/// A century; keeps the expiry arithmetic in range.
const MAX_SESSION_HOURS: u64 = 24 * 365 * 100;

/// Create a new session for a user. Returns the session token.
pub fn create_session(pool: &DbPool, user_id: i64, hours: u64) -> AppResult<String> {
    let conn = pool.get()?;
    insert_session(&conn, user_id, hours, Utc::now())
}

pub fn insert_session(
    conn: &Connection,
    user_id: i64,
    hours: u64,
    now: DateTime<Utc>,
) -> AppResult<String> {
    let token = generate_token();
    let hours = hours.min(MAX_SESSION_HOURS) as i64;
    let expires_at = now + Duration::hours(hours);

    conn.execute(
        "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
        params![token, user_id, format_timestamp(expires_at)],
    )?;
    tracing::debug!(user_id, "Session created");

    Ok(token)
}

/// Resolve an unexpired session to its user id.
pub fn lookup_session(conn: &Connection, token: &str, now: DateTime<Utc>) -> AppResult<Option<i64>> {
    let found = conn
        .query_row(
            "SELECT u.id FROM sessions s \
             JOIN users u ON u.id = s.user_id \
             WHERE s.token = ?1 AND s.expires_at > ?2",
            params![token, format_timestamp(now)],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found)
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{self, at};

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        let t1 = generate_token();
        let t2 = generate_token();
        assert_ne!(t1, t2);
    }

    #[test]
    fn session_resolves_until_it_expires() {
        let conn = testing::conn();
        let alice = testing::user(&conn, "alice");
        let token = insert_session(&conn, alice, 2, at(0)).unwrap();

        assert_eq!(
            lookup_session(&conn, &token, at(3600)).unwrap(),
            Some(alice)
        );
        assert_eq!(lookup_session(&conn, &token, at(7200)).unwrap(), None);
        assert_eq!(lookup_session(&conn, "bogus", at(0)).unwrap(), None);
    }

    #[test]
    fn pooled_session_resolves_to_its_user() {
        let (_tmp, pool) = testing::file_pool();
        let alice = crate::auth::ensure_user(&pool.get().unwrap(), "alice").unwrap();

        let token = create_session(&pool, alice, 1).unwrap();
        let conn = pool.get().unwrap();
        assert_eq!(lookup_session(&conn, &token, Utc::now()).unwrap(), Some(alice));
        // One-hour session, checked two hours later.
        assert_eq!(
            lookup_session(&conn, &token, Utc::now() + Duration::hours(2)).unwrap(),
            None
        );
    }
}
