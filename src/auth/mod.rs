pub mod session;

use rusqlite::{params, Connection};

use crate::error::AppResult;

/// Look up `username`, creating the account row if it does not exist yet.
pub fn ensure_user(conn: &Connection, username: &str) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO users (username) VALUES (?1) ON CONFLICT(username) DO NOTHING",
        params![username],
    )?;
    let id = conn.query_row(
        "SELECT id FROM users WHERE username = ?1",
        params![username],
        |row| row.get(0),
    )?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing;

    #[test]
    fn ensure_user_is_idempotent() {
        let conn = testing::conn();
        let first = ensure_user(&conn, "alice").unwrap();
        let again = ensure_user(&conn, "alice").unwrap();
        assert_eq!(first, again);
        assert_ne!(ensure_user(&conn, "bob").unwrap(), first);
    }
}
