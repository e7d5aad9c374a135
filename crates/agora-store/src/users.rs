use agora_shared::UserId;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Create a user row. Registration proper belongs to the forum; this is
    /// used for fixtures and local development.
    pub fn insert_user(&self, username: &str) -> Result<UserId> {
        self.conn().execute(
            "INSERT INTO users (username) VALUES (?1)",
            params![username],
        )?;
        Ok(UserId(self.conn().last_insert_rowid()))
    }

    /// Resolve a user id to its display name.
    pub fn get_username(&self, id: UserId) -> Result<Option<String>> {
        let username: Option<Option<String>> = self
            .conn()
            .query_row(
                "SELECT username FROM users WHERE id = ?1",
                params![id.get()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(username.flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_lookup() {
        let db = Database::open_in_memory().unwrap();
        let alice = db.insert_user("alice").unwrap();

        assert_eq!(db.get_username(alice).unwrap().as_deref(), Some("alice"));
        assert_eq!(db.get_username(UserId(404)).unwrap(), None);
    }
}
