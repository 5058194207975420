use crate::database::models::UserRecord;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

const USER_COLUMNS: &str =
    "id, username, email, credential, avatar_url, created_at, karma, email_verified";

pub(super) struct SqliteUserRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        credential: row.get(3)?,
        avatar_url: row.get(4)?,
        created_at: row.get(5)?,
        karma: row.get(6)?,
        email_verified: row.get::<_, i64>(7)? != 0,
    })
}

impl<'conn> SqliteUserRepository<'conn> {
    fn find_one(&self, column: &str, value: &str) -> Result<Option<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![value], map_user)
            .optional()?)
    }
}

impl<'conn> super::UserRepository for SqliteUserRepository<'conn> {
    fn create(&self, record: &UserRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO users (id, username, email, credential, avatar_url, created_at, karma, email_verified)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                record.id,
                record.username,
                record.email,
                record.credential,
                record.avatar_url,
                record.created_at,
                record.karma,
                if record.email_verified { 1 } else { 0 },
            ],
        )?;
        Ok(())
    }

    fn update(&self, record: &UserRecord) -> Result<()> {
        self.conn.execute(
            r#"
            UPDATE users SET
                username = ?2,
                email = ?3,
                credential = ?4,
                avatar_url = ?5,
                karma = ?6,
                email_verified = ?7
            WHERE id = ?1
            "#,
            params![
                record.id,
                record.username,
                record.email,
                record.credential,
                record.avatar_url,
                record.karma,
                if record.email_verified { 1 } else { 0 },
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<UserRecord>> {
        self.find_one("id", id)
    }

    fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        self.find_one("username", username)
    }

    fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        self.find_one("email", email)
    }

    fn list(&self) -> Result<Vec<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY rowid ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], map_user)?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    fn adjust_karma(&self, id: &str, delta: i64) -> Result<Option<UserRecord>> {
        let changed = self.conn.execute(
            "UPDATE users SET karma = karma + ?2 WHERE id = ?1",
            params![id, delta],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        self.get(id)
    }
}
