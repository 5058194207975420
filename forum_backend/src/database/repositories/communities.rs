use crate::database::models::CommunityRecord;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

pub(super) struct SqliteCommunityRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

fn map_community(row: &Row<'_>) -> rusqlite::Result<CommunityRecord> {
    Ok(CommunityRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        display_name: row.get(2)?,
        description: row.get(3)?,
        icon_url: row.get(4)?,
        banner_url: row.get(5)?,
        is_nsfw: row.get::<_, i64>(6)? != 0,
        subscribers: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl<'conn> super::CommunityRepository for SqliteCommunityRepository<'conn> {
    fn create(&self, record: &CommunityRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO communities (id, name, display_name, description, icon_url, banner_url, is_nsfw, subscribers, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                record.id,
                record.name,
                record.display_name,
                record.description,
                record.icon_url,
                record.banner_url,
                if record.is_nsfw { 1 } else { 0 },
                record.subscribers,
                record.created_at,
            ],
        )?;
        Ok(())
    }

    fn get_by_name(&self, name: &str) -> Result<Option<CommunityRecord>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT id, name, display_name, description, icon_url, banner_url, is_nsfw, subscribers, created_at
                FROM communities
                WHERE name = ?1 COLLATE NOCASE
                "#,
                params![name],
                map_community,
            )
            .optional()?)
    }

    fn list(&self) -> Result<Vec<CommunityRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, name, display_name, description, icon_url, banner_url, is_nsfw, subscribers, created_at
            FROM communities
            ORDER BY rowid ASC
            "#,
        )?;
        let rows = stmt.query_map([], map_community)?;
        let mut communities = Vec::new();
        for row in rows {
            communities.push(row?);
        }
        Ok(communities)
    }
}
