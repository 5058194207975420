use crate::database::models::{PostBody, PostRecord, VoteCountDelta};
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

const POST_COLUMNS: &str = "id, title, body_kind, body_value, community, author_id, author_name, \
     created_at, upvotes, downvotes, comment_count, is_stickied, is_locked";

pub(super) struct SqlitePostRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

fn map_post(row: &Row<'_>) -> rusqlite::Result<PostRecord> {
    let kind: String = row.get(2)?;
    let value: String = row.get(3)?;
    let body = PostBody::from_parts(&kind, value).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, err.into())
    })?;
    Ok(PostRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        body,
        community: row.get(4)?,
        author_id: row.get(5)?,
        author_name: row.get(6)?,
        created_at: row.get(7)?,
        upvotes: row.get(8)?,
        downvotes: row.get(9)?,
        comment_count: row.get(10)?,
        is_stickied: row.get::<_, i64>(11)? != 0,
        is_locked: row.get::<_, i64>(12)? != 0,
    })
}

impl<'conn> SqlitePostRepository<'conn> {
    fn query_list(&self, filter: &str, arg: Option<&str>) -> Result<Vec<PostRecord>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts {filter} ORDER BY rowid ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = match arg {
            Some(arg) => stmt.query_map(params![arg], map_post)?,
            None => stmt.query_map([], map_post)?,
        };
        let mut posts = Vec::new();
        for row in rows {
            posts.push(row?);
        }
        Ok(posts)
    }
}

impl<'conn> super::PostRepository for SqlitePostRepository<'conn> {
    fn create(&self, record: &PostRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO posts (id, title, body_kind, body_value, community, author_id, author_name,
                               created_at, upvotes, downvotes, comment_count, is_stickied, is_locked)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                record.id,
                record.title,
                record.body.kind(),
                record.body.value(),
                record.community,
                record.author_id,
                record.author_name,
                record.created_at,
                record.upvotes,
                record.downvotes,
                record.comment_count,
                if record.is_stickied { 1 } else { 0 },
                if record.is_locked { 1 } else { 0 },
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<PostRecord>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], map_post)
            .optional()?)
    }

    fn list(&self) -> Result<Vec<PostRecord>> {
        self.query_list("", None)
    }

    fn list_for_community(&self, community: &str) -> Result<Vec<PostRecord>> {
        self.query_list("WHERE community = ?1 COLLATE NOCASE", Some(community))
    }

    fn list_for_author(&self, author_id: &str) -> Result<Vec<PostRecord>> {
        self.query_list("WHERE author_id = ?1", Some(author_id))
    }

    fn increment_comment_count(&self, id: &str) -> Result<Option<PostRecord>> {
        let changed = self.conn.execute(
            "UPDATE posts SET comment_count = comment_count + 1 WHERE id = ?1",
            params![id],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        self.get(id)
    }

    fn adjust_votes(&self, id: &str, delta: VoteCountDelta) -> Result<Option<PostRecord>> {
        let changed = self.conn.execute(
            r#"
            UPDATE posts
            SET upvotes = MAX(upvotes + ?2, 0),
                downvotes = MAX(downvotes + ?3, 0)
            WHERE id = ?1
            "#,
            params![id, delta.upvotes, delta.downvotes],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        self.get(id)
    }
}
