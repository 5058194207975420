use crate::database::models::{CommentRecord, VoteCountDelta};
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

pub(super) struct SqliteCommentRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

fn map_comment(row: &Row<'_>) -> rusqlite::Result<CommentRecord> {
    Ok(CommentRecord {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author_id: row.get(2)?,
        author_name: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
        upvotes: row.get(6)?,
        downvotes: row.get(7)?,
        parent_id: row.get(8)?,
        level: row.get(9)?,
    })
}

impl<'conn> SqliteCommentRepository<'conn> {
    fn list_where(&self, column: &str, value: &str) -> Result<Vec<CommentRecord>> {
        let sql = format!(
            r#"
            SELECT id, post_id, author_id, author_name, content, created_at, upvotes, downvotes, parent_id, level
            FROM comments
            WHERE {column} = ?1
            ORDER BY rowid ASC
            "#
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![value], map_comment)?;
        let mut comments = Vec::new();
        for row in rows {
            comments.push(row?);
        }
        Ok(comments)
    }
}

impl<'conn> super::CommentRepository for SqliteCommentRepository<'conn> {
    fn create(&self, record: &CommentRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO comments (id, post_id, author_id, author_name, content, created_at, upvotes, downvotes, parent_id, level)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                record.id,
                record.post_id,
                record.author_id,
                record.author_name,
                record.content,
                record.created_at,
                record.upvotes,
                record.downvotes,
                record.parent_id,
                record.level,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<CommentRecord>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT id, post_id, author_id, author_name, content, created_at, upvotes, downvotes, parent_id, level
                FROM comments
                WHERE id = ?1
                "#,
                params![id],
                map_comment,
            )
            .optional()?)
    }

    fn list_for_post(&self, post_id: &str) -> Result<Vec<CommentRecord>> {
        self.list_where("post_id", post_id)
    }

    fn list_for_author(&self, author_id: &str) -> Result<Vec<CommentRecord>> {
        self.list_where("author_id", author_id)
    }

    fn adjust_votes(&self, id: &str, delta: VoteCountDelta) -> Result<Option<CommentRecord>> {
        let changed = self.conn.execute(
            r#"
            UPDATE comments
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
