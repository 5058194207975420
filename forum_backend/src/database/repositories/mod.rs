mod comments;
mod communities;
pub(crate) mod memory;
mod posts;
mod users;

use super::models::{CommentRecord, CommunityRecord, PostRecord, UserRecord, VoteCountDelta};
use anyhow::Result;
use rusqlite::Connection;

pub use memory::{ForumData, MemoryRepositories};

pub trait UserRepository {
    fn create(&self, record: &UserRecord) -> Result<()>;
    fn update(&self, record: &UserRecord) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<UserRecord>>;
    fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>>;
    fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>>;
    fn list(&self) -> Result<Vec<UserRecord>>;
    /// Returns the updated record, or `None` when the user does not exist.
    fn adjust_karma(&self, id: &str, delta: i64) -> Result<Option<UserRecord>>;
}

pub trait CommunityRepository {
    fn create(&self, record: &CommunityRecord) -> Result<()>;
    /// Case-insensitive lookup.
    fn get_by_name(&self, name: &str) -> Result<Option<CommunityRecord>>;
    fn list(&self) -> Result<Vec<CommunityRecord>>;
}

/// Posts are listed in insertion order; callers rank them.
pub trait PostRepository {
    fn create(&self, record: &PostRecord) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<PostRecord>>;
    fn list(&self) -> Result<Vec<PostRecord>>;
    fn list_for_community(&self, community: &str) -> Result<Vec<PostRecord>>;
    fn list_for_author(&self, author_id: &str) -> Result<Vec<PostRecord>>;
    fn increment_comment_count(&self, id: &str) -> Result<Option<PostRecord>>;
    fn adjust_votes(&self, id: &str, delta: VoteCountDelta) -> Result<Option<PostRecord>>;
}

/// Comments are listed in insertion order.
pub trait CommentRepository {
    fn create(&self, record: &CommentRecord) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<CommentRecord>>;
    fn list_for_post(&self, post_id: &str) -> Result<Vec<CommentRecord>>;
    fn list_for_author(&self, author_id: &str) -> Result<Vec<CommentRecord>>;
    fn adjust_votes(&self, id: &str, delta: VoteCountDelta) -> Result<Option<CommentRecord>>;
}

/// The capability set handed to services for one unit of work.
pub trait Repositories {
    fn users(&self) -> &dyn UserRepository;
    fn communities(&self) -> &dyn CommunityRepository;
    fn posts(&self) -> &dyn PostRepository;
    fn comments(&self) -> &dyn CommentRepository;
}

pub struct SqliteRepositories<'conn> {
    users: users::SqliteUserRepository<'conn>,
    communities: communities::SqliteCommunityRepository<'conn>,
    posts: posts::SqlitePostRepository<'conn>,
    comments: comments::SqliteCommentRepository<'conn>,
}

impl<'conn> SqliteRepositories<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            users: users::SqliteUserRepository { conn },
            communities: communities::SqliteCommunityRepository { conn },
            posts: posts::SqlitePostRepository { conn },
            comments: comments::SqliteCommentRepository { conn },
        }
    }
}

impl<'conn> Repositories for SqliteRepositories<'conn> {
    fn users(&self) -> &dyn UserRepository {
        &self.users
    }

    fn communities(&self) -> &dyn CommunityRepository {
        &self.communities
    }

    fn posts(&self) -> &dyn PostRepository {
        &self.posts
    }

    fn comments(&self) -> &dyn CommentRepository {
        &self.comments
    }
}
