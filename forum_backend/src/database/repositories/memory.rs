//! Flat-collection adapter: every collection is a `Vec` scanned linearly,
//! kept in insertion order. Backs both the `memory` and `json` storage modes.

use super::{CommentRepository, CommunityRepository, PostRepository, Repositories, UserRepository};
use crate::database::models::{
    CommentRecord, CommunityRecord, PostRecord, UserRecord, VoteCountDelta,
};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForumData {
    #[serde(default)]
    pub users: Vec<UserRecord>,
    #[serde(default)]
    pub communities: Vec<CommunityRecord>,
    #[serde(default)]
    pub posts: Vec<PostRecord>,
    #[serde(default)]
    pub comments: Vec<CommentRecord>,
}

#[derive(Clone, Copy)]
struct Store<'a> {
    data: &'a RefCell<ForumData>,
    dirty: &'a Cell<bool>,
}

impl<'a> Store<'a> {
    fn read<T>(&self, f: impl FnOnce(&ForumData) -> T) -> T {
        f(&self.data.borrow())
    }

    fn write<T>(&self, f: impl FnOnce(&mut ForumData) -> Result<T>) -> Result<T> {
        let result = f(&mut self.data.borrow_mut())?;
        self.dirty.set(true);
        Ok(result)
    }
}

pub struct MemoryRepositories<'a> {
    users: MemoryUserRepository<'a>,
    communities: MemoryCommunityRepository<'a>,
    posts: MemoryPostRepository<'a>,
    comments: MemoryCommentRepository<'a>,
}

impl<'a> MemoryRepositories<'a> {
    /// `dirty` is raised by every successful write.
    pub fn new(data: &'a RefCell<ForumData>, dirty: &'a Cell<bool>) -> Self {
        let store = Store { data, dirty };
        Self {
            users: MemoryUserRepository { store },
            communities: MemoryCommunityRepository { store },
            posts: MemoryPostRepository { store },
            comments: MemoryCommentRepository { store },
        }
    }
}

impl<'a> Repositories for MemoryRepositories<'a> {
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

struct MemoryUserRepository<'a> {
    store: Store<'a>,
}

impl<'a> MemoryUserRepository<'a> {
    fn find(&self, predicate: impl Fn(&UserRecord) -> bool) -> Option<UserRecord> {
        self.store
            .read(|data| data.users.iter().find(|&user| predicate(user)).cloned())
    }
}

impl<'a> UserRepository for MemoryUserRepository<'a> {
    fn create(&self, record: &UserRecord) -> Result<()> {
        self.store.write(|data| {
            if data.users.iter().any(|u| {
                u.id == record.id || u.username == record.username || u.email == record.email
            }) {
                bail!("user {} violates a uniqueness constraint", record.id);
            }
            data.users.push(record.clone());
            Ok(())
        })
    }

    fn update(&self, record: &UserRecord) -> Result<()> {
        self.store.write(|data| {
            if let Some(existing) = data.users.iter_mut().find(|u| u.id == record.id) {
                *existing = record.clone();
            }
            Ok(())
        })
    }

    fn get(&self, id: &str) -> Result<Option<UserRecord>> {
        Ok(self.find(|u| u.id == id))
    }

    fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        Ok(self.find(|u| u.username == username))
    }

    fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        Ok(self.find(|u| u.email == email))
    }

    fn list(&self) -> Result<Vec<UserRecord>> {
        Ok(self.store.read(|data| data.users.clone()))
    }

    fn adjust_karma(&self, id: &str, delta: i64) -> Result<Option<UserRecord>> {
        if self.find(|u| u.id == id).is_none() {
            return Ok(None);
        }
        self.store.write(|data| {
            Ok(data.users.iter_mut().find(|u| u.id == id).map(|user| {
                user.karma += delta;
                user.clone()
            }))
        })
    }
}

struct MemoryCommunityRepository<'a> {
    store: Store<'a>,
}

impl<'a> CommunityRepository for MemoryCommunityRepository<'a> {
    fn create(&self, record: &CommunityRecord) -> Result<()> {
        self.store.write(|data| {
            if data
                .communities
                .iter()
                .any(|c| c.id == record.id || c.name.eq_ignore_ascii_case(&record.name))
            {
                bail!("community {} already exists", record.name);
            }
            data.communities.push(record.clone());
            Ok(())
        })
    }

    fn get_by_name(&self, name: &str) -> Result<Option<CommunityRecord>> {
        Ok(self.store.read(|data| {
            data.communities
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(name))
                .cloned()
        }))
    }

    fn list(&self) -> Result<Vec<CommunityRecord>> {
        Ok(self.store.read(|data| data.communities.clone()))
    }
}

struct MemoryPostRepository<'a> {
    store: Store<'a>,
}

impl<'a> MemoryPostRepository<'a> {
    fn filter(&self, predicate: impl Fn(&PostRecord) -> bool) -> Vec<PostRecord> {
        self.store.read(|data| {
            data.posts
                .iter()
                .filter(|&post| predicate(post))
                .cloned()
                .collect()
        })
    }

    fn modify(&self, id: &str, f: impl FnOnce(&mut PostRecord)) -> Result<Option<PostRecord>> {
        if self.get(id)?.is_none() {
            return Ok(None);
        }
        self.store.write(|data| {
            Ok(data.posts.iter_mut().find(|p| p.id == id).map(|post| {
                f(post);
                post.clone()
            }))
        })
    }
}

impl<'a> PostRepository for MemoryPostRepository<'a> {
    fn create(&self, record: &PostRecord) -> Result<()> {
        self.store.write(|data| {
            if data.posts.iter().any(|p| p.id == record.id) {
                bail!("post {} already exists", record.id);
            }
            data.posts.push(record.clone());
            Ok(())
        })
    }

    fn get(&self, id: &str) -> Result<Option<PostRecord>> {
        Ok(self
            .store
            .read(|data| data.posts.iter().find(|p| p.id == id).cloned()))
    }

    fn list(&self) -> Result<Vec<PostRecord>> {
        Ok(self.filter(|_| true))
    }

    fn list_for_community(&self, community: &str) -> Result<Vec<PostRecord>> {
        Ok(self.filter(|p| p.community.eq_ignore_ascii_case(community)))
    }

    fn list_for_author(&self, author_id: &str) -> Result<Vec<PostRecord>> {
        Ok(self.filter(|p| p.author_id == author_id))
    }

    fn increment_comment_count(&self, id: &str) -> Result<Option<PostRecord>> {
        self.modify(id, |post| post.comment_count += 1)
    }

    fn adjust_votes(&self, id: &str, delta: VoteCountDelta) -> Result<Option<PostRecord>> {
        self.modify(id, |post| {
            post.upvotes = (post.upvotes + delta.upvotes).max(0);
            post.downvotes = (post.downvotes + delta.downvotes).max(0);
        })
    }
}

struct MemoryCommentRepository<'a> {
    store: Store<'a>,
}

impl<'a> MemoryCommentRepository<'a> {
    fn filter(&self, predicate: impl Fn(&CommentRecord) -> bool) -> Vec<CommentRecord> {
        self.store.read(|data| {
            data.comments
                .iter()
                .filter(|&comment| predicate(comment))
                .cloned()
                .collect()
        })
    }
}

impl<'a> CommentRepository for MemoryCommentRepository<'a> {
    fn create(&self, record: &CommentRecord) -> Result<()> {
        self.store.write(|data| {
            if data.comments.iter().any(|c| c.id == record.id) {
                bail!("comment {} already exists", record.id);
            }
            if !data.posts.iter().any(|p| p.id == record.post_id) {
                bail!("comment {} references unknown post {}", record.id, record.post_id);
            }
            data.comments.push(record.clone());
            Ok(())
        })
    }

    fn get(&self, id: &str) -> Result<Option<CommentRecord>> {
        Ok(self
            .store
            .read(|data| data.comments.iter().find(|c| c.id == id).cloned()))
    }

    fn list_for_post(&self, post_id: &str) -> Result<Vec<CommentRecord>> {
        Ok(self.filter(|c| c.post_id == post_id))
    }

    fn list_for_author(&self, author_id: &str) -> Result<Vec<CommentRecord>> {
        Ok(self.filter(|c| c.author_id == author_id))
    }

    fn adjust_votes(&self, id: &str, delta: VoteCountDelta) -> Result<Option<CommentRecord>> {
        if self.get(id)?.is_none() {
            return Ok(None);
        }
        self.store.write(|data| {
            Ok(data.comments.iter_mut().find(|c| c.id == id).map(|comment| {
                comment.upvotes = (comment.upvotes + delta.upvotes).max(0);
                comment.downvotes = (comment.downvotes + delta.downvotes).max(0);
                comment.clone()
            }))
        })
    }
}
