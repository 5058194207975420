use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub email: String,
    /// Argon2 PHC string, see `accounts::hash_password`.
    pub credential: String,
    pub avatar_url: Option<String>,
    pub created_at: String,
    pub karma: i64,
    pub email_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityRecord {
    pub id: String,
    /// Lowercase, unique.
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub icon_url: Option<String>,
    pub banner_url: Option<String>,
    pub is_nsfw: bool,
    pub subscribers: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PostBody {
    Text { content: String },
    Link { url: String },
    Image { url: String },
}

impl PostBody {
    pub fn kind(&self) -> &'static str {
        match self {
            PostBody::Text { .. } => "text",
            PostBody::Link { .. } => "link",
            PostBody::Image { .. } => "image",
        }
    }

    /// The text content or URL carried by the body.
    pub fn value(&self) -> &str {
        match self {
            PostBody::Text { content } => content,
            PostBody::Link { url } | PostBody::Image { url } => url,
        }
    }

    pub fn from_parts(kind: &str, value: String) -> Result<Self> {
        Ok(match kind {
            "text" => PostBody::Text { content: value },
            "link" => PostBody::Link { url: value },
            "image" => PostBody::Image { url: value },
            other => bail!("unknown post body kind {other:?}"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: String,
    pub title: String,
    pub body: PostBody,
    /// Name of the owning community.
    pub community: String,
    pub author_id: String,
    pub author_name: String,
    pub created_at: String,
    pub upvotes: i64,
    pub downvotes: i64,
    pub comment_count: i64,
    #[serde(default)]
    pub is_stickied: bool,
    #[serde(default)]
    pub is_locked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub author_name: String,
    pub content: String,
    pub created_at: String,
    pub upvotes: i64,
    pub downvotes: i64,
    pub parent_id: Option<String>,
    pub level: u32,
}

/// Signed change applied to stored vote counts during a sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCountDelta {
    pub upvotes: i64,
    pub downvotes: i64,
}
