use crate::database::models::{CommentRecord, PostBody, PostRecord, UserRecord};
use crate::database::repositories::Repositories;
use crate::database::Database;
use crate::error::{require_non_blank, ForumError, ForumResult};
use crate::ranking::{sort_by_policy, RankingSettings, Scored, SortPolicy};
use crate::utils::{new_id, now_utc_iso};
use crate::votes::{effective_score, SubjectKind, VoteBook, VoteKey, VoteLedger};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::VecDeque;
use tracing::info;

#[derive(Clone)]
pub struct ThreadService {
    database: Database,
    votes: VoteBook,
    ranking: RankingSettings,
}

impl ThreadService {
    pub fn new(database: Database, votes: VoteBook, ranking: RankingSettings) -> Self {
        Self {
            database,
            votes,
            ranking,
        }
    }

    /// Front page when `community` is `None`. An unknown community yields an
    /// empty list.
    pub fn list_posts(
        &self,
        viewer: &str,
        community: Option<&str>,
        sort: SortPolicy,
        limit: Option<usize>,
    ) -> ForumResult<Vec<PostView>> {
        let records = self.database.with_repositories(|repos| match community {
            Some(name) => repos.posts().list_for_community(name),
            None => repos.posts().list(),
        })?;
        let ledger = self.votes.snapshot(viewer)?;
        let mut posts: Vec<PostView> = records
            .into_iter()
            .map(|record| PostView::from_record(record, &ledger))
            .collect();
        sort_by_policy(&mut posts, sort, Utc::now(), self.ranking);
        if let Some(limit) = limit {
            posts.truncate(limit);
        }
        Ok(posts)
    }

    /// The post with its comment forest; top-level comments ordered by
    /// `comment_sort`, replies in insertion order.
    pub fn get_post(
        &self,
        viewer: &str,
        post_id: &str,
        comment_sort: SortPolicy,
    ) -> ForumResult<Option<PostDetails>> {
        let loaded = self.database.with_repositories(|repos| {
            let Some(post) = repos.posts().get(post_id)? else {
                return Ok(None);
            };
            let comments = repos.comments().list_for_post(post_id)?;
            Ok::<_, anyhow::Error>(Some((post, comments)))
        })?;
        let Some((post, comments)) = loaded else {
            return Ok(None);
        };
        let ledger = self.votes.snapshot(viewer)?;
        let views = comments
            .into_iter()
            .map(|record| CommentView::from_record(record, &ledger))
            .collect();
        let mut forest = assemble_comment_tree(views);
        sort_by_policy(&mut forest, comment_sort, Utc::now(), self.ranking);
        Ok(Some(PostDetails {
            post: PostView::from_record(post, &ledger),
            comments: forest,
        }))
    }

    pub fn create_post(&self, viewer: &str, input: CreatePostInput) -> ForumResult<PostView> {
        require_non_blank("title", &input.title)?;
        require_non_blank("community", &input.community)?;
        match &input.body {
            PostBody::Text { content } => require_non_blank("content", content)?,
            PostBody::Link { url } | PostBody::Image { url } => require_non_blank("url", url)?,
        }

        let record = self.database.with_repositories(|repos| -> ForumResult<PostRecord> {
            let author = resolve_author(repos, viewer)?;
            let community = repos
                .communities()
                .get_by_name(input.community.trim())?
                .ok_or_else(|| {
                    ForumError::validation(format!("community {:?} does not exist", input.community))
                })?;
            let record = PostRecord {
                id: new_id("post"),
                title: input.title.trim().to_string(),
                body: input.body.clone(),
                community: community.name,
                author_id: author.id,
                author_name: author.username,
                created_at: now_utc_iso(),
                upvotes: 0,
                downvotes: 0,
                comment_count: 0,
                is_stickied: false,
                is_locked: false,
            };
            repos.posts().create(&record)?;
            Ok(record)
        })?;
        info!(post_id = %record.id, community = %record.community, "post created");
        Ok(PostView::from_record(record, &VoteLedger::default()))
    }

    /// Appends a comment or reply and bumps the post's comment count in the
    /// same unit of work.
    pub fn create_comment(
        &self,
        viewer: &str,
        post_id: &str,
        input: CreateCommentInput,
    ) -> ForumResult<CommentView> {
        require_non_blank("content", &input.content)?;

        let record = self.database.with_repositories(|repos| -> ForumResult<CommentRecord> {
            let author = resolve_author(repos, viewer)?;
            let post = repos
                .posts()
                .get(post_id)?
                .ok_or_else(|| ForumError::not_found(format!("post {post_id}")))?;
            if post.is_locked {
                return Err(ForumError::validation(format!("post {post_id} is locked")));
            }
            let level = match input.parent_id.as_deref() {
                None => 0,
                Some(parent_id) => match repos.comments().get(parent_id)? {
                    Some(parent) if parent.post_id == post.id => parent.level + 1,
                    _ => {
                        return Err(ForumError::validation(format!(
                            "parent comment {parent_id} does not belong to post {post_id}"
                        )))
                    }
                },
            };
            let record = CommentRecord {
                id: new_id("comment"),
                post_id: post.id.clone(),
                author_id: author.id,
                author_name: author.username,
                content: input.content.trim().to_string(),
                created_at: now_utc_iso(),
                upvotes: 0,
                downvotes: 0,
                parent_id: input.parent_id.clone(),
                level,
            };
            repos.comments().create(&record)?;
            repos.posts().increment_comment_count(&post.id)?;
            Ok(record)
        })?;
        info!(comment_id = %record.id, post_id, level = record.level, "comment created");
        Ok(CommentView::from_record(record, &VoteLedger::default()))
    }
}

/// Writes require a registered account with a confirmed email; the viewer
/// may be a user id or a username.
pub(crate) fn resolve_author(repos: &dyn Repositories, viewer: &str) -> ForumResult<UserRecord> {
    let user = match repos.users().get(viewer)? {
        Some(user) => Some(user),
        None => repos.users().find_by_username(viewer)?,
    };
    let user =
        user.ok_or_else(|| ForumError::Unauthorized(format!("{viewer} is not a registered user")))?;
    if !user.email_verified {
        return Err(ForumError::Unauthorized(format!(
            "{} has not confirmed their email",
            user.username
        )));
    }
    Ok(user)
}

/// Builds the comment forest for one post.
///
/// Children of a node are the comments naming it as parent, in input order.
/// A comment whose parent is missing, or which names itself, becomes a root.
/// Parent cycles are broken by promoting the earliest cycle member to a root,
/// so every input comment appears exactly once. Works iteratively, so depth
/// is unbounded.
pub fn assemble_comment_tree(comments: Vec<CommentView>) -> Vec<CommentNode> {
    let count = comments.len();
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(count);
    for (i, comment) in comments.iter().enumerate() {
        index.entry(comment.id.as_str()).or_insert(i);
    }
    let mut parent: Vec<Option<usize>> = comments
        .iter()
        .enumerate()
        .map(|(i, comment)| {
            comment
                .parent_id
                .as_deref()
                .and_then(|id| index.get(id).copied())
                .filter(|&p| p != i)
        })
        .collect();
    drop(index);

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut roots = Vec::new();
    for (i, p) in parent.iter().enumerate() {
        match p {
            Some(p) => children[*p].push(i),
            None => roots.push(i),
        }
    }

    let mut reached = vec![false; count];
    for &root in &roots {
        mark_subtree(root, &children, &mut reached);
    }

    // Anything unreached hangs off a parent cycle.
    let mut on_path = vec![false; count];
    for start in 0..count {
        if reached[start] {
            continue;
        }
        let mut path = Vec::new();
        let mut current = start;
        while !on_path[current] {
            on_path[current] = true;
            path.push(current);
            match parent[current] {
                Some(p) => current = p,
                None => break,
            }
        }
        let cycle_start = path.iter().position(|&i| i == current).unwrap_or(0);
        let promoted = path[cycle_start..].iter().copied().min().unwrap_or(start);
        for &i in &path {
            on_path[i] = false;
        }
        if let Some(old_parent) = parent[promoted].take() {
            children[old_parent].retain(|&c| c != promoted);
        }
        let position = roots.partition_point(|&r| r < promoted);
        roots.insert(position, promoted);
        mark_subtree(promoted, &children, &mut reached);
    }

    // Breadth-first order gives depths; building in reverse guarantees every
    // child node exists before its parent.
    let mut depth = vec![0u32; count];
    let mut order = Vec::with_capacity(count);
    let mut queue: VecDeque<usize> = roots.iter().copied().collect();
    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &child in &children[i] {
            depth[child] = depth[i] + 1;
            queue.push_back(child);
        }
    }

    let mut views: Vec<Option<CommentView>> = comments.into_iter().map(Some).collect();
    let mut built: Vec<Option<CommentNode>> = (0..count).map(|_| None).collect();
    for &i in order.iter().rev() {
        let kids = children[i]
            .iter()
            .filter_map(|&child| built[child].take())
            .collect();
        if let Some(comment) = views[i].take() {
            built[i] = Some(CommentNode {
                comment,
                depth: depth[i],
                children: kids,
            });
        }
    }
    roots
        .into_iter()
        .filter_map(|root| built[root].take())
        .collect()
}

fn mark_subtree(root: usize, children: &[Vec<usize>], reached: &mut [bool]) {
    let mut stack = vec![root];
    while let Some(i) = stack.pop() {
        if reached[i] {
            continue;
        }
        reached[i] = true;
        stack.extend(children[i].iter().copied());
    }
}

/// Pre-order walk of a forest.
pub fn flatten_preorder(forest: &[CommentNode]) -> Vec<&CommentView> {
    let mut out = Vec::new();
    let mut stack: Vec<&CommentNode> = forest.iter().rev().collect();
    while let Some(node) = stack.pop() {
        out.push(&node.comment);
        stack.extend(node.children.iter().rev());
    }
    out
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostView {
    pub id: String,
    pub title: String,
    #[serde(flatten)]
    pub body: PostBody,
    pub community: String,
    pub author_id: String,
    pub author_name: String,
    pub created_at: String,
    pub upvotes: i64,
    pub downvotes: i64,
    pub comment_count: i64,
    pub is_stickied: bool,
    pub is_locked: bool,
    /// Stored net score plus the viewer's unsynced vote.
    pub score: i64,
    pub viewer_vote: i8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentView {
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
    pub score: i64,
    pub viewer_vote: i8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: CommentView,
    /// Position in the assembled tree; orphans sit at 0.
    pub depth: u32,
    pub children: Vec<CommentNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostDetails {
    pub post: PostView,
    pub comments: Vec<CommentNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePostInput {
    pub title: String,
    pub community: String,
    #[serde(flatten)]
    pub body: PostBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCommentInput {
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl PostView {
    pub fn from_record(record: PostRecord, ledger: &VoteLedger) -> Self {
        let key = VoteKey::new(SubjectKind::Post, record.id.clone());
        Self {
            score: effective_score(record.upvotes, record.downvotes, ledger.delta(&key)),
            viewer_vote: ledger.vote(&key),
            id: record.id,
            title: record.title,
            body: record.body,
            community: record.community,
            author_id: record.author_id,
            author_name: record.author_name,
            created_at: record.created_at,
            upvotes: record.upvotes,
            downvotes: record.downvotes,
            comment_count: record.comment_count,
            is_stickied: record.is_stickied,
            is_locked: record.is_locked,
        }
    }
}

impl CommentView {
    pub fn from_record(record: CommentRecord, ledger: &VoteLedger) -> Self {
        let key = VoteKey::new(SubjectKind::Comment, record.id.clone());
        Self {
            score: effective_score(record.upvotes, record.downvotes, ledger.delta(&key)),
            viewer_vote: ledger.vote(&key),
            id: record.id,
            post_id: record.post_id,
            author_id: record.author_id,
            author_name: record.author_name,
            content: record.content,
            created_at: record.created_at,
            upvotes: record.upvotes,
            downvotes: record.downvotes,
            parent_id: record.parent_id,
            level: record.level,
        }
    }
}

impl Scored for PostView {
    fn upvotes(&self) -> i64 {
        self.upvotes
    }
    fn downvotes(&self) -> i64 {
        self.downvotes
    }
    fn created_at(&self) -> &str {
        &self.created_at
    }
}

impl Scored for CommentView {
    fn upvotes(&self) -> i64 {
        self.upvotes
    }
    fn downvotes(&self) -> i64 {
        self.downvotes
    }
    fn created_at(&self) -> &str {
        &self.created_at
    }
}

impl Scored for CommentNode {
    fn upvotes(&self) -> i64 {
        self.comment.upvotes
    }
    fn downvotes(&self) -> i64 {
        self.comment.downvotes
    }
    fn created_at(&self) -> &str {
        &self.comment.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::CommunityRecord;
    use crate::votes::{VoteDirection, VoteService};
    use rusqlite::Connection;

    fn view(id: &str, parent: Option<&str>) -> CommentView {
        CommentView::from_record(
            CommentRecord {
                id: id.into(),
                post_id: "post-1".into(),
                author_id: "user-1".into(),
                author_name: "alice".into(),
                content: format!("comment {id}"),
                created_at: "2024-01-01T00:00:00Z".into(),
                upvotes: 0,
                downvotes: 0,
                parent_id: parent.map(str::to_string),
                level: if parent.is_some() { 1 } else { 0 },
            },
            &VoteLedger::default(),
        )
    }

    fn shape(forest: &[CommentNode]) -> Vec<(String, u32, Vec<String>)> {
        forest
            .iter()
            .map(|node| {
                (
                    node.comment.id.clone(),
                    node.depth,
                    node.children.iter().map(|c| c.comment.id.clone()).collect(),
                )
            })
            .collect()
    }

    fn flat_ids(forest: &[CommentNode]) -> Vec<&str> {
        flatten_preorder(forest)
            .into_iter()
            .map(|c| c.id.as_str())
            .collect()
    }

    #[test]
    fn orphans_are_promoted_to_roots() {
        let forest = assemble_comment_tree(vec![
            view("r", None),
            view("k", Some("r")),
            view("o", Some("ghost")),
        ]);
        assert_eq!(
            shape(&forest),
            vec![
                ("r".to_string(), 0, vec!["k".to_string()]),
                ("o".to_string(), 0, vec![]),
            ]
        );
    }

    #[test]
    fn replies_may_precede_their_parents() {
        let forest = assemble_comment_tree(vec![
            view("c", Some("b")),
            view("b", Some("a")),
            view("a", None),
            view("d", Some("a")),
        ]);
        assert_eq!(flat_ids(&forest), ["a", "b", "c", "d"]);
        assert_eq!(forest[0].children[0].children[0].depth, 2);
    }

    #[test]
    fn deep_chains_do_not_recurse() {
        let mut comments = vec![view("c-0", None)];
        for i in 1..2_000 {
            comments.push(view(&format!("c-{i}"), Some(&format!("c-{}", i - 1))));
        }
        let forest = assemble_comment_tree(comments);
        assert_eq!(forest.len(), 1);
        assert_eq!(flatten_preorder(&forest).len(), 2_000);
    }

    #[test]
    fn cycles_and_self_parents_still_yield_every_comment_once() {
        let forest = assemble_comment_tree(vec![
            view("x", Some("a")),
            view("a", Some("b")),
            view("b", Some("a")),
            view("s", Some("s")),
        ]);
        assert_eq!(
            shape(&forest),
            vec![
                ("a".to_string(), 0, vec!["x".to_string(), "b".to_string()]),
                ("s".to_string(), 0, vec![]),
            ]
        );
        let mut ids = flat_ids(&forest);
        ids.sort();
        assert_eq!(ids, ["a", "b", "s", "x"]);
    }

    fn setup_service() -> (ThreadService, VoteService) {
        let conn = Connection::open_in_memory().expect("in-memory db");
        let db = Database::from_connection(conn, true);
        db.ensure_migrations().expect("migrations");
        db.with_repositories(|repos| {
            repos.users().create(&UserRecord {
                id: "user-1".into(),
                username: "alice".into(),
                email: "alice@example.com".into(),
                credential: "salt$digest".into(),
                avatar_url: None,
                created_at: "2024-01-01T00:00:00Z".into(),
                karma: 0,
                email_verified: true,
            })?;
            repos.communities().create(&CommunityRecord {
                id: "sub-rust".into(),
                name: "rust".into(),
                display_name: "Rust".into(),
                description: String::new(),
                icon_url: None,
                banner_url: None,
                is_nsfw: false,
                subscribers: 0,
                created_at: "2024-01-01T00:00:00Z".into(),
            })
        })
        .expect("fixtures");
        let book = VoteBook::default();
        (
            ThreadService::new(db.clone(), book.clone(), RankingSettings::default()),
            VoteService::new(db, book),
        )
    }

    fn text_post(title: &str) -> CreatePostInput {
        CreatePostInput {
            title: title.into(),
            community: "Rust".into(),
            body: PostBody::Text {
                content: "body".into(),
            },
        }
    }

    fn reply(content: &str, parent: Option<&str>) -> CreateCommentInput {
        CreateCommentInput {
            content: content.into(),
            parent_id: parent.map(str::to_string),
        }
    }

    /// Inserts a post directly, for fields no service operation sets.
    fn stored_post(service: &ThreadService, id: &str, created_at: &str, is_locked: bool) {
        service
            .database
            .with_repositories(|repos| {
                repos.posts().create(&PostRecord {
                    id: id.into(),
                    title: id.into(),
                    body: PostBody::Text {
                        content: "body".into(),
                    },
                    community: "rust".into(),
                    author_id: "user-1".into(),
                    author_name: "alice".into(),
                    created_at: created_at.into(),
                    upvotes: 0,
                    downvotes: 0,
                    comment_count: 0,
                    is_stickied: false,
                    is_locked,
                })
            })
            .unwrap();
    }

    #[test]
    fn comments_update_count_and_levels() {
        let (service, _) = setup_service();
        let post = service
            .create_post("alice", text_post("Hello"))
            .expect("create post");
        assert_eq!(post.community, "rust");

        let root = service
            .create_comment("user-1", &post.id, reply("first", None))
            .expect("root comment");
        let child = service
            .create_comment("alice", &post.id, reply("second", Some(&root.id)))
            .expect("reply");
        assert_eq!((root.level, child.level), (0, 1));

        let details = service
            .get_post("anonymous", &post.id, SortPolicy::Top)
            .expect("fetch")
            .expect("post exists");
        assert_eq!(details.post.comment_count, 2);
        assert_eq!(details.comments.len(), 1);
        assert_eq!(details.comments[0].children[0].comment.id, child.id);
    }

    #[test]
    fn rejected_comments_leave_the_count_alone() {
        let (service, _) = setup_service();
        let post = service
            .create_post("alice", text_post("Hello"))
            .unwrap();
        let other = service
            .create_post("alice", text_post("Other"))
            .unwrap();
        let foreign = service
            .create_comment("alice", &other.id, reply("elsewhere", None))
            .unwrap();

        let blank = service.create_comment("alice", &post.id, reply("   ", None));
        assert!(matches!(blank, Err(ForumError::Validation(_))));
        let cross = service.create_comment("alice", &post.id, reply("hi", Some(&foreign.id)));
        assert!(matches!(cross, Err(ForumError::Validation(_))));
        let missing = service.create_comment("alice", "post-missing", reply("hi", None));
        assert!(matches!(missing, Err(ForumError::NotFound(_))));
        let stranger = service.create_comment("mallory", &post.id, reply("hi", None));
        assert!(matches!(stranger, Err(ForumError::Unauthorized(_))));

        let details = service
            .get_post("anonymous", &post.id, SortPolicy::Top)
            .unwrap()
            .unwrap();
        assert_eq!(details.post.comment_count, 0);
    }

    #[test]
    fn posts_need_an_existing_community_and_a_body() {
        let (service, _) = setup_service();
        let mut input = text_post("Hello");
        input.community = "golang".into();
        assert!(matches!(
            service.create_post("alice", input),
            Err(ForumError::Validation(_))
        ));
        let link = CreatePostInput {
            title: "Link".into(),
            community: "rust".into(),
            body: PostBody::Link { url: " ".into() },
        };
        assert!(matches!(
            service.create_post("alice", link),
            Err(ForumError::Validation(_))
        ));
    }

    #[test]
    fn listings_sort_and_apply_viewer_votes() {
        let (service, votes) = setup_service();
        stored_post(&service, "post-older", "2024-01-01T00:00:00Z", false);
        stored_post(&service, "post-newer", "2024-01-01T01:00:00Z", false);

        let by_new = service
            .list_posts("bob", Some("rust"), SortPolicy::New, None)
            .unwrap();
        let ids: Vec<&str> = by_new.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["post-newer", "post-older"]);

        votes
            .cast("bob", SubjectKind::Post, "post-older", VoteDirection::Up)
            .unwrap();
        let front = service
            .list_posts("bob", None, SortPolicy::Top, Some(1))
            .unwrap();
        assert_eq!(front.len(), 1);
        assert_eq!(front[0].id, "post-older");
        assert_eq!((front[0].score, front[0].viewer_vote), (1, 1));

        let other_viewer = service
            .list_posts("carol", None, SortPolicy::Top, None)
            .unwrap();
        assert!(other_viewer.iter().all(|p| p.score == 0));
        assert!(service
            .list_posts("bob", Some("nowhere"), SortPolicy::Hot, None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn locked_posts_reject_comments() {
        let (service, _) = setup_service();
        stored_post(&service, "post-locked", "2024-01-01T00:00:00Z", true);

        let err = service
            .create_comment("alice", "post-locked", reply("too late", None))
            .unwrap_err();
        assert!(matches!(err, ForumError::Validation(_)));

        let details = service
            .get_post("anonymous", "post-locked", SortPolicy::Top)
            .unwrap()
            .unwrap();
        assert!(details.post.is_locked);
        assert_eq!(details.post.comment_count, 0);
        assert!(details.comments.is_empty());
    }

    #[test]
    fn unverified_accounts_cannot_write() {
        let (service, _) = setup_service();
        service
            .database
            .with_repositories(|repos| {
                repos.users().create(&UserRecord {
                    id: "user-2".into(),
                    username: "eve".into(),
                    email: "eve@example.com".into(),
                    credential: String::new(),
                    avatar_url: None,
                    created_at: "2024-01-01T00:00:00Z".into(),
                    karma: 0,
                    email_verified: false,
                })
            })
            .unwrap();

        let post = service.create_post("eve", text_post("Hello"));
        assert!(matches!(post, Err(ForumError::Unauthorized(_))));
        stored_post(&service, "post-open", "2024-01-01T00:00:00Z", false);
        let comment = service.create_comment("user-2", "post-open", reply("hi", None));
        assert!(matches!(comment, Err(ForumError::Unauthorized(_))));
        assert!(service
            .list_posts("anonymous", Some("rust"), SortPolicy::New, None)
            .unwrap()
            .iter()
            .all(|p| p.author_id == "user-1"));
    }
}
