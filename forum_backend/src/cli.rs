use crate::accounts::{AccountService, LoginInput, RegisterInput};
use crate::communities::CommunityService;
use crate::config::ForumConfig;
use crate::database::models::PostBody;
use crate::database::Database;
use crate::ranking::SortPolicy;
use crate::requests::RequestSequencer;
use crate::threading::{CommentNode, CreateCommentInput, CreatePostInput, ThreadService};
use crate::votes::{SubjectKind, VoteBook, VoteDirection, VoteService, ANONYMOUS_VIEWER};
use anyhow::{anyhow, Result};
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Run the interactive shell for browsing, posting and voting.
pub async fn run_cli(config: ForumConfig, database: Database, votes: VoteBook) -> Result<()> {
    let mut session = CliSession::new(&config, database, votes);

    println!("Forum shell ready. Type 'help' for a list of commands.");
    println!("Storage: {}", config.storage);

    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);

    loop {
        print!("{}> ", session.prompt());
        io::stdout().flush()?;

        let mut line = String::new();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            println!("Exiting");
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let tokens = match shell_words::split(trimmed) {
            Ok(tokens) if !tokens.is_empty() => tokens,
            Ok(_) => continue,
            Err(err) => {
                println!("Unable to parse command: {err}");
                continue;
            }
        };

        match session.handle_command(&tokens).await {
            Ok(LoopAction::Continue) => {}
            Ok(LoopAction::Exit) => break,
            Err(err) => {
                println!("Error: {err:#}");
            }
        }
    }

    if let Err(err) = session.votes.sync(&session.viewer) {
        tracing::warn!(error = %err, "failed to sync pending votes on exit");
    }
    Ok(())
}

struct CliSession {
    threads: ThreadService,
    communities: CommunityService,
    accounts: AccountService,
    votes: VoteService,
    sequencer: RequestSequencer,
    viewer: String,
    username: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum LoopAction {
    Continue,
    Exit,
}

impl CliSession {
    fn new(config: &ForumConfig, database: Database, votes: VoteBook) -> Self {
        Self {
            threads: ThreadService::new(database.clone(), votes.clone(), config.ranking),
            communities: CommunityService::new(database.clone()),
            accounts: AccountService::new(database.clone(), votes.clone()),
            votes: VoteService::new(database, votes),
            sequencer: RequestSequencer::new(),
            viewer: ANONYMOUS_VIEWER.to_string(),
            username: None,
        }
    }

    fn prompt(&self) -> &str {
        self.username.as_deref().unwrap_or("forum")
    }

    async fn handle_command(&mut self, tokens: &[String]) -> Result<LoopAction> {
        let command = tokens[0].as_str();
        let (args, flags) = split_flags(&tokens[1..]);
        match command {
            "help" => self.print_help(),
            "communities" => self.list_communities()?,
            "posts" => {
                let sort = SortPolicy::parse_or(flag(&flags, "sort"), SortPolicy::Hot)?;
                self.list_posts(args.first().cloned(), sort).await?;
            }
            "show" => {
                let Some(post_id) = args.first() else {
                    println!("Usage: show <post-id> [--sort S]");
                    return Ok(LoopAction::Continue);
                };
                let sort = SortPolicy::parse_or(flag(&flags, "sort"), SortPolicy::Top)?;
                self.show_post(post_id, sort)?;
            }
            "submit" => {
                if args.len() < 2 {
                    println!("Usage: submit <community> <title> [body] [--link URL | --image URL]");
                    return Ok(LoopAction::Continue);
                }
                let body = match (flag(&flags, "link"), flag(&flags, "image")) {
                    (Some(url), _) => PostBody::Link { url: url.into() },
                    (None, Some(url)) => PostBody::Image { url: url.into() },
                    (None, None) => PostBody::Text {
                        content: args.get(2).cloned().unwrap_or_default(),
                    },
                };
                let post = self.threads.create_post(
                    &self.viewer,
                    CreatePostInput {
                        title: args[1].clone(),
                        community: args[0].clone(),
                        body,
                    },
                )?;
                println!("Created post {} in r/{}", post.id, post.community);
            }
            "comment" => {
                if args.len() < 2 {
                    println!("Usage: comment <post-id> <text> [--parent ID]");
                    return Ok(LoopAction::Continue);
                }
                let comment = self.threads.create_comment(
                    &self.viewer,
                    &args[0],
                    CreateCommentInput {
                        content: args[1].clone(),
                        parent_id: flag(&flags, "parent").map(str::to_string),
                    },
                )?;
                println!("Created comment {} (level {})", comment.id, comment.level);
            }
            "up" | "down" => {
                if args.len() < 2 {
                    println!("Usage: {command} <post|comment> <id>");
                    return Ok(LoopAction::Continue);
                }
                let kind: SubjectKind = args[0].parse()?;
                let direction: VoteDirection = command.parse()?;
                let outcome = self.votes.cast(&self.viewer, kind, &args[1], direction)?;
                println!("{} {} score {} (your vote {:+})", kind, outcome.id, outcome.score, outcome.vote);
            }
            "sync" => {
                let report = self.votes.sync(&self.viewer)?;
                println!("Synced {} vote(s), dropped {}", report.applied, report.dropped);
            }
            "register" => {
                if args.len() < 3 {
                    println!("Usage: register <username> <email> <password>");
                    return Ok(LoopAction::Continue);
                }
                let profile = self.accounts.register(RegisterInput {
                    username: args[0].clone(),
                    email: args[1].clone(),
                    password: args[2].clone(),
                })?;
                println!(
                    "Registered {}. Run 'verify {}' to confirm the email.",
                    profile.username, profile.email
                );
            }
            "verify" => {
                let Some(email) = args.first() else {
                    println!("Usage: verify <email>");
                    return Ok(LoopAction::Continue);
                };
                if self.accounts.verify_email(email)? {
                    println!("Email {email} verified");
                } else {
                    println!("No account uses {email}");
                }
            }
            "login" => {
                if args.len() < 2 {
                    println!("Usage: login <email> <password>");
                    return Ok(LoopAction::Continue);
                }
                let profile = self
                    .accounts
                    .login(LoginInput {
                        email: args[0].clone(),
                        password: args[1].clone(),
                    })?
                    .ok_or_else(|| anyhow!("invalid email or password"))?;
                if self.viewer != profile.id {
                    let report = self.votes.sync(&self.viewer)?;
                    if report.applied > 0 {
                        println!("Synced {} vote(s) for the previous session", report.applied);
                    }
                }
                println!("Logged in as {} (karma {})", profile.username, profile.karma);
                self.viewer = profile.id;
                self.username = Some(profile.username);
            }
            "whoami" => match &self.username {
                Some(name) => println!("{name} ({})", self.viewer),
                None => println!("Not logged in"),
            },
            "clear" => {
                print!("\x1B[2J\x1B[1;1H");
                io::stdout().flush()?;
            }
            "quit" | "exit" => return Ok(LoopAction::Exit),
            other => println!("Unknown command: {other}. Type 'help' for a list of commands."),
        }
        Ok(LoopAction::Continue)
    }

    fn print_help(&self) {
        println!("Available commands:");
        println!("  help                         Show this help message");
        println!("  communities                  List communities");
        println!("  posts [community] [--sort S] List posts (hot, new, top, rising, controversial, old)");
        println!("  show <post-id> [--sort S]    Display a post and its comment tree");
        println!("  submit <community> <title> [body] [--link URL | --image URL]");
        println!("                               Create a post");
        println!("  comment <post-id> <text> [--parent ID]");
        println!("                               Comment on a post or reply to a comment");
        println!("  up|down <post|comment> <id>  Toggle your vote");
        println!("  sync                         Push pending votes to storage");
        println!("  register <user> <email> <pw> Create an account");
        println!("  verify <email>               Confirm an account's email");
        println!("  login <email> <pw>           Sign in");
        println!("  whoami                       Show the signed-in user");
        println!("  clear                        Clear the screen");
        println!("  exit                         Quit the shell");
    }

    fn list_communities(&self) -> Result<()> {
        let communities = self.communities.list()?;
        if communities.is_empty() {
            println!("No communities yet.");
            return Ok(());
        }
        for community in communities {
            println!(
                "  r/{:<16} {:>10} subscribers  {}",
                community.name, community.subscribers, community.description
            );
        }
        Ok(())
    }

    /// Listings run off the shell task and take a ticket from the sequencer;
    /// a listing superseded while in flight is not printed. The shell awaits
    /// each command, so only callers issuing listings concurrently hit that
    /// path.
    async fn list_posts(&self, community: Option<String>, sort: SortPolicy) -> Result<()> {
        let ticket = self.sequencer.begin();
        let threads = self.threads.clone();
        let viewer = self.viewer.clone();
        let posts = tokio::task::spawn_blocking(move || {
            threads.list_posts(&viewer, community.as_deref(), sort, Some(25))
        })
        .await??;
        let Some(posts) = self.sequencer.accept(ticket, posts) else {
            return Ok(());
        };
        if posts.is_empty() {
            println!("No posts yet. Use 'submit' to create one.");
            return Ok(());
        }
        println!("Posts ({sort}):");
        for post in posts {
            let marker = match post.viewer_vote {
                1 => "▲",
                -1 => "▼",
                _ => " ",
            };
            println!(
                "  {marker}{:>5}  [{}] r/{} {} ({} comments, by {})",
                post.score, post.id, post.community, post.title, post.comment_count, post.author_name
            );
        }
        Ok(())
    }

    fn show_post(&self, post_id: &str, sort: SortPolicy) -> Result<()> {
        let Some(details) = self.threads.get_post(&self.viewer, post_id, sort)? else {
            println!("Post {post_id} not found");
            return Ok(());
        };
        let post = &details.post;
        println!("{} (score {})", post.title, post.score);
        println!("r/{} by {} at {}", post.community, post.author_name, post.created_at);
        match &post.body {
            PostBody::Text { content } => println!("{content}"),
            PostBody::Link { url } => println!("Link: {url}"),
            PostBody::Image { url } => println!("Image: {url}"),
        }
        println!();
        if details.comments.is_empty() {
            println!("  (no comments yet)");
        }
        for line in render_tree(&details.comments) {
            println!("{line}");
        }
        Ok(())
    }
}

/// Indented pre-order rendering of a comment forest.
fn render_tree(forest: &[CommentNode]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut stack: Vec<&CommentNode> = forest.iter().rev().collect();
    while let Some(node) = stack.pop() {
        let comment = &node.comment;
        lines.push(format!(
            "{}[{}] {} ({}): {}",
            "  ".repeat(node.depth as usize + 1),
            comment.id,
            comment.author_name,
            comment.score,
            comment.content
        ));
        stack.extend(node.children.iter().rev());
    }
    lines
}

/// Splits `--name value` pairs from positional arguments.
fn split_flags(tokens: &[String]) -> (Vec<String>, Vec<(String, String)>) {
    let mut args = Vec::new();
    let mut flags = Vec::new();
    let mut iter = tokens.iter();
    while let Some(token) = iter.next() {
        match token.strip_prefix("--") {
            Some(name) if !name.is_empty() => {
                let value = iter.next().cloned().unwrap_or_default();
                flags.push((name.to_string(), value));
            }
            _ => args.push(token.clone()),
        }
    }
    (args, flags)
}

fn flag<'a>(flags: &'a [(String, String)], name: &str) -> Option<&'a str> {
    flags
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}
