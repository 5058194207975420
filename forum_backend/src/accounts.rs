use crate::database::models::UserRecord;
use crate::database::Database;
use crate::error::{require_non_blank, ForumError, ForumResult};
use crate::ranking::{sort_by_policy, RankingSettings, SortPolicy};
use crate::threading::{CommentView, PostView};
use crate::utils::{new_id, now_utc_iso};
use crate::votes::VoteBook;
use anyhow::anyhow;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Clone)]
pub struct AccountService {
    database: Database,
    votes: VoteBook,
}

impl AccountService {
    pub fn new(database: Database, votes: VoteBook) -> Self {
        Self { database, votes }
    }

    /// Creates an unverified account. Nothing is written when the username or
    /// email is taken.
    pub fn register(&self, input: RegisterInput) -> ForumResult<UserProfile> {
        let username = input.username.trim().to_string();
        let email = normalize_email(&input.email);
        require_non_blank("username", &username)?;
        if username.chars().any(char::is_whitespace) {
            return Err(ForumError::validation("username may not contain spaces"));
        }
        validate_email(&email)?;
        if input.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ForumError::validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let credential = hash_password(&input.password)?;
        let record = self.database.with_repositories(|repos| -> ForumResult<UserRecord> {
            let by_email = repos.users().find_by_email(&email)?;
            let by_name = repos.users().find_by_username(&username)?;
            if let Some(existing) = &by_email {
                if !existing.email_verified {
                    return Err(ForumError::conflict(
                        "user already exists but email is not verified; request a new verification link",
                    ));
                }
            }
            if by_email.is_some() || by_name.is_some() {
                return Err(ForumError::conflict("username or email already exists"));
            }
            let record = UserRecord {
                id: new_id("user"),
                avatar_url: Some(default_avatar(&username)),
                username: username.clone(),
                email: email.clone(),
                credential,
                created_at: now_utc_iso(),
                karma: 0,
                email_verified: false,
            };
            repos.users().create(&record)?;
            Ok(record)
        })?;
        info!(user_id = %record.id, username = %record.username, "account registered");
        Ok(UserProfile::from_record(record))
    }

    /// `Ok(None)` for unknown email or wrong password.
    pub fn login(&self, input: LoginInput) -> ForumResult<Option<UserProfile>> {
        let email = normalize_email(&input.email);
        let user = self
            .database
            .with_repositories(|repos| repos.users().find_by_email(&email))?;
        let Some(user) = user.filter(|u| verify_password(&input.password, &u.credential)) else {
            debug!(email = %email, "login rejected");
            return Ok(None);
        };
        if !user.email_verified {
            return Err(ForumError::Unauthorized(
                "email not confirmed; check your inbox for a verification link".into(),
            ));
        }
        info!(user_id = %user.id, "login succeeded");
        Ok(Some(UserProfile::from_record(user)))
    }

    /// Always succeeds so callers cannot learn which emails are registered.
    pub fn request_magic_link(&self, email: &str) -> ForumResult<()> {
        let email = normalize_email(email);
        let known = self
            .database
            .with_repositories(|repos| repos.users().find_by_email(&email))?
            .is_some();
        debug!(email = %email, known, "magic link requested");
        Ok(())
    }

    /// Marks the account verified. Returns whether the email was known.
    pub fn verify_email(&self, email: &str) -> ForumResult<bool> {
        let email = normalize_email(email);
        let verified = self.database.with_repositories(|repos| {
            let Some(mut user) = repos.users().find_by_email(&email)? else {
                return Ok(false);
            };
            if !user.email_verified {
                user.email_verified = true;
                repos.users().update(&user)?;
            }
            Ok::<_, anyhow::Error>(true)
        })?;
        if verified {
            info!(email = %email, "email verified");
        }
        Ok(verified)
    }

    /// Public profile with the user's posts and comments, newest first.
    pub fn get_profile(&self, viewer: &str, username: &str) -> ForumResult<Option<ProfileDetails>> {
        let loaded = self.database.with_repositories(|repos| {
            let Some(user) = repos.users().find_by_username(username.trim())? else {
                return Ok(None);
            };
            let posts = repos.posts().list_for_author(&user.id)?;
            let comments = repos.comments().list_for_author(&user.id)?;
            Ok::<_, anyhow::Error>(Some((user, posts, comments)))
        })?;
        let Some((user, posts, comments)) = loaded else {
            return Ok(None);
        };
        let ledger = self.votes.snapshot(viewer)?;
        let mut posts: Vec<PostView> = posts
            .into_iter()
            .map(|p| PostView::from_record(p, &ledger))
            .collect();
        let mut comments: Vec<CommentView> = comments
            .into_iter()
            .map(|c| CommentView::from_record(c, &ledger))
            .collect();
        let now = Utc::now();
        sort_by_policy(&mut posts, SortPolicy::New, now, RankingSettings::default());
        sort_by_policy(&mut comments, SortPolicy::New, now, RankingSettings::default());
        Ok(Some(ProfileDetails {
            user: UserProfile::from_record(user),
            posts,
            comments,
        }))
    }
}

fn normalize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

fn validate_email(email: &str) -> ForumResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    };
    if !valid || email.chars().any(char::is_whitespace) {
        return Err(ForumError::validation(format!("{email:?} is not a valid email")));
    }
    Ok(())
}

fn default_avatar(username: &str) -> String {
    format!("https://api.dicebear.com/7.x/avataaars/svg?seed={username}")
}

/// Argon2id PHC string with a random 16-byte salt.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let mut salt = [0u8; 16];
    rand::rng().fill_bytes(&mut salt);
    let salt = SaltString::encode_b64(&salt).map_err(|err| anyhow!("invalid salt: {err}"))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, credential: &str) -> bool {
    let parsed = match PasswordHash::new(credential) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// A user as shown to clients; never carries the credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub created_at: String,
    pub karma: i64,
    pub email_verified: bool,
}

impl UserProfile {
    pub fn from_record(record: UserRecord) -> Self {
        Self {
            id: record.id,
            username: record.username,
            email: record.email,
            avatar_url: record.avatar_url,
            created_at: record.created_at,
            karma: record.karma,
            email_verified: record.email_verified,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDetails {
    pub user: UserProfile,
    pub posts: Vec<PostView>,
    pub comments: Vec<CommentView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AccountService {
        AccountService::new(Database::in_memory(), VoteBook::default())
    }

    fn register(service: &AccountService, username: &str, email: &str) -> ForumResult<UserProfile> {
        service.register(RegisterInput {
            username: username.into(),
            email: email.into(),
            password: "hunter22!".into(),
        })
    }

    fn user_count(service: &AccountService) -> usize {
        service
            .database
            .with_repositories(|repos| repos.users().list())
            .unwrap()
            .len()
    }

    #[test]
    fn passwords_are_salted() {
        let first = hash_password("correct horse").unwrap();
        let second = hash_password("correct horse").unwrap();
        assert_ne!(first, second);
        assert!(first.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &first));
        assert!(!verify_password("wrong horse", &first));
        assert!(!verify_password("correct horse", "garbage"));
    }

    #[test]
    fn duplicate_registration_is_a_conflict_without_side_effects() {
        let service = service();
        let alice = register(&service, "alice", "Alice@Example.com").unwrap();
        assert_eq!(alice.email, "alice@example.com");
        assert!(!alice.email_verified);

        let err = register(&service, "alice2", "alice@example.com").unwrap_err();
        match err {
            ForumError::Conflict(message) => assert!(message.contains("not verified")),
            other => panic!("expected conflict, got {other:?}"),
        }
        service.verify_email("alice@example.com").unwrap();
        let err = register(&service, "alice", "other@example.com").unwrap_err();
        assert!(matches!(err, ForumError::Conflict(ref m) if m == "username or email already exists"));
        assert_eq!(user_count(&service), 1);
    }

    #[test]
    fn registration_validates_input() {
        let service = service();
        assert!(matches!(
            register(&service, " ", "a@example.com"),
            Err(ForumError::Validation(_))
        ));
        assert!(matches!(
            register(&service, "bob", "not-an-email"),
            Err(ForumError::Validation(_))
        ));
        let short = service.register(RegisterInput {
            username: "bob".into(),
            email: "bob@example.com".into(),
            password: "short".into(),
        });
        assert!(matches!(short, Err(ForumError::Validation(_))));
        assert_eq!(user_count(&service), 0);
    }

    #[test]
    fn login_requires_verified_email() {
        let service = service();
        register(&service, "alice", "alice@example.com").unwrap();
        let login = |password: &str| {
            service.login(LoginInput {
                email: "alice@example.com".into(),
                password: password.into(),
            })
        };
        assert!(login("nope nope").unwrap().is_none());
        assert!(matches!(login("hunter22!"), Err(ForumError::Unauthorized(_))));

        assert!(service.verify_email("ALICE@example.com").unwrap());
        assert!(!service.verify_email("ghost@example.com").unwrap());
        let profile = login("hunter22!").unwrap().expect("logged in");
        assert_eq!(profile.username, "alice");
    }

    #[test]
    fn magic_links_never_reveal_membership() {
        let service = service();
        register(&service, "alice", "alice@example.com").unwrap();
        assert!(service.request_magic_link("alice@example.com").is_ok());
        assert!(service.request_magic_link("ghost@example.com").is_ok());
    }

    #[test]
    fn profiles_hide_credentials() {
        let service = service();
        register(&service, "alice", "alice@example.com").unwrap();
        let profile = service.get_profile("anonymous", "alice").unwrap().unwrap();
        let json = serde_json::to_string(&profile).unwrap();
        assert!(!json.contains("credential"));
        assert!(profile.posts.is_empty());
        assert!(service.get_profile("anonymous", "ghost").unwrap().is_none());
    }
}
