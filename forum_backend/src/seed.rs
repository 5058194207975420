//! Default content for a freshly created store.

use crate::accounts::hash_password;
use crate::database::models::{CommunityRecord, UserRecord};
use crate::database::Database;
use anyhow::Result;
use tracing::info;

struct DefaultCommunity {
    name: &'static str,
    display_name: &'static str,
    description: &'static str,
    subscribers: i64,
    photo: &'static str,
}

const DEFAULT_COMMUNITIES: &[DefaultCommunity] = &[
    DefaultCommunity {
        name: "askreddit",
        display_name: "AskReddit",
        description: "Ask Reddit...anything!",
        subscribers: 42_069_420,
        photo: "5308281",
    },
    DefaultCommunity {
        name: "pics",
        display_name: "Pics",
        description: "A place for pictures and photographs.",
        subscribers: 29_472_123,
        photo: "1000366",
    },
    DefaultCommunity {
        name: "funny",
        display_name: "Funny",
        description: "Welcome to r/Funny, Reddit's home for humor.",
        subscribers: 25_123_456,
        photo: "1576937",
    },
    DefaultCommunity {
        name: "news",
        display_name: "News",
        description: "The place for news articles about current events.",
        subscribers: 24_123_456,
        photo: "518543",
    },
];

pub const DEMO_USERNAME: &str = "spez";
pub const DEMO_PASSWORD: &str = "password123";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub communities: usize,
    pub users: usize,
}

/// Inserts whatever default content is missing. Safe to run repeatedly.
pub fn seed_defaults(database: &Database) -> Result<SeedReport> {
    let report = database.with_repositories(|repos| {
        let mut report = SeedReport::default();
        for community in DEFAULT_COMMUNITIES {
            if repos.communities().get_by_name(community.name)?.is_some() {
                continue;
            }
            let photo = format!(
                "https://images.pexels.com/photos/{id}/pexels-photo-{id}.jpeg?auto=compress",
                id = community.photo
            );
            repos.communities().create(&CommunityRecord {
                id: format!("sub-{}", community.name),
                name: community.name.to_string(),
                display_name: community.display_name.to_string(),
                description: community.description.to_string(),
                icon_url: Some(format!("{photo}&cs=tinysrgb&w=300")),
                banner_url: Some(photo),
                is_nsfw: false,
                subscribers: community.subscribers,
                created_at: "2008-01-25T00:00:00Z".to_string(),
            })?;
            report.communities += 1;
        }

        if repos.users().find_by_username(DEMO_USERNAME)?.is_none() {
            repos.users().create(&UserRecord {
                id: format!("user-{DEMO_USERNAME}"),
                username: DEMO_USERNAME.to_string(),
                email: format!("{DEMO_USERNAME}@example.com"),
                credential: hash_password(DEMO_PASSWORD)?,
                avatar_url: Some(format!(
                    "https://api.dicebear.com/7.x/avataaars/svg?seed={DEMO_USERNAME}"
                )),
                created_at: "2005-06-23T18:24:00Z".to_string(),
                karma: 185_463,
                email_verified: true,
            })?;
            report.users += 1;
        }
        Ok::<_, anyhow::Error>(report)
    })?;
    if report != SeedReport::default() {
        info!(
            communities = report.communities,
            users = report.users,
            "seeded default content"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::verify_password;

    #[test]
    fn seeding_is_idempotent() {
        let database = Database::in_memory();
        let first = seed_defaults(&database).unwrap();
        assert_eq!(first, SeedReport { communities: 4, users: 1 });
        assert_eq!(seed_defaults(&database).unwrap(), SeedReport::default());

        let (names, demo) = database
            .with_repositories(|repos| {
                let names: Vec<String> = repos
                    .communities()
                    .list()?
                    .into_iter()
                    .map(|c| c.name)
                    .collect();
                Ok::<_, anyhow::Error>((names, repos.users().find_by_username(DEMO_USERNAME)?))
            })
            .unwrap();
        assert_eq!(names, ["askreddit", "pics", "funny", "news"]);
        let demo = demo.expect("demo user");
        assert!(demo.email_verified);
        assert!(verify_password(DEMO_PASSWORD, &demo.credential));
    }
}
