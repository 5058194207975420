use crate::database::models::CommunityRecord;
use crate::database::Database;
use crate::error::{require_non_blank, ForumError, ForumResult};
use crate::utils::{new_id, now_utc_iso};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Clone)]
pub struct CommunityService {
    database: Database,
}

impl CommunityService {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn list(&self) -> ForumResult<Vec<CommunityRecord>> {
        Ok(self
            .database
            .with_repositories(|repos| repos.communities().list())?)
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> ForumResult<Option<CommunityRecord>> {
        Ok(self
            .database
            .with_repositories(|repos| repos.communities().get_by_name(name.trim()))?)
    }

    pub fn create(&self, input: CreateCommunityInput) -> ForumResult<CommunityRecord> {
        let name = input.name.trim().to_ascii_lowercase();
        require_non_blank("name", &name)?;
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ForumError::validation(
                "community names may only contain letters, digits and underscores",
            ));
        }

        let record = CommunityRecord {
            id: new_id("sub"),
            display_name: input
                .display_name
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| name.clone()),
            name,
            description: input.description.unwrap_or_default(),
            icon_url: input.icon_url,
            banner_url: input.banner_url,
            is_nsfw: input.is_nsfw,
            subscribers: 0,
            created_at: now_utc_iso(),
        };
        self.database.with_repositories(|repos| -> ForumResult<()> {
            if repos.communities().get_by_name(&record.name)?.is_some() {
                return Err(ForumError::conflict(format!(
                    "community {} already exists",
                    record.name
                )));
            }
            repos.communities().create(&record)?;
            Ok(())
        })?;
        info!(community = %record.name, "community created");
        Ok(record)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateCommunityInput {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub banner_url: Option<String>,
    #[serde(default)]
    pub is_nsfw: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn setup_service() -> CommunityService {
        let conn = Connection::open_in_memory().expect("in-memory db");
        let db = Database::from_connection(conn, true);
        db.ensure_migrations().expect("migrations");
        CommunityService::new(db)
    }

    fn input(name: &str) -> CreateCommunityInput {
        CreateCommunityInput {
            name: name.into(),
            ..CreateCommunityInput::default()
        }
    }

    #[test]
    fn names_are_unique_regardless_of_case() {
        let service = setup_service();
        let created = service.create(input("RustLang")).expect("create");
        assert_eq!(created.name, "rustlang");
        assert_eq!(created.display_name, "rustlang");

        let err = service.create(input("rustlang")).unwrap_err();
        assert!(matches!(err, ForumError::Conflict(_)));
        assert_eq!(service.list().unwrap().len(), 1);
        assert!(service.get("RUSTLANG").unwrap().is_some());
        assert!(service.get("golang").unwrap().is_none());
    }

    #[test]
    fn names_must_be_simple_words() {
        let service = setup_service();
        assert!(matches!(
            service.create(input("  ")),
            Err(ForumError::Validation(_))
        ));
        assert!(matches!(
            service.create(input("two words")),
            Err(ForumError::Validation(_))
        ));
    }
}
