use crate::config::{ForumConfig, StorageBackend};
use crate::database::Database;
use crate::seed::{seed_defaults, SeedReport};
use anyhow::Result;
use std::fs;

pub struct BootstrapResources {
    pub directories_created: Vec<String>,
    pub database_initialized: bool,
    pub seeded: SeedReport,
    pub database: Database,
}

/// Prepares directories, opens the configured store and applies the schema.
/// Default content is only inserted into a store that did not exist before.
pub fn initialize(config: &ForumConfig) -> Result<BootstrapResources> {
    let mut directories_created = Vec::new();
    if config.storage != StorageBackend::Memory {
        create_dir_if_missing(&config.paths.data_dir, &mut directories_created)?;
    }

    let database = Database::connect(config)?;
    let database_initialized = database.ensure_migrations()?;

    let seeded = if database_initialized && config.seed_defaults {
        seed_defaults(&database)?
    } else {
        SeedReport::default()
    };

    Ok(BootstrapResources {
        directories_created,
        database_initialized,
        seeded,
        database,
    })
}

fn create_dir_if_missing(path: &std::path::Path, created: &mut Vec<String>) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
        created.push(path.display().to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForumPaths;

    #[test]
    fn fresh_stores_are_seeded_once() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ForumPaths::from_base_dir(dir.path()).unwrap();
        let config = ForumConfig::new(0, StorageBackend::Sqlite, paths);

        let first = initialize(&config).unwrap();
        assert!(first.database_initialized);
        assert_eq!(first.seeded.communities, 4);
        assert!(config.paths.db_path.exists());
        drop(first);

        let second = initialize(&config).unwrap();
        assert!(!second.database_initialized);
        assert_eq!(second.seeded, SeedReport::default());
        assert!(second.directories_created.is_empty());
    }

    #[test]
    fn seeding_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ForumPaths::from_base_dir(dir.path()).unwrap();
        let mut config = ForumConfig::new(0, StorageBackend::Json, paths);
        config.seed_defaults = false;
        let resources = initialize(&config).unwrap();
        let communities = resources
            .database
            .with_repositories(|repos| repos.communities().list())
            .unwrap();
        assert!(communities.is_empty());
    }
}
