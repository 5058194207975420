use crate::api;
use crate::bootstrap::{self, BootstrapResources};
use crate::config::ForumConfig;
use crate::database::Database;
use crate::votes::VoteBook;
use anyhow::Result;

/// Bootstraps the store once and hands out cloned handles to whichever
/// entrypoint (REST server or interactive shell) needs them.
pub struct ForumNode {
    config: ForumConfig,
    bootstrap: BootstrapResources,
    votes: VoteBook,
}

impl ForumNode {
    pub fn start(config: ForumConfig) -> Result<Self> {
        let bootstrap = bootstrap::initialize(&config)?;

        tracing::info!(
            directories_created = ?bootstrap.directories_created,
            database_initialized = bootstrap.database_initialized,
            seeded_communities = bootstrap.seeded.communities,
            seeded_users = bootstrap.seeded.users,
            storage = %config.storage,
            "forum node initialized"
        );

        Ok(Self {
            config,
            bootstrap,
            votes: VoteBook::default(),
        })
    }

    /// Returns a snapshot of the node's reusable handles.
    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            config: self.config.clone(),
            database: self.bootstrap.database.clone(),
            votes: self.votes.clone(),
        }
    }

    /// Runs the REST API server until shutdown.
    pub async fn run_http_server(&self) -> Result<()> {
        let snapshot = self.snapshot();
        api::serve_http(snapshot.config, snapshot.database, snapshot.votes).await
    }
}

/// Cloned handles for consumers that only need the services.
#[derive(Clone)]
pub struct NodeSnapshot {
    pub config: ForumConfig,
    pub database: Database,
    pub votes: VoteBook,
}
