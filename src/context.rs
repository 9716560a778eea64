use crate::config::ServiceConfig;
use crate::database::Database;
use anyhow::{anyhow, Result};

/// Lightweight handle passed to every command.
#[derive(Clone)]
pub struct AppContext {
    database_url: Option<String>,
    config: ServiceConfig,
}

impl AppContext {
    pub async fn initialize(database_url: Option<String>, config: ServiceConfig) -> Result<Self> {
        Ok(Self {
            database_url,
            config,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Connects and makes sure the schema exists; the service creates its
    /// own tables on first contact.
    pub async fn database(&self) -> Result<Database> {
        let Some(database_url) = self.database_url.as_deref() else {
            return Err(anyhow!(
                "DATABASE_URL must be set to use database-backed commands."
            ));
        };
        let db = Database::new(database_url).await?;
        db.ensure_schema().await?;
        Ok(db)
    }
}
