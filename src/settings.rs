use crate::error::Result;
use crate::storage::repository;
use crate::storage::Database;

/// Key/value settings stored in `app_config`.
///
/// Usable without opening the full service, so a setting that stops
/// `SiteInsight` from starting can still be corrected.
#[derive(Clone)]
pub struct Settings {
    db: Database,
}

impl Settings {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await?)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await?;
        log::debug!("Config {key} updated");
        Ok(())
    }

    /// All settings, ordered by key.
    pub async fn list(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await?)
    }
}
