//! Client settings for the Mongo poll store.

use std::time::Duration;

use mongodb::{Client, Database, bson::doc, options::ClientOptions};

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DB: &str = "poll_rooms";
const APP_NAME: &str = "poll-rooms-back";

/// Parsed connection options plus the database holding the `polls` collection.
#[derive(Clone)]
pub struct MongoConfig {
    options: ClientOptions,
    database_name: String,
}

impl MongoConfig {
    /// Parse `uri` and bound server selection and connect by `storage_timeout`,
    /// so an unreachable server fails a vote instead of stalling it.
    ///
    /// The database is `db_name` if given, else the one named in the URI path,
    /// else `poll_rooms`.
    pub async fn from_uri(
        uri: &str,
        db_name: Option<&str>,
        storage_timeout: Duration,
    ) -> MongoResult<Self> {
        let mut options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;

        let database_name = db_name
            .map(str::to_owned)
            .or_else(|| options.default_database.clone())
            .unwrap_or_else(|| DEFAULT_DB.to_owned());
        options.app_name.get_or_insert_with(|| APP_NAME.to_owned());
        options.server_selection_timeout = Some(storage_timeout);
        options.connect_timeout = Some(storage_timeout);

        Ok(Self {
            options,
            database_name,
        })
    }

    /// Name of the database polls are stored in.
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// Build a client and ping once. Retrying is left to the storage supervisor.
    pub(super) async fn connect(&self) -> MongoResult<(Client, Database)> {
        let client = Client::with_options(self.options.clone())
            .map_err(|source| MongoDaoError::ClientConstruction { source })?;
        let database = client.database(&self.database_name);

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::Unreachable {
                database: self.database_name.clone(),
                source,
            })?;

        Ok((client, database))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(1500);

    #[tokio::test]
    async fn bounds_server_selection_by_storage_timeout() {
        let config = MongoConfig::from_uri("mongodb://127.0.0.1:27017", None, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(config.database_name(), DEFAULT_DB);
        assert_eq!(config.options.server_selection_timeout, Some(TIMEOUT));
        assert_eq!(config.options.connect_timeout, Some(TIMEOUT));
        assert_eq!(config.options.app_name.as_deref(), Some(APP_NAME));
    }

    #[tokio::test]
    async fn database_name_prefers_explicit_then_uri_path() {
        let from_uri = MongoConfig::from_uri("mongodb://127.0.0.1:27017/votes", None, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(from_uri.database_name(), "votes");

        let explicit =
            MongoConfig::from_uri("mongodb://127.0.0.1:27017/votes", Some("staging"), TIMEOUT)
                .await
                .unwrap();
        assert_eq!(explicit.database_name(), "staging");
    }

    #[tokio::test]
    async fn rejects_non_mongo_scheme() {
        let err = MongoConfig::from_uri("http://127.0.0.1", None, TIMEOUT)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, MongoDaoError::InvalidUri { .. }));
    }
}
