use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{
    Client, Collection, Database,
    bson::doc,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use tracing::info;

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
    models::{MongoPollDocument, doc_id, doc_id_at_revision},
};
use crate::dao::{models::PollEntity, poll_store::PollStore, storage::StorageResult};

const POLL_COLLECTION_NAME: &str = "polls";
const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Clone)]
pub struct MongoPollStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = self.config.connect().await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoPollStore {
    /// Connect with a single ping and ensure the poll indexes exist.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) = config.connect().await?;
        info!(database = config.database_name(), "connected to MongoDB");

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.collection().await;
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"created_at": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("poll_created_idx".to_owned()))
                    .build(),
            )
            .build();

        collection
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: POLL_COLLECTION_NAME,
                index: "created_at",
                source,
            })?;

        Ok(())
    }

    async fn collection(&self) -> Collection<MongoPollDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoPollDocument>(POLL_COLLECTION_NAME)
    }

    async fn create_poll(&self, poll: PollEntity) -> MongoResult<()> {
        let id = poll.id.clone();
        let document: MongoPollDocument = poll.into();
        let collection = self.collection().await;

        collection
            .insert_one(&document)
            .await
            .map_err(|source| {
                if is_duplicate_key(&source) {
                    MongoDaoError::DuplicatePoll { id, source }
                } else {
                    MongoDaoError::InsertPoll { id, source }
                }
            })?;

        Ok(())
    }

    async fn find_poll(&self, id: String) -> MongoResult<Option<PollEntity>> {
        let collection = self.collection().await;

        let document = collection
            .find_one(doc_id(&id))
            .await
            .map_err(|source| MongoDaoError::LoadPoll { id, source })?;

        Ok(document.map(Into::into))
    }

    async fn save_poll(&self, poll: PollEntity, expected_revision: u64) -> MongoResult<()> {
        let id = poll.id.clone();
        let document: MongoPollDocument = poll.into();
        let collection = self.collection().await;

        let result = collection
            .replace_one(doc_id_at_revision(&id, expected_revision), &document)
            .await
            .map_err(|source| MongoDaoError::SavePoll {
                id: id.clone(),
                source,
            })?;

        if result.matched_count == 0 {
            return Err(MongoDaoError::RevisionConflict {
                id,
                expected: expected_revision,
            });
        }

        Ok(())
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY_CODE
    )
}

impl PollStore for MongoPollStore {
    fn create_poll(&self, poll: PollEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.create_poll(poll).await.map_err(Into::into) })
    }

    fn find_poll(&self, id: String) -> BoxFuture<'static, StorageResult<Option<PollEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_poll(id).await.map_err(Into::into) })
    }

    fn save_poll(
        &self,
        poll: PollEntity,
        expected_revision: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .save_poll(poll, expected_revision)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
