use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use std::time::SystemTime;
use tracing::debug;
use uuid::Uuid;

use crate::dao::{
    game_store::GameStore,
    models::{SessionEntity, SessionResultEntity, StoredStatus},
    storage::{StorageError, StorageResult},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{CouchSessionDocument, session_doc_id},
};

/// Read-modify-write attempts before a revision conflict is reported.
const CONFLICT_RETRIES: usize = 3;

#[derive(Clone)]
pub struct CouchGameStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchGameStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        let builder = self.client.request(method, url);
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = format!("{}/{}", self.base_url, self.database);
        let mut builder = self.client.get(&url);
        if let Some((ref user, ref pass)) = self.auth {
            builder = builder.basic_auth(user.as_ref(), Some(pass.as_ref()));
        }

        let response = builder
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let mut builder = self.client.put(&url);
                if let Some((ref user, ref pass)) = self.auth {
                    builder = builder.basic_auth(user.as_ref(), Some(pass.as_ref()));
                }
                let create =
                    builder
                        .send()
                        .await
                        .map_err(|source| CouchDaoError::DatabaseCreate {
                            database: database.clone(),
                            source,
                        })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(CouchDaoError::Conflict {
                path: doc_id.to_string(),
            }),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// Apply `change` to the stored session document, re-reading it after revision conflicts.
    ///
    /// `change` returns `false` to leave the document untouched. A missing document is
    /// seeded through `seed` when one is given.
    async fn modify_session<F>(
        &self,
        id: Uuid,
        seed: Option<SessionEntity>,
        mut change: F,
    ) -> StorageResult<bool>
    where
        F: FnMut(&mut CouchSessionDocument) -> bool,
    {
        let doc_id = session_doc_id(id);
        for attempt in 0..CONFLICT_RETRIES {
            let mut doc = match self.get_document::<CouchSessionDocument>(&doc_id).await? {
                Some(doc) => doc,
                None => match seed.clone() {
                    Some(entity) => CouchSessionDocument::from_entity(entity),
                    None => return Err(StorageError::NotFound(id)),
                },
            };
            if !change(&mut doc) {
                return Ok(false);
            }
            match self.put_document(&doc_id, &doc).await {
                Ok(()) => return Ok(true),
                Err(CouchDaoError::Conflict { .. }) => {
                    debug!(session_id = %id, attempt, "couchdb revision conflict, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(StorageError::Conflict(id))
    }

}

impl GameStore for CouchGameStore {
    fn create_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<Uuid>> {
        let store = self.clone();
        Box::pin(async move {
            let id = session.id;
            let doc_id = session_doc_id(id);
            if store
                .get_document::<CouchSessionDocument>(&doc_id)
                .await?
                .is_some()
            {
                return Ok(id);
            }
            let doc = CouchSessionDocument::from_entity(session);
            match store.put_document(&doc_id, &doc).await {
                // Lost a creation race: the record exists, which is all we wanted.
                Ok(()) | Err(CouchDaoError::Conflict { .. }) => Ok(id),
                Err(err) => Err(err.into()),
            }
        })
    }

    fn update_status(
        &self,
        id: Uuid,
        status: StoredStatus,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .modify_session(id, None, |doc| {
                    if doc.session.status == StoredStatus::Finished || doc.session.status == status
                    {
                        return false;
                    }
                    doc.session.status = status;
                    doc.session.updated_at = SystemTime::now();
                    true
                })
                .await
                .map(|_| ())
        })
    }

    fn record_result(
        &self,
        result: SessionResultEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let seed = result.to_session();
            store
                .modify_session(result.session_id, Some(seed), |doc| {
                    if doc.session.result.is_some() && doc.rev.is_some() {
                        return false;
                    }
                    doc.session.status = StoredStatus::Finished;
                    doc.session.updated_at = result.finished_at;
                    doc.session.result = Some(result.clone());
                    true
                })
                .await
        })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = session_doc_id(id);
            let maybe_doc = store.get_document::<CouchSessionDocument>(&doc_id).await?;
            Ok(maybe_doc.map(|doc| doc.into_entity()))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = format!("{}/{}", store.base_url, store.database);
            let mut builder = store.client.get(&url);
            if let Some((ref user, ref pass)) = store.auth {
                builder = builder.basic_auth(user.as_ref(), Some(pass.as_ref()));
            }

            let response = builder
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
