#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;

use crate::dao::models::{SessionEntity, SessionResultEntity, StoredStatus};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Abstraction over the persistence layer for match sessions and their results.
pub trait GameStore: Send + Sync {
    /// Store a new session record. Storing an id that already exists is a no-op.
    fn create_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<Uuid>>;
    /// Move a session record to `status`. Finished records never move back.
    fn update_status(&self, id: Uuid, status: StoredStatus)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Write the final outcome of a session.
    ///
    /// Idempotent: returns `false` when a result was already recorded, leaving it untouched.
    fn record_result(&self, result: SessionResultEntity) -> BoxFuture<'static, StorageResult<bool>>;
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
