mod memory;
mod rest;

use serde_json::Value;

use crate::error::StoreError;

pub use memory::{Method, MemoryStore, Release};
pub use rest::RestClient;

/// CRUD against the remote hierarchical key-value namespace.
///
/// Paths are absolute store paths such as `/userInbox/a@x,com/-Nabc`. The
/// credential, when present, authorizes the request. Implementations never
/// retry and have no side effect beyond the call itself.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Read the value at `path`. A missing path reads as `Value::Null`.
    async fn get(&self, path: &str, credential: Option<&str>) -> Result<Value, StoreError>;

    /// Append `payload` under `path`, returning the store-generated key.
    async fn create(
        &self,
        path: &str,
        payload: &Value,
        credential: Option<&str>,
    ) -> Result<String, StoreError>;

    /// Merge the top-level fields of `payload` into the record at `path`.
    async fn patch(
        &self,
        path: &str,
        payload: &Value,
        credential: Option<&str>,
    ) -> Result<Value, StoreError>;

    /// Remove the subtree at `path`.
    async fn delete(&self, path: &str, credential: Option<&str>) -> Result<(), StoreError>;
}
