use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use serde_json::{Map, Value};
use tokio::sync::oneshot;

use super::RemoteStore;
use crate::error::StoreError;

/// Store operation kinds, used to target injected failures and holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Create,
    Patch,
    Delete,
}

/// Releases a held operation when sent or dropped.
#[derive(Debug)]
pub struct Release(oneshot::Sender<()>);

impl Release {
    pub fn release(self) {
        let _ = self.0.send(());
    }
}

#[derive(Default)]
struct Inner {
    root: Map<String, Value>,
    next_id: u64,
    credential: Option<String>,
    failures: HashMap<Method, VecDeque<u16>>,
    holds: HashMap<Method, VecDeque<oneshot::Receiver<()>>>,
    calls: Vec<(Method, String)>,
}

/// In-process store with the same path semantics as the REST surface.
///
/// Generated ids sort in creation order. Failures and holds are queued per
/// method and consumed by the next matching call, which makes failure and
/// completion-order scenarios reproducible.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

/// What a call took from the queues before touching data.
struct Pending {
    failure: Option<u16>,
    hold: Option<oneshot::Receiver<()>>,
}

impl Pending {
    async fn settle(self) -> Result<(), StoreError> {
        if let Some(hold) = self.hold {
            let _ = hold.await;
        }
        match self.failure {
            Some(status) => Err(StoreError::remote(status, "injected failure")),
            None => Ok(()),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every call whose credential differs from `credential` with 401.
    pub fn require_credential(&self, credential: impl Into<String>) {
        self.lock().credential = Some(credential.into());
    }

    /// Make the next `method` call fail with `status`.
    pub fn fail_next(&self, method: Method, status: u16) {
        self.lock()
            .failures
            .entry(method)
            .or_default()
            .push_back(status);
    }

    /// Hold the next `method` call until the returned handle is released.
    ///
    /// A held `Get` reads its data before waiting, so it returns the state as
    /// of issuance. Held mutations apply after release.
    pub fn hold_next(&self, method: Method) -> Release {
        let (tx, rx) = oneshot::channel();
        self.lock().holds.entry(method).or_default().push_back(rx);
        Release(tx)
    }

    /// Write `value` at `path` directly, bypassing queues.
    pub fn seed(&self, path: &str, value: Value) {
        let mut inner = self.lock();
        let segs = segments(path);
        if let Some((last, parents)) = segs.split_last() {
            let parent = descend_mut(&mut inner.root, parents);
            parent.insert(last.to_string(), value);
        }
    }

    /// Read `path` directly, bypassing queues.
    pub fn read(&self, path: &str) -> Value {
        lookup(&self.lock().root, &segments(path))
    }

    /// Every call made so far, in issue order.
    pub fn calls(&self) -> Vec<(Method, String)> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin(
        inner: &mut Inner,
        method: Method,
        path: &str,
        credential: Option<&str>,
    ) -> Result<Pending, StoreError> {
        inner.calls.push((method, path.to_string()));
        if let Some(expected) = &inner.credential {
            if credential != Some(expected.as_str()) {
                return Err(StoreError::remote(401, "{\"error\":\"Permission denied\"}"));
            }
        }
        Ok(Pending {
            failure: inner.failures.get_mut(&method).and_then(VecDeque::pop_front),
            hold: inner.holds.get_mut(&method).and_then(VecDeque::pop_front),
        })
    }
}

#[async_trait::async_trait]
impl RemoteStore for MemoryStore {
    async fn get(&self, path: &str, credential: Option<&str>) -> Result<Value, StoreError> {
        let (pending, snapshot) = {
            let mut inner = self.lock();
            let pending = Self::begin(&mut inner, Method::Get, path, credential)?;
            (pending, lookup(&inner.root, &segments(path)))
        };
        pending.settle().await?;
        Ok(snapshot)
    }

    async fn create(
        &self,
        path: &str,
        payload: &Value,
        credential: Option<&str>,
    ) -> Result<String, StoreError> {
        let pending = Self::begin(&mut self.lock(), Method::Create, path, credential)?;
        pending.settle().await?;

        let mut inner = self.lock();
        inner.next_id += 1;
        let id = format!("-N{:010}", inner.next_id);
        let parent = descend_mut(&mut inner.root, &segments(path));
        parent.insert(id.clone(), payload.clone());
        Ok(id)
    }

    async fn patch(
        &self,
        path: &str,
        payload: &Value,
        credential: Option<&str>,
    ) -> Result<Value, StoreError> {
        let pending = Self::begin(&mut self.lock(), Method::Patch, path, credential)?;
        pending.settle().await?;

        let fields = payload
            .as_object()
            .ok_or_else(|| StoreError::remote(400, "patch payload must be an object"))?;
        let mut inner = self.lock();
        let record = descend_mut(&mut inner.root, &segments(path));
        for (k, v) in fields {
            record.insert(k.clone(), v.clone());
        }
        Ok(payload.clone())
    }

    async fn delete(&self, path: &str, credential: Option<&str>) -> Result<(), StoreError> {
        let pending = Self::begin(&mut self.lock(), Method::Delete, path, credential)?;
        pending.settle().await?;

        remove(&mut self.lock().root, &segments(path));
        Ok(())
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn lookup(root: &Map<String, Value>, segs: &[&str]) -> Value {
    let Some((first, rest)) = segs.split_first() else {
        return Value::Object(root.clone());
    };
    let mut cur = match root.get(*first) {
        Some(v) => v,
        None => return Value::Null,
    };
    for seg in rest {
        match cur.get(*seg) {
            Some(v) => cur = v,
            None => return Value::Null,
        }
    }
    cur.clone()
}

/// Walk to `segs`, creating (or replacing non-object) nodes along the way.
fn descend_mut<'a>(root: &'a mut Map<String, Value>, segs: &[&str]) -> &'a mut Map<String, Value> {
    let mut cur = root;
    for seg in segs {
        let node = cur
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        cur = match node {
            Value::Object(map) => map,
            _ => unreachable!("node was just made an object"),
        };
    }
    cur
}

/// Remove `segs` and prune parents left empty. Missing paths are a no-op.
fn remove(node: &mut Map<String, Value>, segs: &[&str]) {
    let Some((first, rest)) = segs.split_first() else {
        node.clear();
        return;
    };
    if rest.is_empty() {
        node.remove(*first);
        return;
    }
    let emptied = match node.get_mut(*first) {
        Some(Value::Object(child)) => {
            remove(child, rest);
            child.is_empty()
        }
        _ => false,
    };
    if emptied {
        node.remove(*first);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_then_get_returns_record_under_generated_id() {
        let store = MemoryStore::new();
        let id = store
            .create("/userInbox/b", &json!({"subject": "S"}), None)
            .await
            .unwrap();
        let value = store.get("/userInbox/b", None).await.unwrap();
        assert_eq!(value[&id]["subject"], "S");
    }

    #[tokio::test]
    async fn generated_ids_sort_in_creation_order() {
        let store = MemoryStore::new();
        let a = store.create("/p", &json!({}), None).await.unwrap();
        let b = store.create("/p", &json!({}), None).await.unwrap();
        assert!(a < b);
    }

    #[tokio::test]
    async fn missing_path_reads_null() {
        let store = MemoryStore::new();
        assert!(store.get("/userSent/none", None).await.unwrap().is_null());
    }

    #[tokio::test]
    async fn patch_merges_top_level_fields() {
        let store = MemoryStore::new();
        store.seed("/userInbox/b/-N1", json!({"subject": "S", "read": false}));
        store
            .patch("/userInbox/b/-N1", &json!({"read": true, "readAt": "t"}), None)
            .await
            .unwrap();
        assert_eq!(
            store.read("/userInbox/b/-N1"),
            json!({"subject": "S", "read": true, "readAt": "t"})
        );
    }

    #[tokio::test]
    async fn delete_prunes_empty_partition() {
        let store = MemoryStore::new();
        store.seed("/userInbox/b/-N1", json!({"subject": "S"}));
        store.delete("/userInbox/b/-N1", None).await.unwrap();
        assert!(store.read("/userInbox/b").is_null());
        // deleting again is not an error
        store.delete("/userInbox/b/-N1", None).await.unwrap();
    }

    #[tokio::test]
    async fn injected_failure_is_consumed_once() {
        let store = MemoryStore::new();
        store.fail_next(Method::Get, 503);
        let err = store.get("/p", None).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert!(store.get("/p", None).await.is_ok());
    }

    #[tokio::test]
    async fn failed_create_writes_nothing() {
        let store = MemoryStore::new();
        store.fail_next(Method::Create, 500);
        assert!(store.create("/p", &json!({"a": 1}), None).await.is_err());
        assert!(store.read("/p").is_null());
    }

    #[tokio::test]
    async fn held_get_returns_state_as_of_issuance() {
        let store = std::sync::Arc::new(MemoryStore::new());
        store.seed("/p/-N1", json!({"read": false}));
        let release = store.hold_next(Method::Get);

        let reader = {
            let store = store.clone();
            tokio::spawn(async move { store.get("/p", None).await })
        };
        tokio::task::yield_now().await;
        while store.calls().is_empty() {
            tokio::task::yield_now().await;
        }
        store.seed("/p/-N1", json!({"read": true}));
        release.release();

        let value = reader.await.unwrap().unwrap();
        assert_eq!(value["-N1"]["read"], false);
    }

    #[tokio::test]
    async fn wrong_credential_is_rejected() {
        let store = MemoryStore::new();
        store.require_credential("tok");
        let err = store.get("/p", Some("other")).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(store.get("/p", Some("tok")).await.is_ok());
    }
}
