use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::commands::{answer, Reply, SentCmd};
use super::overlay::{FetchGuard, LocalOverlay};
use super::{Notice, Phase};
use crate::error::{StoreError, ViewError};
use crate::mail;
use crate::models::Message;
use crate::session::{active_identifier, Session};
use crate::store::RemoteStore;

/// Snapshot of a mounted sent box.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SentState {
    pub phase: Phase,
    pub items: Vec<Message>,
}

impl SentState {
    pub fn loading(&self) -> bool {
        matches!(self.phase, Phase::Idle | Phase::Loading)
    }
}

/// Handle to a mounted sent box. No read state, no bus traffic.
pub struct SentView {
    tx: mpsc::UnboundedSender<SentCmd>,
    state: watch::Receiver<SentState>,
    notices: mpsc::UnboundedReceiver<Notice>,
    task: Option<JoinHandle<()>>,
}

impl SentView {
    pub fn activate(store: Arc<dyn RemoteStore>, session: Option<Session>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(SentState::default());
        let (notice_tx, notices) = mpsc::unbounded_channel();

        let mut actor = SentActor {
            store,
            session,
            tx: tx.clone(),
            state: SentState::default(),
            state_tx,
            notice_tx,
            overlay: LocalOverlay::default(),
            fetches: FetchGuard::default(),
            active: true,
        };
        log::info!("sent view activated");
        actor.start_fetch(None);
        let task = tokio::spawn(actor.run(rx));

        SentView {
            tx,
            state,
            notices,
            task: Some(task),
        }
    }

    pub fn state(&self) -> SentState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SentState> {
        self.state.clone()
    }

    pub async fn ready(&self) -> SentState {
        let mut rx = self.state.clone();
        let result = rx.wait_for(|s| !s.loading()).await.map(|s| s.clone());
        result.unwrap_or_else(|_| self.state())
    }

    pub async fn refresh(&self) -> Result<(), ViewError> {
        self.request(|reply| SentCmd::Refresh { reply: Some(reply) })
            .await
    }

    pub async fn delete_message(&self, id: &str) -> Result<(), ViewError> {
        let id = id.to_string();
        self.request(|reply| SentCmd::Delete { id, reply }).await
    }

    pub async fn next_notice(&mut self) -> Option<Notice> {
        self.notices.recv().await
    }

    pub fn try_next_notice(&mut self) -> Option<Notice> {
        self.notices.try_recv().ok()
    }

    pub async fn deactivate(mut self) {
        let _ = self.tx.send(SentCmd::Deactivate);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    async fn request(&self, make: impl FnOnce(Reply) -> SentCmd) -> Result<(), ViewError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).map_err(|_| ViewError::Inactive)?;
        rx.await.map_err(|_| ViewError::Inactive)?
    }
}

impl Drop for SentView {
    fn drop(&mut self) {
        let _ = self.tx.send(SentCmd::Deactivate);
    }
}

struct SentActor {
    store: Arc<dyn RemoteStore>,
    session: Option<Session>,
    tx: mpsc::UnboundedSender<SentCmd>,
    state: SentState,
    state_tx: watch::Sender<SentState>,
    notice_tx: mpsc::UnboundedSender<Notice>,
    overlay: LocalOverlay,
    fetches: FetchGuard,
    active: bool,
}

impl SentActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SentCmd>) {
        while let Some(cmd) = rx.recv().await {
            self.handle(cmd);
            if !self.active {
                break;
            }
        }
        log::debug!("sent view deactivated");
    }

    fn handle(&mut self, cmd: SentCmd) {
        if !self.active {
            return;
        }
        match cmd {
            SentCmd::Refresh { reply } => self.start_fetch(reply),
            SentCmd::Delete { id, reply } => self.start_delete(id, reply),
            SentCmd::Deactivate => self.active = false,
            SentCmd::Fetched {
                generation,
                result,
                reply,
            } => self.fetched(generation, result, reply),
            SentCmd::Deleted { id, result, reply } => self.deleted(id, result, reply),
        }
    }

    fn identifier(&self) -> Option<String> {
        active_identifier(self.session.as_ref()).map(str::to_string)
    }

    fn credential(&self) -> Option<String> {
        self.session.as_ref().and_then(|s| s.credential.clone())
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(self.state.clone());
    }

    fn start_fetch(&mut self, reply: Option<Reply>) {
        let Some(identifier) = self.identifier() else {
            self.state.items.clear();
            self.state.phase = Phase::Ready;
            self.publish_state();
            answer(reply, Ok(()));
            return;
        };

        let generation = self.fetches.issue();
        self.state.phase = Phase::Loading;
        self.publish_state();

        let store = self.store.clone();
        let tx = self.tx.clone();
        let credential = self.credential();
        tokio::spawn(async move {
            let result = mail::fetch_sent(&*store, &identifier, credential.as_deref()).await;
            let done = SentCmd::Fetched {
                generation,
                result,
                reply,
            };
            if tx.send(done).is_err() {
                log::debug!("sent view gone, discarding fetch {generation}");
            }
        });
    }

    fn fetched(
        &mut self,
        generation: u64,
        result: Result<Vec<Message>, StoreError>,
        reply: Option<Reply>,
    ) {
        if !self.fetches.accept(generation) {
            answer(reply, Ok(()));
            return;
        }
        let latest = self.fetches.settled();
        let outcome = match result {
            Ok(items) => {
                self.state.items = self.overlay.apply(items, generation);
                if latest {
                    self.state.phase = Phase::Ready;
                }
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to fetch sent messages: {e}");
                if latest {
                    self.state.phase = Phase::Error;
                }
                Err(e.into())
            }
        };
        self.publish_state();
        answer(reply, outcome);
    }

    fn start_delete(&mut self, id: String, reply: Reply) {
        let Some(identifier) = self.identifier() else {
            let _ = reply.send(Ok(()));
            return;
        };

        let store = self.store.clone();
        let tx = self.tx.clone();
        let credential = self.credential();
        tokio::spawn(async move {
            let result =
                mail::delete_sent_mail(&*store, &identifier, &id, credential.as_deref())
                    .await;
            if tx.send(SentCmd::Deleted { id, result, reply }).is_err() {
                log::debug!("sent view gone, discarding delete result");
            }
        });
    }

    fn deleted(&mut self, id: String, result: Result<(), StoreError>, reply: Reply) {
        match result {
            Ok(()) => {
                self.overlay.mark_deleted(&id, self.fetches.issued());
                self.state.items.retain(|m| m.id != id);
                self.publish_state();
                let _ = reply.send(Ok(()));
            }
            Err(e) => {
                log::error!("Failed to delete sent message {id}: {e}");
                let _ = self.notice_tx.send(Notice::DeleteFailed {
                    id,
                    reason: e.to_string(),
                });
                let _ = reply.send(Err(e.into()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutgoingMail;
    use crate::store::{MemoryStore, Method};
    use serde_json::json;

    const ME: &str = "Alice@Example.com";

    fn session() -> Option<Session> {
        Some(Session::new(ME, None))
    }

    async fn send(store: &MemoryStore, subject: &str) -> String {
        let mail = OutgoingMail {
            from: ME.into(),
            to: "bob@example.com".into(),
            subject: subject.into(),
            html: String::new(),
        };
        mail::send_mail(store, &mail, None)
            .await
            .unwrap()
            .sent_message_id
    }

    #[tokio::test]
    async fn loads_sent_partition_newest_first() {
        let store = Arc::new(MemoryStore::new());
        store.seed("/userSent/alice@example,com/-N1", json!({"from": ME, "to": "b", "subject": "t1", "createdAt": "t1"}));
        store.seed("/userSent/alice@example,com/-N2", json!({"from": ME, "to": "b", "subject": "t3", "createdAt": "t3"}));
        store.seed("/userSent/alice@example,com/-N3", json!({"from": ME, "to": "b", "subject": "t2", "createdAt": "t2"}));

        let view = SentView::activate(store, session());
        let state = view.ready().await;
        assert_eq!(state.phase, Phase::Ready);
        let subjects: Vec<&str> = state.items.iter().map(|m| m.subject.as_str()).collect();
        assert_eq!(subjects, vec!["t3", "t2", "t1"]);
    }

    #[tokio::test]
    async fn sent_message_appears_after_refresh() {
        let store = Arc::new(MemoryStore::new());
        let view = SentView::activate(store.clone(), session());
        assert!(view.ready().await.items.is_empty());

        let id = send(&store, "S").await;
        view.refresh().await.unwrap();
        let state = view.state();
        assert_eq!(state.items.len(), 1);
        assert_eq!(state.items[0].id, id);
        assert_eq!(state.items[0].subject, "S");
    }

    #[tokio::test]
    async fn delete_removes_locally_after_remote_success() {
        let store = Arc::new(MemoryStore::new());
        let keep = send(&store, "keep").await;
        let gone = send(&store, "gone").await;
        let view = SentView::activate(store.clone(), session());
        view.ready().await;

        view.delete_message(&gone).await.unwrap();
        let ids: Vec<String> = view.state().items.into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![keep]);
        // the recipient's copy is untouched
        assert_eq!(
            mail::fetch_inbox(&*store, "bob@example.com", None)
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn failed_delete_notifies_without_local_change() {
        let store = Arc::new(MemoryStore::new());
        let id = send(&store, "S").await;
        let mut view = SentView::activate(store.clone(), session());
        let before = view.ready().await;

        store.fail_next(Method::Delete, 500);
        assert!(view.delete_message(&id).await.is_err());
        assert_eq!(view.state(), before);
        assert!(matches!(
            view.try_next_notice(),
            Some(Notice::DeleteFailed { .. })
        ));
    }

    #[tokio::test]
    async fn failed_fetch_is_logged_not_surfaced() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next(Method::Get, 500);
        let mut view = SentView::activate(store, session());
        let state = view.ready().await;
        assert_eq!(state.phase, Phase::Error);
        assert!(state.items.is_empty());
        assert_eq!(view.try_next_notice(), None);
    }

    #[tokio::test]
    async fn missing_identifier_skips_network() {
        let store = Arc::new(MemoryStore::new());
        let view = SentView::activate(store.clone(), None);
        assert_eq!(view.ready().await.phase, Phase::Ready);
        view.delete_message("-N1").await.unwrap();
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn slow_fetch_does_not_resurrect_a_delete() {
        let store = Arc::new(MemoryStore::new());
        let id = send(&store, "S").await;
        let view = SentView::activate(store.clone(), session());
        view.ready().await;

        let release = store.hold_next(Method::Get);
        let refresh = view.refresh();
        tokio::pin!(refresh);
        tokio::select! {
            _ = &mut refresh => panic!("held fetch landed early"),
            _ = async {
                while store.calls().iter().filter(|(m, _)| *m == Method::Get).count() < 2 {
                    tokio::task::yield_now().await;
                }
            } => {}
        }
        view.delete_message(&id).await.unwrap();
        release.release();
        refresh.await.unwrap();
        assert!(view.state().items.is_empty());
    }
}
