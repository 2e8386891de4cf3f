use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::commands::{answer, InboxCmd, Reply};
use super::overlay::{FetchGuard, LocalOverlay};
use super::{Notice, Phase};
use crate::bus::EventBus;
use crate::error::{StoreError, ViewError};
use crate::mail;
use crate::models::{Message, ReadPatch};
use crate::session::{active_identifier, Session};
use crate::store::RemoteStore;

/// Snapshot of a mounted inbox.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboxState {
    pub phase: Phase,
    /// Newest first.
    pub items: Vec<Message>,
    /// At most one message is expanded.
    pub expanded_id: Option<String>,
    /// Always the number of unread entries in `items`.
    pub unread_count: u32,
}

impl InboxState {
    pub fn loading(&self) -> bool {
        matches!(self.phase, Phase::Idle | Phase::Loading)
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.items.iter().find(|m| m.id == id)
    }
}

/// Handle to a mounted inbox. Dropping it deactivates the view.
pub struct InboxView {
    tx: mpsc::UnboundedSender<InboxCmd>,
    state: watch::Receiver<InboxState>,
    notices: mpsc::UnboundedReceiver<Notice>,
    task: Option<JoinHandle<()>>,
}

impl InboxView {
    /// Mount the inbox for `session` and start loading it.
    ///
    /// Without an identifier the view is immediately ready and empty. Must be
    /// called inside a Tokio runtime.
    pub fn activate(store: Arc<dyn RemoteStore>, bus: EventBus, session: Option<Session>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(InboxState::default());
        let (notice_tx, notices) = mpsc::unbounded_channel();

        let mut actor = InboxActor {
            store,
            bus,
            session,
            tx: tx.clone(),
            state: InboxState::default(),
            state_tx,
            notice_tx,
            overlay: LocalOverlay::default(),
            fetches: FetchGuard::default(),
            active: true,
        };
        log::info!("inbox view activated");
        actor.start_fetch(None);
        let task = tokio::spawn(actor.run(rx));

        InboxView {
            tx,
            state,
            notices,
            task: Some(task),
        }
    }

    pub fn state(&self) -> InboxState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<InboxState> {
        self.state.clone()
    }

    /// Wait until the current load has finished, successfully or not.
    pub async fn ready(&self) -> InboxState {
        let mut rx = self.state.clone();
        let result = rx.wait_for(|s| !s.loading()).await.map(|s| s.clone());
        result.unwrap_or_else(|_| self.state())
    }

    /// Re-fetch the inbox. Resolves when this fetch has been applied.
    pub async fn refresh(&self) -> Result<(), ViewError> {
        self.request(|reply| InboxCmd::Refresh { reply: Some(reply) })
            .await
    }

    /// Toggle expansion of `id`; marks it read if it was unread.
    ///
    /// The message is marked read locally straight away. A failed remote
    /// patch is logged and not rolled back, so this only errs when the view
    /// has been deactivated.
    pub async fn open_message(&self, id: &str) -> Result<(), ViewError> {
        let id = id.to_string();
        self.request(|reply| InboxCmd::Open { id, reply }).await
    }

    /// Delete `id` remotely, then locally. On failure nothing changes
    /// locally, a [`Notice`] is queued and the error is returned.
    pub async fn delete_message(&self, id: &str) -> Result<(), ViewError> {
        let id = id.to_string();
        self.request(|reply| InboxCmd::Delete { id, reply }).await
    }

    pub async fn next_notice(&mut self) -> Option<Notice> {
        self.notices.recv().await
    }

    pub fn try_next_notice(&mut self) -> Option<Notice> {
        self.notices.try_recv().ok()
    }

    /// Deactivate and wait for the owning task to finish. Store calls still in
    /// flight complete on their own; their results are discarded.
    pub async fn deactivate(mut self) {
        let _ = self.tx.send(InboxCmd::Deactivate);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    async fn request(&self, make: impl FnOnce(Reply) -> InboxCmd) -> Result<(), ViewError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).map_err(|_| ViewError::Inactive)?;
        rx.await.map_err(|_| ViewError::Inactive)?
    }
}

impl Drop for InboxView {
    fn drop(&mut self) {
        let _ = self.tx.send(InboxCmd::Deactivate);
    }
}

// -- owning task -----------------------------------------------------------

struct InboxActor {
    store: Arc<dyn RemoteStore>,
    bus: EventBus,
    session: Option<Session>,
    tx: mpsc::UnboundedSender<InboxCmd>,
    state: InboxState,
    state_tx: watch::Sender<InboxState>,
    notice_tx: mpsc::UnboundedSender<Notice>,
    overlay: LocalOverlay,
    fetches: FetchGuard,
    active: bool,
}

impl InboxActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<InboxCmd>) {
        while let Some(cmd) = rx.recv().await {
            self.handle(cmd);
            if !self.active {
                break;
            }
        }
        log::debug!("inbox view deactivated");
    }

    fn handle(&mut self, cmd: InboxCmd) {
        if !self.active {
            log::debug!("inbox view inactive, dropping command");
            return;
        }
        match cmd {
            InboxCmd::Refresh { reply } => self.start_fetch(reply),
            InboxCmd::Open { id, reply } => self.open(id, reply),
            InboxCmd::Delete { id, reply } => self.start_delete(id, reply),
            InboxCmd::Deactivate => self.active = false,
            InboxCmd::Fetched {
                generation,
                result,
                reply,
            } => self.fetched(generation, result, reply),
            InboxCmd::MarkedRead {
                id,
                read_at,
                result,
                reply,
            } => self.marked_read(id, read_at, result, reply),
            InboxCmd::Deleted { id, result, reply } => self.deleted(id, result, reply),
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

    /// Recompute the derived count after a list mutation and announce it.
    fn recount(&mut self) {
        self.recount_local();
        self.bus.publish_unread_count(self.state.unread_count);
    }

    /// Recompute without telling the bus. Used for the optimistic read, whose
    /// announcement waits for the patch to settle so listeners never see the
    /// decrement twice.
    fn recount_local(&mut self) {
        self.state.unread_count = mail::count_unread(&self.state.items);
        self.publish_state();
    }

    fn start_fetch(&mut self, reply: Option<Reply>) {
        let Some(identifier) = self.identifier() else {
            self.state.items.clear();
            self.state.phase = Phase::Ready;
            self.recount();
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
            let result = mail::fetch_inbox(&*store, &identifier, credential.as_deref()).await;
            let done = InboxCmd::Fetched {
                generation,
                result,
                reply,
            };
            if tx.send(done).is_err() {
                log::debug!("inbox view gone, discarding fetch {generation}");
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
            log::debug!("discarding superseded inbox fetch {generation}");
            answer(reply, Ok(()));
            return;
        }
        let latest = self.fetches.settled();
        match result {
            Ok(items) => {
                self.state.items = self.overlay.apply(items, generation);
                if latest {
                    self.state.phase = Phase::Ready;
                }
                self.recount();
                answer(reply, Ok(()));
            }
            Err(e) => {
                log::error!("Failed to fetch inbox: {e}");
                if latest {
                    self.state.phase = Phase::Error;
                }
                self.publish_state();
                answer(reply, Err(e.into()));
            }
        }
    }

    fn open(&mut self, id: String, reply: Reply) {
        self.state.expanded_id = if self.state.expanded_id.as_deref() == Some(id.as_str()) {
            None
        } else {
            Some(id.clone())
        };

        let target = self.state.items.iter().position(|m| m.id == id && !m.read);
        let (Some(pos), Some(identifier)) = (target, self.identifier()) else {
            self.publish_state();
            let _ = reply.send(Ok(()));
            return;
        };

        let patch = ReadPatch::now();
        self.state.items[pos].mark_read(&patch.read_at);
        self.overlay.mark_read(&id, &patch.read_at);
        self.recount_local();

        let store = self.store.clone();
        let tx = self.tx.clone();
        let credential = self.credential();
        tokio::spawn(async move {
            let result =
                mail::mark_as_read(&*store, &identifier, &id, &patch, credential.as_deref())
                    .await;
            let done = InboxCmd::MarkedRead {
                id,
                read_at: patch.read_at,
                result,
                reply,
            };
            if tx.send(done).is_err() {
                log::debug!("inbox view gone, discarding mark-as-read result");
            }
        });
    }

    fn marked_read(
        &mut self,
        id: String,
        read_at: String,
        result: Result<(), StoreError>,
        reply: Reply,
    ) {
        match result {
            Ok(()) => {
                self.overlay.confirm_read(&id, self.fetches.issued());
                self.bus.publish_read_changed(-1);
                if let Some(m) = self.state.items.iter_mut().find(|m| m.id == id) {
                    m.mark_read(&read_at);
                }
                self.recount();
            }
            // The local copy stays read; the remote copy stays unread.
            Err(e) => {
                log::error!("Failed to mark {id} as read: {e}");
                self.recount();
            }
        }
        let _ = reply.send(Ok(()));
    }

    fn start_delete(&mut self, id: String, reply: Reply) {
        let Some(identifier) = self.identifier() else {
            log::debug!("inbox delete without a mailbox, ignoring {id}");
            let _ = reply.send(Ok(()));
            return;
        };

        let store = self.store.clone();
        let tx = self.tx.clone();
        let credential = self.credential();
        tokio::spawn(async move {
            let result =
                mail::delete_inbox_mail(&*store, &identifier, &id, credential.as_deref())
                    .await;
            if tx.send(InboxCmd::Deleted { id, result, reply }).is_err() {
                log::debug!("inbox view gone, discarding delete result");
            }
        });
    }

    fn deleted(&mut self, id: String, result: Result<(), StoreError>, reply: Reply) {
        match result {
            Ok(()) => {
                self.overlay.mark_deleted(&id, self.fetches.issued());
                let mut was_unread = false;
                if let Some(pos) = self.state.items.iter().position(|m| m.id == id) {
                    was_unread = !self.state.items.remove(pos).read;
                }
                if self.state.expanded_id.as_deref() == Some(id.as_str()) {
                    self.state.expanded_id = None;
                }
                if was_unread {
                    self.bus.publish_read_changed(-1);
                }
                self.recount();
                let _ = reply.send(Ok(()));
            }
            Err(e) => {
                log::error!("Failed to delete message {id}: {e}");
                let _ = self.notice_tx.send(Notice::DeleteFailed {
                    id,
                    reason: e.to_string(),
                });
                let _ = reply.send(Err(e.into()));
            }
        }
    }
}
