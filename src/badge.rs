//! Unread badge for components other than the inbox view.
//!
//! The badge fetches its own baseline and then follows the bus. It never
//! reads another view's state, so while an inbox view is mounted the two can
//! disagree briefly; the inbox's next `unread-count` event settles it.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::bus::{BusEvent, Channel, EventBus, Subscription};
use crate::error::StoreError;
use crate::mail;
use crate::session::{active_identifier, Session};
use crate::store::RemoteStore;

enum BadgeCmd {
    Baseline {
        generation: u64,
        result: Result<u32, StoreError>,
    },
    Deactivate,
}

/// Handle to a mounted badge. Dropping it releases the bus subscription.
pub struct UnreadBadge {
    tx: mpsc::UnboundedSender<BadgeCmd>,
    count: watch::Receiver<u32>,
    task: Option<JoinHandle<()>>,
}

impl UnreadBadge {
    pub fn activate(store: Arc<dyn RemoteStore>, bus: &EventBus, session: Option<Session>) -> Self {
        // subscribe before the baseline is requested so no event is missed
        let sub = bus.subscribe(&[Channel::ReadChanged, Channel::UnreadCount]);
        let (tx, rx) = mpsc::unbounded_channel();
        let (count_tx, count) = watch::channel(0);

        let identifier = active_identifier(session.as_ref()).map(str::to_string);
        let mut actor = BadgeActor {
            store,
            identifier,
            credential: session.and_then(|s| s.credential),
            tx: tx.clone(),
            count: 0,
            count_tx,
            requested: 0,
            pending: None,
            deltas_before_baseline: 0,
            saw_absolute: false,
        };
        actor.request_baseline();
        let task = tokio::spawn(actor.run(rx, sub));

        UnreadBadge {
            tx,
            count,
            task: Some(task),
        }
    }

    pub fn count(&self) -> u32 {
        *self.count.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.count.clone()
    }

    pub async fn deactivate(mut self) {
        let _ = self.tx.send(BadgeCmd::Deactivate);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for UnreadBadge {
    fn drop(&mut self) {
        let _ = self.tx.send(BadgeCmd::Deactivate);
    }
}

struct BadgeActor {
    store: Arc<dyn RemoteStore>,
    identifier: Option<String>,
    credential: Option<String>,
    tx: mpsc::UnboundedSender<BadgeCmd>,
    count: u32,
    count_tx: watch::Sender<u32>,
    requested: u64,
    /// Generation of the baseline fetch in flight, if any.
    pending: Option<u64>,
    deltas_before_baseline: i64,
    saw_absolute: bool,
}

impl BadgeActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<BadgeCmd>, mut sub: Subscription) {
        let mut bus_open = true;
        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(BadgeCmd::Baseline { generation, result }) => {
                        self.baseline(generation, result)
                    }
                    Some(BadgeCmd::Deactivate) | None => break,
                },
                event = sub.recv(), if bus_open => match event {
                    Some(event) => {
                        self.apply(event);
                        let missed = sub.take_missed();
                        if missed > 0 {
                            log::warn!("badge missed {missed} bus events, refetching baseline");
                            self.request_baseline();
                        }
                    }
                    // no publisher left; the baseline can still land
                    None => {
                        log::debug!("bus closed, badge stops following it");
                        bus_open = false;
                    }
                },
            }
        }
        log::debug!("unread badge deactivated");
    }

    fn set(&mut self, count: u32) {
        self.count = count;
        self.count_tx.send_replace(count);
    }

    /// Fetch the unread count from the store. Supersedes any fetch in flight.
    fn request_baseline(&mut self) {
        let Some(identifier) = self.identifier.clone() else {
            return;
        };
        self.requested += 1;
        let generation = self.requested;
        self.pending = Some(generation);
        self.deltas_before_baseline = 0;
        self.saw_absolute = false;

        let store = self.store.clone();
        let tx = self.tx.clone();
        let credential = self.credential.clone();
        tokio::spawn(async move {
            let result =
                mail::fetch_unread_count(&*store, &identifier, credential.as_deref()).await;
            if tx.send(BadgeCmd::Baseline { generation, result }).is_err() {
                log::debug!("badge gone, discarding baseline");
            }
        });
    }

    fn apply(&mut self, event: BusEvent) {
        match event {
            BusEvent::ReadChanged { delta } => {
                if self.pending.is_some() {
                    self.deltas_before_baseline += delta;
                }
                self.set(apply_delta(self.count, delta));
            }
            BusEvent::UnreadCount { count } => {
                self.saw_absolute = true;
                self.set(count);
            }
        }
    }

    /// The baseline loses to any absolute count already received; otherwise
    /// deltas seen while it was in flight are replayed on top of it.
    fn baseline(&mut self, generation: u64, result: Result<u32, StoreError>) {
        if self.pending != Some(generation) {
            log::debug!("discarding superseded badge baseline {generation}");
            return;
        }
        self.pending = None;
        match result {
            Ok(_) if self.saw_absolute => {
                log::debug!("badge baseline superseded by an unread-count event");
            }
            Ok(n) => {
                let count = apply_delta(n, self.deltas_before_baseline);
                self.set(count);
            }
            Err(e) => log::warn!("Failed to fetch unread baseline: {e}"),
        }
        self.deltas_before_baseline = 0;
    }
}

/// `max(0, count + delta)`.
fn apply_delta(count: u32, delta: i64) -> u32 {
    (i64::from(count) + delta).clamp(0, i64::from(u32::MAX)) as u32
}
