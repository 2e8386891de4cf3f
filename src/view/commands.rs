use tokio::sync::oneshot;

use crate::error::{StoreError, ViewError};
use crate::models::Message;

pub(super) type Reply = oneshot::Sender<Result<(), ViewError>>;

pub(super) fn answer(reply: Option<Reply>, result: Result<(), ViewError>) {
    if let Some(reply) = reply {
        let _ = reply.send(result);
    }
}

pub(super) enum InboxCmd {
    Refresh {
        reply: Option<Reply>,
    },
    Open {
        id: String,
        reply: Reply,
    },
    Delete {
        id: String,
        reply: Reply,
    },
    Deactivate,
    // completions posted by spawned store calls
    Fetched {
        generation: u64,
        result: Result<Vec<Message>, StoreError>,
        reply: Option<Reply>,
    },
    MarkedRead {
        id: String,
        read_at: String,
        result: Result<(), StoreError>,
        reply: Reply,
    },
    Deleted {
        id: String,
        result: Result<(), StoreError>,
        reply: Reply,
    },
}

pub(super) enum SentCmd {
    Refresh {
        reply: Option<Reply>,
    },
    Delete {
        id: String,
        reply: Reply,
    },
    Deactivate,
    Fetched {
        generation: u64,
        result: Result<Vec<Message>, StoreError>,
        reply: Option<Reply>,
    },
    Deleted {
        id: String,
        result: Result<(), StoreError>,
        reply: Reply,
    },
}
