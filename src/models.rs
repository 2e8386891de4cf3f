use serde::{Deserialize, Serialize};

/// One message as stored in a mailbox partition.
///
/// `id` is the store-generated key of the record and is not part of the stored
/// body. `read` only ever goes from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(skip)]
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<String>,
}

impl Message {
    /// Mark read with the given timestamp. Returns `true` if the message was unread.
    ///
    /// Idempotent: an already-read message keeps its original `read_at`.
    pub fn mark_read(&mut self, read_at: &str) -> bool {
        if self.read {
            if self.read_at.is_none() {
                self.read_at = Some(read_at.to_string());
            }
            return false;
        }
        self.read = true;
        self.read_at = Some(read_at.to_string());
        true
    }

    pub fn display_subject(&self) -> &str {
        if self.subject.trim().is_empty() {
            "(no subject)"
        } else {
            &self.subject
        }
    }

    /// Sanitized plain-text rendering of the HTML body.
    pub fn body_text(&self) -> String {
        crate::mime::render_html_body(&self.html)
    }

    /// Make `read_at` present exactly when `read` is set. A read record that
    /// lost its timestamp gets `created_at`, the earliest it could have been
    /// read. Returns `true` if anything changed.
    pub(crate) fn normalize_read_at(&mut self) -> bool {
        match (self.read, self.read_at.is_some()) {
            (true, false) => {
                self.read_at = Some(self.created_at.clone());
                true
            }
            (false, true) => {
                self.read_at = None;
                true
            }
            _ => false,
        }
    }
}

/// Which side of a conversation a partition holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Inbox,
    Sent,
}

impl Direction {
    /// Root namespace of this direction in the remote store.
    pub fn root(self) -> &'static str {
        match self {
            Direction::Inbox => "/userInbox",
            Direction::Sent => "/userSent",
        }
    }
}

/// A message about to be sent, before the store assigns ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Body written to both partitions on send.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewMessage<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub subject: &'a str,
    pub html: &'a str,
    pub created_at: String,
    pub read: bool,
}

/// Body of a mark-as-read PATCH.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadPatch {
    pub read: bool,
    pub read_at: String,
}

impl ReadPatch {
    pub fn at(read_at: impl Into<String>) -> Self {
        ReadPatch {
            read: true,
            read_at: read_at.into(),
        }
    }

    pub fn now() -> Self {
        Self::at(now_iso())
    }
}

/// Ids assigned by the store to the two copies of a sent message.
///
/// The two ids are unrelated; nothing links the inbox copy to the sent copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub inbox_message_id: String,
    pub sent_message_id: String,
}

/// Current time as ISO-8601 UTC with millisecond precision, e.g.
/// `2024-05-01T12:00:00.000Z`.
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
