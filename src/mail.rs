use indexmap::IndexMap;
use serde_json::Value;

use crate::error::StoreError;
use crate::mailbox_key;
use crate::models::{now_iso, Direction, Message, NewMessage, OutgoingMail, ReadPatch, SendReceipt};
use crate::store::RemoteStore;

/// Store path of the partition holding `identifier`'s messages in `direction`.
pub fn partition_path(direction: Direction, identifier: &str) -> String {
    format!("{}/{}", direction.root(), mailbox_key::encode(identifier))
}

/// Store path of one message inside a partition.
pub fn message_path(direction: Direction, identifier: &str, message_id: &str) -> String {
    format!("{}/{}", partition_path(direction, identifier), message_id)
}

/// Deliver one message to the recipient's inbox and the sender's sent box.
///
/// Both creates are issued together and both run to completion. If either
/// fails the first failure is returned (inbox before sent); a write that
/// already landed is left in place.
pub async fn send_mail(
    store: &dyn RemoteStore,
    mail: &OutgoingMail,
    credential: Option<&str>,
) -> Result<SendReceipt, StoreError> {
    let payload = serde_json::to_value(NewMessage {
        from: &mail.from,
        to: &mail.to,
        subject: &mail.subject,
        html: &mail.html,
        created_at: now_iso(),
        read: false,
    })?;

    let inbox_path = partition_path(Direction::Inbox, &mail.to);
    let sent_path = partition_path(Direction::Sent, &mail.from);
    let (inbox, sent) = futures::join!(
        store.create(&inbox_path, &payload, credential),
        store.create(&sent_path, &payload, credential),
    );

    match (inbox, sent) {
        (Ok(inbox_message_id), Ok(sent_message_id)) => {
            log::debug!("sent {inbox_message_id} -> {inbox_path}, {sent_message_id} -> {sent_path}");
            Ok(SendReceipt {
                inbox_message_id,
                sent_message_id,
            })
        }
        (Err(e), Ok(sent_id)) => {
            log::warn!("partial send: sent copy {sent_id} stored, inbox copy failed: {e}");
            Err(e)
        }
        (Ok(inbox_id), Err(e)) => {
            log::warn!("partial send: inbox copy {inbox_id} stored, sent copy failed: {e}");
            Err(e)
        }
        (Err(e), Err(sent_err)) => {
            log::debug!("send failed on both partitions; sent error: {sent_err}");
            Err(e)
        }
    }
}

pub async fn fetch_inbox(
    store: &dyn RemoteStore,
    identifier: &str,
    credential: Option<&str>,
) -> Result<Vec<Message>, StoreError> {
    fetch_partition(store, Direction::Inbox, identifier, credential).await
}

pub async fn fetch_sent(
    store: &dyn RemoteStore,
    identifier: &str,
    credential: Option<&str>,
) -> Result<Vec<Message>, StoreError> {
    fetch_partition(store, Direction::Sent, identifier, credential).await
}

/// Fetch a whole partition, newest first.
pub async fn fetch_partition(
    store: &dyn RemoteStore,
    direction: Direction,
    identifier: &str,
    credential: Option<&str>,
) -> Result<Vec<Message>, StoreError> {
    let value = store
        .get(&partition_path(direction, identifier), credential)
        .await?;
    let mut messages = decode_partition(value)?;
    sort_newest_first(&mut messages);
    Ok(messages)
}

/// Mark one inbox message read with the given timestamp.
pub async fn mark_as_read(
    store: &dyn RemoteStore,
    identifier: &str,
    message_id: &str,
    patch: &ReadPatch,
    credential: Option<&str>,
) -> Result<(), StoreError> {
    let payload = serde_json::to_value(patch)?;
    store
        .patch(
            &message_path(Direction::Inbox, identifier, message_id),
            &payload,
            credential,
        )
        .await?;
    Ok(())
}

/// Number of unread messages in `identifier`'s inbox, from a fresh fetch.
pub async fn fetch_unread_count(
    store: &dyn RemoteStore,
    identifier: &str,
    credential: Option<&str>,
) -> Result<u32, StoreError> {
    let messages = fetch_inbox(store, identifier, credential).await?;
    Ok(count_unread(&messages))
}

pub async fn delete_inbox_mail(
    store: &dyn RemoteStore,
    identifier: &str,
    message_id: &str,
    credential: Option<&str>,
) -> Result<(), StoreError> {
    store
        .delete(&message_path(Direction::Inbox, identifier, message_id), credential)
        .await
}

pub async fn delete_sent_mail(
    store: &dyn RemoteStore,
    identifier: &str,
    message_id: &str,
    credential: Option<&str>,
) -> Result<(), StoreError> {
    store
        .delete(&message_path(Direction::Sent, identifier, message_id), credential)
        .await
}

pub fn count_unread(messages: &[Message]) -> u32 {
    messages.iter().filter(|m| !m.read).count() as u32
}

/// Stable sort by `created_at` descending, plain string comparison.
/// Equal timestamps keep their incoming (store key) order.
pub fn sort_newest_first(messages: &mut [Message]) {
    messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Turn a partition's `id -> record` object into messages, in key order.
///
/// `null` is an empty partition. Records that do not match the message schema
/// are skipped.
fn decode_partition(value: Value) -> Result<Vec<Message>, StoreError> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    let records: IndexMap<String, Value> = serde_json::from_value(value)
        .map_err(|e| StoreError::Decode(format!("partition is not an object: {e}")))?;

    let mut messages = Vec::with_capacity(records.len());
    for (id, record) in records {
        match serde_json::from_value::<Message>(record) {
            Ok(mut message) => {
                if message.normalize_read_at() {
                    log::warn!("message {id} had readAt out of step with read, normalized");
                }
                message.id = id;
                messages.push(message);
            }
            Err(e) => log::warn!("skipping malformed message {id}: {e}"),
        }
    }
    Ok(messages)
}
