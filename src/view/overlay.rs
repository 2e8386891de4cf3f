use std::collections::{HashMap, HashSet};

use crate::models::Message;

/// Local mutations a landing fetch must not undo.
///
/// Reads are monotonic and store ids are never reused, so every recorded
/// mutation can be replayed onto any fetch result regardless of when that
/// fetch was issued. Once the store has confirmed a mutation, the entry is
/// kept only until a fetch issued after the confirmation lands; that fetch
/// already reflects it. An unconfirmed read stays for the life of the view.
#[derive(Debug, Default)]
pub(super) struct LocalOverlay {
    read: HashMap<String, ReadEntry>,
    /// Deleted id -> last fetch generation issued when the delete succeeded.
    deleted: HashMap<String, u64>,
}

#[derive(Debug)]
struct ReadEntry {
    read_at: String,
    confirmed: Option<u64>,
}

impl LocalOverlay {
    pub fn mark_read(&mut self, id: &str, read_at: &str) {
        self.read.entry(id.to_string()).or_insert_with(|| ReadEntry {
            read_at: read_at.to_string(),
            confirmed: None,
        });
    }

    /// The store accepted the read while `issued` was the newest fetch.
    pub fn confirm_read(&mut self, id: &str, issued: u64) {
        if let Some(entry) = self.read.get_mut(id) {
            entry.confirmed = Some(issued);
        }
    }

    /// The store accepted the delete while `issued` was the newest fetch.
    pub fn mark_deleted(&mut self, id: &str, issued: u64) {
        self.read.remove(id);
        self.deleted.insert(id.to_string(), issued);
    }

    /// Replay onto the result of fetch `generation`, then forget whatever
    /// that fetch already reflects.
    pub fn apply(&mut self, items: Vec<Message>, generation: u64) -> Vec<Message> {
        let items = items
            .into_iter()
            .filter(|m| !self.deleted.contains_key(&m.id))
            .map(|mut m| {
                if let Some(entry) = self.read.get(&m.id) {
                    m.mark_read(&entry.read_at);
                }
                m
            })
            .collect();

        self.deleted.retain(|_, issued| *issued >= generation);
        self.read
            .retain(|_, entry| entry.confirmed.map_or(true, |issued| issued >= generation));
        items
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.read.len() + self.deleted.len()
    }
}

/// Orders fetch completions: a result older than one already applied is
/// dropped.
#[derive(Debug, Default)]
pub(super) struct FetchGuard {
    issued: u64,
    applied: u64,
}

impl FetchGuard {
    pub fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Generation of the newest fetch issued so far.
    pub fn issued(&self) -> u64 {
        self.issued
    }

    pub fn accept(&mut self, generation: u64) -> bool {
        if generation < self.applied {
            return false;
        }
        self.applied = generation;
        true
    }

    /// The most recently issued fetch has landed.
    pub fn settled(&self) -> bool {
        self.applied == self.issued
    }
}
