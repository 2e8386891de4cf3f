//! Per-view state controllers.
//!
//! Each mounted view owns its state inside a single task. The handle the
//! renderer holds talks to that task over a command channel; remote calls run
//! in spawned tasks and post their completions back, so state is only ever
//! touched by its owner. Snapshots go out over a `watch` channel.

mod commands;
mod inbox;
mod overlay;
mod sent;

pub use inbox::{InboxState, InboxView};
pub use sent::{SentState, SentView};

/// Load lifecycle of a view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Ready,
    /// The last fetch failed; the cached list is left as it was.
    Error,
}

/// A failure the user should be told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    DeleteFailed { id: String, reason: String },
}

impl Notice {
    pub fn text(&self) -> &'static str {
        match self {
            Notice::DeleteFailed { .. } => "Failed to delete message. Please try again.",
        }
    }
}
