pub mod badge;
pub mod bus;
pub mod config;
pub mod error;
pub mod keyring;
pub mod mail;
pub mod mailbox_key;
pub mod mime;
pub mod models;
pub mod session;
pub mod store;
pub mod view;

pub use badge::UnreadBadge;
pub use bus::{BusEvent, Channel, EventBus};
pub use config::StoreConfig;
pub use error::{StoreError, ViewError};
pub use models::{Direction, Message, OutgoingMail, ReadPatch, SendReceipt};
pub use session::Session;
pub use store::{MemoryStore, RemoteStore, RestClient};
pub use view::{InboxState, InboxView, Notice, Phase, SentState, SentView};
