#![forbid(unsafe_code)]

pub mod admin;
pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod feed;
pub mod notices;
pub mod realtime;
pub mod reconcile;
pub mod redirect;
pub mod session;
pub mod store;

pub use api::{Backend, HttpBackend};
pub use config::{ClientConfig, ConfigError};
pub use coordinator::{Authoritative, Coordinator, PendingMutation, Policy, Settlement, Submission};
pub use error::{ApiError, ApiErrorKind, SessionError};
pub use feed::{ChangeFeed, FeedHub, FeedItem, Subscription};
pub use notices::{Notice, NoticeReceiver, NoticeSender};
pub use realtime::RealtimeEngine;
pub use reconcile::Reconciler;
pub use redirect::{LogRedirector, RecordingRedirector, Redirector};
pub use session::{Session, SessionDeps};
pub use store::{SessionStore, Slot, Ticket, Versioned};
