//! Sync layer: hosted REST backend, fixed-interval polling, in-process events
//! and the local session file.

mod error;
pub mod events;
pub mod poll;
pub mod session;

#[cfg(feature = "http")]
pub mod http;

pub use error::SyncError;
pub use events::{EventBus, RideEvent};
pub use poll::{PollHandle, PollIntervals, QueueWatcher, RideChange, RideWatcher, spawn_poller};
pub use session::{AcceptedRide, ClientRequest, NotificationPreferences, Session, SessionStore};

#[cfg(feature = "http")]
pub use http::SupabaseClient;
