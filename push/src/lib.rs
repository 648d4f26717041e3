//! Real-time notification channel.
//!
//! Keeps one WebSocket connection to the backend's notification endpoint open
//! while the user is signed in, and collects the events it delivers.
//!
//! # Lifecycle
//!
//! - **Start**: only for an authenticated session that is not on a public page.
//! - **Reconnect**: after a failed or dropped connection the channel waits a
//!   fixed delay and tries again, up to `max_retries` consecutive losses. A
//!   successful connection resets the count.
//! - **Stop**: on logout or teardown the connection is closed and any pending
//!   retry is cancelled before `stop` returns.
//!
//! # Events
//!
//! Inbound frames are JSON notifications. Frames that don't parse are dropped.
//! Each event id is kept once, newest first; new events are passed to the
//! handlers of the [`events::EventPublisher`] the channel was built with.
//!
//! # Modules
//!
//! - `connection`: the `Connector` seam and the cookie-authenticated WebSocket connector
//! - `manager`: `PushChannel`, the reconnect state machine and the event set
//! - `message`: frame decoding

pub mod connection;
pub mod error;
pub mod manager;
pub mod message;

pub use connection::{Connector, FrameStream, WsConnector};
pub use error::{Error, ErrorKind};
pub use manager::{ConnectionState, PushChannel, PushConfig};
