//! # gateway
//!
//! Authenticated access to the permit backend:
//! - Session state (signed in/out, anti-forgery token, teardown)
//! - API client that attaches the anti-forgery token and handles 401s
//! - Single-flight refresh coordinator with a FIFO replay queue
//! - Proactive refresh scheduler that renews the session ahead of expiry
//! - Navigator seam for forced sign-out and user notices
//!
//! ## Architecture
//!
//! Every request goes through [`ApiClient::send`]. A 401 parks the request on
//! the [`RefreshCoordinator`], which runs at most one refresh at a time and
//! replays parked requests in arrival order once the session is renewed. The
//! [`ProactiveRefresh`] timer calls into the same coordinator, so a scheduled
//! refresh and a burst of expired requests never overlap.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gateway::{ApiClient, GatewayConfig, LogNavigator, Session};
//!
//! let session = Arc::new(Session::new());
//! let client = ApiClient::new(GatewayConfig::default(), session, Arc::new(LogNavigator))?;
//! client.login("inspector", &password).await?;
//! let permits = client.get("/permits/").await?;
//! ```

pub mod api_client;
pub mod config;
pub mod error;
pub mod http;
pub mod navigator;
pub mod refresh;
pub mod session;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use api_client::ApiClient;
pub use config::GatewayConfig;
pub use error::{AuthErrorKind, Error, ErrorKind, HttpErrorKind};
pub use navigator::{LogNavigator, Navigator};
pub use refresh::{ProactiveRefresh, RefreshCoordinator, RefreshState, SchedulerConfig};
pub use session::{Session, SessionStatus};
