//! HTTP plumbing: client building, transport seam and token-attaching dispatch.

mod client;
mod dispatch;
mod transport;

pub use client::HttpClientBuilder;
pub use dispatch::Dispatcher;
pub use transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport};
