//! Gateway configuration.

use std::time::Duration;

/// Endpoints and timeouts used by the API client and the refresh coordinator.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the REST API; request paths are appended to it.
    pub base_url: String,
    pub refresh_path: String,
    pub csrf_path: String,
    pub login_path: String,
    pub logout_path: String,
    /// Header carrying the anti-forgery token.
    pub csrf_header: String,
    /// Timeout for ordinary requests.
    pub request_timeout: Duration,
    /// Upper bound for one refresh call.
    pub refresh_timeout: Duration,
    pub user_agent: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            refresh_path: "/auth/token/refresh/".to_string(),
            csrf_path: "/auth/csrf/".to_string(),
            login_path: "/auth/login/".to_string(),
            logout_path: "/auth/logout/".to_string(),
            csrf_header: "X-CSRFToken".to_string(),
            request_timeout: Duration::from_secs(30),
            refresh_timeout: Duration::from_secs(30),
            user_agent: format!("permit-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}
