//! HTTP client builder sharing one cookie jar with the push channel.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;

use crate::config::GatewayConfig;
use crate::error::Error;

/// Builder for the reqwest client behind [`super::ReqwestTransport`].
///
/// The backend keeps its session in cookies, so the client always gets a cookie
/// jar. Pass an existing jar to share it with another connection (the push
/// channel reads it for its upgrade request).
pub struct HttpClientBuilder {
    timeout: Duration,
    user_agent: String,
    jar: Arc<Jar>,
}

impl HttpClientBuilder {
    pub fn new() -> Self {
        let defaults = GatewayConfig::default();
        Self {
            timeout: defaults.request_timeout,
            user_agent: defaults.user_agent,
            jar: Arc::new(Jar::default()),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new()
            .with_timeout(config.request_timeout)
            .with_user_agent(config.user_agent.clone())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_cookie_jar(mut self, jar: Arc<Jar>) -> Self {
        self.jar = jar;
        self
    }

    pub fn cookie_jar(&self) -> Arc<Jar> {
        Arc::clone(&self.jar)
    }

    pub fn build(self) -> Result<reqwest::Client, Error> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent)
            .cookie_provider(self.jar)
            .build()?;
        Ok(client)
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
