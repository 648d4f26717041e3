//! Gateway client wrapping every outbound call.

use std::sync::Arc;

use log::*;
use reqwest::cookie::Jar;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::json;

use crate::config::GatewayConfig;
use crate::error::{auth_error, AuthErrorKind, Error};
use crate::http::{
    ApiRequest, ApiResponse, Dispatcher, HttpClientBuilder, ReqwestTransport, Transport,
};
use crate::navigator::Navigator;
use crate::refresh::RefreshCoordinator;
use crate::session::Session;

/// Sends requests, renewing the session once when the backend answers 401.
///
/// A 401 parks the request behind the refresh coordinator; it is sent again
/// once the session is renewed and a second 401 is final.
pub struct ApiClient {
    config: GatewayConfig,
    session: Arc<Session>,
    dispatcher: Arc<Dispatcher>,
    coordinator: Arc<RefreshCoordinator>,
    cookie_jar: Option<Arc<Jar>>,
}

impl ApiClient {
    /// Builds a client talking to `config.base_url` over reqwest.
    pub fn new(
        config: GatewayConfig,
        session: Arc<Session>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, Error> {
        let builder = HttpClientBuilder::from_config(&config);
        let cookie_jar = builder.cookie_jar();
        let transport = Arc::new(ReqwestTransport::new(builder.build()?, &config.base_url));

        let mut client = Self::with_transport(config, transport, session, navigator);
        client.cookie_jar = Some(cookie_jar);
        Ok(client)
    }

    pub fn with_transport(
        config: GatewayConfig,
        transport: Arc<dyn Transport>,
        session: Arc<Session>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(
            transport,
            Arc::clone(&session),
            &config.csrf_header,
        ));
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&dispatcher),
            Arc::clone(&session),
            navigator,
            &config,
        ));
        Self {
            config,
            session,
            dispatcher,
            coordinator,
            cookie_jar: None,
        }
    }

    pub fn session(&self) -> Arc<Session> {
        Arc::clone(&self.session)
    }

    pub fn coordinator(&self) -> Arc<RefreshCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Cookie jar holding the backend session, when built over reqwest.
    pub fn cookie_jar(&self) -> Option<Arc<Jar>> {
        self.cookie_jar.clone()
    }

    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, Error> {
        if self.session.is_torn_down() {
            return Err(auth_error(AuthErrorKind::TornDown, "client was torn down"));
        }

        let sent_epoch = self.coordinator.epoch().await;
        let response = self.dispatcher.dispatch(&request).await?;
        if !response.is_auth_expired() {
            return Ok(response);
        }

        debug!(
            "{} {} answered 401, waiting for session refresh",
            request.method, request.path
        );
        self.coordinator.on_auth_expired(request, sent_epoch).await
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, Error> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<ApiResponse, Error> {
        self.send(ApiRequest::post(path).with_body(body)?).await
    }

    pub async fn put<T: Serialize>(&self, path: &str, body: &T) -> Result<ApiResponse, Error> {
        self.send(ApiRequest::put(path).with_body(body)?).await
    }

    pub async fn patch<T: Serialize>(&self, path: &str, body: &T) -> Result<ApiResponse, Error> {
        self.send(ApiRequest::patch(path).with_body(body)?).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, Error> {
        self.send(ApiRequest::delete(path)).await
    }

    pub async fn fetch_csrf_token(&self) -> Result<(), Error> {
        self.dispatcher.fetch_csrf_token(&self.config.csrf_path).await
    }

    /// Renews the session now, sharing any cycle already in flight.
    pub async fn refresh(&self) -> Result<(), Error> {
        self.coordinator.refresh().await
    }

    pub async fn login(&self, username: &str, password: &SecretString) -> Result<(), Error> {
        if self.session.is_torn_down() {
            return Err(auth_error(AuthErrorKind::TornDown, "client was torn down"));
        }

        // The login form itself is CSRF protected
        if let Err(e) = self.fetch_csrf_token().await {
            debug!("No anti-forgery token before login: {e}");
        }

        let request = ApiRequest::post(self.config.login_path.clone()).with_json(json!({
            "username": username,
            "password": password.expose_secret(),
        }));
        let response = self.dispatcher.dispatch(&request).await?;
        if !response.is_success() {
            warn!("Login for {username} rejected with {}", response.status);
            return Err(auth_error(
                AuthErrorKind::LoginFailed,
                &format!("login endpoint returned {}", response.status),
            ));
        }

        self.coordinator.reset().await;
        self.session.sign_in();
        if let Err(e) = self.fetch_csrf_token().await {
            warn!("Signed in but no anti-forgery token was issued: {e}");
        }
        info!("Signed in as {username}");
        Ok(())
    }

    /// Signs out locally. The backend call is best effort.
    pub async fn logout(&self) {
        if self.session.is_authenticated() {
            let request = ApiRequest::post(self.config.logout_path.clone());
            match self.dispatcher.dispatch(&request).await {
                Ok(response) if !response.is_success() => {
                    warn!("Logout endpoint returned {}", response.status)
                }
                Ok(_) => {}
                Err(e) => warn!("Logout request failed: {e}"),
            }
        }
        self.session.sign_out().await;
        self.coordinator.reset().await;
        info!("Signed out");
    }
}
