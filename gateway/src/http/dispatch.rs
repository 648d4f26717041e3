use std::sync::Arc;

use log::*;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{ApiRequest, ApiResponse, Transport};
use crate::error::{http_error, Error, HttpErrorKind};
use crate::session::Session;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CsrfResponse {
    csrf_token: String,
}

/// Sends requests with the current anti-forgery token attached.
///
/// Shared by the API client (first attempt) and the refresh coordinator
/// (refresh call and replays), so both paths attach headers the same way.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    session: Arc<Session>,
    csrf_header: String,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, session: Arc<Session>, csrf_header: &str) -> Self {
        Self {
            transport,
            session,
            csrf_header: csrf_header.to_string(),
        }
    }

    pub async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse, Error> {
        let mut outgoing = request.clone();
        if let Some(token) = self.session.csrf_token().await {
            outgoing
                .headers
                .retain(|(name, _)| !name.eq_ignore_ascii_case(&self.csrf_header));
            outgoing
                .headers
                .push((self.csrf_header.clone(), token.expose_secret().clone()));
        }
        trace!("{} {}", outgoing.method, outgoing.path);
        self.transport.execute(outgoing).await
    }

    /// Fetches `{csrfToken}` from `path` and stores it in the session.
    pub async fn fetch_csrf_token(&self, path: &str) -> Result<(), Error> {
        let response = self.dispatch(&ApiRequest::get(path)).await?;
        if !response.is_success() {
            return Err(http_error(
                HttpErrorKind::Decode,
                &format!("CSRF endpoint returned {}", response.status),
            ));
        }
        let body: CsrfResponse = response.json()?;
        self.session
            .set_csrf_token(Some(SecretString::new(body.csrf_token)))
            .await;
        debug!("Anti-forgery token updated");
        Ok(())
    }
}
