//! Opening the push connection.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future;
use futures_util::stream::{BoxStream, StreamExt};
use log::*;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{push_error, Error, ErrorKind};

/// Inbound text frames of one open connection. Ends when the server closes it.
pub type FrameStream = BoxStream<'static, Result<String, Error>>;

/// Opens one connection to the push endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<FrameStream, Error>;
}

/// WebSocket connector authenticated with the HTTP client's session cookies.
pub struct WsConnector {
    url: String,
    cookie_jar: Option<Arc<Jar>>,
}

impl WsConnector {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            cookie_jar: None,
        }
    }

    /// Shares the jar the API client stores the backend session in.
    pub fn with_cookie_jar(mut self, jar: Arc<Jar>) -> Self {
        self.cookie_jar = Some(jar);
        self
    }

    fn cookie_header(&self) -> Result<Option<HeaderValue>, Error> {
        let Some(jar) = &self.cookie_jar else {
            return Ok(None);
        };
        let cookies = jar.cookies(&http_url(&self.url)?);
        cookies
            .map(|value| {
                HeaderValue::from_bytes(value.as_bytes())
                    .map_err(|e| push_error(ErrorKind::Connect, &e.to_string()))
            })
            .transpose()
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<FrameStream, Error> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(cookies) = self.cookie_header()? {
            request.headers_mut().insert(COOKIE, cookies);
        }

        debug!("Connecting push channel to {}", self.url);
        let (stream, _) = connect_async(request).await?;

        // Pings are answered by the library while the stream is polled
        let frames = stream.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(frame)) => {
                    debug!("Push channel closed by server: {frame:?}");
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(Error::from(e))),
            })
        });
        Ok(frames.boxed())
    }
}

/// Cookie jars are keyed by HTTP URLs; maps `ws`/`wss` onto `http`/`https`.
fn http_url(ws_url: &str) -> Result<Url, Error> {
    let mut url =
        Url::parse(ws_url).map_err(|e| push_error(ErrorKind::Connect, &e.to_string()))?;
    let scheme = match url.scheme() {
        "ws" => "http",
        "wss" => "https",
        _ => return Ok(url),
    };
    url.set_scheme(scheme)
        .map_err(|_| push_error(ErrorKind::Connect, "cannot map push URL scheme"))?;
    Ok(url)
}
