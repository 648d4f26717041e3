//! Scripted transport and navigator shared by the unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::time::{sleep, Instant};

use crate::config::GatewayConfig;
use crate::error::{http_error, Error, HttpErrorKind};
use crate::http::{ApiRequest, ApiResponse, Transport};
use crate::navigator::Navigator;

#[derive(Debug, Clone, Copy)]
pub(crate) enum RefreshOutcome {
    Ok,
    Status(u16),
    NetworkError,
    Hang,
}

/// One request as seen by the fake backend.
#[derive(Debug, Clone)]
pub(crate) struct Sent {
    pub path: String,
    pub csrf: Option<String>,
    /// Whether the fake backend considered the session valid when the request arrived.
    pub authorized: bool,
}

/// Fake backend: requests succeed once a refresh has gone through.
///
/// Authorization is decided when a request arrives, not when it is answered,
/// like a real server checking the cookie on receipt.
pub(crate) struct MockTransport {
    config: GatewayConfig,
    authorized: AtomicBool,
    refresh_delay: Duration,
    refresh_outcomes: Mutex<VecDeque<RefreshOutcome>>,
    refresh_started: Mutex<Vec<Instant>>,
    csrf_issued: AtomicUsize,
    login_status: u16,
    latency: HashMap<String, Duration>,
    statuses: HashMap<String, u16>,
    network_errors: HashSet<String>,
    always_unauthorized: HashSet<String>,
    sent: Mutex<Vec<Sent>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
            authorized: AtomicBool::new(false),
            refresh_delay: Duration::from_millis(50),
            refresh_outcomes: Mutex::new(VecDeque::new()),
            refresh_started: Mutex::new(Vec::new()),
            csrf_issued: AtomicUsize::new(0),
            login_status: 200,
            latency: HashMap::new(),
            statuses: HashMap::new(),
            network_errors: HashSet::new(),
            always_unauthorized: HashSet::new(),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn authorized(self) -> Self {
        self.authorized.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    /// Outcomes for successive refresh calls; once used up, refreshes succeed.
    pub fn with_refresh_outcomes(self, outcomes: Vec<RefreshOutcome>) -> Self {
        *self.refresh_outcomes.lock().unwrap() = outcomes.into();
        self
    }

    pub fn with_login_status(mut self, status: u16) -> Self {
        self.login_status = status;
        self
    }

    pub fn with_latency(mut self, path: &str, latency: Duration) -> Self {
        self.latency.insert(path.to_string(), latency);
        self
    }

    pub fn with_status(mut self, path: &str, status: u16) -> Self {
        self.statuses.insert(path.to_string(), status);
        self
    }

    pub fn with_network_error(mut self, path: &str) -> Self {
        self.network_errors.insert(path.to_string());
        self
    }

    pub fn always_unauthorized(mut self, path: &str) -> Self {
        self.always_unauthorized.insert(path.to_string());
        self
    }

    pub fn expire(&self) {
        self.authorized.store(false, Ordering::SeqCst);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_started.lock().unwrap().len()
    }

    pub fn refresh_started(&self) -> Vec<Instant> {
        self.refresh_started.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self, path: &str) -> usize {
        self.sent().iter().filter(|sent| sent.path == path).count()
    }

    /// Paths of requests that arrived with a valid session, in arrival order.
    pub fn authorized_paths(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|sent| sent.authorized)
            .map(|sent| sent.path)
            .collect()
    }

    async fn refresh(&self) -> Result<ApiResponse, Error> {
        self.refresh_started.lock().unwrap().push(Instant::now());
        let outcome = self
            .refresh_outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RefreshOutcome::Ok);

        sleep(self.refresh_delay).await;
        match outcome {
            RefreshOutcome::Ok => {
                self.authorized.store(true, Ordering::SeqCst);
                Ok(ApiResponse::new(StatusCode::OK, "{}"))
            }
            RefreshOutcome::Status(status) => Ok(ApiResponse::new(
                StatusCode::from_u16(status).unwrap(),
                "{}",
            )),
            RefreshOutcome::NetworkError => {
                Err(http_error(HttpErrorKind::Network, "connection refused"))
            }
            RefreshOutcome::Hang => {
                sleep(Duration::from_secs(24 * 60 * 60)).await;
                Ok(ApiResponse::new(StatusCode::OK, "{}"))
            }
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, Error> {
        if request.path == self.config.refresh_path {
            return self.refresh().await;
        }
        if request.path == self.config.csrf_path {
            let issued = self.csrf_issued.fetch_add(1, Ordering::SeqCst) + 1;
            let body = format!(r#"{{"csrfToken": "tok-{issued}"}}"#);
            return Ok(ApiResponse::new(StatusCode::OK, body));
        }
        if request.path == self.config.login_path {
            if self.login_status == 200 {
                self.authorized.store(true, Ordering::SeqCst);
            }
            return Ok(ApiResponse::new(
                StatusCode::from_u16(self.login_status).unwrap(),
                "{}",
            ));
        }
        if request.path == self.config.logout_path {
            self.authorized.store(false, Ordering::SeqCst);
            return Ok(ApiResponse::new(StatusCode::OK, "{}"));
        }

        let authorized = self.authorized.load(Ordering::SeqCst)
            && !self.always_unauthorized.contains(&request.path);
        self.sent.lock().unwrap().push(Sent {
            path: request.path.clone(),
            csrf: request.header(&self.config.csrf_header).map(str::to_string),
            authorized,
        });

        if let Some(latency) = self.latency.get(&request.path) {
            sleep(*latency).await;
        }
        if self.network_errors.contains(&request.path) {
            return Err(http_error(HttpErrorKind::Network, "connection reset"));
        }
        if let Some(status) = self.statuses.get(&request.path) {
            return Ok(ApiResponse::new(
                StatusCode::from_u16(*status).unwrap(),
                "{}",
            ));
        }
        if authorized {
            Ok(ApiResponse::new(
                StatusCode::OK,
                format!(r#"{{"path": "{}"}}"#, request.path),
            ))
        } else {
            Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, "{}"))
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingNavigator {
    pub public: AtomicBool,
    pub sign_outs: AtomicUsize,
    notices: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn is_on_public_surface(&self) -> bool {
        self.public.load(Ordering::SeqCst)
    }

    fn force_sign_out(&self, _reason: &str) {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
    }

    fn notify(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }
}
