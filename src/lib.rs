//! Permit client: session-aware API access, proactive refresh and push notifications.
//!
//! [`Client`] owns one of each component for a single user session and keeps the
//! background work in step with the session: signing in starts the proactive
//! refresh timer and the push channel, signing out stops both and forgets the
//! received notifications, teardown stops everything for good.

use std::sync::Arc;

use async_trait::async_trait;
use events::{Event, EventHandler, EventPublisher};
use gateway::{
    ApiClient, GatewayConfig, Navigator, ProactiveRefresh, SchedulerConfig, Session,
    SessionStatus,
};
use log::*;
use push::{Connector, PushChannel, PushConfig, WsConnector};
use secrecy::SecretString;
use service::config::Config;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

pub struct Client {
    api: Arc<ApiClient>,
    scheduler: Arc<ProactiveRefresh>,
    push: Arc<PushChannel>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Builds a client for the configured backend. Must be called inside a tokio runtime.
    pub fn new(
        config: &Config,
        navigator: Arc<dyn Navigator>,
        publisher: EventPublisher,
    ) -> Result<Self, gateway::Error> {
        let session = Arc::new(Session::new());
        let api = ApiClient::new(gateway_config(config), session, Arc::clone(&navigator))?;

        let mut connector = WsConnector::new(&config.push_url);
        if let Some(jar) = api.cookie_jar() {
            connector = connector.with_cookie_jar(jar);
        }

        Ok(Self::from_parts(
            api,
            Arc::new(connector),
            navigator,
            scheduler_config(config),
            push_config(config),
            publisher,
        ))
    }

    /// Assembles a client from an existing API client and push connector.
    pub fn from_parts(
        api: ApiClient,
        connector: Arc<dyn Connector>,
        navigator: Arc<dyn Navigator>,
        scheduler_config: SchedulerConfig,
        push_config: PushConfig,
        publisher: EventPublisher,
    ) -> Self {
        let session = api.session();
        let scheduler = Arc::new(ProactiveRefresh::new(
            api.coordinator(),
            Arc::clone(&session),
            scheduler_config,
        ));
        let push = Arc::new(PushChannel::with_publisher(
            connector,
            Arc::clone(&session),
            navigator,
            push_config,
            publisher,
        ));
        let supervisor = tokio::spawn(supervise(
            session.subscribe(),
            Arc::clone(&scheduler),
            Arc::clone(&push),
        ));

        Self {
            api: Arc::new(api),
            scheduler,
            push,
            supervisor: Mutex::new(Some(supervisor)),
        }
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn scheduler(&self) -> &Arc<ProactiveRefresh> {
        &self.scheduler
    }

    pub fn push(&self) -> &Arc<PushChannel> {
        &self.push
    }

    pub fn session(&self) -> Arc<Session> {
        self.api.session()
    }

    pub async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<(), gateway::Error> {
        self.api.login(username, password).await
    }

    pub async fn logout(&self) {
        self.api.logout().await;
    }

    /// Stops all background work. The client refuses every call afterwards.
    pub async fn teardown(&self) {
        self.api.session().tear_down().await;
        self.scheduler.stop().await;
        self.push.stop().await;
        if let Some(supervisor) = self.supervisor.lock().await.take() {
            let _ = supervisor.await;
        }
        info!("Client torn down");
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // The supervisor holds the scheduler and push channel; once it is gone
        // their own drops cancel the timer and the connection loop.
        if let Some(supervisor) = self.supervisor.get_mut().take() {
            supervisor.abort();
        }
    }
}

/// Follows session transitions until teardown.
async fn supervise(
    mut status: watch::Receiver<SessionStatus>,
    scheduler: Arc<ProactiveRefresh>,
    push: Arc<PushChannel>,
) {
    loop {
        let current = *status.borrow_and_update();
        match current {
            SessionStatus::Authenticated => {
                scheduler.start().await;
                if let Err(e) = push.start().await {
                    debug!("Push channel not started: {e}");
                }
            }
            SessionStatus::Unauthenticated => {
                scheduler.stop().await;
                push.stop().await;
                push.clear_events().await;
            }
            SessionStatus::TornDown => {
                scheduler.stop().await;
                push.stop().await;
                break;
            }
        }

        if status.changed().await.is_err() {
            break;
        }
    }
    debug!("Session supervisor finished");
}

pub fn gateway_config(config: &Config) -> GatewayConfig {
    GatewayConfig {
        base_url: config.base_url.clone(),
        refresh_path: config.refresh_path.clone(),
        csrf_path: config.csrf_path.clone(),
        login_path: config.login_path.clone(),
        logout_path: config.logout_path.clone(),
        csrf_header: config.csrf_header.clone(),
        request_timeout: config.request_timeout(),
        refresh_timeout: config.refresh_timeout(),
        ..GatewayConfig::default()
    }
}

pub fn scheduler_config(config: &Config) -> SchedulerConfig {
    SchedulerConfig {
        interval: config.proactive_refresh_interval(),
        retry_delay: config.refresh_retry_delay(),
    }
}

pub fn push_config(config: &Config) -> PushConfig {
    PushConfig {
        url: config.push_url.clone(),
        reconnect_delay: config.push_reconnect_delay(),
        max_retries: config.push_max_retries,
    }
}

/// Logs every new notification.
pub struct LogEventHandler;

#[async_trait]
impl EventHandler for LogEventHandler {
    async fn handle(&self, event: &Event) {
        match &event.link {
            Some(link) => info!("Notification {}: {} ({link})", event.id, event.message),
            None => info!("Notification {}: {}", event.id, event.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use futures_util::stream::{self, StreamExt};
    use gateway::AuthErrorKind;
    use push::{ConnectionState, FrameStream};
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    /// Connector that opens a connection, delivers `frames` and stays open.
    struct OpenConnector {
        frames: Vec<String>,
        attempts: AtomicUsize,
    }

    impl OpenConnector {
        fn new(frames: &[&str]) -> Self {
            Self {
                frames: frames.iter().map(|frame| frame.to_string()).collect(),
                attempts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Connector for OpenConnector {
        async fn connect(&self) -> Result<FrameStream, push::Error> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let frames: Vec<Result<String, push::Error>> =
                self.frames.iter().cloned().map(Ok).collect();
            Ok(stream::iter(frames).chain(stream::pending()).boxed())
        }
    }

    struct StaticNavigator {
        public: bool,
    }

    impl Navigator for StaticNavigator {
        fn is_on_public_surface(&self) -> bool {
            self.public
        }

        fn force_sign_out(&self, _reason: &str) {}
    }

    const NOTIFICATION: &str = r#"{"id": 41, "message": "Permit 41 approved",
        "is_read": false, "created_at": "2024-05-02T08:30:00Z", "link": "/permits/41"}"#;

    async fn backend() -> mockito::ServerGuard {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/auth/csrf/")
            .with_status(200)
            .with_body(r#"{"csrfToken": "tok"}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/api/auth/login/")
            .with_status(200)
            .with_header("set-cookie", "sessionid=s1; Path=/")
            .with_body("{}")
            .create_async()
            .await;
        server
            .mock("POST", "/api/auth/logout/")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        server
    }

    fn client(
        server: &mockito::ServerGuard,
        connector: Arc<OpenConnector>,
        public: bool,
    ) -> Client {
        let navigator = Arc::new(StaticNavigator { public });
        let config = GatewayConfig {
            base_url: format!("{}/api", server.url()),
            ..GatewayConfig::default()
        };
        let api = ApiClient::new(config, Arc::new(Session::new()), navigator.clone()).unwrap();
        Client::from_parts(
            api,
            connector,
            navigator,
            SchedulerConfig::default(),
            PushConfig::default(),
            EventPublisher::new().with_handler(Arc::new(LogEventHandler)),
        )
    }

    async fn wait_until<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        timeout(Duration::from_secs(5), async {
            while !check().await {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    fn password() -> SecretString {
        SecretString::new("hunter2".to_string())
    }

    #[tokio::test]
    async fn test_login_starts_refresh_timer_and_push_channel() {
        let server = backend().await;
        let connector = Arc::new(OpenConnector::new(&[NOTIFICATION]));
        let client = &client(&server, connector.clone(), false);

        client.login("inspector", &password()).await.unwrap();

        wait_until(move || async move { client.push().is_connected() }).await;
        wait_until(move || async move { client.push().unread_count().await == 1 }).await;
        assert!(client.scheduler().is_running().await);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_logout_stops_background_work_and_clears_events() {
        let server = backend().await;
        let connector = Arc::new(OpenConnector::new(&[NOTIFICATION]));
        let client = &client(&server, connector, false);

        client.login("inspector", &password()).await.unwrap();
        wait_until(move || async move { client.push().unread_count().await == 1 }).await;

        client.logout().await;

        wait_until(move || async move {
            client.push().state() == ConnectionState::Disconnected
                && !client.scheduler().is_running().await
                && client.push().events().await.is_empty()
        })
        .await;
    }

    #[tokio::test]
    async fn test_public_surface_keeps_push_channel_closed() {
        let server = backend().await;
        let connector = Arc::new(OpenConnector::new(&[]));
        let client = &client(&server, connector.clone(), true);

        client.login("inspector", &password()).await.unwrap();

        wait_until(move || async move { client.scheduler().is_running().await }).await;
        assert!(!client.push().is_connected());
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_teardown_stops_everything() {
        let server = backend().await;
        let connector = Arc::new(OpenConnector::new(&[]));
        let client = &client(&server, connector, false);

        client.login("inspector", &password()).await.unwrap();
        wait_until(move || async move { client.push().is_connected() }).await;

        client.teardown().await;

        assert!(!client.push().is_connected());
        assert!(!client.scheduler().is_running().await);
        let err = client.api().get("/permits/").await.unwrap_err();
        assert!(err.is_auth(AuthErrorKind::TornDown));
        // A second teardown is harmless
        client.teardown().await;
    }

    #[tokio::test]
    async fn test_dropping_client_ends_background_work() {
        let server = backend().await;
        let connector = Arc::new(OpenConnector::new(&[]));
        let client = client(&server, connector.clone(), false);

        client.login("inspector", &password()).await.unwrap();
        {
            let client = &client;
            wait_until(move || async move {
                client.push().is_connected() && client.scheduler().is_running().await
            })
            .await;
        }

        let coordinator = Arc::downgrade(&client.api().coordinator());
        let weak_connector = Arc::downgrade(&connector);
        drop(connector);
        drop(client);

        // The timer task holds the coordinator and the connection loop holds the connector
        wait_until(move || {
            let gone = coordinator.upgrade().is_none() && weak_connector.upgrade().is_none();
            async move { gone }
        })
        .await;
    }

    #[test]
    fn test_config_maps_onto_component_configs() {
        let config = Config::try_parse_from([
            "permit-client",
            "--base-url",
            "https://permits.example.com/api",
            "--push-url",
            "wss://permits.example.com/ws/notifications/",
            "--refresh-timeout-secs",
            "10",
            "--push-max-retries",
            "4",
        ])
        .unwrap();

        let gateway = gateway_config(&config);
        assert_eq!(gateway.base_url, "https://permits.example.com/api");
        assert_eq!(gateway.refresh_timeout, Duration::from_secs(10));
        assert_eq!(gateway.csrf_header, "X-CSRFToken");

        let scheduler = scheduler_config(&config);
        assert_eq!(scheduler.interval, Duration::from_secs(22 * 60 * 60));
        assert_eq!(scheduler.retry_delay, Duration::from_secs(60));

        let push = push_config(&config);
        assert_eq!(push.url, "wss://permits.example.com/ws/notifications/");
        assert_eq!(push.reconnect_delay, Duration::from_millis(3000));
        assert_eq!(push.max_retries, 4);
    }
}
