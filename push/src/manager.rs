//! Reconnecting push channel with bounded retry and event de-duplication.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use events::{Event, EventId, EventPublisher, EventSet};
use futures_util::StreamExt;
use gateway::{Navigator, Session};
use log::*;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::connection::{Connector, FrameStream};
use crate::error::{push_error, Error, ErrorKind};
use crate::message;

#[derive(Debug, Clone)]
pub struct PushConfig {
    /// WebSocket endpoint of the notification stream.
    pub url: String,
    /// Fixed pause between a lost connection and the next attempt.
    pub reconnect_delay: Duration,
    /// Consecutive failed or dropped connections after which the channel gives up.
    pub max_retries: u32,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws/notifications/".to_string(),
            reconnect_delay: Duration::from_millis(3000),
            max_retries: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// State shared between the channel handle and its connection task.
struct Shared {
    connector: Arc<dyn Connector>,
    session: Arc<Session>,
    config: PushConfig,
    state: watch::Sender<ConnectionState>,
    retries: AtomicU32,
    events: RwLock<EventSet>,
    publisher: EventPublisher,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the push connection for one session.
///
/// The connection loop runs on a single task: connect, read until the
/// connection drops, wait the reconnect delay, try again. It stops after
/// `max_retries` consecutive losses, when the session ends, or on [`stop`](Self::stop).
pub struct PushChannel {
    shared: Arc<Shared>,
    navigator: Arc<dyn Navigator>,
    running: Mutex<Option<Running>>,
}

impl PushChannel {
    pub fn new(
        connector: Arc<dyn Connector>,
        session: Arc<Session>,
        navigator: Arc<dyn Navigator>,
        config: PushConfig,
    ) -> Self {
        Self::with_publisher(connector, session, navigator, config, EventPublisher::new())
    }

    /// Like [`new`](Self::new), notifying `publisher`'s handlers of every new event.
    pub fn with_publisher(
        connector: Arc<dyn Connector>,
        session: Arc<Session>,
        navigator: Arc<dyn Navigator>,
        config: PushConfig,
        publisher: EventPublisher,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                connector,
                session,
                config,
                state,
                retries: AtomicU32::new(0),
                events: RwLock::new(EventSet::new()),
                publisher,
            }),
            navigator,
            running: Mutex::new(None),
        }
    }

    /// Opens the channel. A channel that gave up or was stopped starts over with a fresh retry budget.
    pub async fn start(&self) -> Result<(), Error> {
        if self.shared.session.is_torn_down() {
            return Err(push_error(ErrorKind::NotAllowed, "client was torn down"));
        }
        if !self.shared.session.is_authenticated() {
            return Err(push_error(ErrorKind::NotAllowed, "session is signed out"));
        }
        if self.navigator.is_on_public_surface() {
            return Err(push_error(ErrorKind::NotAllowed, "on a public page"));
        }

        let mut running = self.running.lock().await;
        if running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
        {
            debug!("Push channel already running");
            return Ok(());
        }

        self.shared.retries.store(0, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(Arc::clone(&self.shared), cancel.clone()));
        *running = Some(Running { cancel, handle });
        Ok(())
    }

    /// Closes the connection and cancels any scheduled retry. Idempotent.
    pub async fn stop(&self) {
        if let Some(running) = self.running.lock().await.take() {
            running.cancel.cancel();
            running.handle.abort();
            let _ = running.handle.await;
            debug!("Push channel stopped");
        }
        self.shared.state.send_replace(ConnectionState::Disconnected);
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// True only while a connection is open.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Consecutive failed or dropped connections since the last successful one.
    pub fn retries(&self) -> u32 {
        self.shared.retries.load(Ordering::SeqCst)
    }

    /// Whether the channel stopped reconnecting after too many failures.
    pub fn gave_up(&self) -> bool {
        self.retries() >= self.shared.config.max_retries
    }

    /// Snapshot of received events, newest first.
    pub async fn events(&self) -> Vec<Event> {
        self.shared.events.read().await.iter().cloned().collect()
    }

    pub async fn unread_count(&self) -> usize {
        self.shared.events.read().await.unread_count()
    }

    pub async fn mark_read(&self, id: &EventId) -> bool {
        self.shared.events.write().await.mark_read(id)
    }

    pub async fn mark_all_read(&self) -> usize {
        self.shared.events.write().await.mark_all_read()
    }

    pub async fn clear_events(&self) {
        self.shared.events.write().await.clear();
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
            running.handle.abort();
        }
    }
}

async fn run(shared: Arc<Shared>, cancel: CancellationToken) {
    let max_retries = shared.config.max_retries;
    loop {
        if cancel.is_cancelled() || !shared.session.is_authenticated() {
            debug!("Session no longer active, push channel ends");
            break;
        }

        shared.state.send_replace(ConnectionState::Connecting);
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            connected = shared.connector.connect() => connected,
        };

        match connected {
            Ok(frames) => {
                shared.retries.store(0, Ordering::SeqCst);
                shared.state.send_replace(ConnectionState::Connected);
                info!("Push channel connected");

                let closed = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    closed = shared.read(frames) => closed,
                };
                match closed {
                    Ok(()) => info!("Push channel closed"),
                    Err(e) => warn!("Push channel dropped: {e}"),
                }
            }
            Err(e) => warn!("Push channel connection failed: {e}"),
        }

        shared.state.send_replace(ConnectionState::Disconnected);
        let retries = shared.retries.fetch_add(1, Ordering::SeqCst) + 1;
        if retries >= max_retries {
            let e = push_error(
                ErrorKind::MaxRetriesExceeded,
                &format!("{retries} consecutive connection failures"),
            );
            error!("Push channel giving up: {e}");
            break;
        }

        debug!(
            "Reconnecting push channel in {:?} (attempt {} of {max_retries})",
            shared.config.reconnect_delay,
            retries + 1
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = sleep(shared.config.reconnect_delay) => {}
        }
    }
    shared.state.send_replace(ConnectionState::Disconnected);
}

impl Shared {
    /// Consumes frames until the connection ends.
    async fn read(&self, mut frames: FrameStream) -> Result<(), Error> {
        while let Some(frame) = frames.next().await {
            self.receive(&frame?).await;
        }
        Ok(())
    }

    async fn receive(&self, frame: &str) {
        let event = match message::decode(frame) {
            Ok(event) => event,
            Err(e) => {
                debug!("Dropping push frame: {e}");
                return;
            }
        };

        let inserted = self.events.write().await.insert(event.clone());
        if inserted {
            self.publisher.publish(&event).await;
        } else {
            trace!("Ignoring duplicate push event {}", event.id);
        }
    }
}
