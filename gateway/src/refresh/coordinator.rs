//! Single-flight session refresh with a FIFO replay queue.

use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use log::*;
use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;

use crate::config::GatewayConfig;
use crate::error::{auth_error, http_error, refresh_failed, AuthErrorKind, Error, HttpErrorKind};
use crate::http::{ApiRequest, ApiResponse, Dispatcher};
use crate::navigator::Navigator;
use crate::session::Session;

/// Lifecycle of the current refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    InFlight,
    /// The backend refused to renew the session. Only login/logout leave this state.
    Failed,
}

/// A request parked until the refresh cycle settles. Its responder is consumed exactly once.
struct PendingRequest {
    request: ApiRequest,
    respond: oneshot::Sender<Result<ApiResponse, Error>>,
}

struct Cycle {
    state: RefreshState,
    /// Bumped after every successful refresh.
    epoch: u64,
    /// Bumped on login and logout. A cycle only settles the generation it started in.
    generation: u64,
    /// The refresh call succeeded and parked requests are being replayed.
    draining: bool,
    queue: VecDeque<PendingRequest>,
    /// Callers of [`RefreshCoordinator::refresh`] that only want the outcome.
    waiters: Vec<oneshot::Sender<Result<(), Error>>>,
}

enum Parked {
    Waiting(oneshot::Receiver<Result<ApiResponse, Error>>),
    Replay(ApiRequest),
}

/// Why a refresh call did not succeed.
enum Failure {
    /// The backend answered and refused. The session is gone.
    Rejected(Error),
    /// The backend could not be reached in time. The session may still be valid.
    Unreachable(Error),
}

/// Coordinates session refreshes for one client.
///
/// The first caller that sees Idle starts the cycle; everyone arriving while it is
/// in flight queues behind it. The cycle runs on its own task so that a caller
/// dropping its future cannot leave the state stuck at InFlight.
pub struct RefreshCoordinator {
    dispatcher: Arc<Dispatcher>,
    session: Arc<Session>,
    navigator: Arc<dyn Navigator>,
    refresh_path: String,
    csrf_path: String,
    refresh_timeout: Duration,
    cycle: Mutex<Cycle>,
}

impl RefreshCoordinator {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        session: Arc<Session>,
        navigator: Arc<dyn Navigator>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            dispatcher,
            session,
            navigator,
            refresh_path: config.refresh_path.clone(),
            csrf_path: config.csrf_path.clone(),
            refresh_timeout: config.refresh_timeout,
            cycle: Mutex::new(Cycle {
                state: RefreshState::Idle,
                epoch: 0,
                generation: 0,
                draining: false,
                queue: VecDeque::new(),
                waiters: Vec::new(),
            }),
        }
    }

    pub async fn state(&self) -> RefreshState {
        self.cycle.lock().await.state
    }

    pub async fn epoch(&self) -> u64 {
        self.cycle.lock().await.epoch
    }

    /// Renews the session, joining a cycle that is already in flight.
    pub async fn refresh(self: &Arc<Self>) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        {
            let mut cycle = self.cycle.lock().await;
            let state = cycle.state;
            match state {
                RefreshState::Failed => {
                    return Err(auth_error(
                        AuthErrorKind::RefreshFailed,
                        "session could not be renewed",
                    ))
                }
                // Already renewed; only the replays are still running
                RefreshState::InFlight if cycle.draining => return Ok(()),
                RefreshState::InFlight => cycle.waiters.push(tx),
                RefreshState::Idle => {
                    cycle.state = RefreshState::InFlight;
                    cycle.waiters.push(tx);
                    self.spawn_cycle(cycle.generation);
                }
            }
        }
        rx.await.unwrap_or_else(|_| Err(cycle_dropped()))
    }

    /// Parks a request that got 401 and resolves it once the session is renewed.
    ///
    /// `sent_epoch` is the epoch observed before the request went out. If a refresh
    /// completed since then, the request is replayed directly.
    pub(crate) async fn on_auth_expired(
        self: &Arc<Self>,
        request: ApiRequest,
        sent_epoch: u64,
    ) -> Result<ApiResponse, Error> {
        if self.session.is_torn_down() {
            return Err(torn_down());
        }

        let parked = {
            let mut cycle = self.cycle.lock().await;
            let state = cycle.state;
            let renewed_since_sent = cycle.epoch != sent_epoch;
            match state {
                RefreshState::Failed => {
                    return Err(auth_error(
                        AuthErrorKind::RefreshFailed,
                        "session could not be renewed",
                    ))
                }
                // Nothing to renew; the refresh endpoint would only answer 401 too
                _ if !self.session.is_authenticated() => {
                    return Err(auth_error(AuthErrorKind::Expired, "not signed in"))
                }
                RefreshState::Idle if renewed_since_sent => Parked::Replay(request),
                RefreshState::InFlight if cycle.draining && renewed_since_sent => {
                    Parked::Replay(request)
                }
                RefreshState::InFlight => {
                    let (respond, rx) = oneshot::channel();
                    cycle.queue.push_back(PendingRequest { request, respond });
                    Parked::Waiting(rx)
                }
                RefreshState::Idle => {
                    let (respond, rx) = oneshot::channel();
                    cycle.queue.push_back(PendingRequest { request, respond });
                    cycle.state = RefreshState::InFlight;
                    self.spawn_cycle(cycle.generation);
                    Parked::Waiting(rx)
                }
            }
        };

        match parked {
            Parked::Waiting(rx) => rx.await.unwrap_or_else(|_| Err(cycle_dropped())),
            Parked::Replay(request) => {
                debug!(
                    "Session renewed while {} {} was in flight, replaying",
                    request.method, request.path
                );
                self.replay(&request).await
            }
        }
    }

    /// Starts a new generation at Idle. Called on login and logout.
    ///
    /// A cycle still running for the previous session can no longer touch the
    /// state or the session; whatever it had parked is rejected here.
    pub async fn reset(&self) {
        let (queue, waiters) = {
            let mut cycle = self.cycle.lock().await;
            cycle.generation += 1;
            if cycle.state != RefreshState::Idle {
                debug!("Refresh state reset from {:?}", cycle.state);
            }
            cycle.state = RefreshState::Idle;
            cycle.draining = false;
            (mem::take(&mut cycle.queue), mem::take(&mut cycle.waiters))
        };

        if !queue.is_empty() {
            debug!(
                "Rejecting {} request(s) parked before the session changed",
                queue.len()
            );
        }
        for pending in queue {
            let _ = pending.respond.send(Err(session_changed()));
        }
        for waiter in waiters {
            let _ = waiter.send(Err(session_changed()));
        }
    }

    fn spawn_cycle(self: &Arc<Self>, generation: u64) {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_cycle(generation).await });
    }

    async fn run_cycle(&self, generation: u64) {
        match self.call_refresh().await {
            Ok(()) => self.settle_success(generation).await,
            Err(failure) => self.settle_failure(generation, failure).await,
        }
    }

    async fn call_refresh(&self) -> Result<(), Failure> {
        info!("Refreshing session");
        let request = ApiRequest::post(self.refresh_path.clone());

        let response = match timeout(self.refresh_timeout, self.dispatcher.dispatch(&request)).await
        {
            Err(_) => {
                return Err(Failure::Unreachable(http_error(
                    HttpErrorKind::Network,
                    &format!("session refresh timed out after {:?}", self.refresh_timeout),
                )))
            }
            Ok(Err(e)) => return Err(Failure::Unreachable(e)),
            Ok(Ok(response)) => response,
        };

        if !response.is_success() {
            return Err(Failure::Rejected(auth_error(
                AuthErrorKind::RefreshFailed,
                &format!("refresh endpoint returned {}", response.status),
            )));
        }

        if let Err(e) = self.dispatcher.fetch_csrf_token(&self.csrf_path).await {
            warn!("Session refreshed but the anti-forgery token was not updated: {e}");
        }
        Ok(())
    }

    async fn settle_success(&self, generation: u64) {
        let waiters = {
            let mut cycle = self.cycle.lock().await;
            if cycle.generation != generation {
                debug!("Session changed while refreshing, discarding the renewal");
                return;
            }
            cycle.epoch += 1;
            cycle.draining = true;
            mem::take(&mut cycle.waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(Ok(()));
        }

        // Replays of a batch go out in the order the 401s arrived and each caller
        // is answered as soon as its own replay finishes. Requests that 401 while
        // a batch is running join the next one.
        let mut replayed = 0;
        loop {
            let batch = {
                let mut cycle = self.cycle.lock().await;
                if cycle.generation != generation {
                    return;
                }
                let batch = mem::take(&mut cycle.queue);
                if batch.is_empty() {
                    cycle.state = RefreshState::Idle;
                    cycle.draining = false;
                }
                batch
            };
            if batch.is_empty() {
                break;
            }
            replayed += batch.len();
            join_all(batch.into_iter().map(|pending| self.answer(pending))).await;
        }
        info!("Session refreshed, replayed {replayed} request(s)");
    }

    async fn answer(&self, pending: PendingRequest) {
        let result = self.replay(&pending.request).await;
        if pending.respond.send(result).is_err() {
            debug!(
                "Caller of {} went away before replay finished",
                pending.request.path
            );
        }
    }

    async fn settle_failure(&self, generation: u64, failure: Failure) {
        let (cause, rejected) = match failure {
            Failure::Rejected(cause) => (cause, true),
            Failure::Unreachable(cause) => (cause, false),
        };

        let (queue, waiters) = {
            let mut cycle = self.cycle.lock().await;
            if cycle.generation != generation {
                // The old session's requests were already rejected by reset
                debug!("Session changed while refreshing, ignoring failure: {cause}");
                return;
            }
            cycle.state = if rejected {
                RefreshState::Failed
            } else {
                RefreshState::Idle
            };
            (mem::take(&mut cycle.queue), mem::take(&mut cycle.waiters))
        };

        warn!(
            "Session refresh failed: {cause}; rejecting {} queued request(s)",
            queue.len()
        );
        for pending in queue {
            let _ = pending.respond.send(Err(refresh_failed(&cause)));
        }
        for waiter in waiters {
            let _ = waiter.send(Err(refresh_failed(&cause)));
        }

        if rejected {
            self.expire_session(&cause).await;
        }
    }

    /// Signs the session out and redirects once, unless already on a public page.
    async fn expire_session(&self, cause: &Error) {
        if self.session.is_torn_down() {
            return;
        }
        self.session.sign_out().await;

        if self.navigator.is_on_public_surface() {
            debug!("Session expired on a public page, not redirecting");
            return;
        }
        self.navigator
            .notify("Your session has expired. Please sign in again.");
        self.navigator.force_sign_out(&cause.to_string());
    }

    /// Second and final send of a request. Another 401 is terminal.
    async fn replay(&self, request: &ApiRequest) -> Result<ApiResponse, Error> {
        if self.session.is_torn_down() {
            return Err(torn_down());
        }
        let response = self.dispatcher.dispatch(request).await?;
        if response.is_auth_expired() {
            warn!(
                "{} {} rejected again after session refresh",
                request.method, request.path
            );
            return Err(auth_error(
                AuthErrorKind::Expired,
                &format!("{} {} rejected after session refresh", request.method, request.path),
            ));
        }
        Ok(response)
    }
}

fn cycle_dropped() -> Error {
    auth_error(
        AuthErrorKind::RefreshFailed,
        "refresh cycle ended without an outcome",
    )
}

fn session_changed() -> Error {
    auth_error(
        AuthErrorKind::RefreshFailed,
        "session changed while the refresh was in flight",
    )
}

fn torn_down() -> Error {
    auth_error(AuthErrorKind::TornDown, "client was torn down")
}
