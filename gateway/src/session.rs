//! Client-side session state.

use log::*;
use secrecy::SecretString;
use tokio::sync::{watch, RwLock};

/// Authentication status of the session, observable through [`Session::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Unauthenticated,
    Authenticated,
    /// Terminal. The owning client was torn down and no further side effects may fire.
    TornDown,
}

/// Authentication flag, anti-forgery token and teardown marker for one client.
///
/// Status changes go through a watch channel so the scheduler and push channel
/// can follow sign-in, sign-out and teardown without polling.
pub struct Session {
    status: watch::Sender<SessionStatus>,
    csrf_token: RwLock<Option<SecretString>>,
}

impl Session {
    pub fn new() -> Self {
        let (status, _) = watch::channel(SessionStatus::Unauthenticated);
        Self {
            status,
            csrf_token: RwLock::new(None),
        }
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn is_authenticated(&self) -> bool {
        self.status() == SessionStatus::Authenticated
    }

    pub fn is_torn_down(&self) -> bool {
        self.status() == SessionStatus::TornDown
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Marks the session authenticated. Returns `false` once torn down.
    pub fn sign_in(&self) -> bool {
        self.transition(SessionStatus::Authenticated)
    }

    /// Marks the session unauthenticated and forgets the anti-forgery token.
    pub async fn sign_out(&self) -> bool {
        *self.csrf_token.write().await = None;
        self.transition(SessionStatus::Unauthenticated)
    }

    pub async fn tear_down(&self) {
        *self.csrf_token.write().await = None;
        self.status.send_replace(SessionStatus::TornDown);
        debug!("Session torn down");
    }

    /// Current anti-forgery token. May be momentarily stale or absent.
    pub async fn csrf_token(&self) -> Option<SecretString> {
        self.csrf_token.read().await.clone()
    }

    pub async fn set_csrf_token(&self, token: Option<SecretString>) {
        if self.is_torn_down() {
            return;
        }
        *self.csrf_token.write().await = token;
    }

    fn transition(&self, next: SessionStatus) -> bool {
        let changed = self.status.send_if_modified(|status| {
            if *status == SessionStatus::TornDown || *status == next {
                return false;
            }
            *status = next;
            true
        });
        if changed {
            debug!("Session is now {next:?}");
        }
        !self.is_torn_down()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[tokio::test]
    async fn test_sign_in_and_out_notify_subscribers() {
        let session = Session::new();
        let mut status = session.subscribe();

        assert!(session.sign_in());
        assert!(status.has_changed().unwrap());
        assert_eq!(*status.borrow_and_update(), SessionStatus::Authenticated);

        assert!(session.sign_out().await);
        assert_eq!(*status.borrow_and_update(), SessionStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn test_sign_out_clears_token() {
        let session = Session::new();
        session.sign_in();
        session
            .set_csrf_token(Some(SecretString::new("abc".to_string())))
            .await;
        assert_eq!(
            session.csrf_token().await.unwrap().expose_secret(),
            "abc"
        );

        session.sign_out().await;

        assert!(session.csrf_token().await.is_none());
    }

    #[tokio::test]
    async fn test_torn_down_is_terminal() {
        let session = Session::new();
        session.sign_in();
        session.tear_down().await;

        assert!(!session.sign_in());
        assert!(session.is_torn_down());
        assert!(!session.is_authenticated());

        session
            .set_csrf_token(Some(SecretString::new("late".to_string())))
            .await;
        assert!(session.csrf_token().await.is_none());
    }
}
