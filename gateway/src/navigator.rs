//! Seam between the coordination layer and the UI shell.

use log::*;

/// Navigation and toast surface of the host application.
///
/// The refresh coordinator uses it to force a sign-out when the session can no
/// longer be renewed; the push channel uses it to stay off public pages.
pub trait Navigator: Send + Sync {
    /// True while the user is on the login page or another unauthenticated surface.
    fn is_on_public_surface(&self) -> bool;

    /// Navigate to the sign-in page.
    fn force_sign_out(&self, reason: &str);

    /// Show a transient user-visible message.
    fn notify(&self, _message: &str) {}
}

/// Navigator for headless use: logs instead of navigating.
#[derive(Debug, Default)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn is_on_public_surface(&self) -> bool {
        false
    }

    fn force_sign_out(&self, reason: &str) {
        warn!("Signed out: {reason}");
    }

    fn notify(&self, message: &str) {
        info!("{message}");
    }
}
