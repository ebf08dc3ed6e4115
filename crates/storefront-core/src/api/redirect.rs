use tracing::warn;

/// Sends the user back to the login entry point after the session could not
/// be renewed.
pub trait LoginRedirect: Send + Sync {
    fn redirect_to_login(&self);
}

/// Redirect that only records the forced logout in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRedirect;

impl LoginRedirect for LogRedirect {
    fn redirect_to_login(&self) {
        warn!("Session expired, login required");
    }
}
