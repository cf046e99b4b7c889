use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, Url};
use std::sync::Arc;
use std::time::Duration;

use crate::csrf::{CsrfToken, token_from_cookie_header};

/// Lifecycle of a role's session. Only ever moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Anonymous,
    TokenAcquired,
    Authenticated,
    TokenRefreshed,
}

/// Cookie-holding client for one role.
pub struct HttpSession {
    client: Client,
    jar: Arc<Jar>,
    state: SessionState,
    label: &'static str,
}

impl HttpSession {
    #[allow(clippy::missing_errors_doc)]
    pub fn new(label: &'static str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            jar,
            state: SessionState::Anonymous,
            label,
        })
    }

    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.label
    }

    /// Move to `next` unless the session is already past it.
    pub fn advance(&mut self, next: SessionState) {
        if next > self.state {
            tracing::debug!(session = self.label, from = ?self.state, to = ?next, "session advanced");
            self.state = next;
        }
    }

    /// The csrf cookie the jar would send to `url`, if any.
    #[must_use]
    pub fn csrf_cookie(&self, url: &Url) -> Option<CsrfToken> {
        let header = self.jar.cookies(url)?;
        header.to_str().ok().and_then(token_from_cookie_header)
    }
}
