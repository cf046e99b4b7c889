use anyhow::Context;
use reqwest::header::HeaderMap;
use reqwest::{Client, Response, Url};
use std::time::Duration;

use crate::configuration::ApplicationSettings;
use crate::credentials::Credentials;
use crate::csrf::{CsrfToken, token_from_html};
use crate::errors::{SessionError, SetupError};
use crate::session::{HttpSession, SessionState};

// django re-renders the login form with this message on bad credentials
const LOGIN_FAILED_MARKER: &str = "Please enter a correct username";

/// Absolute urls of every endpoint the suite touches.
#[derive(Clone, Debug)]
pub struct Endpoints {
    pub login: Url,
    pub create_user: Url,
    pub new_post: Url,
    pub create_post: Url,
}

impl Endpoints {
    #[allow(clippy::missing_errors_doc)]
    pub fn new(base_url: &str) -> Result<Self, anyhow::Error> {
        let endpoint = |path: &str| {
            Url::parse(&format!("{base_url}{path}"))
                .with_context(|| format!("Invalid application url {base_url}{path}"))
        };
        Ok(Self {
            login: endpoint("/accounts/login/")?,
            create_user: endpoint("/app/createUser")?,
            new_post: endpoint("/app/new")?,
            create_post: endpoint("/app/createPost")?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct PostFields {
    pub title: String,
    pub content: String,
}

impl PostFields {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

#[derive(serde::Serialize)]
struct CreatePostForm<'a> {
    title: &'a str,
    content: &'a str,
    csrfmiddlewaretoken: &'a str,
}

/// A role's session after the login handshake, successful or not.
pub struct AuthenticatedSession {
    pub session: HttpSession,
    pub headers: HeaderMap,
    // the pre-login token; not valid for state changes once logged in
    pub token: CsrfToken,
    pub logged_in: bool,
}

/// Issues the requests of the csrf handshake against the application.
pub struct Harness {
    endpoints: Endpoints,
    timeout: Duration,
    // cookie-less client for calls that need no session
    plain: Client,
}

impl Harness {
    #[allow(clippy::missing_errors_doc)]
    pub fn new(settings: &ApplicationSettings) -> Result<Self, SetupError> {
        let endpoints = Endpoints::new(settings.base_url())?;
        let plain = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .context("Failed to build http client")?;

        Ok(Self {
            endpoints,
            timeout: settings.request_timeout(),
            plain,
        })
    }

    #[must_use]
    pub const fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn new_session(&self, label: &'static str) -> Result<HttpSession, SessionError> {
        Ok(HttpSession::new(label, self.timeout)?)
    }

    /// Fresh session plus the token the login page hands out.
    #[allow(clippy::missing_errors_doc)]
    #[tracing::instrument(name = "Acquire anonymous csrf token", skip(self))]
    pub async fn acquire_anonymous_csrf(
        &self,
        label: &'static str,
    ) -> Result<(HttpSession, CsrfToken), SessionError> {
        let mut session = self.new_session(label)?;
        let response = session
            .client()
            .get(self.endpoints.login.clone())
            .send()
            .await?;
        let token = extract_token(&session, &self.endpoints.login, response).await?;
        if !token.is_sentinel() {
            session.advance(SessionState::TokenAcquired);
        }
        Ok((session, token))
    }

    /// Register the account. Any failure, "already exists" included, is only logged.
    #[tracing::instrument(
        name = "Create user",
        skip(self, credentials),
        fields(user_name = %credentials.user_name, role = credentials.role())
    )]
    pub async fn create_user(&self, credentials: &Credentials) {
        let outcome = self
            .plain
            .post(self.endpoints.create_user.clone())
            .form(&credentials.create_user_form())
            .send()
            .await;

        match outcome {
            Ok(response) => {
                tracing::info!(status = response.status().as_u16(), "createUser responded");
            }
            Err(e) => {
                tracing::warn!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    "createUser failed, continuing"
                );
            }
        }
    }

    /// Create the account, then log in through the csrf-protected form.
    ///
    /// A rejected login is logged and reported through `logged_in`; only
    /// transport errors are returned.
    #[allow(clippy::missing_errors_doc)]
    #[tracing::instrument(
        name = "Log in",
        skip(self, credentials),
        fields(user_name = %credentials.user_name, role = credentials.role())
    )]
    pub async fn login(
        &self,
        credentials: &Credentials,
    ) -> Result<AuthenticatedSession, SessionError> {
        self.create_user(credentials).await;

        let (mut session, token) = self.acquire_anonymous_csrf(credentials.role()).await?;
        let headers = token.headers(self.endpoints.login.as_str())?;

        let response = session
            .client()
            .post(self.endpoints.login.clone())
            .form(&credentials.login_form(token.as_str()))
            .headers(headers.clone())
            .send()
            .await?;
        let status = response.status();
        let redirected = response.url().path() != self.endpoints.login.path();
        let body = response.text().await?;

        let logged_in = !body.contains(LOGIN_FAILED_MARKER) && (redirected || status.is_success());
        if logged_in {
            session.advance(SessionState::Authenticated);
            tracing::info!(status = status.as_u16(), "login succeeded");
        } else {
            let e = SessionError::LoginFailure {
                username: credentials.user_name.clone(),
                status: status.as_u16(),
            };
            tracing::warn!(error.message = %e, response.body = %body, "login failed");
        }

        Ok(AuthenticatedSession {
            session,
            headers,
            token,
            logged_in,
        })
    }

    /// Re-read the token from an authenticated page; the pre-login one is stale.
    #[allow(clippy::missing_errors_doc)]
    #[tracing::instrument(name = "Refresh csrf token", skip(self, session), fields(session = session.label()))]
    pub async fn refresh_csrf(&self, session: &mut HttpSession) -> Result<CsrfToken, SessionError> {
        let response = session
            .client()
            .get(self.endpoints.new_post.clone())
            .send()
            .await?;
        let token = extract_token(session, &self.endpoints.new_post, response).await?;
        if !token.is_sentinel() && session.state() >= SessionState::Authenticated {
            session.advance(SessionState::TokenRefreshed);
        }
        Ok(token)
    }

    /// Submit a post with the token as both form field and header.
    #[allow(clippy::missing_errors_doc)]
    #[tracing::instrument(
        name = "Create post",
        skip(self, session, token),
        fields(session = session.label())
    )]
    pub async fn create_post(
        &self,
        session: &HttpSession,
        token: &CsrfToken,
        post: &PostFields,
    ) -> Result<Response, SessionError> {
        let form = CreatePostForm {
            title: &post.title,
            content: &post.content,
            csrfmiddlewaretoken: token.as_str(),
        };
        let response = session
            .client()
            .post(self.endpoints.create_post.clone())
            .form(&form)
            .headers(token.headers(self.endpoints.new_post.as_str())?)
            .send()
            .await?;
        tracing::info!(status = response.status().as_u16(), "createPost responded");
        Ok(response)
    }
}

// cookie first, then the hidden form field, then the sentinel
async fn extract_token(
    session: &HttpSession,
    page: &Url,
    response: Response,
) -> Result<CsrfToken, SessionError> {
    if let Some(token) = session.csrf_cookie(page) {
        return Ok(token);
    }

    let body = response.text().await?;
    if let Some(token) = token_from_html(&body) {
        tracing::debug!(session = session.label(), "csrf token read from page body");
        return Ok(token);
    }

    let e = SessionError::TokenNotFound {
        page: page.to_string(),
    };
    tracing::warn!(session = session.label(), error.message = %e, "using sentinel csrf token");
    Ok(CsrfToken::sentinel())
}
