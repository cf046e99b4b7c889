use reqwest::header::{HeaderMap, HeaderName, HeaderValue, REFERER};
use std::fmt;

use crate::errors::SessionError;

pub const CSRF_COOKIE: &str = "csrftoken";
pub const CSRF_FORM_FIELD: &str = "csrfmiddlewaretoken";
pub const CSRF_HEADER: HeaderName = HeaderName::from_static("x-csrftoken");

// stands in for a missing token so the invalid-token cases can still run
const SENTINEL: &str = "BOGUSDATA";

/// Anti-forgery token scoped to one session.
#[derive(Clone, PartialEq, Eq)]
pub struct CsrfToken(String);

impl CsrfToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn sentinel() -> Self {
        Self(SENTINEL.to_string())
    }

    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.0 == SENTINEL
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `X-CSRFToken` plus the `Referer` django insists on.
    #[allow(clippy::missing_errors_doc)]
    pub fn headers(&self, referer: &str) -> Result<HeaderMap, SessionError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CSRF_HEADER,
            HeaderValue::from_str(&self.0).map_err(SessionError::InvalidHeader)?,
        );
        headers.insert(
            REFERER,
            HeaderValue::from_str(referer).map_err(SessionError::InvalidHeader)?,
        );
        Ok(headers)
    }
}

// tokens are credentials of a sort, keep them out of the logs
impl fmt::Debug for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_sentinel() {
            f.write_str("CsrfToken(sentinel)")
        } else {
            write!(f, "CsrfToken({}..)", self.0.chars().take(4).collect::<String>())
        }
    }
}

/// Pull the csrf cookie out of a `Cookie` header value (`a=b; c=d`).
#[must_use]
pub fn token_from_cookie_header(header: &str) -> Option<CsrfToken> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == CSRF_COOKIE)
        .map(|(_, value)| value.trim_matches('"'))
        .filter(|value| !value.is_empty())
        .map(CsrfToken::new)
}

/// Scan a page for the hidden `csrfmiddlewaretoken` input.
///
/// Accepts `csrfmiddlewaretoken" value="..."` with any run of quotes and
/// whitespace between the field name and `value=`.
#[must_use]
pub fn token_from_html(html: &str) -> Option<CsrfToken> {
    let mut rest = html;
    while let Some(start) = rest.find(CSRF_FORM_FIELD) {
        rest = &rest[start + CSRF_FORM_FIELD.len()..];
        let candidate = rest.trim_start_matches(|c: char| c == '"' || c.is_whitespace());
        if let Some(value) = candidate.strip_prefix("value=\"") {
            if let Some(end) = value.find('"') {
                return Some(CsrfToken::new(&value[..end]));
            }
        }
    }
    None
}
