#[derive(thiserror::Error, Debug)]
pub enum CaseError {
    #[error("{0}")]
    Assertion(String),
    #[error("Request failed")]
    Request(#[from] reqwest::Error),
    #[error(transparent)]
    Session(#[from] super::SessionError),
}

impl CaseError {
    #[must_use]
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Assertion(_) => "failed",
            Self::Request(_) | Self::Session(_) => "error",
        }
    }
}

/// Fail a case unless `condition` holds.
#[macro_export]
macro_rules! ensure_case {
    ($condition:expr, $($message:tt)+) => {
        if !$condition {
            return Err($crate::errors::CaseError::Assertion(format!($($message)+)));
        }
    };
}

// walk the source chain so the report shows the root cause too
#[must_use]
pub fn error_chain(e: &impl std::error::Error) -> String {
    let mut message = e.to_string();
    let mut current = e.source();
    while let Some(cause) = current {
        message.push_str(&format!("\nCaused by:\n\t{cause}"));
        current = cause.source();
    }
    message
}
