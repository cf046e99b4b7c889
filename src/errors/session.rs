#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("No csrf token found on {page}")]
    TokenNotFound { page: String },
    #[error("Login was rejected for {username} (status {status})")]
    LoginFailure { username: String, status: u16 },
    #[error("Csrf token cannot be sent as a header")]
    InvalidHeader(#[source] reqwest::header::InvalidHeaderValue),
    #[error(transparent)]
    Request(#[from] reqwest::Error),
}
