use std::process::ExitStatus;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum SetupError {
    #[error("Failed to spawn `{program}`")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Application server exited during startup ({status})\n{output}")]
    ServerExited { status: ExitStatus, output: String },
    #[error("Application server was not ready after {waited:?}\n{output}")]
    ServerNotReady { waited: Duration, output: String },
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
    #[error("Could not establish the {role} session")]
    SessionUnavailable {
        role: &'static str,
        #[source]
        source: super::SessionError,
    },
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}
