use crate::configuration::Settings;
use crate::credentials::Credentials;
use crate::errors::SetupError;
use crate::harness::{AuthenticatedSession, Harness};
use crate::server::ServerProcess;

/// Everything the test cases share: the server, the harness and one session per role.
///
/// Built once per suite run and handed to each case explicitly.
pub struct Fixture {
    pub harness: Harness,
    pub admin: AuthenticatedSession,
    pub user: AuthenticatedSession,
    server: Option<ServerProcess>,
}

impl Fixture {
    /// Start the server (when one is configured) and log both roles in.
    #[allow(clippy::missing_errors_doc)]
    #[tracing::instrument(name = "Build fixture", skip(settings))]
    pub async fn build(settings: &Settings) -> Result<Self, SetupError> {
        let admin_credentials = Credentials::from(settings.credentials.admin.clone());
        let user_credentials = Credentials::from(settings.credentials.user.clone());
        admin_credentials.validate()?;
        user_credentials.validate()?;

        let harness = Harness::new(&settings.application)?;

        let server = match &settings.server {
            Some(server_settings) => {
                Some(ServerProcess::start(server_settings, settings.application.base_url()).await?)
            }
            None => {
                tracing::info!(
                    base_url = settings.application.base_url(),
                    "no server configured, attaching to a running application"
                );
                None
            }
        };

        // dropping `server` on the error paths kills the child
        let admin = login(&harness, &admin_credentials).await?;
        let user = login(&harness, &user_credentials).await?;

        Ok(Self {
            harness,
            admin,
            user,
            server,
        })
    }

    pub async fn teardown(self) {
        if let Some(server) = self.server {
            server.teardown().await;
        }
    }
}

async fn login(
    harness: &Harness,
    credentials: &Credentials,
) -> Result<AuthenticatedSession, SetupError> {
    harness
        .login(credentials)
        .await
        .map_err(|source| SetupError::SessionUnavailable {
            role: credentials.role(),
            source,
        })
}
