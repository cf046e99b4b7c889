use std::time::Instant;

use crate::ensure_case;
use crate::errors::{CaseError, error_chain};
use crate::fixture::Fixture;
use crate::harness::PostFields;
use crate::report::{Results, Status, TestResult};

const SUCCESS: std::ops::Range<u16> = 200..203;
const UNAUTHORIZED: u16 = 401;

/// Checks against the application's post endpoint. Only numbered cases carry points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Case {
    CreatePostAdminSuccess,
    CreatePostNotLoggedIn,
    CreatePostStaleToken,
}

impl Case {
    pub const ALL: [Self; 3] = [
        Self::CreatePostAdminSuccess,
        Self::CreatePostNotLoggedIn,
        Self::CreatePostStaleToken,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CreatePostAdminSuccess => "create_post_admin_success",
            Self::CreatePostNotLoggedIn => "create_post_notloggedin",
            Self::CreatePostStaleToken => "create_post_stale_token",
        }
    }

    #[must_use]
    pub const fn number(self) -> Option<&'static str> {
        match self {
            Self::CreatePostNotLoggedIn => Some("10.1"),
            Self::CreatePostAdminSuccess | Self::CreatePostStaleToken => None,
        }
    }

    /// `None` for cases that report pass/fail without scoring.
    #[must_use]
    pub const fn weight(self) -> Option<f64> {
        match self {
            Self::CreatePostNotLoggedIn => Some(0.5),
            Self::CreatePostAdminSuccess | Self::CreatePostStaleToken => None,
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::CreatePostAdminSuccess => "Logged-in admin can POST to /app/createPost",
            Self::CreatePostNotLoggedIn => "Unauthenticated POST to /app/createPost returns 401",
            Self::CreatePostStaleToken => "Pre-login csrf token is rejected after login",
        }
    }

    #[allow(clippy::missing_errors_doc)]
    pub async fn run(self, fixture: &mut Fixture) -> Result<(), CaseError> {
        match self {
            Self::CreatePostAdminSuccess => create_post_admin_success(fixture).await,
            Self::CreatePostNotLoggedIn => create_post_notloggedin(fixture).await,
            Self::CreatePostStaleToken => create_post_stale_token(fixture).await,
        }
    }
}

async fn create_post_admin_success(fixture: &mut Fixture) -> Result<(), CaseError> {
    let post = PostFields::new("Fuzzy bunnies are great", "I think so");

    let token = fixture
        .harness
        .refresh_csrf(&mut fixture.admin.session)
        .await?;
    let response = fixture
        .harness
        .create_post(&fixture.admin.session, &token, &post)
        .await?;

    let status = response.status().as_u16();
    let content = response.text().await?;
    ensure_case!(
        SUCCESS.contains(&status),
        "Server returns error for POST to {} Data:{post:?} Status:{status} Content:{content}",
        fixture.harness.endpoints().create_post
    );
    Ok(())
}

async fn create_post_notloggedin(fixture: &mut Fixture) -> Result<(), CaseError> {
    let post = PostFields::new("I like fuzzy bunnies 10.0", "I like fuzzy bunnies.  Do you?");

    let (session, token) = fixture.harness.acquire_anonymous_csrf("anonymous").await?;
    let response = fixture.harness.create_post(&session, &token, &post).await?;

    let status = response.status().as_u16();
    ensure_case!(
        status == UNAUTHORIZED,
        "Server should return 401 for unauthenticated POST to {} Data:{post:?} Status:{status}",
        fixture.harness.endpoints().create_post
    );
    Ok(())
}

async fn create_post_stale_token(fixture: &mut Fixture) -> Result<(), CaseError> {
    ensure_case!(
        fixture.admin.logged_in,
        "Admin login failed, so the pre-login token cannot be checked"
    );
    let post = PostFields::new("Stale token post", "Posted with the login page token");

    let stale = fixture.admin.token.clone();
    let response = fixture
        .harness
        .create_post(&fixture.admin.session, &stale, &post)
        .await?;

    let status = response.status().as_u16();
    ensure_case!(
        !SUCCESS.contains(&status),
        "Server accepted a POST to {} carrying the pre-login csrf token (status {status})",
        fixture.harness.endpoints().create_post
    );
    Ok(())
}

/// Runs cases one after another against a shared fixture.
pub struct Suite {
    cases: Vec<Case>,
}

impl Default for Suite {
    fn default() -> Self {
        Self::new(Case::ALL.to_vec())
    }
}

impl Suite {
    #[must_use]
    pub const fn new(cases: Vec<Case>) -> Self {
        Self { cases }
    }

    /// Every case runs; a failure is recorded and the next case starts.
    ///
    /// `started` is when the whole run began, server start and login included.
    #[tracing::instrument(name = "Run suite", skip_all, fields(cases = self.cases.len()))]
    pub async fn run(&self, fixture: &mut Fixture, started: Instant) -> Results {
        let mut tests = Vec::with_capacity(self.cases.len());

        for case in &self.cases {
            let outcome = case.run(fixture).await;
            tests.push(record(*case, outcome));
        }

        Results::from_tests(tests, started.elapsed())
    }
}

fn record(case: Case, outcome: Result<(), CaseError>) -> TestResult {
    let (status, score, output) = match outcome {
        Ok(()) => {
            tracing::info!(case = case.name(), "passed");
            (Status::Passed, case.weight(), case.description().to_string())
        }
        Err(e) => {
            tracing::error!(
                case = case.name(),
                kind = e.status(),
                error.cause_chain = ?e,
                error.message = %e,
                "failed"
            );
            (
                Status::Failed,
                case.weight().map(|_| 0.0),
                format!("{}\n{}", case.description(), error_chain(&e)),
            )
        }
    };

    TestResult {
        name: case.name().to_string(),
        number: case.number().map(str::to_string),
        score,
        max_score: case.weight(),
        status,
        output,
    }
}
