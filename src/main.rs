use std::process::ExitCode;
use std::time::Instant;

use csrf_autograder::{
    configuration::{default_results_path, get_configuration},
    fixture::Fixture,
    report::Results,
    suite::Suite,
    telemetry::{get_subscriber, init_subscriber},
};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let subscriber = get_subscriber("csrf_autograder".into(), "info".into(), std::io::stdout);
    init_subscriber(subscriber);

    let start = Instant::now();
    let configuration = match get_configuration() {
        Ok(configuration) => configuration,
        Err(e) => {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "failed to read configuration, aborting suite"
            );
            Results::setup_failure(&e, start.elapsed())
                .write(&default_results_path())
                .await?;
            return Ok(ExitCode::FAILURE);
        }
    };

    let results = match Fixture::build(&configuration).await {
        Ok(mut fixture) => {
            let results = Suite::default().run(&mut fixture, start).await;
            fixture.teardown().await;
            results
        }
        Err(e) => {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "autograder setup failed, aborting suite"
            );
            Results::setup_failure(&e, start.elapsed())
        }
    };

    results.write(&configuration.results.path).await?;
    tracing::info!(
        score = results.score,
        path = %configuration.results.path.display(),
        "results written"
    );

    if results.all_passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
