//! Gradescope `results.json` output.
use anyhow::Context;
use std::path::Path;
use std::time::Duration;

use crate::errors::error_chain;

#[derive(serde::Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Failed,
}

#[derive(serde::Serialize, Debug, Clone)]
pub struct TestResult {
    pub name: String,
    // ungraded cases carry no number and no score fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_score: Option<f64>,
    pub status: Status,
    pub output: String,
}

impl TestResult {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == Status::Passed
    }
}

#[derive(serde::Serialize, Debug)]
pub struct Results {
    pub score: f64,
    pub execution_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub tests: Vec<TestResult>,
}

impl Results {
    #[must_use]
    pub fn from_tests(tests: Vec<TestResult>, elapsed: Duration) -> Self {
        Self {
            score: tests.iter().filter_map(|t| t.score).sum(),
            execution_time: elapsed.as_secs(),
            output: None,
            tests,
        }
    }

    /// Nothing ran; the whole submission scores zero.
    #[must_use]
    pub fn setup_failure(e: &impl std::error::Error, elapsed: Duration) -> Self {
        Self {
            score: 0.0,
            execution_time: elapsed.as_secs(),
            output: Some(format!("Autograder setup failed:\n{}", error_chain(e))),
            tests: Vec::new(),
        }
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.output.is_none() && self.tests.iter().all(TestResult::passed)
    }

    #[allow(clippy::missing_errors_doc)]
    pub async fn write(&self, path: &Path) -> Result<(), anyhow::Error> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let body = serde_json::to_vec_pretty(self).context("Failed to serialize results")?;
        tokio::fs::write(path, body)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}
