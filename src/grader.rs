use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::EngineSettings;
use crate::error::EngineError;
use crate::executor::ProcessExecutor;
use crate::languages::LanguageRegistry;
use crate::model::{ExecutionRequest, Submission, TestCase, TestResult, Verdict};
use crate::pipeline;

/// Runs the pipeline across all test cases of a submission and aggregates
/// a `Verdict`. Holds no mutable state; safe to share behind an `Arc`.
pub struct Grader {
    registry: Arc<LanguageRegistry>,
    executor: ProcessExecutor,
    scratch_root: PathBuf,
    worker_slots: usize,
    default_timeout_ms: u64,
    submission_timeout: Duration,
}

impl Grader {
    pub fn new(registry: Arc<LanguageRegistry>, settings: &EngineSettings) -> Self {
        Self {
            registry,
            executor: ProcessExecutor::new(settings.output_cap_bytes),
            scratch_root: settings
                .scratch_root
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            worker_slots: settings.worker_slots.max(1),
            default_timeout_ms: settings.default_timeout_ms,
            submission_timeout: Duration::from_millis(settings.submission_timeout_ms),
        }
    }

    /// Grades one submission. Never fails: every error condition folds into
    /// the returned verdict.
    ///
    /// The overall submission deadline is independent of per-case timeouts;
    /// when it expires the token is cancelled, which propagates down to the
    /// executor's kill path, and the verdict reports the deadline.
    pub async fn grade(
        &self,
        submission: &Submission,
        test_cases: &[TestCase],
        parent: &CancellationToken,
    ) -> Verdict {
        let token = parent.child_token();
        let inner = self.grade_cases(submission, test_cases, &token);
        tokio::pin!(inner);

        tokio::select! {
            verdict = &mut inner => verdict,
            _ = tokio::time::sleep(self.submission_timeout) => {
                log::warn!(
                    "submission {} exceeded the {}ms deadline, cancelling",
                    submission.id,
                    self.submission_timeout.as_millis()
                );
                token.cancel();
                // Let in-flight cases wind down through the kill path so no
                // process outlives the verdict.
                let _ = inner.await;
                Verdict::rejected(
                    format!(
                        "submission deadline of {}ms exceeded",
                        self.submission_timeout.as_millis()
                    ),
                    self.submission_timeout.as_millis() as u64,
                )
            }
        }
    }

    async fn grade_cases(
        &self,
        submission: &Submission,
        test_cases: &[TestCase],
        token: &CancellationToken,
    ) -> Verdict {
        let started = Instant::now();

        // Registry lookup happens before anything is spawned; an unknown
        // language never reaches a process.
        let profile = match self.registry.lookup(&submission.language) {
            Ok(profile) => profile,
            Err(e) => {
                return Verdict::rejected(e.to_string(), started.elapsed().as_millis() as u64);
            }
        };

        if test_cases.is_empty() {
            return Verdict::from_results(Vec::new(), started.elapsed().as_millis() as u64);
        }

        let timeout_ms = profile.timeout_ms.unwrap_or(self.default_timeout_ms);
        let language = profile.language;
        let semaphore = Arc::new(Semaphore::new(self.worker_slots));
        let mut tasks = JoinSet::new();

        for (case_index, test_case) in test_cases.iter().enumerate() {
            let request = ExecutionRequest {
                submission_id: submission.id,
                case_index,
                code: submission.code.clone(),
                test_case: test_case.clone(),
                timeout_ms,
            };
            let registry = Arc::clone(&self.registry);
            let executor = self.executor.clone();
            let scratch_root = self.scratch_root.clone();
            let semaphore = Arc::clone(&semaphore);
            let token = token.clone();

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| EngineError::infrastructure("worker pool", e))?;
                let profile = registry.lookup(language.id())?;
                let result =
                    pipeline::run_case(&executor, profile, &scratch_root, &request, &token)
                        .await?;
                Ok::<(usize, TestResult), EngineError>((case_index, result))
            });
        }

        // Reassemble into input order regardless of completion order.
        let mut slots: Vec<Option<TestResult>> = test_cases.iter().map(|_| None).collect();
        let mut fault: Option<EngineError> = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok((case_index, result))) => slots[case_index] = Some(result),
                Ok(Err(e)) => {
                    log::error!(
                        "infrastructure failure grading submission {}: {e}",
                        submission.id
                    );
                    if fault.is_none() {
                        fault = Some(e);
                    }
                    // Stop in-flight siblings promptly; keep draining the
                    // set so every task is reaped.
                    token.cancel();
                }
                Err(e) => {
                    if fault.is_none() {
                        fault = Some(EngineError::infrastructure("grading task", e));
                    }
                    token.cancel();
                }
            }
        }

        let total_duration_ms = started.elapsed().as_millis() as u64;
        if let Some(e) = fault {
            return Verdict::rejected(e.to_string(), total_duration_ms);
        }

        let results: Vec<TestResult> = slots.into_iter().flatten().collect();
        Verdict::from_results(results, total_duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VerdictKind;
    use pretty_assertions::assert_eq;

    fn settings() -> EngineSettings {
        EngineSettings {
            worker_slots: 4,
            default_timeout_ms: 5_000,
            submission_timeout_ms: 30_000,
            output_cap_bytes: 64 * 1024,
            scratch_root: None,
        }
    }

    fn submission(language: &str) -> Submission {
        Submission {
            id: 1,
            user_id: 1,
            problem_id: 1,
            code: "whatever".to_string(),
            language: language.to_string(),
            created_at: crate::create_timestamp(),
        }
    }

    #[tokio::test]
    async fn unsupported_language_fails_fast_without_spawning() {
        let grader = Grader::new(Arc::new(LanguageRegistry::builtin()), &settings());
        let cases = vec![TestCase {
            id: 1,
            input: "1".to_string(),
            expected_output: "1".to_string(),
            hidden: false,
        }];

        let started = Instant::now();
        let verdict = grader
            .grade(&submission("cobol"), &cases, &CancellationToken::new())
            .await;

        assert_eq!(verdict.result, VerdictKind::Fail);
        assert_eq!(verdict.total_count, 0);
        assert_eq!(verdict.passed_count, 0);
        assert!(verdict.test_results.is_empty());
        assert!(verdict.overall_error.as_deref().unwrap().contains("cobol"));
        // Fast: no compile, no run, no per-case timeout involved.
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn zero_test_cases_fail_with_overall_error() {
        let grader = Grader::new(Arc::new(LanguageRegistry::builtin()), &settings());
        let verdict = grader
            .grade(&submission("python"), &[], &CancellationToken::new())
            .await;

        assert_eq!(verdict.result, VerdictKind::Fail);
        assert_eq!(verdict.total_count, 0);
        assert!(verdict.overall_error.is_some());
    }
}
