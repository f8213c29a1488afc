use std::path::Path;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::executor::{ExecOutcome, ProcessExecutor, ProcessSpec};
use crate::languages::LanguageProfile;
use crate::materialize::{ScratchDir, materialize};
use crate::model::{ExecutionRequest, TestResult};

/// Fixed message for timed-out runs; asserted on by callers and tests.
pub const TIMEOUT_MESSAGE: &str = "Execution timeout";
pub const CANCELLED_MESSAGE: &str = "Execution cancelled";

/// Compiled artifact name inside the scratch directory.
const EXECUTABLE_NAME: &str = "main";

/// Compile steps get their own fixed budget, independent of the per-case
/// run timeout.
const COMPILE_TIMEOUT: Duration = Duration::from_secs(30);

/// Documented comparison policy: exact string match after trimming leading
/// and trailing whitespace. Internal whitespace is significant.
pub fn outputs_match(actual: &str, expected: &str) -> bool {
    actual.trim() == expected.trim()
}

/// Runs one test case through materialize -> compile (if the language needs
/// it) -> run -> compare.
///
/// Every user-code failure mode (compile error, runtime error, timeout,
/// wrong answer, bad test input) is converted into a `TestResult` with
/// `passed == false`; only infrastructure faults escape as `Err`.
pub async fn run_case(
    executor: &ProcessExecutor,
    profile: &LanguageProfile,
    scratch_root: &Path,
    request: &ExecutionRequest,
    token: &CancellationToken,
) -> Result<TestResult, EngineError> {
    let started = Instant::now();
    let scratch = ScratchDir::create(scratch_root, request.submission_id, request.case_index)?;

    // Materialize. Bad test-case input is a per-case failure, not a fault.
    match materialize(profile, &request.code, &request.test_case.input, scratch.path()) {
        Ok(_) => {}
        Err(EngineError::InvalidInput(msg)) => {
            return Ok(failed(request, String::new(), Some(msg), false, started));
        }
        Err(e) => return Err(e),
    }

    // Compile phase: a non-zero exit short-circuits straight to a failed
    // result with the compiler's stderr; the run phase never starts.
    if let Some(compile) = &profile.compile {
        let (program, args) = compile.render(profile.source_file, EXECUTABLE_NAME);
        let spec = ProcessSpec {
            program,
            args,
            cwd: scratch.path().to_path_buf(),
            stdin: String::new(),
            timeout: COMPILE_TIMEOUT,
        };

        match executor.run(spec, token).await? {
            ExecOutcome::Completed(output) if output.success() => {}
            ExecOutcome::Completed(output) => {
                let message = if output.stderr.trim().is_empty() {
                    format!(
                        "compilation failed with exit code {:?}",
                        output.exit_code
                    )
                } else {
                    output.stderr
                };
                return Ok(failed(
                    request,
                    String::new(),
                    Some(message),
                    output.truncated,
                    started,
                ));
            }
            ExecOutcome::TimedOut { .. } => {
                return Ok(failed(
                    request,
                    String::new(),
                    Some("Compilation timeout".to_string()),
                    false,
                    started,
                ));
            }
            ExecOutcome::Cancelled => {
                return Ok(failed(
                    request,
                    String::new(),
                    Some(CANCELLED_MESSAGE.to_string()),
                    false,
                    started,
                ));
            }
        }
    }

    // Run phase. The harness already embeds the input literals; the raw
    // input also goes to stdin for solutions that choose to read it.
    let (program, args) = profile.run.render(profile.source_file, EXECUTABLE_NAME);
    let spec = ProcessSpec {
        program,
        args,
        cwd: scratch.path().to_path_buf(),
        stdin: request.test_case.input.clone(),
        timeout: Duration::from_millis(request.timeout_ms),
    };

    let result = match executor.run(spec, token).await? {
        ExecOutcome::Completed(output) if output.success() => {
            let passed = outputs_match(&output.stdout, &request.test_case.expected_output);
            TestResult {
                test_case_id: request.test_case.id,
                passed,
                input: request.test_case.input.clone(),
                expected: request.test_case.expected_output.clone(),
                actual: output.stdout,
                error_message: None,
                duration_ms: started.elapsed().as_millis() as u64,
                output_truncated: output.truncated,
                hidden: request.test_case.hidden,
            }
        }
        ExecOutcome::Completed(output) => {
            let message = if output.stderr.trim().is_empty() {
                format!("process exited with code {:?}", output.exit_code)
            } else {
                output.stderr
            };
            failed(request, output.stdout, Some(message), output.truncated, started)
        }
        ExecOutcome::TimedOut { .. } => failed(
            request,
            String::new(),
            Some(TIMEOUT_MESSAGE.to_string()),
            false,
            started,
        ),
        ExecOutcome::Cancelled => failed(
            request,
            String::new(),
            Some(CANCELLED_MESSAGE.to_string()),
            false,
            started,
        ),
    };

    Ok(result)
}

fn failed(
    request: &ExecutionRequest,
    actual: String,
    error_message: Option<String>,
    output_truncated: bool,
    started: Instant,
) -> TestResult {
    TestResult {
        test_case_id: request.test_case.id,
        passed: false,
        input: request.test_case.input.clone(),
        expected: request.test_case.expected_output.clone(),
        actual,
        error_message,
        duration_ms: started.elapsed().as_millis() as u64,
        output_truncated,
        hidden: request.test_case.hidden,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::{CommandTemplate, Language};
    use crate::model::TestCase;
    use pretty_assertions::assert_eq;

    // Shell-backed profiles keep these tests hermetic: the "user code" is a
    // shell script run by /bin/sh, no language toolchain required.
    fn sh_profile() -> LanguageProfile {
        LanguageProfile {
            language: Language::Python,
            source_file: "main.sh",
            compile: None,
            run: CommandTemplate::new(&["/bin/sh", "%SOURCE%"]),
            timeout_ms: None,
            harness: |code, _args| code.to_string(),
        }
    }

    fn compiled_profile(compile: &[&str], run: &[&str]) -> LanguageProfile {
        LanguageProfile {
            compile: Some(CommandTemplate::new(compile)),
            run: CommandTemplate::new(run),
            ..sh_profile()
        }
    }

    fn request(code: &str, input: &str, expected: &str, timeout_ms: u64) -> ExecutionRequest {
        ExecutionRequest {
            submission_id: 7,
            case_index: 0,
            code: code.to_string(),
            test_case: TestCase {
                id: 1,
                input: input.to_string(),
                expected_output: expected.to_string(),
                hidden: false,
            },
            timeout_ms,
        }
    }

    async fn run(profile: &LanguageProfile, req: &ExecutionRequest) -> TestResult {
        let executor = ProcessExecutor::new(64 * 1024);
        run_case(
            &executor,
            profile,
            &std::env::temp_dir(),
            req,
            &CancellationToken::new(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn matching_output_passes_with_trailing_newline_trimmed() {
        let req = request("echo '[0,1]'", "", "[0,1]", 5000);
        let result = run(&sh_profile(), &req).await;
        assert!(result.passed, "{result:?}");
        assert_eq!(result.actual, "[0,1]\n");
        assert!(result.error_message.is_none());
    }

    #[tokio::test]
    async fn internal_whitespace_is_significant() {
        let req = request("echo '4 2'", "", "42", 5000);
        let result = run(&sh_profile(), &req).await;
        assert!(!result.passed);
        assert_eq!(result.actual, "4 2\n");
        assert!(result.error_message.is_none());
    }

    #[tokio::test]
    async fn nonzero_exit_captures_stderr_as_error() {
        let req = request("echo boom >&2; exit 3", "", "", 5000);
        let result = run(&sh_profile(), &req).await;
        assert!(!result.passed);
        assert!(result.error_message.as_deref().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn timeout_produces_fixed_message_promptly() {
        let started = Instant::now();
        let req = request("sleep 30", "", "", 300);
        let result = run(&sh_profile(), &req).await;
        assert!(!result.passed);
        assert_eq!(result.error_message.as_deref(), Some(TIMEOUT_MESSAGE));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn compile_error_short_circuits_run_phase() {
        // The run command points at a nonexistent binary: if the run phase
        // were attempted it would be an infrastructure error, so an Ok
        // result proves the short-circuit.
        let profile = compiled_profile(
            &["/bin/sh", "-c", "echo 'expected `;`' >&2; exit 1"],
            &["/nonexistent/run-binary"],
        );
        let req = request("whatever", "", "", 5000);
        let result = run(&profile, &req).await;
        assert!(!result.passed);
        assert!(
            result
                .error_message
                .as_deref()
                .unwrap()
                .contains("expected `;`")
        );
    }

    #[tokio::test]
    async fn successful_compile_then_run() {
        let profile = compiled_profile(
            &["/bin/cp", "%SOURCE%", "%EXE%"],
            &["/bin/sh", "%EXE%"],
        );
        let req = request("echo compiled", "", "compiled", 5000);
        let result = run(&profile, &req).await;
        assert!(result.passed, "{result:?}");
    }

    #[tokio::test]
    async fn missing_runtime_binary_is_infrastructure() {
        let profile = LanguageProfile {
            run: CommandTemplate::new(&["/nonexistent/interpreter", "%SOURCE%"]),
            ..sh_profile()
        };
        let req = request("echo hi", "", "hi", 5000);
        let executor = ProcessExecutor::new(64 * 1024);
        let err = run_case(
            &executor,
            &profile,
            &std::env::temp_dir(),
            &req,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::Infrastructure(_)));
    }

    #[tokio::test]
    async fn malformed_input_fails_the_case_without_spawning() {
        let profile = LanguageProfile {
            // Would be an infrastructure error if anything were spawned.
            run: CommandTemplate::new(&["/nonexistent/interpreter", "%SOURCE%"]),
            harness: |_, args| format!("{args:?}"),
            ..sh_profile()
        };
        let req = request("code", "[1,2", "", 5000);
        let result = run(&profile, &req).await;
        assert!(!result.passed);
        assert!(result.error_message.is_some());
    }

    #[test]
    fn whitespace_policy() {
        assert!(outputs_match("42\n", "42"));
        assert!(outputs_match("  42  ", "42"));
        assert!(!outputs_match("4 2", "42"));
        assert!(!outputs_match("42", "43"));
    }
}
