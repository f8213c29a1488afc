use thiserror::Error;

/// Failure taxonomy for the grading engine.
///
/// Per-test-case failures caused by user code (compile errors, runtime
/// errors, timeouts, wrong answers) are NOT errors here — they become
/// `TestResult`s. This enum only covers the conditions under which a test
/// case cannot meaningfully run at all.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Requested language is not in the registry allow-list. Fails before
    /// any process is spawned.
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// Problem id unknown to the problem store.
    #[error("problem {0} not found")]
    ProblemNotFound(u32),

    /// Test case input could not be parsed into argument literals.
    #[error("invalid test case input: {0}")]
    InvalidInput(String),

    /// Environment misconfiguration: missing toolchain binary, permission
    /// denied, unwritable scratch directory. Distinct from user-code
    /// failures so operators can alert on it.
    #[error("execution environment failure: {0}")]
    Infrastructure(String),
}

impl EngineError {
    pub fn infrastructure(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Infrastructure(format!("{context}: {err}"))
    }
}
