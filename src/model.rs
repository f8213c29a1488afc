use serde::{Deserialize, Serialize};

use crate::create_timestamp;

/// One test case as supplied by the problem store.
///
/// Hidden cases are graded like any other but their contents are redacted
/// from responses shown to the submitter.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TestCase {
    pub id: u32,
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub hidden: bool,
}

/// A grading request as received from the surrounding application.
#[derive(Serialize, Deserialize, Debug)]
pub struct SubmitCodeRequest {
    pub user_id: u32,
    pub problem_id: u32,
    pub code: String,
    pub language: String,
}

/// One submission record. Immutable after creation; the verdict is attached
/// by the recorder, never written back into this struct.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Submission {
    pub id: u64,
    pub user_id: u32,
    pub problem_id: u32,
    pub code: String,
    pub language: String,
    pub created_at: String,
}

impl Submission {
    pub fn from_request(id: u64, req: &SubmitCodeRequest) -> Self {
        Self {
            id,
            user_id: req.user_id,
            problem_id: req.problem_id,
            code: req.code.clone(),
            language: req.language.clone(),
            created_at: create_timestamp(),
        }
    }
}

/// Everything the pipeline needs to run one test case. Created per case,
/// never shared between cases.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub submission_id: u64,
    pub case_index: usize,
    pub code: String,
    pub test_case: TestCase,
    pub timeout_ms: u64,
}

/// The outcome of running a submission against exactly one test case.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TestResult {
    pub test_case_id: u32,
    pub passed: bool,
    pub input: String,
    pub expected: String,
    pub actual: String,
    pub error_message: Option<String>,
    pub duration_ms: u64,
    #[serde(default)]
    pub output_truncated: bool,
    #[serde(default)]
    pub hidden: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VerdictKind {
    Pass,
    Fail,
}

/// Final outcome for one submission: pass/fail plus the full per-case
/// breakdown, in the same order as the input test cases.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Verdict {
    pub result: VerdictKind,
    pub passed_count: usize,
    pub total_count: usize,
    pub test_results: Vec<TestResult>,
    pub overall_error: Option<String>,
    pub total_duration_ms: u64,
}

impl Verdict {
    /// Builds a verdict from ordered test results, enforcing the invariant
    /// that `Pass` requires every case passing and at least one case.
    pub fn from_results(test_results: Vec<TestResult>, total_duration_ms: u64) -> Self {
        let total_count = test_results.len();
        let passed_count = test_results.iter().filter(|r| r.passed).count();
        let result = if total_count > 0 && passed_count == total_count {
            VerdictKind::Pass
        } else {
            VerdictKind::Fail
        };
        let overall_error = if total_count == 0 {
            Some("no test cases to run".to_string())
        } else {
            None
        };

        Self {
            result,
            passed_count,
            total_count,
            test_results,
            overall_error,
            total_duration_ms,
        }
    }

    /// A verdict for a submission that could not be graded at all: no test
    /// cases ran, the reason goes into `overall_error`.
    pub fn rejected(reason: String, total_duration_ms: u64) -> Self {
        Self {
            result: VerdictKind::Fail,
            passed_count: 0,
            total_count: 0,
            test_results: Vec::new(),
            overall_error: Some(reason),
            total_duration_ms,
        }
    }
}
