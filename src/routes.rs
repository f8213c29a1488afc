use actix_web::{HttpRequest, HttpResponse, Responder, error::JsonPayloadError, get, post, web};
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::database as db;
use crate::error::EngineError;
use crate::grader::Grader;
use crate::languages::LanguageRegistry;
use crate::model::{SubmitCodeRequest, Submission, Verdict};
use crate::store::{ConfigProblemStore, ProblemStore};

#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub reason: &'static str,
    pub code: u32,
}

#[derive(Serialize, Debug)]
pub struct ErrorResponseWithMessage {
    pub reason: &'static str,
    pub code: u32,
    pub message: String,
}

#[derive(Serialize, Debug)]
pub struct SubmissionResponse {
    pub submission_id: u64,
    #[serde(flatten)]
    pub verdict: Verdict,
}

/// Hidden test cases are graded like any other, but their contents never
/// leave the engine: the response carries pass/fail and timing only.
pub fn redact_hidden(mut verdict: Verdict) -> Verdict {
    for result in verdict.test_results.iter_mut().filter(|r| r.hidden) {
        result.input = String::new();
        result.expected = String::new();
        result.actual = String::new();
    }
    verdict
}

#[post("/submissions")]
pub async fn post_submission_handler(
    grader: web::Data<Grader>,
    registry: web::Data<LanguageRegistry>,
    store: web::Data<ConfigProblemStore>,
    pool: web::Data<SqlitePool>,
    shutdown: web::Data<CancellationToken>,
    body: web::Json<SubmitCodeRequest>,
) -> impl Responder {
    let req = body.into_inner();

    // Fail fast on an unknown language: client error, nothing spawned,
    // nothing persisted.
    if let Err(e) = registry.lookup(&req.language) {
        return HttpResponse::BadRequest().json(ErrorResponseWithMessage {
            reason: "ERR_INVALID_ARGUMENT",
            code: 1,
            message: e.to_string(),
        });
    }

    let test_cases = match store.test_cases(req.problem_id) {
        Ok(cases) => cases,
        Err(EngineError::ProblemNotFound(_)) => {
            return HttpResponse::NotFound().json(ErrorResponse {
                reason: "ERR_NOT_FOUND",
                code: 3,
            });
        }
        Err(e) => {
            log::error!("Problem store failure: {e}");
            return HttpResponse::InternalServerError().json(ErrorResponse {
                reason: "ERR_EXTERNAL",
                code: 5,
            });
        }
    };

    let submission_id = match db::create_submission(&req, &pool).await {
        Ok(id) => {
            log::info!("Inserted submission {id} into database");
            id
        }
        Err(e) => {
            log::error!("Failed to insert submission into database: {e}");
            return HttpResponse::InternalServerError().json(ErrorResponse {
                reason: "ERR_EXTERNAL",
                code: 5,
            });
        }
    };

    let submission = Submission::from_request(submission_id, &req);
    let verdict = grader.grade(&submission, &test_cases, &shutdown).await;

    if let Err(e) = db::record_verdict(submission_id, &verdict, &pool).await {
        log::error!("Failed to record verdict for submission {submission_id}: {e}");
        // Remove the pending row so nothing half-recorded survives; the
        // client resubmits as a fresh grading request.
        if let Err(e) = db::discard_submission(submission_id, &pool).await {
            log::error!("Failed to discard submission {submission_id}: {e}");
        }
        return HttpResponse::InternalServerError().json(ErrorResponse {
            reason: "ERR_EXTERNAL",
            code: 5,
        });
    }

    HttpResponse::Ok().json(SubmissionResponse {
        submission_id,
        verdict: redact_hidden(verdict),
    })
}

#[get("/languages")]
pub async fn get_languages_handler(registry: web::Data<LanguageRegistry>) -> impl Responder {
    HttpResponse::Ok().json(registry.language_ids())
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    log::debug!("Rejected malformed request body: {err}");
    actix_web::error::ErrorBadRequest(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestResult;

    #[test]
    fn redaction_strips_hidden_case_contents_only() {
        let visible = TestResult {
            test_case_id: 1,
            passed: true,
            input: "1".to_string(),
            expected: "1".to_string(),
            actual: "1\n".to_string(),
            error_message: None,
            duration_ms: 2,
            output_truncated: false,
            hidden: false,
        };
        let hidden = TestResult {
            test_case_id: 2,
            passed: false,
            input: "secret".to_string(),
            expected: "secret".to_string(),
            actual: "leak".to_string(),
            hidden: true,
            ..visible.clone()
        };

        let verdict = redact_hidden(Verdict::from_results(vec![visible, hidden], 5));
        assert_eq!(verdict.test_results[0].input, "1");
        assert_eq!(verdict.test_results[1].input, "");
        assert_eq!(verdict.test_results[1].expected, "");
        assert_eq!(verdict.test_results[1].actual, "");
        // Pass/fail accounting still covers hidden cases.
        assert_eq!(verdict.total_count, 2);
        assert_eq!(verdict.passed_count, 1);
    }
}
