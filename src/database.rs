use std::fs;
use std::path::{Path, PathBuf};

use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::model::{SubmitCodeRequest, Verdict, VerdictKind};

const DATABASE_NAME: &str = "gradebox.sqlite3";

pub fn get_db_path() -> PathBuf {
    use directories::ProjectDirs;

    let proj_dirs = ProjectDirs::from("", "", "gradebox").expect("Unable to find user directory");
    let data_dir = proj_dirs.data_local_dir();

    fs::create_dir_all(data_dir).expect("Failed to create local data dir");

    data_dir.join(DATABASE_NAME)
}

pub async fn init_db(db_path: impl AsRef<Path>) -> sqlx::Result<SqlitePool> {
    let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display()); // rwc = read/write/create
    let db_pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect(&db_url)
        .await?;

    // PRAGMA statements cannot run inside a transaction
    for pragma_sql in &[
        "PRAGMA foreign_keys = ON;",
        "PRAGMA busy_timeout = 2000;", // 2 seconds timeout for lock contention
        "PRAGMA journal_mode = WAL;",  // Write-Ahead Logging for better concurrency
        "PRAGMA synchronous = NORMAL;",
    ] {
        sqlx::query(pragma_sql).execute(&db_pool).await?;
    }

    let mut tx = db_pool.begin().await?;

    for sql in &[
        r"
        CREATE TABLE IF NOT EXISTS submissions (
            id                 INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at         TEXT    NOT NULL,
            user_id            INTEGER NOT NULL,
            problem_id         INTEGER NOT NULL,
            code               TEXT    NOT NULL,
            language           TEXT    NOT NULL,
            result             TEXT    NOT NULL,
            passed_count       INTEGER NOT NULL DEFAULT 0,
            total_count        INTEGER NOT NULL DEFAULT 0,
            overall_error      TEXT,
            total_duration_ms  INTEGER NOT NULL DEFAULT 0
        );",
        "CREATE INDEX IF NOT EXISTS idx_submissions_created_at ON submissions(created_at);",
        r"
        CREATE TABLE IF NOT EXISTS submission_case (
            submission_id  INTEGER NOT NULL,
            case_index     INTEGER NOT NULL,
            test_case_id   INTEGER NOT NULL,
            passed         INTEGER NOT NULL,
            actual         TEXT    NOT NULL DEFAULT '',
            error_message  TEXT,
            duration_ms    INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (submission_id, case_index),
            FOREIGN KEY (submission_id) REFERENCES submissions (id)
        );",
    ] {
        sqlx::query(sql).execute(tx.as_mut()).await?;
    }

    tx.commit().await?;

    log::info!("Initialized database at {}", db_path.as_ref().display());

    Ok(db_pool)
}

pub fn remove_db(db_path: impl AsRef<Path>) {
    // WAL and SHM files might not exist; ignore errors
    let wal_path = format!("{}-wal", db_path.as_ref().display());
    let shm_path = format!("{}-shm", db_path.as_ref().display());
    let _ = fs::remove_file(wal_path);
    let _ = fs::remove_file(shm_path);

    if let Err(e) = std::fs::remove_file(&db_path) {
        log::warn!(
            "Unable to remove database at {}: {e}",
            db_path.as_ref().display()
        );
    } else {
        log::info!("Removed database at {}", db_path.as_ref().display());
    }
}

/// Inserts the submission record in its pending state and returns its id.
pub async fn create_submission(req: &SubmitCodeRequest, pool: &SqlitePool) -> sqlx::Result<u64> {
    let now = crate::create_timestamp();

    let result = sqlx::query(
        r#"
        INSERT INTO submissions (created_at, user_id, problem_id, code, language, result)
        VALUES (?, ?, ?, ?, ?, 'pending')
        "#,
    )
    .bind(&now)
    .bind(req.user_id)
    .bind(req.problem_id)
    .bind(&req.code)
    .bind(&req.language)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid() as u64)
}

/// Attaches the computed verdict (and its per-case breakdown) to a
/// previously created submission.
pub async fn record_verdict(
    submission_id: u64,
    verdict: &Verdict,
    pool: &SqlitePool,
) -> sqlx::Result<()> {
    let result = match verdict.result {
        VerdictKind::Pass => "pass",
        VerdictKind::Fail => "fail",
    };

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE submissions
        SET result = ?, passed_count = ?, total_count = ?, overall_error = ?, total_duration_ms = ?
        WHERE id = ?
        "#,
    )
    .bind(result)
    .bind(verdict.passed_count as i64)
    .bind(verdict.total_count as i64)
    .bind(&verdict.overall_error)
    .bind(verdict.total_duration_ms as i64)
    .bind(submission_id as i64)
    .execute(tx.as_mut())
    .await?;

    for (case_index, case) in verdict.test_results.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO submission_case
                (submission_id, case_index, test_case_id, passed, actual, error_message, duration_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(submission_id as i64)
        .bind(case_index as i64)
        .bind(case.test_case_id)
        .bind(case.passed)
        .bind(&case.actual)
        .bind(&case.error_message)
        .bind(case.duration_ms as i64)
        .execute(tx.as_mut())
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Deletes a submission whose verdict could not be recorded, so no row is
/// left behind in its pending state.
pub async fn discard_submission(submission_id: u64, pool: &SqlitePool) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM submission_case WHERE submission_id = ?")
        .bind(submission_id as i64)
        .execute(tx.as_mut())
        .await?;
    sqlx::query("DELETE FROM submissions WHERE id = ?")
        .bind(submission_id as i64)
        .execute(tx.as_mut())
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Returns the persisted (result, passed_count, total_count) for a
/// submission; used by status queries and tests.
pub async fn fetch_submission_result(
    submission_id: u64,
    pool: &SqlitePool,
) -> sqlx::Result<(String, i64, i64)> {
    let row = sqlx::query(
        r#"
        SELECT result, passed_count, total_count FROM submissions WHERE id = ?
        "#,
    )
    .bind(submission_id as i64)
    .fetch_one(pool)
    .await?;

    Ok((row.get("result"), row.get("passed_count"), row.get("total_count")))
}
