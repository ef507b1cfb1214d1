// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Call attempts: creation at originate time and exactly-once finalization.

use ringpost_core::types::now_timestamp;
use ringpost_core::{CallAttempt, CallStatus, Classification, DialerError};
use rusqlite::{OptionalExtension, params};

use super::jobs::ACTIVE_STATUSES;
use super::{parse_column, parse_optional_column};
use crate::database::{Database, map_tr_err};

const ATTEMPT_COLUMNS: &str = "id, job_id, port_number, phone_number, gateway_call_id, status, \
     outcome, transfer_requested, transfer_successful, duration_seconds, started_at, ended_at, notes";

fn row_to_attempt(row: &rusqlite::Row<'_>) -> rusqlite::Result<CallAttempt> {
    let status: String = row.get(5)?;
    let outcome: Option<String> = row.get(6)?;
    Ok(CallAttempt {
        id: row.get(0)?,
        job_id: row.get(1)?,
        port_number: row.get(2)?,
        phone_number: row.get(3)?,
        gateway_call_id: row.get(4)?,
        status: parse_column(5, &status)?,
        outcome: parse_optional_column(6, outcome)?,
        transfer_requested: row.get(7)?,
        transfer_successful: row.get(8)?,
        duration_seconds: row.get(9)?,
        started_at: row.get(10)?,
        ended_at: row.get(11)?,
        notes: row.get(12)?,
    })
}

fn fetch_attempt(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<CallAttempt>> {
    conn.query_row(
        &format!("SELECT {ATTEMPT_COLUMNS} FROM call_attempts WHERE id = ?1"),
        params![id],
        row_to_attempt,
    )
    .optional()
}

/// Claim the contact at `position` for `attempt` and insert the attempt row.
///
/// Returns `false` (and writes nothing) if the contact was already claimed.
pub async fn begin_attempt(
    db: &Database,
    attempt: &CallAttempt,
    position: i64,
) -> Result<bool, DialerError> {
    let attempt = attempt.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let claimed = tx.execute(
                "UPDATE job_contacts SET attempt_id = ?3 \
                 WHERE job_id = ?1 AND position = ?2 AND attempt_id IS NULL",
                params![attempt.job_id, position, attempt.id],
            )?;
            if claimed == 0 {
                return Ok(false);
            }
            tx.execute(
                &format!(
                    "INSERT INTO call_attempts ({ATTEMPT_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                params![
                    attempt.id,
                    attempt.job_id,
                    attempt.port_number,
                    attempt.phone_number,
                    attempt.gateway_call_id,
                    attempt.status.to_string(),
                    attempt.outcome.map(|o| o.to_string()),
                    attempt.transfer_requested,
                    attempt.transfer_successful,
                    attempt.duration_seconds,
                    attempt.started_at,
                    attempt.ended_at,
                    attempt.notes,
                ],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)
}

/// Record the control plane's leg id once `originate` returns.
pub async fn set_gateway_call_id(
    db: &Database,
    attempt_id: &str,
    gateway_call_id: &str,
) -> Result<(), DialerError> {
    let attempt_id = attempt_id.to_string();
    let gateway_call_id = gateway_call_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE call_attempts SET gateway_call_id = ?2 WHERE id = ?1 AND ended_at IS NULL",
                params![attempt_id, gateway_call_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Update the in-flight status of an unresolved attempt (e.g. `ringing`).
pub async fn update_progress(
    db: &Database,
    attempt_id: &str,
    status: CallStatus,
) -> Result<(), DialerError> {
    let attempt_id = attempt_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE call_attempts SET status = ?2 WHERE id = ?1 AND ended_at IS NULL",
                params![attempt_id, status.to_string()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Finalize an attempt with its classification and account it on the job.
///
/// The update is conditional on `ended_at IS NULL`: of any number of racing
/// finalizers exactly one gets `Some`, and only that one touches the job's
/// counters. Everyone else gets `None`.
pub async fn finalize_attempt(
    db: &Database,
    attempt_id: &str,
    classification: &Classification,
) -> Result<Option<CallAttempt>, DialerError> {
    let attempt_id = attempt_id.to_string();
    let classification = classification.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let outcome = classification.outcome;
            let now = now_timestamp();
            let changed = tx.execute(
                "UPDATE call_attempts SET status = ?2, outcome = ?3, transfer_requested = ?4, \
                 transfer_successful = ?5, duration_seconds = ?6, ended_at = ?7, \
                 notes = COALESCE(?8, notes) \
                 WHERE id = ?1 AND ended_at IS NULL",
                params![
                    attempt_id,
                    outcome.call_status().to_string(),
                    outcome.to_string(),
                    classification.transfer_requested,
                    classification.transfer_successful,
                    classification.duration_seconds,
                    now,
                    classification.notes,
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            let (successful, failed) = if outcome.is_success() { (1, 0) } else { (0, 1) };
            tx.execute(
                "UPDATE dialer_jobs SET completed_calls = completed_calls + 1, \
                 successful_calls = successful_calls + ?2, failed_calls = failed_calls + ?3, \
                 updated_at = ?4 \
                 WHERE id = (SELECT job_id FROM call_attempts WHERE id = ?1)",
                params![attempt_id, successful, failed, now],
            )?;
            let attempt = fetch_attempt(&tx, &attempt_id)?;
            tx.commit()?;
            Ok(attempt)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch one attempt by id.
pub async fn get_attempt(db: &Database, id: &str) -> Result<Option<CallAttempt>, DialerError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| fetch_attempt(conn, &id))
        .await
        .map_err(map_tr_err)
}

/// Attempts of a job that have not been finalized, oldest first.
pub async fn unresolved_attempts(
    db: &Database,
    job_id: &str,
) -> Result<Vec<CallAttempt>, DialerError> {
    query_attempts(db, job_id, true).await
}

/// Unresolved attempts whose job already reached a terminal status.
///
/// Left behind when the process stops between a job's terminal transition
/// and the finalization of its in-flight calls.
pub async fn orphaned_attempts(db: &Database) -> Result<Vec<CallAttempt>, DialerError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ATTEMPT_COLUMNS} FROM call_attempts \
                 WHERE ended_at IS NULL AND job_id IN \
                 (SELECT id FROM dialer_jobs WHERE status NOT IN ({ACTIVE_STATUSES})) \
                 ORDER BY started_at ASC, rowid ASC"
            ))?;
            let rows = stmt
                .query_map([], row_to_attempt)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Every attempt of a job, oldest first.
pub async fn list_attempts(db: &Database, job_id: &str) -> Result<Vec<CallAttempt>, DialerError> {
    query_attempts(db, job_id, false).await
}

async fn query_attempts(
    db: &Database,
    job_id: &str,
    unresolved_only: bool,
) -> Result<Vec<CallAttempt>, DialerError> {
    let job_id = job_id.to_string();
    db.connection()
        .call(move |conn| {
            let filter = if unresolved_only { "AND ended_at IS NULL" } else { "" };
            let mut stmt = conn.prepare(&format!(
                "SELECT {ATTEMPT_COLUMNS} FROM call_attempts WHERE job_id = ?1 {filter} \
                 ORDER BY started_at ASC, rowid ASC"
            ))?;
            let rows = stmt
                .query_map(params![job_id], row_to_attempt)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::jobs;
    use ringpost_core::{CallOutcome, Contact, DialerJob, JobStatus};
    use tempfile::tempdir;

    async fn setup_job(contacts: i64) -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let job = DialerJob {
            id: "job-1".to_string(),
            campaign_id: "camp-1".to_string(),
            owner_id: "owner-1".to_string(),
            status: JobStatus::Running,
            total_calls: 0,
            completed_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            max_concurrent_calls: 2,
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
            ended_at: None,
        };
        let contacts: Vec<Contact> = (0..contacts)
            .map(|i| Contact {
                position: i,
                phone_number: format!("+1555{i:07}"),
            })
            .collect();
        jobs::create_job(&db, &job, &contacts).await.unwrap();
        (db, dir)
    }

    fn make_attempt(id: &str, position: i64) -> CallAttempt {
        CallAttempt {
            id: id.to_string(),
            job_id: "job-1".to_string(),
            port_number: 1,
            phone_number: format!("+1555{position:07}"),
            gateway_call_id: None,
            status: CallStatus::Initiated,
            outcome: None,
            transfer_requested: false,
            transfer_successful: false,
            duration_seconds: 0,
            started_at: now_timestamp(),
            ended_at: None,
            notes: None,
        }
    }

    fn transferred() -> Classification {
        Classification {
            outcome: CallOutcome::Transferred,
            transfer_requested: true,
            transfer_successful: true,
            duration_seconds: 42,
            notes: None,
        }
    }

    #[tokio::test]
    async fn begin_attempt_claims_contact_once() {
        let (db, _dir) = setup_job(2).await;
        assert!(begin_attempt(&db, &make_attempt("a-1", 0), 0).await.unwrap());
        assert!(!begin_attempt(&db, &make_attempt("a-2", 0), 0).await.unwrap());
        assert!(get_attempt(&db, "a-2").await.unwrap().is_none());
        assert_eq!(jobs::remaining_contacts(&db, "job-1").await.unwrap(), 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn finalize_updates_attempt_and_counters() {
        let (db, _dir) = setup_job(2).await;
        begin_attempt(&db, &make_attempt("a-1", 0), 0).await.unwrap();
        set_gateway_call_id(&db, "a-1", "leg-77").await.unwrap();

        let attempt = finalize_attempt(&db, "a-1", &transferred())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(attempt.status, CallStatus::Transferred);
        assert_eq!(attempt.outcome, Some(CallOutcome::Transferred));
        assert_eq!(attempt.gateway_call_id.as_deref(), Some("leg-77"));
        assert_eq!(attempt.duration_seconds, 42);
        assert!(attempt.is_resolved());

        let job = jobs::get_job(&db, "job-1").await.unwrap().unwrap();
        assert_eq!(job.completed_calls, 1);
        assert_eq!(job.successful_calls, 1);
        assert_eq!(job.failed_calls, 0);
        assert!(job.counters_consistent());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn finalize_happens_exactly_once() {
        let (db, _dir) = setup_job(1).await;
        begin_attempt(&db, &make_attempt("a-1", 0), 0).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                finalize_attempt(&db, "a-1", &Classification::gateway_failure("timeout"))
                    .await
                    .unwrap()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);

        let job = jobs::get_job(&db, "job-1").await.unwrap().unwrap();
        assert_eq!(job.completed_calls, 1);
        assert_eq!(job.failed_calls, 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn unresolved_excludes_finalized() {
        let (db, _dir) = setup_job(3).await;
        begin_attempt(&db, &make_attempt("a-1", 0), 0).await.unwrap();
        begin_attempt(&db, &make_attempt("a-2", 1), 1).await.unwrap();
        update_progress(&db, "a-2", CallStatus::Ringing).await.unwrap();
        finalize_attempt(&db, "a-1", &transferred()).await.unwrap();

        let open = unresolved_attempts(&db, "job-1").await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, "a-2");
        assert_eq!(open[0].status, CallStatus::Ringing);
        assert_eq!(list_attempts(&db, "job-1").await.unwrap().len(), 2);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn progress_update_never_touches_finalized_attempt() {
        let (db, _dir) = setup_job(1).await;
        begin_attempt(&db, &make_attempt("a-1", 0), 0).await.unwrap();
        finalize_attempt(&db, "a-1", &Classification::gateway_failure("x"))
            .await
            .unwrap();
        update_progress(&db, "a-1", CallStatus::Ringing).await.unwrap();
        let attempt = get_attempt(&db, "a-1").await.unwrap().unwrap();
        assert_eq!(attempt.status, CallStatus::Failed);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn orphaned_lists_only_unresolved_attempts_of_terminal_jobs() {
        let (db, _dir) = setup_job(3).await;
        assert!(begin_attempt(&db, &make_attempt("a-1", 0), 0).await.unwrap());
        assert!(begin_attempt(&db, &make_attempt("a-2", 1), 1).await.unwrap());
        finalize_attempt(&db, "a-1", &transferred()).await.unwrap();
        assert!(orphaned_attempts(&db).await.unwrap().is_empty());

        jobs::transition_job(&db, "job-1", JobStatus::Cancelled).await.unwrap();
        let orphans = orphaned_attempts(&db).await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].id, "a-2");
        db.close().await.unwrap();
    }
}
