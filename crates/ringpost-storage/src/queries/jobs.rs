// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dialer jobs and their frozen contact snapshots.

use ringpost_core::types::now_timestamp;
use ringpost_core::{Contact, DialerError, DialerJob, JobStatus};
use rusqlite::{OptionalExtension, params};

use super::parse_column;
use crate::database::{Database, map_tr_err};

pub(crate) const JOB_COLUMNS: &str = "id, campaign_id, owner_id, status, total_calls, \
     completed_calls, successful_calls, failed_calls, max_concurrent_calls, \
     created_at, updated_at, ended_at";

/// Non-terminal job statuses, as an SQL list.
pub(crate) const ACTIVE_STATUSES: &str = "'pending', 'starting', 'running', 'paused'";

pub(crate) fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<DialerJob> {
    let status: String = row.get(3)?;
    Ok(DialerJob {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        owner_id: row.get(2)?,
        status: parse_column(3, &status)?,
        total_calls: row.get(4)?,
        completed_calls: row.get(5)?,
        successful_calls: row.get(6)?,
        failed_calls: row.get(7)?,
        max_concurrent_calls: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        ended_at: row.get(11)?,
    })
}

pub(crate) fn fetch_job(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<DialerJob>> {
    conn.query_row(
        &format!("SELECT {JOB_COLUMNS} FROM dialer_jobs WHERE id = ?1"),
        params![id],
        row_to_job,
    )
    .optional()
}

/// Insert a new job together with its contact snapshot.
///
/// Fails with `AlreadyRunning` if the campaign already has a non-terminal job.
/// `total_calls` is taken from the snapshot length.
pub async fn create_job(
    db: &Database,
    job: &DialerJob,
    contacts: &[Contact],
) -> Result<DialerJob, DialerError> {
    let mut job = job.clone();
    job.total_calls = u32::try_from(contacts.len())
        .map_err(|_| DialerError::Internal("contact list too large".into()))?;
    let contacts = contacts.to_vec();
    let campaign_id = job.campaign_id.clone();

    let created = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let existing: Option<String> = tx
                .query_row(
                    &format!(
                        "SELECT id FROM dialer_jobs WHERE campaign_id = ?1 AND status IN ({ACTIVE_STATUSES})"
                    ),
                    params![job.campaign_id],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(existing) = existing {
                return Ok(Err(existing));
            }
            tx.execute(
                &format!(
                    "INSERT INTO dialer_jobs ({JOB_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    job.id,
                    job.campaign_id,
                    job.owner_id,
                    job.status.to_string(),
                    job.total_calls,
                    job.completed_calls,
                    job.successful_calls,
                    job.failed_calls,
                    job.max_concurrent_calls,
                    job.created_at,
                    job.updated_at,
                    job.ended_at,
                ],
            )?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO job_contacts (job_id, position, phone_number) VALUES (?1, ?2, ?3)",
                )?;
                for contact in &contacts {
                    stmt.execute(params![job.id, contact.position, contact.phone_number])?;
                }
            }
            tx.commit()?;
            Ok(Ok(job))
        })
        .await
        .map_err(map_tr_err)?;

    created.map_err(|job_id| DialerError::AlreadyRunning {
        campaign_id,
        job_id,
    })
}

/// Fetch a job by id.
pub async fn get_job(db: &Database, id: &str) -> Result<Option<DialerJob>, DialerError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| fetch_job(conn, &id))
        .await
        .map_err(map_tr_err)
}

/// The campaign's non-terminal job, if any.
pub async fn active_job_for_campaign(
    db: &Database,
    campaign_id: &str,
) -> Result<Option<DialerJob>, DialerError> {
    let campaign_id = campaign_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM dialer_jobs WHERE campaign_id = ?1 AND status IN ({ACTIVE_STATUSES})"
                ),
                params![campaign_id],
                row_to_job,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Every non-terminal job, oldest first.
pub async fn list_active_jobs(db: &Database) -> Result<Vec<DialerJob>, DialerError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM dialer_jobs WHERE status IN ({ACTIVE_STATUSES}) ORDER BY created_at ASC"
            ))?;
            let rows = stmt
                .query_map([], row_to_job)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Move a job to `next`, enforcing the state machine.
///
/// The read and the write share one transaction, so two racing transitions
/// (say a cancel and the loop's completion) cannot both apply.
pub async fn transition_job(
    db: &Database,
    id: &str,
    next: JobStatus,
) -> Result<DialerJob, DialerError> {
    let job_id = id.to_string();
    let result = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let Some(job) = fetch_job(&tx, &job_id)? else {
                return Ok(Err(None));
            };
            if !job.status.can_transition_to(next) {
                return Ok(Err(Some(job.status)));
            }
            let now = now_timestamp();
            let ended_at = next.is_terminal().then(|| now.clone());
            tx.execute(
                "UPDATE dialer_jobs SET status = ?2, updated_at = ?3, ended_at = ?4 WHERE id = ?1",
                params![job_id, next.to_string(), now, ended_at],
            )?;
            tx.commit()?;
            Ok(Ok(DialerJob {
                status: next,
                updated_at: now,
                ended_at,
                ..job
            }))
        })
        .await
        .map_err(map_tr_err)?;

    result.map_err(|current| match current {
        None => DialerError::NotFound {
            entity: "job",
            id: id.to_string(),
        },
        Some(from) => DialerError::InvalidTransition { from, to: next },
    })
}

/// Number of snapshot contacts not yet claimed by an attempt.
pub async fn remaining_contacts(db: &Database, job_id: &str) -> Result<u32, DialerError> {
    let job_id = job_id.to_string();
    db.connection()
        .call(move |conn| {
            let count: u32 = conn.query_row(
                "SELECT COUNT(*) FROM job_contacts WHERE job_id = ?1 AND attempt_id IS NULL",
                params![job_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await
        .map_err(map_tr_err)
}

/// Up to `limit` unclaimed contacts in list order.
pub async fn next_contacts(
    db: &Database,
    job_id: &str,
    limit: usize,
) -> Result<Vec<Contact>, DialerError> {
    let job_id = job_id.to_string();
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT position, phone_number FROM job_contacts \
                 WHERE job_id = ?1 AND attempt_id IS NULL ORDER BY position ASC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![job_id, limit], |row| {
                    Ok(Contact {
                        position: row.get(0)?,
                        phone_number: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn make_job(id: &str, campaign_id: &str) -> DialerJob {
        DialerJob {
            id: id.to_string(),
            campaign_id: campaign_id.to_string(),
            owner_id: "owner-1".to_string(),
            status: JobStatus::Starting,
            total_calls: 0,
            completed_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            max_concurrent_calls: 2,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            updated_at: "2026-01-01T00:00:00.000Z".to_string(),
            ended_at: None,
        }
    }

    fn contacts(n: i64) -> Vec<Contact> {
        (0..n)
            .map(|i| Contact {
                position: i,
                phone_number: format!("+1555000{i:04}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn create_job_snapshots_contacts() {
        let (db, _dir) = setup_db().await;
        let job = create_job(&db, &make_job("job-1", "camp-1"), &contacts(5))
            .await
            .unwrap();
        assert_eq!(job.total_calls, 5);
        assert_eq!(remaining_contacts(&db, "job-1").await.unwrap(), 5);

        let next = next_contacts(&db, "job-1", 2).await.unwrap();
        assert_eq!(next.len(), 2);
        assert_eq!(next[0].position, 0);
        assert_eq!(next[1].position, 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn second_active_job_for_campaign_is_rejected() {
        let (db, _dir) = setup_db().await;
        create_job(&db, &make_job("job-1", "camp-1"), &contacts(1)).await.unwrap();

        let err = create_job(&db, &make_job("job-2", "camp-1"), &contacts(1))
            .await
            .unwrap_err();
        match err {
            DialerError::AlreadyRunning { job_id, .. } => assert_eq!(job_id, "job-1"),
            other => panic!("expected AlreadyRunning, got {other}"),
        }
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn terminal_job_frees_the_campaign() {
        let (db, _dir) = setup_db().await;
        create_job(&db, &make_job("job-1", "camp-1"), &contacts(1)).await.unwrap();
        transition_job(&db, "job-1", JobStatus::Cancelled).await.unwrap();

        create_job(&db, &make_job("job-2", "camp-1"), &contacts(1)).await.unwrap();
        let active = active_job_for_campaign(&db, "camp-1").await.unwrap().unwrap();
        assert_eq!(active.id, "job-2");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn partial_unique_index_backs_the_check() {
        let (db, _dir) = setup_db().await;
        create_job(&db, &make_job("job-1", "camp-1"), &contacts(1)).await.unwrap();

        let result = db
            .connection()
            .call(|conn| {
                conn.execute(
                    "INSERT INTO dialer_jobs (id, campaign_id, owner_id, status, \
                     max_concurrent_calls, created_at, updated_at) \
                     VALUES ('job-x', 'camp-1', 'owner-1', 'running', 1, 'now', 'now')",
                    [],
                )
            })
            .await;
        assert!(result.is_err());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn transitions_follow_state_machine() {
        let (db, _dir) = setup_db().await;
        create_job(&db, &make_job("job-1", "camp-1"), &contacts(1)).await.unwrap();

        let job = transition_job(&db, "job-1", JobStatus::Running).await.unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.ended_at.is_none());

        let job = transition_job(&db, "job-1", JobStatus::Paused).await.unwrap();
        assert_eq!(job.status, JobStatus::Paused);

        let err = transition_job(&db, "job-1", JobStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DialerError::InvalidTransition { from: JobStatus::Paused, to: JobStatus::Completed }
        ));

        let job = transition_job(&db, "job-1", JobStatus::Cancelled).await.unwrap();
        assert!(job.ended_at.is_some());

        // Terminal states have no exits.
        let err = transition_job(&db, "job-1", JobStatus::Running).await.unwrap_err();
        assert!(matches!(err, DialerError::InvalidTransition { .. }));
        let stored = get_job(&db, "job-1").await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Cancelled);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn transition_of_unknown_job_is_not_found() {
        let (db, _dir) = setup_db().await;
        let err = transition_job(&db, "nope", JobStatus::Running).await.unwrap_err();
        assert!(matches!(err, DialerError::NotFound { entity: "job", .. }));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_active_jobs_skips_terminal() {
        let (db, _dir) = setup_db().await;
        create_job(&db, &make_job("job-1", "camp-1"), &contacts(1)).await.unwrap();
        create_job(&db, &make_job("job-2", "camp-2"), &contacts(1)).await.unwrap();
        transition_job(&db, "job-2", JobStatus::Failed).await.unwrap();

        let active = list_active_jobs(&db).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "job-1");
        db.close().await.unwrap();
    }
}
