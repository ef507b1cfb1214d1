// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Port state and allocation audit trail.
//!
//! Every status change is a conditional `UPDATE` that commits together with
//! its `port_events` row, so the audit trail never disagrees with the port.

use ringpost_core::types::now_timestamp;
use ringpost_core::{DialerError, Port, PortEvent, PortEventKind, PortStatus};
use rusqlite::{OptionalExtension, params};

use super::jobs::ACTIVE_STATUSES;
use super::parse_column;
use crate::database::{Database, map_tr_err};

const PORT_COLUMNS: &str = "id, owner_id, port_number, device_label, status, \
     current_campaign_id, current_call_id, last_used_at, error_info";

fn row_to_port(row: &rusqlite::Row<'_>) -> rusqlite::Result<Port> {
    let status: String = row.get(4)?;
    Ok(Port {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        port_number: row.get(2)?,
        device_label: row.get(3)?,
        status: parse_column(4, &status)?,
        current_campaign_id: row.get(5)?,
        current_call_id: row.get(6)?,
        last_used_at: row.get(7)?,
        error_info: row.get(8)?,
    })
}

/// Audit row to append alongside a state change.
struct NewEvent<'a> {
    owner_id: &'a str,
    port_number: u32,
    kind: PortEventKind,
    campaign_id: Option<&'a str>,
    call_id: Option<&'a str>,
    call_status: Option<&'a str>,
    code: Option<&'a str>,
    message: Option<&'a str>,
}

impl<'a> NewEvent<'a> {
    fn new(owner_id: &'a str, port_number: u32, kind: PortEventKind) -> Self {
        Self {
            owner_id,
            port_number,
            kind,
            campaign_id: None,
            call_id: None,
            call_status: None,
            code: None,
            message: None,
        }
    }
}

fn insert_event(conn: &rusqlite::Connection, event: &NewEvent<'_>) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO port_events (owner_id, port_number, kind, campaign_id, call_id, \
         call_status, code, message, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            event.owner_id,
            event.port_number,
            event.kind.to_string(),
            event.campaign_id,
            event.call_id,
            event.call_status,
            event.code,
            event.message,
            now_timestamp(),
        ],
    )?;
    Ok(())
}

fn fetch_port(
    conn: &rusqlite::Connection,
    owner_id: &str,
    port_number: u32,
) -> rusqlite::Result<Option<Port>> {
    conn.query_row(
        &format!("SELECT {PORT_COLUMNS} FROM ports WHERE owner_id = ?1 AND port_number = ?2"),
        params![owner_id, port_number],
        row_to_port,
    )
    .optional()
}

/// Why a conditional port update matched no row.
enum Miss {
    NotFound,
    Status(PortStatus),
}

impl Miss {
    fn of(port: Option<Port>) -> Self {
        match port {
            None => Miss::NotFound,
            Some(p) => Miss::Status(p.status),
        }
    }

    fn into_error(self, owner_id: &str, port_number: u32) -> DialerError {
        match self {
            Miss::NotFound => DialerError::PortNotFound {
                owner_id: owner_id.to_string(),
                port_number,
            },
            Miss::Status(status) => DialerError::PortUnavailable {
                port_number,
                status,
            },
        }
    }
}

/// Register a device port, or relabel it if the number is already registered.
pub async fn register_port(
    db: &Database,
    owner_id: &str,
    port_number: u32,
    device_label: &str,
) -> Result<Port, DialerError> {
    let owner_id = owner_id.to_string();
    let device_label = device_label.to_string();
    let id = uuid::Uuid::new_v4().to_string();
    db.connection()
        .call(move |conn| {
            let now = now_timestamp();
            conn.execute(
                "INSERT INTO ports (id, owner_id, port_number, device_label, status, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, 'available', ?5, ?5) \
                 ON CONFLICT (owner_id, port_number) \
                 DO UPDATE SET device_label = excluded.device_label, updated_at = excluded.updated_at",
                params![id, owner_id, port_number, device_label, now],
            )?;
            let port = conn.query_row(
                &format!("SELECT {PORT_COLUMNS} FROM ports WHERE owner_id = ?1 AND port_number = ?2"),
                params![owner_id, port_number],
                row_to_port,
            )?;
            Ok(port)
        })
        .await
        .map_err(map_tr_err)
}

/// Remove a port. A busy port cannot be deregistered.
pub async fn deregister_port(
    db: &Database,
    owner_id: &str,
    port_number: u32,
) -> Result<(), DialerError> {
    let owner = owner_id.to_string();
    let miss = db
        .connection()
        .call(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM ports WHERE owner_id = ?1 AND port_number = ?2 AND status != 'busy'",
                params![owner, port_number],
            )?;
            if deleted == 1 {
                return Ok(None);
            }
            Ok(Some(Miss::of(fetch_port(conn, &owner, port_number)?)))
        })
        .await
        .map_err(map_tr_err)?;
    match miss {
        None => Ok(()),
        Some(miss) => Err(miss.into_error(owner_id, port_number)),
    }
}

/// All ports for an owner, least-recently-used first, ties by port number.
///
/// Ports never used sort before any used port.
pub async fn list_ports(db: &Database, owner_id: &str) -> Result<Vec<Port>, DialerError> {
    let owner_id = owner_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PORT_COLUMNS} FROM ports WHERE owner_id = ?1 \
                 ORDER BY last_used_at IS NOT NULL, last_used_at ASC, port_number ASC"
            ))?;
            let rows = stmt
                .query_map(params![owner_id], row_to_port)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// A single port, if registered.
pub async fn get_port(
    db: &Database,
    owner_id: &str,
    port_number: u32,
) -> Result<Option<Port>, DialerError> {
    let owner_id = owner_id.to_string();
    db.connection()
        .call(move |conn| fetch_port(conn, &owner_id, port_number))
        .await
        .map_err(map_tr_err)
}

/// Number of the owner's ports currently available.
pub async fn count_available(db: &Database, owner_id: &str) -> Result<usize, DialerError> {
    let owner_id = owner_id.to_string();
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM ports WHERE owner_id = ?1 AND status = 'available'",
                params![owner_id],
                |row| row.get(0),
            )?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
        .await
        .map_err(map_tr_err)
}

/// Compare-and-set `available -> busy`, recording an allocation event.
///
/// Of any number of concurrent callers for one port, exactly one gets `Ok`.
pub async fn mark_busy(
    db: &Database,
    owner_id: &str,
    port_number: u32,
    campaign_id: &str,
    call_id: &str,
) -> Result<(), DialerError> {
    let owner = owner_id.to_string();
    let campaign_id = campaign_id.to_string();
    let call_id = call_id.to_string();
    let miss = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let now = now_timestamp();
            let changed = tx.execute(
                "UPDATE ports SET status = 'busy', current_campaign_id = ?3, current_call_id = ?4, \
                 last_used_at = ?5, error_info = NULL, updated_at = ?5 \
                 WHERE owner_id = ?1 AND port_number = ?2 AND status = 'available'",
                params![owner, port_number, campaign_id, call_id, now],
            )?;
            if changed == 0 {
                let port = fetch_port(&tx, &owner, port_number)?;
                return Ok(Some(Miss::of(port)));
            }
            insert_event(
                &tx,
                &NewEvent {
                    campaign_id: Some(&campaign_id),
                    call_id: Some(&call_id),
                    ..NewEvent::new(&owner, port_number, PortEventKind::Allocation)
                },
            )?;
            tx.commit()?;
            Ok(None)
        })
        .await
        .map_err(map_tr_err)?;
    match miss {
        None => Ok(()),
        Some(miss) => Err(miss.into_error(owner_id, port_number)),
    }
}

/// Release a busy port back to available. Returns `false` when the port was
/// not busy (nothing changed).
pub async fn release(
    db: &Database,
    owner_id: &str,
    port_number: u32,
    call_status: Option<&str>,
) -> Result<bool, DialerError> {
    release_where(db, owner_id, port_number, None, call_status).await
}

/// Release a port only while it is still held by `call_id`.
///
/// A late release for a call that no longer owns the port is a no-op.
pub async fn release_call(
    db: &Database,
    owner_id: &str,
    port_number: u32,
    call_id: &str,
    call_status: Option<&str>,
) -> Result<bool, DialerError> {
    release_where(db, owner_id, port_number, Some(call_id), call_status).await
}

async fn release_where(
    db: &Database,
    owner_id: &str,
    port_number: u32,
    call_id: Option<&str>,
    call_status: Option<&str>,
) -> Result<bool, DialerError> {
    let owner = owner_id.to_string();
    let call_id = call_id.map(str::to_string);
    let call_status = call_status.map(str::to_string);
    let outcome = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let Some(port) = fetch_port(&tx, &owner, port_number)? else {
                return Ok(Err(Miss::NotFound));
            };
            let held_by_caller = match &call_id {
                Some(id) => port.current_call_id.as_deref() == Some(id.as_str()),
                None => true,
            };
            if port.status != PortStatus::Busy || !held_by_caller {
                return Ok(Ok(false));
            }
            tx.execute(
                "UPDATE ports SET status = 'available', current_campaign_id = NULL, \
                 current_call_id = NULL, updated_at = ?3 \
                 WHERE owner_id = ?1 AND port_number = ?2 AND status = 'busy'",
                params![owner, port_number, now_timestamp()],
            )?;
            insert_event(
                &tx,
                &NewEvent {
                    campaign_id: port.current_campaign_id.as_deref(),
                    call_id: port.current_call_id.as_deref(),
                    call_status: call_status.as_deref(),
                    ..NewEvent::new(&owner, port_number, PortEventKind::Release)
                },
            )?;
            tx.commit()?;
            Ok(Ok(true))
        })
        .await
        .map_err(map_tr_err)?;
    outcome.map_err(|miss| miss.into_error(owner_id, port_number))
}

/// Unconditionally move a port to `error`, interrupting any call it carried.
pub async fn mark_error(
    db: &Database,
    owner_id: &str,
    port_number: u32,
    code: &str,
    message: &str,
) -> Result<(), DialerError> {
    let owner = owner_id.to_string();
    let code = code.to_string();
    let message = message.to_string();
    let found = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let Some(port) = fetch_port(&tx, &owner, port_number)? else {
                return Ok(false);
            };
            tx.execute(
                "UPDATE ports SET status = 'error', current_campaign_id = NULL, \
                 current_call_id = NULL, error_info = ?3, updated_at = ?4 \
                 WHERE owner_id = ?1 AND port_number = ?2",
                params![owner, port_number, format!("{code}: {message}"), now_timestamp()],
            )?;
            insert_event(
                &tx,
                &NewEvent {
                    campaign_id: port.current_campaign_id.as_deref(),
                    call_id: port.current_call_id.as_deref(),
                    code: Some(&code),
                    message: Some(&message),
                    ..NewEvent::new(&owner, port_number, PortEventKind::Error)
                },
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)?;
    if found {
        Ok(())
    } else {
        Err(DialerError::PortNotFound {
            owner_id: owner_id.to_string(),
            port_number,
        })
    }
}

/// Move every busy or error port of an owner back to available.
///
/// Returns how many ports changed. A second call returns 0.
pub async fn reset_all(db: &Database, owner_id: &str) -> Result<usize, DialerError> {
    let owner = owner_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let affected = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {PORT_COLUMNS} FROM ports \
                     WHERE owner_id = ?1 AND status IN ('busy', 'error')"
                ))?;
                stmt.query_map(params![owner], row_to_port)?
                    .collect::<Result<Vec<_>, _>>()?
            };
            if affected.is_empty() {
                return Ok(0);
            }
            tx.execute(
                "UPDATE ports SET status = 'available', current_campaign_id = NULL, \
                 current_call_id = NULL, error_info = NULL, updated_at = ?2 \
                 WHERE owner_id = ?1 AND status IN ('busy', 'error')",
                params![owner, now_timestamp()],
            )?;
            for port in &affected {
                insert_event(
                    &tx,
                    &NewEvent {
                        campaign_id: port.current_campaign_id.as_deref(),
                        call_id: port.current_call_id.as_deref(),
                        message: Some(&format!("reset from {}", port.status)),
                        ..NewEvent::new(&owner, port.port_number, PortEventKind::Reset)
                    },
                )?;
            }
            tx.commit()?;
            Ok(affected.len())
        })
        .await
        .map_err(map_tr_err)
}

/// Subquery matching an unresolved attempt, belonging to a live job, for `call_id_expr`.
///
/// Attempts left unresolved on a terminal job no longer pin their port.
fn live_attempt_for(call_id_expr: &str) -> String {
    format!(
        "SELECT 1 FROM call_attempts a JOIN dialer_jobs j ON j.id = a.job_id \
         WHERE a.id = {call_id_expr} AND a.ended_at IS NULL \
         AND j.status IN ({ACTIVE_STATUSES})"
    )
}

/// Busy ports (all owners) used before `cutoff` whose current call has no
/// unresolved attempt on a live job.
pub async fn stale_busy_ports(db: &Database, cutoff: &str) -> Result<Vec<Port>, DialerError> {
    let cutoff = cutoff.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PORT_COLUMNS} FROM ports p \
                 WHERE p.status = 'busy' AND p.last_used_at < ?1 \
                 AND NOT EXISTS ({}) \
                 ORDER BY p.owner_id, p.port_number",
                live_attempt_for("p.current_call_id")
            ))?;
            let rows = stmt
                .query_map(params![cutoff], row_to_port)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Reclaim one stale port, re-checking staleness inside the transaction.
///
/// Returns `false` if the port moved on (new call, released, or its attempt
/// is unresolved) since it was listed.
pub async fn reclaim_stale(
    db: &Database,
    owner_id: &str,
    port_number: u32,
    call_id: &str,
    cutoff: &str,
) -> Result<bool, DialerError> {
    let owner = owner_id.to_string();
    let call_id = call_id.to_string();
    let cutoff = cutoff.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let campaign_id: Option<Option<String>> = tx
                .query_row(
                    "SELECT current_campaign_id FROM ports \
                     WHERE owner_id = ?1 AND port_number = ?2 AND status = 'busy' \
                     AND current_call_id = ?3 AND last_used_at < ?4",
                    params![owner, port_number, call_id, cutoff],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(campaign_id) = campaign_id else {
                return Ok(false);
            };
            let changed = tx.execute(
                &format!(
                    "UPDATE ports SET status = 'available', current_campaign_id = NULL, \
                     current_call_id = NULL, updated_at = ?4 \
                     WHERE owner_id = ?1 AND port_number = ?2 AND current_call_id = ?3 \
                     AND NOT EXISTS ({})",
                    live_attempt_for("?3")
                ),
                params![owner, port_number, call_id, now_timestamp()],
            )?;
            if changed == 0 {
                return Ok(false);
            }
            insert_event(
                &tx,
                &NewEvent {
                    campaign_id: campaign_id.as_deref(),
                    call_id: Some(&call_id),
                    code: Some("stale_busy_port"),
                    ..NewEvent::new(&owner, port_number, PortEventKind::WatchdogRelease)
                },
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)
}

/// Audit trail for one port, oldest first.
pub async fn events(
    db: &Database,
    owner_id: &str,
    port_number: u32,
) -> Result<Vec<PortEvent>, DialerError> {
    let owner_id = owner_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, owner_id, port_number, kind, campaign_id, call_id, call_status, \
                 code, message, created_at FROM port_events \
                 WHERE owner_id = ?1 AND port_number = ?2 ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map(params![owner_id, port_number], |row| {
                    let kind: String = row.get(3)?;
                    Ok(PortEvent {
                        id: row.get(0)?,
                        owner_id: row.get(1)?,
                        port_number: row.get(2)?,
                        kind: parse_column(3, &kind)?,
                        campaign_id: row.get(4)?,
                        call_id: row.get(5)?,
                        call_status: row.get(6)?,
                        code: row.get(7)?,
                        message: row.get(8)?,
                        created_at: row.get(9)?,
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

    async fn seed(db: &Database, owner: &str, numbers: &[u32]) {
        for n in numbers {
            register_port(db, owner, *n, &format!("gsm-{n}")).await.unwrap();
        }
    }

    #[tokio::test]
    async fn register_is_idempotent_and_relabels() {
        let (db, _dir) = setup_db().await;
        let first = register_port(&db, "owner-1", 1, "sim-a").await.unwrap();
        let second = register_port(&db, "owner-1", 1, "sim-b").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.device_label, "sim-b");
        assert_eq!(second.status, PortStatus::Available);
        assert_eq!(list_ports(&db, "owner-1").await.unwrap().len(), 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn mark_busy_sets_call_and_records_allocation() {
        let (db, _dir) = setup_db().await;
        seed(&db, "owner-1", &[1]).await;

        mark_busy(&db, "owner-1", 1, "camp-1", "call-1").await.unwrap();

        let port = get_port(&db, "owner-1", 1).await.unwrap().unwrap();
        assert_eq!(port.status, PortStatus::Busy);
        assert_eq!(port.current_call_id.as_deref(), Some("call-1"));
        assert_eq!(port.current_campaign_id.as_deref(), Some("camp-1"));
        assert!(port.last_used_at.is_some());

        let events = events(&db, "owner-1", 1).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, PortEventKind::Allocation);
        assert_eq!(events[0].call_id.as_deref(), Some("call-1"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn mark_busy_on_busy_port_is_unavailable() {
        let (db, _dir) = setup_db().await;
        seed(&db, "owner-1", &[1]).await;
        mark_busy(&db, "owner-1", 1, "camp-1", "call-1").await.unwrap();

        let err = mark_busy(&db, "owner-1", 1, "camp-1", "call-2")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DialerError::PortUnavailable { port_number: 1, status: PortStatus::Busy }
        ));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn mark_busy_on_unknown_port_is_not_found() {
        let (db, _dir) = setup_db().await;
        let err = mark_busy(&db, "owner-1", 9, "camp-1", "call-1")
            .await
            .unwrap_err();
        assert!(matches!(err, DialerError::PortNotFound { port_number: 9, .. }));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn ports_are_scoped_by_owner() {
        let (db, _dir) = setup_db().await;
        seed(&db, "owner-1", &[1]).await;
        let err = mark_busy(&db, "owner-2", 1, "camp-1", "call-1")
            .await
            .unwrap_err();
        assert!(matches!(err, DialerError::PortNotFound { .. }));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_mark_busy_has_exactly_one_winner() {
        let (db, _dir) = setup_db().await;
        seed(&db, "owner-1", &[1]).await;

        let mut handles = Vec::new();
        for i in 0..8 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                mark_busy(&db, "owner-1", 1, "camp-1", &format!("call-{i}")).await
            }));
        }
        let mut wins = 0;
        let mut unavailable = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => wins += 1,
                Err(DialerError::PortUnavailable { .. }) => unavailable += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(unavailable, 7);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn release_then_mark_busy_succeeds() {
        let (db, _dir) = setup_db().await;
        seed(&db, "owner-1", &[1]).await;
        mark_busy(&db, "owner-1", 1, "camp-1", "call-1").await.unwrap();

        assert!(release(&db, "owner-1", 1, Some("answered")).await.unwrap());
        let port = get_port(&db, "owner-1", 1).await.unwrap().unwrap();
        assert_eq!(port.status, PortStatus::Available);
        assert!(port.current_call_id.is_none());
        assert!(port.current_campaign_id.is_none());

        mark_busy(&db, "owner-1", 1, "camp-1", "call-2").await.unwrap();

        let kinds: Vec<_> = events(&db, "owner-1", 1)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                PortEventKind::Allocation,
                PortEventKind::Release,
                PortEventKind::Allocation
            ]
        );
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn release_of_available_port_is_noop() {
        let (db, _dir) = setup_db().await;
        seed(&db, "owner-1", &[1]).await;
        assert!(!release(&db, "owner-1", 1, None).await.unwrap());
        assert!(events(&db, "owner-1", 1).await.unwrap().is_empty());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn release_call_ignores_stale_call_id() {
        let (db, _dir) = setup_db().await;
        seed(&db, "owner-1", &[1]).await;
        mark_busy(&db, "owner-1", 1, "camp-1", "call-1").await.unwrap();
        release(&db, "owner-1", 1, None).await.unwrap();
        mark_busy(&db, "owner-1", 1, "camp-1", "call-2").await.unwrap();

        // A late release for call-1 must not free call-2's port.
        assert!(!release_call(&db, "owner-1", 1, "call-1", Some("failed")).await.unwrap());
        let port = get_port(&db, "owner-1", 1).await.unwrap().unwrap();
        assert_eq!(port.current_call_id.as_deref(), Some("call-2"));

        assert!(release_call(&db, "owner-1", 1, "call-2", Some("failed")).await.unwrap());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn mark_error_interrupts_busy_port() {
        let (db, _dir) = setup_db().await;
        seed(&db, "owner-1", &[1]).await;
        mark_busy(&db, "owner-1", 1, "camp-1", "call-1").await.unwrap();

        mark_error(&db, "owner-1", 1, "sim_missing", "SIM not detected").await.unwrap();
        let port = get_port(&db, "owner-1", 1).await.unwrap().unwrap();
        assert_eq!(port.status, PortStatus::Error);
        assert!(port.current_call_id.is_none());
        assert!(port.error_info.unwrap().contains("SIM not detected"));

        let err = mark_busy(&db, "owner-1", 1, "camp-1", "call-2").await.unwrap_err();
        assert!(matches!(err, DialerError::PortUnavailable { status: PortStatus::Error, .. }));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_orders_least_recently_used_first() {
        let (db, _dir) = setup_db().await;
        seed(&db, "owner-1", &[1, 2, 3]).await;
        mark_busy(&db, "owner-1", 2, "camp-1", "call-a").await.unwrap();
        release(&db, "owner-1", 2, None).await.unwrap();

        let order: Vec<u32> = list_ports(&db, "owner-1")
            .await
            .unwrap()
            .iter()
            .map(|p| p.port_number)
            .collect();
        // Never-used ports first by number, then port 2.
        assert_eq!(order, vec![1, 3, 2]);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reset_all_is_idempotent() {
        let (db, _dir) = setup_db().await;
        seed(&db, "owner-1", &[1, 2, 3]).await;
        mark_busy(&db, "owner-1", 1, "camp-1", "call-1").await.unwrap();
        mark_error(&db, "owner-1", 2, "e", "boom").await.unwrap();

        assert_eq!(reset_all(&db, "owner-1").await.unwrap(), 2);
        let after_first = list_ports(&db, "owner-1").await.unwrap();
        assert_eq!(reset_all(&db, "owner-1").await.unwrap(), 0);
        let after_second = list_ports(&db, "owner-1").await.unwrap();

        assert_eq!(after_first, after_second);
        assert!(after_second.iter().all(|p| p.status == PortStatus::Available));
        assert_eq!(count_available(&db, "owner-1").await.unwrap(), 3);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn deregister_refuses_busy_port() {
        let (db, _dir) = setup_db().await;
        seed(&db, "owner-1", &[1, 2]).await;
        mark_busy(&db, "owner-1", 1, "camp-1", "call-1").await.unwrap();

        let err = deregister_port(&db, "owner-1", 1).await.unwrap_err();
        assert!(matches!(err, DialerError::PortUnavailable { .. }));
        deregister_port(&db, "owner-1", 2).await.unwrap();
        assert!(get_port(&db, "owner-1", 2).await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn stale_port_without_attempt_is_reclaimed() {
        let (db, _dir) = setup_db().await;
        seed(&db, "owner-1", &[1]).await;
        mark_busy(&db, "owner-1", 1, "camp-1", "orphan").await.unwrap();
        db.connection()
            .call(|conn| {
                conn.execute(
                    "UPDATE ports SET last_used_at = '2020-01-01T00:00:00.000Z'",
                    [],
                )?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .unwrap();

        let cutoff = ringpost_core::types::timestamp_secs_ago(60);
        let stale = stale_busy_ports(&db, &cutoff).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert!(reclaim_stale(&db, "owner-1", 1, "orphan", &cutoff).await.unwrap());
        assert!(!reclaim_stale(&db, "owner-1", 1, "orphan", &cutoff).await.unwrap());

        let last = events(&db, "owner-1", 1).await.unwrap().pop().unwrap();
        assert_eq!(last.kind, PortEventKind::WatchdogRelease);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn unresolved_attempt_pins_port_only_while_job_is_live() {
        use crate::queries::{attempts, jobs};
        use ringpost_core::{CallAttempt, CallStatus, Contact, DialerJob, JobStatus};

        let (db, _dir) = setup_db().await;
        seed(&db, "owner-1", &[1]).await;
        let job = DialerJob {
            id: "job-1".to_string(),
            campaign_id: "camp-1".to_string(),
            owner_id: "owner-1".to_string(),
            status: JobStatus::Running,
            total_calls: 0,
            completed_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            max_concurrent_calls: 1,
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
            ended_at: None,
        };
        let contact = Contact {
            position: 0,
            phone_number: "+15550000001".to_string(),
        };
        jobs::create_job(&db, &job, &[contact]).await.unwrap();
        let attempt = CallAttempt {
            id: "call-1".to_string(),
            job_id: "job-1".to_string(),
            port_number: 1,
            phone_number: "+15550000001".to_string(),
            gateway_call_id: Some("leg-1".to_string()),
            status: CallStatus::Initiated,
            outcome: None,
            transfer_requested: false,
            transfer_successful: false,
            duration_seconds: 0,
            started_at: now_timestamp(),
            ended_at: None,
            notes: None,
        };
        assert!(attempts::begin_attempt(&db, &attempt, 0).await.unwrap());
        mark_busy(&db, "owner-1", 1, "camp-1", "call-1").await.unwrap();
        db.connection()
            .call(|conn| {
                conn.execute(
                    "UPDATE ports SET last_used_at = '2020-01-01T00:00:00.000Z'",
                    [],
                )?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .unwrap();
        let cutoff = ringpost_core::types::timestamp_secs_ago(60);

        assert!(stale_busy_ports(&db, &cutoff).await.unwrap().is_empty());
        assert!(!reclaim_stale(&db, "owner-1", 1, "call-1", &cutoff).await.unwrap());

        jobs::transition_job(&db, "job-1", JobStatus::Cancelled).await.unwrap();
        assert_eq!(stale_busy_ports(&db, &cutoff).await.unwrap().len(), 1);
        assert!(reclaim_stale(&db, "owner-1", 1, "call-1", &cutoff).await.unwrap());
        assert_eq!(list_ports(&db, "owner-1").await.unwrap()[0].status, PortStatus::Available);
        db.close().await.unwrap();
    }
}
