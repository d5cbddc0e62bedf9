use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::batch::RunStatus;
use crate::model::EventRecord;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating database directory {}", dir.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("opening database {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runs (
            id                INTEGER PRIMARY KEY,
            started_at        TEXT,
            finished_at       TEXT,
            artists_total     INTEGER NOT NULL,
            artists_processed INTEGER NOT NULL,
            artists_failed    INTEGER NOT NULL,
            concerts_found    INTEGER NOT NULL,
            unique_venues     INTEGER NOT NULL,
            stopped           BOOLEAN NOT NULL DEFAULT 0,
            created_at        TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS events (
            id            INTEGER PRIMARY KEY,
            run_id        INTEGER NOT NULL REFERENCES runs(id),
            position      INTEGER NOT NULL,
            entity_name   TEXT NOT NULL,
            venue_name    TEXT NOT NULL,
            venue_address TEXT NOT NULL,
            event_date    TEXT NOT NULL,
            UNIQUE(run_id, venue_name, event_date)
        );
        CREATE INDEX IF NOT EXISTS idx_events_run ON events(run_id);
        CREATE INDEX IF NOT EXISTS idx_events_venue ON events(venue_name);

        CREATE TABLE IF NOT EXISTS run_errors (
            id      INTEGER PRIMARY KEY,
            run_id  INTEGER NOT NULL REFERENCES runs(id),
            message TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_run_errors_run ON run_errors(run_id);
        ",
    )?;
    Ok(())
}

// ── Runs ──

/// Store a finished run with its records and errors. Returns the new run id.
pub fn save_run(conn: &Connection, status: &RunStatus, records: &[EventRecord]) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    let run_id;
    {
        tx.execute(
            "INSERT INTO runs
             (started_at, finished_at, artists_total, artists_processed, artists_failed,
              concerts_found, unique_venues, stopped)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                status.started_at.map(|t| t.to_rfc3339()),
                status.finished_at.map(|t| t.to_rfc3339()),
                status.artists_total as i64,
                status.artists_processed as i64,
                status.artists_failed as i64,
                status.concerts_found as i64,
                status.unique_venues as i64,
                status.stop_requested,
            ],
        )?;
        run_id = tx.last_insert_rowid();

        let mut e_stmt = tx.prepare(
            "INSERT OR IGNORE INTO events
             (run_id, position, entity_name, venue_name, venue_address, event_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for (i, r) in records.iter().enumerate() {
            e_stmt.execute(params![
                run_id,
                i as i64,
                r.entity_name(),
                r.venue_name(),
                r.venue_address(),
                r.event_date(),
            ])?;
        }

        let mut err_stmt = tx.prepare("INSERT INTO run_errors (run_id, message) VALUES (?1, ?2)")?;
        for msg in &status.errors {
            err_stmt.execute(params![run_id, msg])?;
        }
    }
    tx.commit()?;
    Ok(run_id)
}

pub struct RunRow {
    pub id: i64,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub artists_total: i64,
    pub artists_processed: i64,
    pub artists_failed: i64,
    pub concerts_found: i64,
    pub unique_venues: i64,
    pub stopped: bool,
    pub error_count: i64,
}

/// Most recent first.
pub fn fetch_runs(conn: &Connection, limit: usize) -> Result<Vec<RunRow>> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.started_at, r.finished_at, r.artists_total, r.artists_processed,
                r.artists_failed, r.concerts_found, r.unique_venues, r.stopped,
                (SELECT COUNT(*) FROM run_errors e WHERE e.run_id = r.id)
         FROM runs r
         ORDER BY r.id DESC
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok(RunRow {
                id: row.get(0)?,
                started_at: row.get(1)?,
                finished_at: row.get(2)?,
                artists_total: row.get(3)?,
                artists_processed: row.get(4)?,
                artists_failed: row.get(5)?,
                concerts_found: row.get(6)?,
                unique_venues: row.get(7)?,
                stopped: row.get(8)?,
                error_count: row.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Records of one run in their original order.
pub fn fetch_events(conn: &Connection, run_id: i64) -> Result<Vec<EventRecord>> {
    let mut stmt = conn.prepare(
        "SELECT entity_name, venue_name, venue_address, event_date
         FROM events WHERE run_id = ?1 ORDER BY position",
    )?;
    let rows = stmt
        .query_map([run_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows
        .iter()
        .filter_map(|(entity, venue, address, date)| {
            EventRecord::new(entity, venue, Some(address), Some(date))
        })
        .collect())
}

pub fn fetch_errors(conn: &Connection, run_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT message FROM run_errors WHERE run_id = ?1 ORDER BY id")?;
    let rows = stmt
        .query_map([run_id], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn run_exists(conn: &Connection, run_id: i64) -> Result<bool> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM runs WHERE id = ?1", [run_id], |row| {
        row.get(0)
    })?;
    Ok(n > 0)
}
