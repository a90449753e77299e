use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::path::Path;
use uuid::Uuid;

use crate::reconcile::{PasiRecord, StudentSummaryRecord};

pub const SOURCE_PASI: &str = "pasi";
pub const SOURCE_SUMMARIES: &str = "summaries";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("pasid.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    // One row per delivered snapshot. A missing row means the source never
    // delivered for that year, which is different from a delivered empty
    // snapshot.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS snapshots(
            school_year TEXT NOT NULL,
            source TEXT NOT NULL,
            ingested_at TEXT NOT NULL,
            record_count INTEGER NOT NULL,
            PRIMARY KEY(school_year, source)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS pasi_records(
            school_year TEXT NOT NULL,
            id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            asn TEXT,
            course_code TEXT,
            status TEXT,
            term TEXT,
            exit_date TEXT,
            assignment_date TEXT,
            extra TEXT NOT NULL,
            PRIMARY KEY(school_year, id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_pasi_records_year_sort
         ON pasi_records(school_year, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_summaries(
            school_year TEXT NOT NULL,
            id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            asn TEXT,
            course_id TEXT,
            status TEXT,
            student_type TEXT,
            email TEXT,
            extra TEXT NOT NULL,
            PRIMARY KEY(school_year, id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_summaries_year_sort
         ON student_summaries(school_year, sort_order)",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        None => Ok(None),
        Some(text) => Ok(serde_json::from_str(&text).ok()),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn record_or_new_id(id: &str) -> String {
    let t = id.trim();
    if t.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        t.to_string()
    }
}

fn extra_json(extra: &Map<String, Value>) -> anyhow::Result<String> {
    Ok(serde_json::to_string(&Value::Object(extra.clone()))?)
}

fn parse_extra(raw: &str) -> Map<String, Value> {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default()
}

fn mark_snapshot(
    conn: &Connection,
    school_year: &str,
    source: &str,
    record_count: usize,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO snapshots(school_year, source, ingested_at, record_count)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(school_year, source) DO UPDATE
         SET ingested_at = excluded.ingested_at,
             record_count = excluded.record_count",
        (
            school_year,
            source,
            Utc::now().to_rfc3339(),
            record_count as i64,
        ),
    )?;
    Ok(())
}

pub fn has_snapshot(conn: &Connection, school_year: &str, source: &str) -> anyhow::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM snapshots WHERE school_year = ? AND source = ?",
            (school_year, source),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Full-snapshot replacement: the source pushes whole collections, never
/// deltas, so the previous snapshot is dropped inside the same transaction.
/// Returns the stored records with assigned ids.
pub fn replace_pasi_snapshot(
    conn: &Connection,
    school_year: &str,
    records: &[PasiRecord],
) -> anyhow::Result<Vec<PasiRecord>> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM pasi_records WHERE school_year = ?",
        [school_year],
    )?;
    let mut stored = Vec::with_capacity(records.len());
    for (sort_order, record) in records.iter().enumerate() {
        let mut record = record.clone();
        record.id = record_or_new_id(&record.id);
        record.school_year = Some(school_year.to_string());
        tx.execute(
            "INSERT INTO pasi_records(
                school_year, id, sort_order, asn, course_code, status, term,
                exit_date, assignment_date, extra)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                school_year,
                &record.id,
                sort_order as i64,
                &record.asn,
                &record.course_code,
                &record.status,
                &record.term,
                &record.exit_date,
                &record.assignment_date,
                extra_json(&record.extra)?,
            ),
        )?;
        stored.push(record);
    }
    mark_snapshot(&tx, school_year, SOURCE_PASI, stored.len())?;
    tx.commit()?;
    Ok(stored)
}

pub fn replace_summary_snapshot(
    conn: &Connection,
    school_year: &str,
    records: &[StudentSummaryRecord],
) -> anyhow::Result<Vec<StudentSummaryRecord>> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM student_summaries WHERE school_year = ?",
        [school_year],
    )?;
    let mut stored = Vec::with_capacity(records.len());
    for (sort_order, record) in records.iter().enumerate() {
        let mut record = record.clone();
        record.id = record_or_new_id(&record.id);
        record.school_year = Some(school_year.to_string());
        tx.execute(
            "INSERT INTO student_summaries(
                school_year, id, sort_order, asn, course_id, status,
                student_type, email, extra)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                school_year,
                &record.id,
                sort_order as i64,
                &record.asn,
                &record.course_id,
                &record.status,
                &record.student_type,
                &record.email,
                extra_json(&record.extra)?,
            ),
        )?;
        stored.push(record);
    }
    mark_snapshot(&tx, school_year, SOURCE_SUMMARIES, stored.len())?;
    tx.commit()?;
    Ok(stored)
}

/// `None` means the source never delivered a snapshot for this year.
pub fn load_pasi_records(
    conn: &Connection,
    school_year: &str,
) -> anyhow::Result<Option<Vec<PasiRecord>>> {
    if !has_snapshot(conn, school_year, SOURCE_PASI)? {
        return Ok(None);
    }
    let mut stmt = conn.prepare(
        "SELECT id, asn, course_code, status, term, exit_date, assignment_date, extra
         FROM pasi_records
         WHERE school_year = ?
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map([school_year], |r| {
            Ok(PasiRecord {
                id: r.get(0)?,
                school_year: Some(school_year.to_string()),
                asn: r.get(1)?,
                course_code: r.get(2)?,
                status: r.get(3)?,
                term: r.get(4)?,
                exit_date: r.get(5)?,
                assignment_date: r.get(6)?,
                extra: parse_extra(&r.get::<_, String>(7)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(rows))
}

pub fn load_student_summaries(
    conn: &Connection,
    school_year: &str,
) -> anyhow::Result<Option<Vec<StudentSummaryRecord>>> {
    if !has_snapshot(conn, school_year, SOURCE_SUMMARIES)? {
        return Ok(None);
    }
    let mut stmt = conn.prepare(
        "SELECT id, asn, course_id, status, student_type, email, extra
         FROM student_summaries
         WHERE school_year = ?
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map([school_year], |r| {
            Ok(StudentSummaryRecord {
                id: r.get(0)?,
                school_year: Some(school_year.to_string()),
                asn: r.get(1)?,
                course_id: r.get(2)?,
                status: r.get(3)?,
                student_type: r.get(4)?,
                email: r.get(5)?,
                extra: parse_extra(&r.get::<_, String>(6)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(rows))
}

pub fn clear_year(conn: &Connection, school_year: &str) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM pasi_records WHERE school_year = ?",
        [school_year],
    )?;
    tx.execute(
        "DELETE FROM student_summaries WHERE school_year = ?",
        [school_year],
    )?;
    tx.execute("DELETE FROM snapshots WHERE school_year = ?", [school_year])?;
    tx.commit()?;
    Ok(())
}
