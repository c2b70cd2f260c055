//! Decision Archive.
//!
//! Mirrors the in-memory decision history to a local SQLite database so it
//! survives the process.  [`DecisionArchive::store_decision`] writes a
//! record, its transparency entry and the pruning step in one transaction:
//! either all of it lands or none of it does.
//!
//! # Storage layout
//!
//! `decision_records`:
//!
//! | column         | type    | description                                 |
//! |----------------|---------|---------------------------------------------|
//! | seq            | INTEGER | Pipeline decision counter (primary key)     |
//! | sensor_state   | BLOB    | Little-endian f32 vector                    |
//! | action         | BLOB    | Little-endian f32 vector                    |
//! | reward         | REAL    | Environment reward                          |
//! | context        | BLOB    | Little-endian f32 vector                    |
//! | scores         | TEXT    | JSON object of the action-group scores      |
//! | derived_scores | BLOB    | Little-endian f32 × 4, declared field order |
//!
//! `transparency_entries`:
//!
//! | column    | type    | description                          |
//! |-----------|---------|--------------------------------------|
//! | seq       | INTEGER | Pipeline decision counter (primary key) |
//! | id        | TEXT    | UUID v4                              |
//! | timestamp | TEXT    | RFC-3339 creation time (UTC)         |
//! | allowed   | INTEGER | 1 when the gate allowed the action   |
//! | body      | TEXT    | JSON-encoded [`TransparencyEntry`]   |
//!
//! # Example
//!
//! ```rust
//! use ethos_memory::archive::DecisionArchive;
//! use ethos_types::{DecisionRecord, DerivedScores, Head};
//!
//! let archive = DecisionArchive::open_in_memory().unwrap();
//! let record = DecisionRecord {
//!     sensor_state: vec![0.25, -1.0],
//!     action: vec![0.0],
//!     reward: 0.5,
//!     context: vec![],
//!     scores: Head::ACTION_GROUP.into_iter().map(|h| (h, 0.2)).collect(),
//!     derived_scores: DerivedScores::default(),
//! };
//! archive.store_record(1, &record).unwrap();
//!
//! let back = archive.records().unwrap();
//! assert_eq!(back, vec![(1, record)]);
//! ```

use ethos_types::{DecisionRecord, DerivedScores, EthosError, Scores, TransparencyEntry};
use rusqlite::{Connection, Row, params};
use thiserror::Error;
use tracing::debug;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from archive operations.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupt archive row {seq}: {reason}")]
    Corrupt { seq: u64, reason: String },
}

impl From<ArchiveError> for EthosError {
    fn from(e: ArchiveError) -> Self {
        EthosError::Archive(e.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Vector serialisation helpers
// ─────────────────────────────────────────────────────────────────────────────

fn vector_to_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_vector(seq: u64, column: &str, bytes: &[u8]) -> Result<Vec<f32>, ArchiveError> {
    if bytes.len() % 4 != 0 {
        return Err(ArchiveError::Corrupt {
            seq,
            reason: format!("{column} blob is {} bytes, not a whole number of f32s", bytes.len()),
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

// ─────────────────────────────────────────────────────────────────────────────
// Statements
//
// Written against `&Connection` so they run unchanged inside a transaction.
// ─────────────────────────────────────────────────────────────────────────────

fn insert_record(conn: &Connection, seq: u64, record: &DecisionRecord) -> Result<(), ArchiveError> {
    let scores = serde_json::to_string(&record.scores)?;
    conn.execute(
        "INSERT OR REPLACE INTO decision_records
             (seq, sensor_state, action, reward, context, scores, derived_scores)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            seq as i64,
            vector_to_bytes(&record.sensor_state),
            vector_to_bytes(&record.action),
            f64::from(record.reward),
            vector_to_bytes(&record.context),
            scores,
            vector_to_bytes(&record.derived_scores.to_array()),
        ],
    )?;
    Ok(())
}

fn insert_entry(conn: &Connection, entry: &TransparencyEntry) -> Result<(), ArchiveError> {
    let body = serde_json::to_string(entry)?;
    conn.execute(
        "INSERT OR REPLACE INTO transparency_entries (seq, id, timestamp, allowed, body)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            entry.seq as i64,
            entry.id.to_string(),
            entry.timestamp.to_rfc3339(),
            entry.allowed,
            body,
        ],
    )?;
    Ok(())
}

fn prune_tables(conn: &Connection, keep: usize) -> Result<usize, ArchiveError> {
    let keep = keep as i64;
    let mut removed = 0;
    for table in ["decision_records", "transparency_entries"] {
        removed += conn.execute(
            &format!(
                "DELETE FROM {table} WHERE seq NOT IN
                     (SELECT seq FROM {table} ORDER BY seq DESC LIMIT ?1)"
            ),
            params![keep],
        )?;
    }
    debug!(keep, removed, "archive pruned");
    Ok(removed)
}

type RecordRow = (u64, Vec<u8>, Vec<u8>, f64, Vec<u8>, String, Vec<u8>);

fn record_row(row: &Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok((
        row.get::<_, i64>(0)? as u64,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// DecisionArchive
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed mirror of decision records and transparency entries.
pub struct DecisionArchive {
    conn: Connection,
}

impl DecisionArchive {
    /// Open (or create) a persistent SQLite database at `path`.
    pub fn open(path: &str) -> Result<Self, ArchiveError> {
        let conn = Connection::open(path)?;
        let archive = Self { conn };
        archive.init_schema()?;
        Ok(archive)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, ArchiveError> {
        let conn = Connection::open_in_memory()?;
        let archive = Self { conn };
        archive.init_schema()?;
        Ok(archive)
    }

    fn init_schema(&self) -> Result<(), ArchiveError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS decision_records (
                seq            INTEGER NOT NULL PRIMARY KEY,
                sensor_state   BLOB NOT NULL,
                action         BLOB NOT NULL,
                reward         REAL NOT NULL,
                context        BLOB NOT NULL,
                scores         TEXT NOT NULL,
                derived_scores BLOB NOT NULL
            );
            CREATE TABLE IF NOT EXISTS transparency_entries (
                seq       INTEGER NOT NULL PRIMARY KEY,
                id        TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                allowed   INTEGER NOT NULL,
                body      TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Persist `record` under decision number `seq`.
    pub fn store_record(&self, seq: u64, record: &DecisionRecord) -> Result<(), ArchiveError> {
        insert_record(&self.conn, seq, record)
    }

    /// Persist a transparency entry under its own `seq`.
    pub fn store_entry(&self, entry: &TransparencyEntry) -> Result<(), ArchiveError> {
        insert_entry(&self.conn, entry)
    }

    /// Persist one decision atomically: `record` and `entry` under
    /// `entry.seq`, then prune both tables to the newest `keep` rows.
    ///
    /// On error the transaction is rolled back and the archive is unchanged.
    pub fn store_decision(
        &self,
        record: &DecisionRecord,
        entry: &TransparencyEntry,
        keep: usize,
    ) -> Result<usize, ArchiveError> {
        let tx = self.conn.unchecked_transaction()?;
        insert_record(&tx, entry.seq, record)?;
        insert_entry(&tx, entry)?;
        let removed = prune_tables(&tx, keep)?;
        tx.commit()?;
        Ok(removed)
    }

    /// All archived records with their decision numbers, oldest first.
    pub fn records(&self) -> Result<Vec<(u64, DecisionRecord)>, ArchiveError> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, sensor_state, action, reward, context, scores, derived_scores
             FROM decision_records
             ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map([], record_row)?;

        let mut records = Vec::new();
        for row in rows {
            let (seq, sensor, action, reward, context, scores, derived) = row?;
            let scores: Scores = serde_json::from_str(&scores)?;
            let derived = bytes_to_vector(seq, "derived_scores", &derived)?;
            let derived = match *derived.as_slice() {
                [introspection, intent, zealot, war_risk] => DerivedScores {
                    introspection,
                    intent,
                    zealot,
                    war_risk,
                },
                _ => {
                    return Err(ArchiveError::Corrupt {
                        seq,
                        reason: format!("derived_scores holds {} values, expected 4", derived.len()),
                    });
                }
            };
            records.push((
                seq,
                DecisionRecord {
                    sensor_state: bytes_to_vector(seq, "sensor_state", &sensor)?,
                    action: bytes_to_vector(seq, "action", &action)?,
                    reward: reward as f32,
                    context: bytes_to_vector(seq, "context", &context)?,
                    scores,
                    derived_scores: derived,
                },
            ));
        }
        Ok(records)
    }

    /// All archived transparency entries, oldest first.
    pub fn entries(&self) -> Result<Vec<TransparencyEntry>, ArchiveError> {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM transparency_entries ORDER BY seq ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut entries = Vec::new();
        for body in rows {
            entries.push(serde_json::from_str(&body?)?);
        }
        Ok(entries)
    }

    /// Number of archived decisions that were denied.
    pub fn denied_count(&self) -> Result<u64, ArchiveError> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM transparency_entries WHERE allowed = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    /// Highest archived decision number, if any.
    pub fn last_seq(&self) -> Result<Option<u64>, ArchiveError> {
        let seq: Option<i64> = self.conn.query_row(
            "SELECT MAX(seq) FROM (
                 SELECT seq FROM decision_records
                 UNION ALL
                 SELECT seq FROM transparency_entries
             )",
            [],
            |row| row.get(0),
        )?;
        Ok(seq.map(|s| s as u64))
    }

    /// Keep only the newest `keep` rows of each table, mirroring the FIFO
    /// bound of the in-memory stores.  Returns the number of rows removed.
    pub fn prune(&self, keep: usize) -> Result<usize, ArchiveError> {
        prune_tables(&self.conn, keep)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ethos_types::Head;
    use uuid::Uuid;

    fn make_record(tag: f32) -> DecisionRecord {
        DecisionRecord {
            sensor_state: vec![tag, 1.5, -0.25],
            action: vec![0.0, tag],
            reward: tag * 2.0,
            context: vec![42.0],
            scores: Head::ACTION_GROUP
                .into_iter()
                .enumerate()
                .map(|(i, h)| (h, i as f32 * 0.125))
                .collect(),
            derived_scores: DerivedScores {
                introspection: 0.5,
                intent: 0.1,
                zealot: 0.2,
                war_risk: 0.3,
            },
        }
    }

    fn make_entry(seq: u64, allowed: bool) -> TransparencyEntry {
        TransparencyEntry {
            seq,
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            proposed_action: vec![1.0],
            final_action: vec![if allowed { 1.0 } else { 0.0 }],
            allowed,
            denied_by: if allowed { vec![] } else { vec![Head::Hacking] },
            scores: Scores::from([(Head::Hacking, 0.5)]),
            coherence: 0.25,
            intrinsic_state: -0.5,
        }
    }

    // ── vector round-trip ────────────────────────────────────────────────────

    #[test]
    fn vector_bytes_roundtrip() {
        let original = vec![1.5f32, -0.25, 0.0, 42.0];
        assert_eq!(bytes_to_vector(1, "v", &vector_to_bytes(&original)).unwrap(), original);
    }

    #[test]
    fn truncated_vector_blob_is_reported() {
        let archive = DecisionArchive::open_in_memory().unwrap();
        archive.store_record(4, &make_record(1.0)).unwrap();
        archive
            .conn
            .execute(
                "UPDATE decision_records SET sensor_state = ?1 WHERE seq = 4",
                params![vec![0u8; 11]],
            )
            .unwrap();
        let err = archive.records().unwrap_err();
        assert!(
            matches!(err, ArchiveError::Corrupt { seq: 4, ref reason } if reason.contains("sensor_state"))
        );
    }

    // ── records ──────────────────────────────────────────────────────────────

    #[test]
    fn store_and_reload_records_in_order() {
        let archive = DecisionArchive::open_in_memory().unwrap();
        archive.store_record(2, &make_record(2.0)).unwrap();
        archive.store_record(1, &make_record(1.0)).unwrap();

        let all = archive.records().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], (1, make_record(1.0)));
        assert_eq!(all[1], (2, make_record(2.0)));
    }

    #[test]
    fn corrupt_derived_scores_are_reported() {
        let archive = DecisionArchive::open_in_memory().unwrap();
        archive.store_record(5, &make_record(1.0)).unwrap();
        archive
            .conn
            .execute(
                "UPDATE decision_records SET derived_scores = ?1 WHERE seq = 5",
                params![vec![0u8; 8]],
            )
            .unwrap();
        let err = archive.records().unwrap_err();
        assert!(matches!(err, ArchiveError::Corrupt { seq: 5, .. }));
    }

    // ── entries ──────────────────────────────────────────────────────────────

    #[test]
    fn store_and_reload_entries() {
        let archive = DecisionArchive::open_in_memory().unwrap();
        let a = make_entry(1, true);
        let b = make_entry(2, false);
        archive.store_entry(&a).unwrap();
        archive.store_entry(&b).unwrap();

        let all = archive.entries().unwrap();
        assert_eq!(all, vec![a, b]);
        assert_eq!(archive.denied_count().unwrap(), 1);
    }

    #[test]
    fn empty_archive_has_no_last_seq() {
        let archive = DecisionArchive::open_in_memory().unwrap();
        assert_eq!(archive.last_seq().unwrap(), None);
        archive.store_entry(&make_entry(9, true)).unwrap();
        assert_eq!(archive.last_seq().unwrap(), Some(9));
    }

    #[test]
    fn prune_keeps_newest_rows() {
        let archive = DecisionArchive::open_in_memory().unwrap();
        for seq in 1..=5u64 {
            archive.store_record(seq, &make_record(seq as f32)).unwrap();
            archive.store_entry(&make_entry(seq, true)).unwrap();
        }
        let removed = archive.prune(2).unwrap();
        assert_eq!(removed, 6);

        let seqs: Vec<u64> = archive.records().unwrap().into_iter().map(|(s, _)| s).collect();
        assert_eq!(seqs, vec![4, 5]);
        let seqs: Vec<u64> = archive.entries().unwrap().into_iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![4, 5]);
    }

    #[test]
    fn store_decision_writes_record_and_entry_together() {
        let archive = DecisionArchive::open_in_memory().unwrap();
        for seq in 1..=3u64 {
            archive
                .store_decision(&make_record(seq as f32), &make_entry(seq, true), 2)
                .unwrap();
        }
        let seqs: Vec<u64> = archive.records().unwrap().into_iter().map(|(s, _)| s).collect();
        assert_eq!(seqs, vec![2, 3]);
        let seqs: Vec<u64> = archive.entries().unwrap().into_iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![2, 3]);
    }

    #[test]
    fn failed_store_decision_rolls_back() {
        let archive = DecisionArchive::open_in_memory().unwrap();
        archive
            .store_decision(&make_record(1.0), &make_entry(1, true), 10)
            .unwrap();
        archive
            .conn
            .execute_batch("DROP TABLE transparency_entries")
            .unwrap();

        let err = archive
            .store_decision(&make_record(2.0), &make_entry(2, true), 10)
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Sqlite(_)));
        // The record insert ran first and must have been rolled back.
        let seqs: Vec<u64> = archive.records().unwrap().into_iter().map(|(s, _)| s).collect();
        assert_eq!(seqs, vec![1]);
    }

    #[test]
    fn persistent_archive_survives_reopen() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("ethos.db");
        let path = path.to_string_lossy();
        {
            let archive = DecisionArchive::open(&path).unwrap();
            archive.store_record(1, &make_record(3.0)).unwrap();
        }
        let archive = DecisionArchive::open(&path).unwrap();
        assert_eq!(archive.records().unwrap(), vec![(1, make_record(3.0))]);
    }

    #[test]
    fn archive_error_converts_to_ethos_error() {
        let err: EthosError = ArchiveError::Corrupt {
            seq: 3,
            reason: "truncated".to_string(),
        }
        .into();
        assert!(matches!(err, EthosError::Archive(ref msg) if msg.contains("truncated")));
    }
}
