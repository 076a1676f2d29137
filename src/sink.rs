use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::SinkError;
use crate::registry::InsuranceRegistry;
use crate::violation::{PaymentStatus, ViolationKind, ViolationRecord, WriteAction};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one primary write plus its optional expired-insurance row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReceipt {
    pub action: WriteAction,
    pub row_id: i64,
    pub expired_insurance_row: Option<i64>,
}

/// A row read back from the `violations` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredViolation {
    pub id: i64,
    pub track_id: i64,
    pub speed: f64,
    pub plate: Option<String>,
    pub timestamp: String,
    pub frame_number: i64,
    pub status: String,
    pub violation_type: String,
}

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS violations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            track_id INTEGER,
            speed REAL,
            plate TEXT,
            timestamp TEXT,
            frame_number INTEGER,
            status TEXT,
            violation_type TEXT
        )",
        [],
    )?;
    Ok(())
}

/// Open a store connection, creating the table if needed.
pub fn open_store(path: impl AsRef<Path>) -> Result<Connection, SinkError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// All rows in id order.
pub fn fetch_all(conn: &Connection) -> Result<Vec<StoredViolation>, SinkError> {
    let mut stmt = conn.prepare(
        "SELECT id, track_id, speed, plate, timestamp, frame_number, status, violation_type
         FROM violations ORDER BY id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(StoredViolation {
                id: row.get(0)?,
                track_id: row.get(1)?,
                speed: row.get(2)?,
                plate: row.get(3)?,
                timestamp: row.get(4)?,
                frame_number: row.get(5)?,
                status: row.get(6)?,
                violation_type: row.get(7)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn insert_row(tx: &Transaction<'_>, record: &ViolationRecord, kind: ViolationKind) -> rusqlite::Result<i64> {
    tx.execute(
        "INSERT INTO violations (track_id, speed, plate, timestamp, frame_number, status, violation_type)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            record.track_id,
            record.speed,
            record.plate,
            record.timestamp,
            record.frame_number as i64,
            record.status.as_str(),
            kind.as_str(),
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

/// Persists violation records and the derived expired-insurance rows.
///
/// Row ids of primary records are remembered per `(track_id, kind)` for the
/// life of the sink, so updates only ever touch rows written by this session.
pub struct ViolationSink {
    conn: Connection,
    registry: InsuranceRegistry,
    rows: HashMap<(u32, ViolationKind), i64>,
}

impl ViolationSink {
    pub fn new(conn: Connection, registry: InsuranceRegistry) -> Result<Self, SinkError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        init_schema(&conn)?;
        Ok(ViolationSink {
            conn,
            registry,
            rows: HashMap::new(),
        })
    }

    pub fn open(path: impl AsRef<Path>, registry: InsuranceRegistry) -> Result<Self, SinkError> {
        Self::new(Connection::open(path)?, registry)
    }

    pub fn in_memory(registry: InsuranceRegistry) -> Result<Self, SinkError> {
        Self::new(Connection::open_in_memory()?, registry)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn registry(&self) -> &InsuranceRegistry {
        &self.registry
    }

    /// Append a new primary row.
    pub fn insert(&mut self, record: &ViolationRecord) -> Result<WriteReceipt, SinkError> {
        self.write(record, false)
    }

    /// Update the row previously written for `(track_id, kind)` when the
    /// ledger says one exists, otherwise insert.
    pub fn upsert(&mut self, record: &ViolationRecord, logged: bool) -> Result<WriteReceipt, SinkError> {
        self.write(record, logged)
    }

    fn write(&mut self, record: &ViolationRecord, update: bool) -> Result<WriteReceipt, SinkError> {
        let key = (record.track_id, record.kind);
        let existing = if update {
            let row = self.rows.get(&key).copied();
            if row.is_none() {
                warn!(
                    track_id = record.track_id,
                    kind = %record.kind,
                    "no row remembered for logged violation; inserting"
                );
            }
            row
        } else {
            None
        };

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let updated = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE violations
                     SET plate = ?1, speed = ?2, timestamp = ?3, frame_number = ?4, status = ?5
                     WHERE id = ?6",
                    params![
                        record.plate,
                        record.speed,
                        record.timestamp,
                        record.frame_number as i64,
                        record.status.as_str(),
                        id,
                    ],
                )? == 1
            }
            None => false,
        };
        let (action, row_id) = match existing {
            Some(id) if updated => (WriteAction::Upgraded, id),
            _ => (WriteAction::Inserted, insert_row(&tx, record, record.kind)?),
        };

        let expired_insurance_row = if self.registry.contains(&record.plate) {
            Some(insert_row(&tx, record, ViolationKind::ExpiredInsurance)?)
        } else {
            None
        };
        tx.commit()?;

        self.rows.insert(key, row_id);
        info!(
            track_id = record.track_id,
            kind = %record.kind,
            plate = %record.plate,
            row_id,
            ?action,
            "violation persisted"
        );
        if let Some(row) = expired_insurance_row {
            info!(track_id = record.track_id, plate = %record.plate, row, "expired insurance recorded");
        }
        Ok(WriteReceipt {
            action,
            row_id,
            expired_insurance_row,
        })
    }

    pub fn count(&self, kind: ViolationKind) -> Result<usize, SinkError> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM violations WHERE violation_type = ?1",
            params![kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}

/// A fresh unpaid record.
pub fn unpaid_record(
    track_id: u32,
    kind: ViolationKind,
    speed: f64,
    plate: String,
    frame_number: u64,
    timestamp: String,
) -> ViolationRecord {
    ViolationRecord {
        track_id,
        speed,
        plate,
        timestamp,
        frame_number,
        status: PaymentStatus::Unpaid,
        kind,
    }
}

/// Local wall-clock time in the stored format.
pub fn now_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
