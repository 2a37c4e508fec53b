//! SQLite-based audit log
//!
//! Records who accessed which patient data through the proxy. Rows are
//! append-only: triggers reject UPDATE and DELETE.

use crate::error::Result;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;

pub const DEFAULT_QUERY_LIMIT: usize = 100;
pub const MAX_QUERY_LIMIT: usize = 1000;

/// Entry to be written
#[derive(Debug, Clone, Default)]
pub struct NewAuditEntry {
    pub user_id: String,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub patient_id: Option<String>,
    pub ip_address: Option<String>,
    pub vendor: Option<String>,
}

/// Stored entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub user_id: String,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub patient_id: Option<String>,
    pub ip_address: Option<String>,
    pub vendor: Option<String>,
}

/// Filters for reading the log back
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub patient_id: Option<String>,
    pub user_id: Option<String>,
    pub limit: Option<usize>,
}

/// Audit log
pub struct AuditLog {
    conn: Connection,
}

#[allow(clippy::result_large_err)]
impl AuditLog {
    /// Open the audit log (create if not exists)
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let audit = Self { conn };
        audit.initialize()?;
        Ok(audit)
    }

    fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS audit_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                user_id TEXT NOT NULL,
                action TEXT NOT NULL,
                resource_type TEXT,
                resource_id TEXT,
                patient_id TEXT,
                ip_address TEXT,
                vendor TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_logs(timestamp);
            CREATE INDEX IF NOT EXISTS idx_audit_patient ON audit_logs(patient_id);
            CREATE INDEX IF NOT EXISTS idx_audit_user ON audit_logs(user_id);

            CREATE TRIGGER IF NOT EXISTS audit_logs_no_update
            BEFORE UPDATE ON audit_logs
            BEGIN
                SELECT RAISE(ABORT, 'audit_logs is append-only');
            END;

            CREATE TRIGGER IF NOT EXISTS audit_logs_no_delete
            BEFORE DELETE ON audit_logs
            BEGIN
                SELECT RAISE(ABORT, 'audit_logs is append-only');
            END;
            "#,
        )?;

        Ok(())
    }

    /// Append an entry, returning its row id
    pub fn record(&self, entry: &NewAuditEntry) -> Result<i64> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        self.conn.execute(
            r#"
            INSERT INTO audit_logs
            (timestamp, user_id, action, resource_type, resource_id,
             patient_id, ip_address, vendor)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                timestamp,
                entry.user_id,
                entry.action,
                entry.resource_type,
                entry.resource_id,
                entry.patient_id,
                entry.ip_address,
                entry.vendor,
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent entries first, optionally filtered by patient or user
    pub fn recent(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>> {
        let limit = query
            .limit
            .unwrap_or(DEFAULT_QUERY_LIMIT)
            .clamp(1, MAX_QUERY_LIMIT);

        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, timestamp, user_id, action, resource_type,
                   resource_id, patient_id, ip_address, vendor
            FROM audit_logs
            WHERE (?1 IS NULL OR patient_id = ?1)
              AND (?2 IS NULL OR user_id = ?2)
            ORDER BY id DESC
            LIMIT ?3
            "#,
        )?;

        let rows = stmt.query_map(
            params![query.patient_id, query.user_id, limit as i64],
            row_to_entry,
        )?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }

        Ok(entries)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEntry> {
    Ok(AuditEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        user_id: row.get(2)?,
        action: row.get(3)?,
        resource_type: row.get(4)?,
        resource_id: row.get(5)?,
        patient_id: row.get(6)?,
        ip_address: row.get(7)?,
        vendor: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(user: &str, patient: &str, action: &str) -> NewAuditEntry {
        NewAuditEntry {
            user_id: user.to_string(),
            action: action.to_string(),
            resource_type: Some("DiagnosticReport".to_string()),
            resource_id: Some("r1".to_string()),
            patient_id: Some(patient.to_string()),
            ip_address: Some("127.0.0.1".to_string()),
            vendor: Some("epic".to_string()),
        }
    }

    #[test]
    fn test_record_and_read_back() {
        let audit = AuditLog::open(":memory:").unwrap();
        let id = audit.record(&entry("provider@example.com", "p1", "view")).unwrap();

        let stored = audit.recent(&AuditQuery::default()).unwrap().remove(0);
        assert_eq!(stored.id, id);
        assert_eq!(stored.user_id, "provider@example.com");
        assert_eq!(stored.action, "view");
        assert_eq!(stored.patient_id.as_deref(), Some("p1"));
        assert_eq!(stored.vendor.as_deref(), Some("epic"));
        assert!(stored.timestamp.ends_with('Z'));
    }

    #[test]
    fn test_recent_filters_and_orders() {
        let audit = AuditLog::open(":memory:").unwrap();
        audit.record(&entry("alice", "p1", "search")).unwrap();
        audit.record(&entry("bob", "p2", "read")).unwrap();
        audit.record(&entry("alice", "p2", "download")).unwrap();

        let all = audit.recent(&AuditQuery::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].action, "download");

        let p2 = audit
            .recent(&AuditQuery {
                patient_id: Some("p2".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(p2.len(), 2);

        let alice_p2 = audit
            .recent(&AuditQuery {
                patient_id: Some("p2".to_string()),
                user_id: Some("alice".to_string()),
                limit: Some(10),
            })
            .unwrap();
        assert_eq!(alice_p2.len(), 1);
        assert_eq!(alice_p2[0].action, "download");

        let limited = audit
            .recent(&AuditQuery {
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_entries_are_immutable() {
        let audit = AuditLog::open(":memory:").unwrap();
        let id = audit.record(&entry("alice", "p1", "view")).unwrap();

        let update = audit
            .conn
            .execute("UPDATE audit_logs SET user_id = 'mallory' WHERE id = ?1", params![id]);
        assert!(update.is_err());

        let delete = audit
            .conn
            .execute("DELETE FROM audit_logs WHERE id = ?1", params![id]);
        assert!(delete.is_err());

        let stored = audit.recent(&AuditQuery::default()).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].user_id, "alice");
    }

    #[test]
    fn test_reopen_file_keeps_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.sqlite");
        {
            let audit = AuditLog::open(&path).unwrap();
            audit.record(&entry("alice", "p1", "view")).unwrap();
        }
        let audit = AuditLog::open(&path).unwrap();
        assert_eq!(audit.recent(&AuditQuery::default()).unwrap().len(), 1);
    }
}
