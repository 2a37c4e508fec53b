//! Pending OAuth `state` values shared through SQLite
//!
//! Every proxy process pointed at the same file sees the same pending
//! authorization requests, so the callback may land on any instance.

use crate::error::{Result, StoreError};
use connectehr_core::Vendor;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// A pending authorization request
#[derive(Debug, Clone, PartialEq)]
pub struct PendingState {
    pub state: String,
    pub vendor: Vendor,
    pub client_ip: Option<String>,
    pub created_at: i64,
}

pub struct SqliteStateStore {
    conn: Connection,
}

#[allow(clippy::result_large_err)]
impl SqliteStateStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS oauth_state (
                state TEXT PRIMARY KEY,
                vendor TEXT NOT NULL,
                client_ip TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;
        Ok(Self { conn })
    }

    pub fn insert(
        &self,
        state: &str,
        vendor: Vendor,
        client_ip: Option<&str>,
        now: i64,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO oauth_state (state, vendor, client_ip, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![state, vendor.as_str(), client_ip, now],
        )?;
        Ok(())
    }

    /// Remove and return a pending state for `vendor`.
    ///
    /// A state issued for another vendor is left in place. Expired rows are
    /// deleted and reported as absent.
    pub fn take(
        &self,
        state: &str,
        vendor: Vendor,
        now: i64,
        ttl_secs: i64,
    ) -> Result<Option<PendingState>> {
        let row = self
            .conn
            .query_row(
                "SELECT state, vendor, client_ip, created_at FROM oauth_state WHERE state = ?1 AND vendor = ?2",
                params![state, vendor.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((state, vendor_str, client_ip, created_at)) = row else {
            return Ok(None);
        };

        let deleted = self
            .conn
            .execute("DELETE FROM oauth_state WHERE state = ?1", params![state])?;
        // Another instance consumed it between the select and the delete
        if deleted == 0 {
            return Ok(None);
        }

        if now - created_at > ttl_secs {
            return Ok(None);
        }

        let vendor = vendor_str.parse().map_err(|_| StoreError::InvalidValue {
            column: "vendor",
            value: vendor_str.clone(),
        })?;

        Ok(Some(PendingState {
            state,
            vendor,
            client_ip,
            created_at,
        }))
    }

    /// Drop every state older than the TTL, returning how many were removed
    pub fn purge_expired(&self, now: i64, ttl_secs: i64) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM oauth_state WHERE created_at < ?1",
            params![now - ttl_secs],
        )?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_is_single_use() {
        let store = SqliteStateStore::open(":memory:").unwrap();
        store.insert("s1", Vendor::Cerner, Some("10.0.0.1"), 1000).unwrap();

        let pending = store.take("s1", Vendor::Cerner, 1010, 600).unwrap().unwrap();
        assert_eq!(pending.vendor, Vendor::Cerner);
        assert_eq!(pending.client_ip.as_deref(), Some("10.0.0.1"));

        assert!(store.take("s1", Vendor::Cerner, 1011, 600).unwrap().is_none());
    }

    #[test]
    fn test_take_other_vendor_leaves_state() {
        let store = SqliteStateStore::open(":memory:").unwrap();
        store.insert("s1", Vendor::Epic, None, 1000).unwrap();

        assert!(store.take("s1", Vendor::Cerner, 1001, 600).unwrap().is_none());
        assert!(store.take("s1", Vendor::Epic, 1002, 600).unwrap().is_some());
    }

    #[test]
    fn test_expired_state_is_rejected_and_removed() {
        let store = SqliteStateStore::open(":memory:").unwrap();
        store.insert("old", Vendor::Epic, None, 1000).unwrap();
        assert!(store.take("old", Vendor::Epic, 2000, 600).unwrap().is_none());
        assert!(store.take("old", Vendor::Epic, 1001, 600).unwrap().is_none());
    }

    #[test]
    fn test_purge_expired() {
        let store = SqliteStateStore::open(":memory:").unwrap();
        store.insert("a", Vendor::Epic, None, 100).unwrap();
        store.insert("b", Vendor::Epic, None, 900).unwrap();
        assert_eq!(store.purge_expired(1000, 600).unwrap(), 1);
        assert!(store.take("b", Vendor::Epic, 1000, 600).unwrap().is_some());
    }

    #[test]
    fn test_shared_between_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.sqlite");
        let first = SqliteStateStore::open(&path).unwrap();
        let second = SqliteStateStore::open(&path).unwrap();

        first.insert("shared", Vendor::Epic, None, 5).unwrap();
        assert!(second.take("shared", Vendor::Epic, 6, 600).unwrap().is_some());
        assert!(first.take("shared", Vendor::Epic, 7, 600).unwrap().is_none());
    }
}
