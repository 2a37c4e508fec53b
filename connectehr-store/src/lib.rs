pub mod error;
pub mod oauth_state;
pub mod sqlite_audit;

pub use error::{Result, StoreError};
pub use oauth_state::{PendingState, SqliteStateStore};
pub use sqlite_audit::{AuditEntry, AuditLog, AuditQuery, NewAuditEntry};
