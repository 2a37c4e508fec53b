//! CSRF `state` bookkeeping for the authorization-code flow

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use connectehr_core::Vendor;
use connectehr_store::SqliteStateStore;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::ApiError;

/// Pending authorization requests, consumed exactly once by the callback
pub trait StateStore: Send + Sync {
    /// Create and remember a fresh state for `vendor`
    fn issue(&self, vendor: Vendor, client_ip: Option<&str>) -> Result<String, ApiError>;

    /// Consume `state`; [`ApiError::InvalidState`] when it is unknown,
    /// expired, already used or was issued for another vendor.
    fn consume(&self, vendor: Vendor, state: &str) -> Result<(), ApiError>;
}

/// 256 bits of randomness, base64url without padding
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

struct Pending {
    vendor: Vendor,
    issued_at: Instant,
}

/// Process-local store. Only correct for a single proxy instance.
pub struct MemoryStateStore {
    ttl: Duration,
    pending: Mutex<HashMap<String, Pending>>,
}

impl MemoryStateStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Pending>>, ApiError> {
        self.pending
            .lock()
            .map_err(|_| ApiError::Internal("OAuth state store poisoned".to_string()))
    }
}

impl StateStore for MemoryStateStore {
    fn issue(&self, vendor: Vendor, _client_ip: Option<&str>) -> Result<String, ApiError> {
        let state = generate_state();
        let mut pending = self.lock()?;
        let ttl = self.ttl;
        pending.retain(|_, p| p.issued_at.elapsed() <= ttl);
        pending.insert(
            state.clone(),
            Pending {
                vendor,
                issued_at: Instant::now(),
            },
        );
        Ok(state)
    }

    fn consume(&self, vendor: Vendor, state: &str) -> Result<(), ApiError> {
        let mut pending = self.lock()?;
        match pending.get(state) {
            Some(p) if p.vendor == vendor => {
                let fresh = p.issued_at.elapsed() <= self.ttl;
                pending.remove(state);
                if fresh {
                    Ok(())
                } else {
                    Err(ApiError::InvalidState)
                }
            }
            _ => Err(ApiError::InvalidState),
        }
    }
}

/// SQLite-backed store shared by every instance using the same database file
pub struct SharedStateStore {
    ttl_secs: i64,
    inner: Mutex<SqliteStateStore>,
}

impl SharedStateStore {
    pub fn new(store: SqliteStateStore, ttl: Duration) -> Self {
        Self {
            ttl_secs: ttl.as_secs() as i64,
            inner: Mutex::new(store),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SqliteStateStore>, ApiError> {
        self.inner
            .lock()
            .map_err(|_| ApiError::Internal("OAuth state store poisoned".to_string()))
    }
}

impl StateStore for SharedStateStore {
    fn issue(&self, vendor: Vendor, client_ip: Option<&str>) -> Result<String, ApiError> {
        let state = generate_state();
        let now = chrono::Utc::now().timestamp();
        let store = self.lock()?;
        let purged = store.purge_expired(now, self.ttl_secs)?;
        if purged > 0 {
            tracing::debug!(purged, "Purged expired OAuth states");
        }
        store.insert(&state, vendor, client_ip, now)?;
        Ok(state)
    }

    fn consume(&self, vendor: Vendor, state: &str) -> Result<(), ApiError> {
        let now = chrono::Utc::now().timestamp();
        match self.lock()?.take(state, vendor, now, self.ttl_secs)? {
            Some(_) => Ok(()),
            None => Err(ApiError::InvalidState),
        }
    }
}
