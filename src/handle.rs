use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use lazy_static::lazy_static;

use crate::connection::Connection;
use crate::error::{GdaError, Result};
use crate::pool;
use crate::recordset::Recordset;

// ── Handle ID counters ────────────────────────────────────────

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_RECORDSET_ID: AtomicU64 = AtomicU64::new(1);

fn next_conn_id() -> u64 {
    NEXT_CONN_ID.fetch_add(1, Ordering::SeqCst)
}

fn next_recordset_id() -> u64 {
    NEXT_RECORDSET_ID.fetch_add(1, Ordering::SeqCst)
}

// ── Global handle maps ───────────────────────────────────────

lazy_static! {
    static ref CONNS: Mutex<HashMap<u64, Arc<Connection>>> = Mutex::new(HashMap::new());
    static ref RECORDSETS: Mutex<HashMap<u64, Arc<RecordsetHandle>>> = Mutex::new(HashMap::new());
}

/// A recordset owned by the C side, with the connection handle it was
/// created from.
pub struct RecordsetHandle {
    pub recordset: Mutex<Recordset>,
    pub conn_id: u64,
}

impl RecordsetHandle {
    pub fn lock(&self) -> std::sync::MutexGuard<'_, Recordset> {
        self.recordset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Connection operations ────────────────────────────────────

pub fn store_conn(conn: Arc<Connection>) -> u64 {
    let id = next_conn_id();
    CONNS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(id, conn);
    id
}

pub fn get_conn(id: u64) -> Result<Arc<Connection>> {
    CONNS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
        .cloned()
        .ok_or_else(|| GdaError::Connection(format!("Connection {id} not found")))
}

pub fn remove_conn(id: u64) -> Option<Arc<Connection>> {
    CONNS.lock().unwrap_or_else(PoisonError::into_inner).remove(&id)
}

/// Remove all connections.
pub fn remove_all_conns() {
    CONNS.lock().unwrap_or_else(PoisonError::into_inner).clear();
}

// ── Recordset operations ─────────────────────────────────────

pub fn store_recordset(recordset: Recordset, conn_id: u64) -> u64 {
    let id = next_recordset_id();
    let handle = Arc::new(RecordsetHandle {
        recordset: Mutex::new(recordset),
        conn_id,
    });
    RECORDSETS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(id, handle);
    id
}

pub fn get_recordset(id: u64) -> Option<Arc<RecordsetHandle>> {
    RECORDSETS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
        .cloned()
}

/// Dropping the last reference closes the recordset.
pub fn remove_recordset(id: u64) -> Option<Arc<RecordsetHandle>> {
    RECORDSETS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id)
}

pub fn remove_all_recordsets() {
    RECORDSETS.lock().unwrap_or_else(PoisonError::into_inner).clear();
}

// ── Diagnostics ──────────────────────────────────────────────

/// Snapshot of all pools, connections and recordsets for diagnostics.
pub fn diagnostic_snapshot() -> serde_json::Value {
    let conn_info: Vec<serde_json::Value> = CONNS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(|(id, conn)| {
            serde_json::json!({
                "id": id,
                "provider": conn.provider_name(),
                "pending_errors": conn.errors().len(),
                "ref_count": Arc::strong_count(conn),
            })
        })
        .collect();

    let handles: Vec<(u64, Arc<RecordsetHandle>)> = RECORDSETS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(|(id, h)| (*id, Arc::clone(h)))
        .collect();

    let recordset_info: Vec<serde_json::Value> = handles
        .iter()
        .map(|(id, handle)| {
            let rs = handle.lock();
            serde_json::json!({
                "id": id,
                "conn_id": handle.conn_id,
                "name": rs.name(),
                "is_open": rs.is_open(),
                "cursor_location": rs.cursor_location().code(),
                "cursor_type": rs.cursor_type().code(),
                "current_index": rs.current_index(),
            })
        })
        .collect();

    serde_json::json!({
        "pools": pool::pool_snapshot(),
        "connections": conn_info,
        "recordsets": recordset_info,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{connection, ScriptedTransport};

    #[test]
    fn recordset_handles_round_trip() {
        let conn = connection(ScriptedTransport::numbered(1));
        let conn_id = store_conn(Arc::clone(&conn));
        let rs_id = store_recordset(conn.new_recordset(), conn_id);

        let handle = get_recordset(rs_id).unwrap();
        assert_eq!(handle.conn_id, conn_id);
        assert!(!handle.lock().is_open());

        let snapshot = diagnostic_snapshot();
        let listed = snapshot["recordsets"]
            .as_array()
            .unwrap()
            .iter()
            .any(|r| r["id"] == rs_id);
        assert!(listed);

        assert!(remove_recordset(rs_id).is_some());
        assert!(get_recordset(rs_id).is_none());
        assert!(remove_conn(conn_id).is_some());
        assert!(get_conn(conn_id).is_err());
    }
}
