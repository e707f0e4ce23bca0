// The gda_* functions in this file are #[no_mangle] extern "C" FFI entry points.
// Raw pointer parameters (*const c_char) come from the host runtime and are
// either null or valid null-terminated C strings. The unsafe dereference in
// read_cstr() is the standard pattern for receiving strings across FFI boundaries.
#![allow(clippy::not_unsafe_ptr_arg_deref)]

pub mod command;
pub mod config;
pub mod connection;
pub mod debug;
pub mod error;
pub mod field;
pub mod handle;
pub mod operation;
pub mod pool;
pub mod provider;
pub mod query;
pub mod recordset;
pub mod registry;
pub mod row_store;
pub mod transport;
pub mod value;

#[cfg(test)]
mod testing;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::OnceLock;

use serde::Deserialize;
use tokio::runtime::Runtime;

pub use command::{Command, CommandType, Param};
pub use config::{ConnectionConfig, RecordsetDefaults};
pub use connection::Connection;
pub use error::{ErrorRecord, GdaError, Result};
pub use field::Field;
pub use operation::{ColumnSpec, ServerOperation};
pub use provider::Provider;
pub use recordset::{Bookmark, CursorLocation, CursorType, LockType, Recordset, INVALID_POSITION};
pub use registry::{ConstraintKind, SchemaKind, StatementRegistry};
pub use transport::{ColumnDescriptor, Executed, StatementId, Transport};
pub use value::{FieldType, Value};

use command::SerializedCommand;

/// Returned by the gda_recordset_move* functions when a move fails.
pub const GDA_RECORDSET_INVALID_POSITION: u64 = INVALID_POSITION;

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Runtime driving the async SQL Server client.
pub(crate) fn rt() -> &'static Runtime {
    RUNTIME.get_or_init(|| {
        debug::init();
        debug::debug_log!("Tokio runtime initialized");
        Runtime::new().expect("Failed to create tokio runtime")
    })
}

unsafe fn read_cstr<'a>(ptr: *const c_char) -> &'a str {
    if ptr.is_null() {
        return "";
    }
    CStr::from_ptr(ptr).to_str().unwrap_or("")
}

fn to_cstring(s: &str) -> *mut c_char {
    CString::new(s).unwrap_or_default().into_raw()
}

fn position(result: Result<u64>) -> u64 {
    result.unwrap_or(INVALID_POSITION)
}

fn status(result: Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

/// Run `f` on recordset `id`, or return `missing` when there is none.
fn with_recordset<T>(id: u64, missing: T, f: impl FnOnce(&mut Recordset) -> T) -> T {
    match handle::get_recordset(id) {
        Some(h) => f(&mut h.lock()),
        None => {
            debug::debug_log!("Recordset {} not found", id);
            missing
        }
    }
}

// ══════════════════════════════════════════════════════════════
// Connection FFI
// ══════════════════════════════════════════════════════════════

#[no_mangle]
pub extern "C" fn gda_connection_open(config_json: *const c_char) -> u64 {
    debug::init();
    let json = unsafe { read_cstr(config_json) };
    let result = ConnectionConfig::from_json(json).and_then(|config| Connection::open(&config));
    match result {
        Ok(conn) => {
            let id = handle::store_conn(conn);
            debug::debug_log!("Connection opened: id={}", id);
            id
        }
        Err(e) => {
            eprintln!("[gdacursor] Connection open failed: {e}");
            0
        }
    }
}

#[no_mangle]
pub extern "C" fn gda_connection_close(conn_id: u64) {
    debug::debug_log!("Closing connection {}", conn_id);
    // recordsets keep their own reference until freed
    handle::remove_conn(conn_id);
}

/// Drain the connection's error list as a JSON array.
#[no_mangle]
pub extern "C" fn gda_connection_errors(conn_id: u64) -> *mut c_char {
    match handle::get_conn(conn_id) {
        Ok(conn) => {
            let errors = conn.take_errors();
            to_cstring(&serde_json::to_string(&errors).unwrap_or_else(|_| "[]".into()))
        }
        Err(_) => std::ptr::null_mut(),
    }
}

fn parse_operation(conn: &Connection, op_json: *const c_char) -> Result<ServerOperation> {
    let json = unsafe { read_cstr(op_json) };
    ServerOperation::from_json(json).inspect_err(|e| conn.add_error(e, "operation"))
}

#[no_mangle]
pub extern "C" fn gda_connection_render_operation(conn_id: u64, op_json: *const c_char) -> *mut c_char {
    let Ok(conn) = handle::get_conn(conn_id) else {
        return std::ptr::null_mut();
    };
    match parse_operation(&conn, op_json).and_then(|op| conn.render_operation(&op)) {
        Ok(sql) => to_cstring(&sql),
        Err(_) => std::ptr::null_mut(),
    }
}

#[no_mangle]
pub extern "C" fn gda_connection_perform_operation(conn_id: u64, op_json: *const c_char) -> i64 {
    let Ok(conn) = handle::get_conn(conn_id) else {
        return -1;
    };
    parse_operation(&conn, op_json)
        .and_then(|op| conn.perform_operation(&op))
        .unwrap_or(-1)
}

#[derive(Deserialize)]
struct SchemaRequest {
    kind: SchemaKind,
    #[serde(default)]
    constraints: Vec<SchemaConstraint>,
}

#[derive(Deserialize)]
struct SchemaConstraint {
    kind: ConstraintKind,
    value: serde_json::Value,
}

impl SchemaRequest {
    fn constraints(&self) -> Result<Vec<(ConstraintKind, Value)>> {
        self.constraints
            .iter()
            .map(|c| Ok((c.kind, Value::from_json(&c.value, None)?)))
            .collect()
    }
}

/// Open a schema recordset described by `{"kind": ..., "constraints": [...]}`.
#[no_mangle]
pub extern "C" fn gda_connection_open_schema(conn_id: u64, req_json: *const c_char) -> u64 {
    let Ok(conn) = handle::get_conn(conn_id) else {
        return 0;
    };
    let json = unsafe { read_cstr(req_json) };
    let result = serde_json::from_str::<SchemaRequest>(json)
        .map_err(|e| GdaError::Command(format!("Invalid schema request JSON: {e}")))
        .and_then(|req| req.constraints().map(|c| (req.kind, c)))
        .inspect_err(|e| conn.add_error(e, "open_schema"))
        .and_then(|(kind, constraints)| conn.open_schema(kind, &constraints));
    match result {
        Ok(rs) => handle::store_recordset(rs, conn_id),
        Err(_) => 0,
    }
}

/// Open a command in a new recordset; returns its handle or 0.
#[no_mangle]
pub extern "C" fn gda_connection_execute(conn_id: u64, cmd_json: *const c_char) -> u64 {
    let Ok(conn) = handle::get_conn(conn_id) else {
        return 0;
    };
    let json = unsafe { read_cstr(cmd_json) };
    let result = SerializedCommand::from_json(json)
        .and_then(SerializedCommand::into_command)
        .inspect_err(|e| conn.add_error(e, "execute"))
        .and_then(|cmd| conn.execute(&cmd));
    match result {
        Ok(rs) => handle::store_recordset(rs, conn_id),
        Err(_) => 0,
    }
}

fn transaction_name<'a>(name: *const c_char) -> Option<&'a str> {
    Some(unsafe { read_cstr(name) }).filter(|n| !n.is_empty())
}

#[no_mangle]
pub extern "C" fn gda_connection_begin_transaction(conn_id: u64, name: *const c_char) -> i32 {
    match handle::get_conn(conn_id) {
        Ok(conn) => status(conn.begin_transaction(transaction_name(name))),
        Err(_) => -1,
    }
}

#[no_mangle]
pub extern "C" fn gda_connection_commit_transaction(conn_id: u64, name: *const c_char) -> i32 {
    match handle::get_conn(conn_id) {
        Ok(conn) => status(conn.commit_transaction(transaction_name(name))),
        Err(_) => -1,
    }
}

#[no_mangle]
pub extern "C" fn gda_connection_rollback_transaction(conn_id: u64, name: *const c_char) -> i32 {
    match handle::get_conn(conn_id) {
        Ok(conn) => status(conn.rollback_transaction(transaction_name(name))),
        Err(_) => -1,
    }
}

// ══════════════════════════════════════════════════════════════
// Recordset FFI
// ══════════════════════════════════════════════════════════════

#[no_mangle]
pub extern "C" fn gda_recordset_new(conn_id: u64) -> u64 {
    match handle::get_conn(conn_id) {
        Ok(conn) => handle::store_recordset(conn.new_recordset(), conn_id),
        Err(e) => {
            debug::debug_log!("gda_recordset_new: {}", e);
            0
        }
    }
}

#[no_mangle]
pub extern "C" fn gda_recordset_free(rs_id: u64) {
    debug::debug_log!("Freeing recordset {}", rs_id);
    handle::remove_recordset(rs_id);
}

fn open_codes(cursor_type: u32, lock_type: u32) -> Result<(CursorType, LockType)> {
    let ct = CursorType::from_code(cursor_type)
        .ok_or_else(|| GdaError::Unsupported(format!("cursor type {cursor_type}")))?;
    let lt = LockType::from_code(lock_type)
        .ok_or_else(|| GdaError::Unsupported(format!("lock type {lock_type}")))?;
    Ok((ct, lt))
}

#[no_mangle]
pub extern "C" fn gda_recordset_open(
    rs_id: u64,
    cmd_json: *const c_char,
    cursor_type: u32,
    lock_type: u32,
) -> i32 {
    let json = unsafe { read_cstr(cmd_json) };
    with_recordset(rs_id, -1, |rs| {
        let result = open_codes(cursor_type, lock_type).and_then(|(ct, lt)| {
            let cmd = SerializedCommand::from_json(json)?.into_command()?;
            rs.open(&cmd, ct, lt)
        });
        if let Err(ref e) = result {
            debug::debug_log!("gda_recordset_open: {}", e);
        }
        status(result)
    })
}

#[no_mangle]
pub extern "C" fn gda_recordset_open_txt(
    rs_id: u64,
    text: *const c_char,
    cursor_type: u32,
    lock_type: u32,
) -> i32 {
    let text = unsafe { read_cstr(text) };
    with_recordset(rs_id, -1, |rs| {
        status(open_codes(cursor_type, lock_type).and_then(|(ct, lt)| rs.open_text(text, ct, lt)))
    })
}

#[no_mangle]
pub extern "C" fn gda_recordset_close(rs_id: u64) {
    with_recordset(rs_id, (), |rs| rs.close());
}

#[no_mangle]
pub extern "C" fn gda_recordset_move(rs_id: u64, count: i64) -> u64 {
    with_recordset(rs_id, INVALID_POSITION, |rs| position(rs.move_by(count, None)))
}

#[no_mangle]
pub extern "C" fn gda_recordset_move_first(rs_id: u64) -> u64 {
    with_recordset(rs_id, INVALID_POSITION, |rs| position(rs.move_first()))
}

#[no_mangle]
pub extern "C" fn gda_recordset_move_last(rs_id: u64) -> u64 {
    with_recordset(rs_id, INVALID_POSITION, |rs| position(rs.move_last()))
}

#[no_mangle]
pub extern "C" fn gda_recordset_move_next(rs_id: u64) -> u64 {
    with_recordset(rs_id, INVALID_POSITION, |rs| position(rs.move_next()))
}

#[no_mangle]
pub extern "C" fn gda_recordset_move_prev(rs_id: u64) -> u64 {
    with_recordset(rs_id, INVALID_POSITION, |rs| position(rs.move_prev()))
}

#[no_mangle]
pub extern "C" fn gda_recordset_bof(rs_id: u64) -> u32 {
    with_recordset(rs_id, 1, |rs| rs.bof() as u32)
}

#[no_mangle]
pub extern "C" fn gda_recordset_eof(rs_id: u64) -> u32 {
    with_recordset(rs_id, 1, |rs| rs.eof() as u32)
}

#[no_mangle]
pub extern "C" fn gda_recordset_is_open(rs_id: u64) -> u32 {
    with_recordset(rs_id, 0, |rs| rs.is_open() as u32)
}

#[no_mangle]
pub extern "C" fn gda_recordset_rowsize(rs_id: u64) -> i32 {
    with_recordset(rs_id, -1, |rs| rs.rowsize().map_or(-1, |n| n as i32))
}

#[no_mangle]
pub extern "C" fn gda_recordset_affected_rows(rs_id: u64) -> i64 {
    with_recordset(rs_id, -1, |rs| rs.affected_rows())
}

#[no_mangle]
pub extern "C" fn gda_recordset_field_idx(rs_id: u64, idx: u32) -> *mut c_char {
    with_recordset(rs_id, std::ptr::null_mut(), |rs| match rs.field(idx as usize) {
        Ok(field) => to_cstring(&field.to_json().to_string()),
        Err(_) => std::ptr::null_mut(),
    })
}

#[no_mangle]
pub extern "C" fn gda_recordset_field_name(rs_id: u64, name: *const c_char) -> *mut c_char {
    let name = unsafe { read_cstr(name) };
    with_recordset(rs_id, std::ptr::null_mut(), |rs| match rs.field_by_name(name) {
        Ok(field) => to_cstring(&field.to_json().to_string()),
        Err(_) => std::ptr::null_mut(),
    })
}

/// The current row as a JSON object keyed by column name.
#[no_mangle]
pub extern "C" fn gda_recordset_row(rs_id: u64) -> *mut c_char {
    with_recordset(rs_id, std::ptr::null_mut(), |rs| match rs.fields() {
        Ok(fields) => {
            let mut map = serde_json::Map::new();
            for field in fields {
                map.insert(field.name().to_string(), field.value().to_json());
            }
            to_cstring(&serde_json::Value::Object(map).to_string())
        }
        Err(_) => std::ptr::null_mut(),
    })
}

#[no_mangle]
pub extern "C" fn gda_recordset_add_field(rs_id: u64, column_json: *const c_char) -> i32 {
    let json = unsafe { read_cstr(column_json) };
    with_recordset(rs_id, -1, |rs| {
        let result = serde_json::from_str::<ColumnDescriptor>(json)
            .map_err(|e| GdaError::Command(format!("Invalid column JSON: {e}")))
            .and_then(|column| rs.add_field(column));
        if let Err(ref e) = result {
            debug::debug_log!("gda_recordset_add_field: {}", e);
        }
        status(result)
    })
}

#[no_mangle]
pub extern "C" fn gda_recordset_get_cursorloc(rs_id: u64) -> u32 {
    with_recordset(rs_id, u32::MAX, |rs| rs.cursor_location().code())
}

#[no_mangle]
pub extern "C" fn gda_recordset_set_cursorloc(rs_id: u64, location: u32) -> i32 {
    with_recordset(rs_id, -1, |rs| match CursorLocation::from_code(location) {
        Some(loc) => status(rs.set_cursor_location(loc)),
        None => -1,
    })
}

#[no_mangle]
pub extern "C" fn gda_recordset_get_cursortype(rs_id: u64) -> u32 {
    with_recordset(rs_id, u32::MAX, |rs| rs.cursor_type().code())
}

#[no_mangle]
pub extern "C" fn gda_recordset_set_cursortype(rs_id: u64, cursor_type: u32) -> i32 {
    with_recordset(rs_id, -1, |rs| match CursorType::from_code(cursor_type) {
        Some(ct) => status(rs.set_cursor_type(ct)),
        None => -1,
    })
}

// ══════════════════════════════════════════════════════════════
// Process FFI
// ══════════════════════════════════════════════════════════════

#[no_mangle]
pub extern "C" fn gda_diagnostic_info() -> *mut c_char {
    let snapshot = handle::diagnostic_snapshot();
    to_cstring(&snapshot.to_string())
}

#[no_mangle]
pub extern "C" fn gda_set_debug(enabled: u32) {
    debug::set_debug(enabled != 0);
}

#[no_mangle]
pub extern "C" fn gda_close_all() {
    debug::debug_log!("Closing all handles");
    handle::remove_all_recordsets();
    handle::remove_all_conns();
    pool::remove_all_pools();
}

#[no_mangle]
pub extern "C" fn gda_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            drop(CString::from_raw(ptr));
        }
    }
}
