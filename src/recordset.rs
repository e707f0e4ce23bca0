use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::command::Command;
use crate::config::DEFAULT_CACHE_SIZE;
use crate::connection::Connection;
use crate::debug::debug_log;
use crate::error::{GdaError, Result};
use crate::field::Field;
use crate::row_store::{Row, RowStore};
use crate::transport::{ColumnDescriptor, StatementId};

/// Position returned across the C ABI when a move fails.
pub const INVALID_POSITION: u64 = u64::MAX;

/// Where fetched rows live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorLocation {
    /// Every fetched row is kept; revisiting a row needs no round trip.
    #[default]
    Client,
    /// Only the last fetched chunk is kept; moves re-home the remote cursor.
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorType {
    #[default]
    ForwardOnly,
    Scrollable,
}

/// Requested locking. Stored for callers; the engine is read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockType {
    #[default]
    ReadOnly,
    Pessimistic,
    Optimistic,
}

/// Reserved repositioning handle. Accepted by `move_by` and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bookmark(pub i64);

impl CursorLocation {
    pub fn code(self) -> u32 {
        match self {
            CursorLocation::Client => 0,
            CursorLocation::Server => 1,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(CursorLocation::Client),
            1 => Some(CursorLocation::Server),
            _ => None,
        }
    }
}

impl CursorType {
    pub fn code(self) -> u32 {
        match self {
            CursorType::ForwardOnly => 0,
            CursorType::Scrollable => 1,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(CursorType::ForwardOnly),
            1 => Some(CursorType::Scrollable),
            _ => None,
        }
    }
}

impl LockType {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(LockType::ReadOnly),
            1 => Some(LockType::Pessimistic),
            2 => Some(LockType::Optimistic),
            _ => None,
        }
    }
}

/// A cursor over the result of a command.
///
/// Positions are 1-based; 0 is "before the first row". In client mode
/// every fetched row stays in the row store, so moving back inside the
/// fetched range never touches the transport. In server mode the store
/// holds only the chunk of the last fetch, which is why a [`Field`]
/// borrows the recordset: the next move needs `&mut self` and so ends
/// every field obtained before it.
///
/// A recordset is reusable: `close` returns it to the closed state and
/// a later `open` starts over.
pub struct Recordset {
    connection: Option<Arc<Connection>>,
    statement: Option<StatementId>,
    columns: Option<Vec<ColumnDescriptor>>,
    store: RowStore,
    current_index: i64,
    max_index: i64,
    bof: bool,
    eof: bool,
    open: bool,
    cursor_location: CursorLocation,
    cursor_type: CursorType,
    lock_type: LockType,
    cache_size: usize,
    max_rows: usize,
    affected_rows: i64,
    name: Option<String>,
}

impl fmt::Debug for Recordset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recordset")
            .field("name", &self.name)
            .field("open", &self.open)
            .field("cursor_location", &self.cursor_location)
            .field("cursor_type", &self.cursor_type)
            .field("current_index", &self.current_index)
            .field("max_index", &self.max_index)
            .field("bof", &self.bof)
            .field("eof", &self.eof)
            .finish_non_exhaustive()
    }
}

impl Default for Recordset {
    fn default() -> Self {
        Self::new()
    }
}

impl Recordset {
    pub fn new() -> Self {
        Self {
            connection: None,
            statement: None,
            columns: None,
            store: RowStore::new(),
            current_index: 0,
            max_index: 0,
            bof: true,
            eof: true,
            open: false,
            cursor_location: CursorLocation::Client,
            cursor_type: CursorType::ForwardOnly,
            lock_type: LockType::ReadOnly,
            cache_size: DEFAULT_CACHE_SIZE,
            max_rows: 0,
            affected_rows: 0,
            name: None,
        }
    }

    pub fn with_connection(connection: Arc<Connection>) -> Self {
        let mut rs = Self::new();
        rs.connection = Some(connection);
        rs
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Execute `command` and describe its columns. Per-open state is
    /// cleared before the command runs, so a failed open leaves the
    /// recordset closed and empty.
    pub fn open(&mut self, command: &Command, cursor_type: CursorType, lock_type: LockType) -> Result<()> {
        if self.open {
            debug_log!("open: recordset is already open");
            return Err(GdaError::AlreadyOpen);
        }
        self.reset();
        self.cursor_type = cursor_type;
        self.lock_type = lock_type;

        let Some(conn) = self.connection.clone() else {
            debug_log!("open: recordset has no connection");
            return Err(GdaError::NoConnection);
        };

        let executed = conn.call("execute", |t| t.execute(command))?;
        let columns = match conn.call("describe", |t| t.describe(executed.statement)) {
            Ok(columns) => columns,
            Err(e) => {
                let _ = conn.call("close", |t| t.close(executed.statement));
                return Err(e);
            }
        };

        debug_log!(
            "open: {} columns, {} affected rows, {:?}/{:?}",
            columns.len(),
            executed.affected_rows,
            self.cursor_location,
            self.cursor_type
        );

        self.statement = Some(executed.statement);
        self.columns = Some(columns);
        self.affected_rows = executed.affected_rows;
        self.open = true;
        Ok(())
    }

    /// `open` with a plain text command.
    pub fn open_text(&mut self, text: &str, cursor_type: CursorType, lock_type: LockType) -> Result<()> {
        self.open(&Command::text(text), cursor_type, lock_type)
    }

    /// Release the remote statement and every fetched row. Closing a
    /// closed recordset does nothing.
    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        if let (Some(conn), Some(statement)) = (&self.connection, self.statement.take()) {
            let _ = conn.call("close", |t| t.close(statement));
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.open = false;
        self.statement = None;
        self.columns = None;
        self.store = RowStore::with_capacity(self.cache_size);
        self.current_index = 0;
        self.max_index = 0;
        self.bof = true;
        self.eof = true;
        self.affected_rows = 0;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// True when not positioned on data, including when closed.
    pub fn bof(&self) -> bool {
        !self.open || self.bof || self.store.row_at(self.current_index).is_none()
    }

    /// True when closed or past the last row.
    pub fn eof(&self) -> bool {
        !self.open || self.eof
    }

    // ── Movement ─────────────────────────────────────────────────

    /// Move `count` rows from the current position and return the new one.
    ///
    /// A zero count, or a backward move on a forward-only cursor, leaves
    /// everything unchanged. In client mode a forward move that runs off
    /// the end is not an error: it stops on the last row with `eof` set.
    /// `bookmark` is reserved.
    pub fn move_by(&mut self, count: i64, bookmark: Option<Bookmark>) -> Result<u64> {
        let _ = bookmark;
        if !self.open {
            debug_log!("move: recordset is not open");
            return Err(GdaError::NotOpen);
        }
        if count == 0 || (self.cursor_type == CursorType::ForwardOnly && count < 0) {
            return Ok(self.position());
        }
        match self.cursor_location {
            CursorLocation::Client => self.fetch_and_store(count),
            CursorLocation::Server => self.fetch_and_dont_store(count),
        }
    }

    pub fn move_next(&mut self) -> Result<u64> {
        self.move_by(1, None)
    }

    pub fn move_prev(&mut self) -> Result<u64> {
        self.move_by(-1, None)
    }

    /// Go to the first row. With rows cached on the client this is local.
    pub fn move_first(&mut self) -> Result<u64> {
        if !self.open {
            debug_log!("move_first: recordset is not open");
            return Err(GdaError::NotOpen);
        }
        match self.cursor_location {
            CursorLocation::Client if self.store.is_empty() => self.move_by(1, None),
            CursorLocation::Client => {
                self.current_index = 1;
                self.bof = false;
                self.eof = false;
                Ok(1)
            }
            CursorLocation::Server => self.fetch_remote_at(1, 1),
        }
    }

    /// Step forward one row at a time until the end and stay on the last row.
    pub fn move_last(&mut self) -> Result<u64> {
        if !self.open {
            debug_log!("move_last: recordset is not open");
            return Err(GdaError::NotOpen);
        }
        loop {
            let before = self.current_index;
            match self.move_by(1, None) {
                Ok(_) if self.eof || self.current_index == before => break,
                Ok(_) => {}
                Err(GdaError::InvalidPosition) if self.eof => break,
                Err(e) => return Err(e),
            }
        }
        if self.store.row_at(self.current_index).is_some() {
            self.eof = false;
            self.bof = false;
        }
        Ok(self.position())
    }

    fn position(&self) -> u64 {
        self.current_index.max(0) as u64
    }

    /// Client mode: serve the target from the cache or fetch the missing
    /// rows one at a time after the last fetched row.
    fn fetch_and_store(&mut self, count: i64) -> Result<u64> {
        // an overflowing move fetches until the end of the set
        let target = self.current_index.saturating_add(count);

        if target >= 0 && target <= self.max_index {
            self.current_index = target;
            self.bof = target == 0;
            self.eof = false;
            return Ok(self.position());
        }

        if target < 0 {
            self.bof = true;
            self.eof = false;
            return Ok(self.position());
        }

        let (conn, statement) = self.bound()?;
        for _ in 0..(target - self.max_index) {
            if self.max_rows > 0 && self.max_index >= self.max_rows as i64 {
                debug_log!("fetch: max_rows {} reached", self.max_rows);
                return Ok(self.stop_at_end());
            }
            match conn.call("fetch", |t| t.fetch(statement, 1)) {
                Ok(rows) if rows.is_empty() => return Ok(self.stop_at_end()),
                Ok(rows) => {
                    self.max_index += rows.len() as i64;
                    self.store.append(rows);
                    self.current_index = self.max_index;
                    self.bof = false;
                    self.eof = false;
                }
                // already recorded on the connection
                Err(_) => return Ok(self.position()),
            }
        }
        Ok(self.position())
    }

    fn stop_at_end(&mut self) -> u64 {
        self.current_index = self.max_index;
        self.eof = true;
        self.bof = self.max_index == 0;
        self.position()
    }

    /// Server mode: re-home the remote cursor at the target and fetch
    /// `|count|` rows into a buffer that replaces the previous one.
    fn fetch_and_dont_store(&mut self, count: i64) -> Result<u64> {
        let Some(target) = self.current_index.checked_add(count) else {
            debug_log!("move: {} rows from {} is past the end", count, self.current_index);
            self.mark_past_end();
            return Err(GdaError::InvalidPosition);
        };
        self.fetch_remote_at(target, count.unsigned_abs() as usize)
    }

    /// Flag `eof` without moving. `bof` then only holds when no row is current.
    fn mark_past_end(&mut self) {
        self.eof = true;
        self.bof = self.store.row_at(self.current_index).is_none();
    }

    fn fetch_remote_at(&mut self, target: i64, rows: usize) -> Result<u64> {
        if target < 1 {
            debug_log!("move: target {} is before the first row", target);
            self.bof = true;
            self.eof = false;
            return Err(GdaError::InvalidPosition);
        }
        let (conn, statement) = self.bound()?;
        conn.call("move", |t| t.move_absolute(statement, target as u64))?;
        let chunk = conn.call("fetch", |t| t.fetch(statement, rows))?;
        if chunk.is_empty() {
            debug_log!("move: no row at {}", target);
            self.mark_past_end();
            return Err(GdaError::InvalidPosition);
        }
        self.store.reset_at(target);
        self.store.append(chunk);
        self.current_index = target;
        self.bof = false;
        self.eof = false;
        Ok(self.position())
    }

    fn bound(&self) -> Result<(Arc<Connection>, StatementId)> {
        match (&self.connection, self.statement) {
            (Some(conn), Some(statement)) => Ok((Arc::clone(conn), statement)),
            (None, _) => Err(GdaError::NoConnection),
            (_, None) => Err(GdaError::NotOpen),
        }
    }

    // ── Fields ───────────────────────────────────────────────────

    /// Number of columns. Known right after `open`, before any fetch.
    pub fn rowsize(&self) -> Result<usize> {
        if !self.open {
            return Err(GdaError::NotOpen);
        }
        Ok(self.columns.as_ref().map_or(0, Vec::len))
    }

    pub fn affected_rows(&self) -> i64 {
        self.affected_rows
    }

    pub fn current_index(&self) -> i64 {
        self.current_index
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        self.columns.as_deref().unwrap_or(&[])
    }

    pub fn column(&self, index: usize) -> Result<&ColumnDescriptor> {
        self.columns()
            .get(index)
            .ok_or(GdaError::FieldOutOfRange(index))
    }

    pub fn column_by_name(&self, name: &str) -> Result<&ColumnDescriptor> {
        let index = self.column_index(name)?;
        self.column(index)
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.columns()
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| GdaError::FieldNotFound(name.to_string()))
    }

    fn current_row(&self) -> Result<&Row> {
        if !self.open {
            debug_log!("field: recordset is not open");
            return Err(GdaError::NotOpen);
        }
        if self.bof || self.eof {
            debug_log!("field: no current row");
            return Err(GdaError::NoCurrentRow);
        }
        self.store.row_at(self.current_index).ok_or_else(|| {
            debug_log!("field: no row at {}", self.current_index);
            GdaError::NoCurrentRow
        })
    }

    /// Field `index` of the current row.
    pub fn field(&self, index: usize) -> Result<Field<'_>> {
        let row = self.current_row()?;
        let column = self.column(index).inspect_err(|_| {
            debug_log!("field: index {} out of range", index);
        })?;
        Ok(Field::new(column, row.get(index), index))
    }

    /// Field of the current row whose column name matches, ignoring case.
    pub fn field_by_name(&self, name: &str) -> Result<Field<'_>> {
        let row = self.current_row()?;
        let index = self.column_index(name).inspect_err(|_| {
            debug_log!("field: no column named {}", name);
        })?;
        Ok(Field::new(&self.columns()[index], row.get(index), index))
    }

    /// Every field of the current row, in column order.
    pub fn fields(&self) -> Result<Vec<Field<'_>>> {
        let row = self.current_row()?;
        Ok(self
            .columns()
            .iter()
            .enumerate()
            .map(|(i, column)| Field::new(column, row.get(i), i))
            .collect())
    }

    /// Append a column descriptor. Only allowed before any row is fetched.
    pub fn add_field(&mut self, column: ColumnDescriptor) -> Result<()> {
        if !self.store.is_empty() {
            debug_log!("add_field: rows already fetched");
            return Err(GdaError::Unsupported(
                "fields cannot be added after rows are fetched".into(),
            ));
        }
        let columns = self.columns.get_or_insert_with(Vec::new);
        if columns.iter().any(|c| c.name.eq_ignore_ascii_case(&column.name)) {
            return Err(GdaError::DuplicateField(column.name));
        }
        columns.push(column);
        Ok(())
    }

    // ── Settings ─────────────────────────────────────────────────

    pub fn cursor_location(&self) -> CursorLocation {
        self.cursor_location
    }

    pub fn set_cursor_location(&mut self, location: CursorLocation) -> Result<()> {
        self.ensure_closed()?;
        self.cursor_location = location;
        Ok(())
    }

    pub fn cursor_type(&self) -> CursorType {
        self.cursor_type
    }

    pub fn set_cursor_type(&mut self, cursor_type: CursorType) -> Result<()> {
        self.ensure_closed()?;
        self.cursor_type = cursor_type;
        Ok(())
    }

    pub fn lock_type(&self) -> LockType {
        self.lock_type
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    pub fn set_cache_size(&mut self, cache_size: usize) -> Result<()> {
        self.ensure_closed()?;
        self.cache_size = cache_size.max(1);
        Ok(())
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// Cap on rows fetched in client mode; 0 means no cap.
    pub fn set_max_rows(&mut self, max_rows: usize) {
        self.max_rows = max_rows;
    }

    /// The connection, while open.
    pub fn connection(&self) -> Option<&Arc<Connection>> {
        if self.open {
            self.connection.as_ref()
        } else {
            None
        }
    }

    pub fn set_connection(&mut self, connection: Arc<Connection>) -> Result<()> {
        self.ensure_closed()?;
        self.connection = Some(connection);
        Ok(())
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    fn ensure_closed(&self) -> Result<()> {
        if self.open {
            debug_log!("recordset settings cannot change while open");
            return Err(GdaError::AlreadyOpen);
        }
        Ok(())
    }
}

impl Drop for Recordset {
    fn drop(&mut self) {
        self.close();
    }
}
