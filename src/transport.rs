use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::error::{GdaError, Result};
use crate::row_store::Row;
use crate::value::FieldType;

/// Identifies an executed statement on a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatementId(pub u64);

/// Column metadata reported when a statement is described.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub defined_size: u32,
    #[serde(default)]
    pub scale: u32,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            defined_size: 0,
            scale: 0,
            nullable: true,
        }
    }

    pub fn with_size(mut self, defined_size: u32) -> Self {
        self.defined_size = defined_size;
        self
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }
}

/// Result of executing a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Executed {
    pub statement: StatementId,
    /// Rows reported by the server, or -1 when unknown.
    pub affected_rows: i64,
}

/// The remote side of a connection: executes commands and serves their
/// rows. Calls block until the remote round trip completes.
pub trait Transport: Send {
    /// Run `command`, leaving its result positioned before the first row.
    fn execute(&mut self, command: &Command) -> Result<Executed>;

    /// Run a command for its side effects and return the affected row count.
    fn execute_non_query(&mut self, command: &Command) -> Result<i64> {
        let executed = self.execute(command)?;
        self.close(executed.statement)?;
        Ok(executed.affected_rows)
    }

    /// Start a transaction, optionally named.
    fn begin_transaction(&mut self, name: Option<&str>) -> Result<()> {
        let _ = name;
        Err(GdaError::Unsupported("transactions".into()))
    }

    fn commit_transaction(&mut self, name: Option<&str>) -> Result<()> {
        let _ = name;
        Err(GdaError::Unsupported("transactions".into()))
    }

    fn rollback_transaction(&mut self, name: Option<&str>) -> Result<()> {
        let _ = name;
        Err(GdaError::Unsupported("transactions".into()))
    }

    fn describe(&mut self, statement: StatementId) -> Result<Vec<ColumnDescriptor>>;

    /// Fetch up to `count` rows from the statement's position. An empty
    /// result means the end of the set was reached.
    fn fetch(&mut self, statement: StatementId, count: usize) -> Result<Vec<Row>>;

    /// Position the statement so the next fetch starts at 1-based row `index`.
    fn move_absolute(&mut self, statement: StatementId, index: u64) -> Result<()>;

    /// Release the statement. Unfetched rows are discarded.
    fn close(&mut self, statement: StatementId) -> Result<()>;
}

/// A result held entirely by the transport and handed out in chunks.
#[derive(Debug, Default)]
pub struct BufferedResult {
    columns: Vec<ColumnDescriptor>,
    rows: Vec<Row>,
    /// 0-based index of the next row to fetch.
    position: usize,
}

impl BufferedResult {
    pub fn new(columns: Vec<ColumnDescriptor>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            position: 0,
        }
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Up to `count` rows from the current position; empty at the end.
    pub fn fetch(&mut self, count: usize) -> Vec<Row> {
        let start = self.position.min(self.rows.len());
        let end = start.saturating_add(count).min(self.rows.len());
        self.position = end;
        self.rows[start..end].to_vec()
    }

    /// Make 1-based row `index` the next one fetched.
    pub fn seek(&mut self, index: u64) {
        self.position = usize::try_from(index.saturating_sub(1)).unwrap_or(usize::MAX);
    }
}
