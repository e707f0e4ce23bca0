//! Test doubles for the recordset engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::command::Command;
use crate::config::{MemoryConfig, RecordsetDefaults};
use crate::connection::Connection;
use crate::error::{GdaError, Result};
use crate::provider::MemoryProvider;
use crate::row_store::Row;
use crate::transport::{BufferedResult, ColumnDescriptor, Executed, StatementId, Transport};
use crate::value::{FieldType, Value};

/// Call counts shared between a transport and the test that owns it.
#[derive(Debug, Clone, Default)]
pub struct Counters {
    fetches: Arc<AtomicUsize>,
    moves: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl Counters {
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn moves(&self) -> usize {
        self.moves.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Serves the same rows for every command, counting calls and failing
/// on request.
pub struct ScriptedTransport {
    columns: Vec<ColumnDescriptor>,
    rows: Vec<Row>,
    statements: HashMap<u64, BufferedResult>,
    next_id: u64,
    counters: Counters,
    fail_fetch_at: Option<usize>,
    fail_execute: bool,
    fail_describe: bool,
    in_transaction: bool,
}

impl ScriptedTransport {
    pub fn new(columns: Vec<ColumnDescriptor>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            statements: HashMap::new(),
            next_id: 1,
            counters: Counters::default(),
            fail_fetch_at: None,
            fail_execute: false,
            fail_describe: false,
            in_transaction: false,
        }
    }

    /// `n` rows of `(id INTEGER, name VARCHAR)`: `(1, "row 1")` and so on.
    pub fn numbered(n: i32) -> Self {
        let columns = vec![
            ColumnDescriptor::new("id", FieldType::Integer),
            ColumnDescriptor::new("name", FieldType::Varchar).with_size(16),
        ];
        let rows = (1..=n)
            .map(|i| Row::new(vec![Value::Integer(i), Value::Varchar(format!("row {i}"))]))
            .collect();
        Self::new(columns, rows)
    }

    pub fn counters(&self) -> Counters {
        self.counters.clone()
    }

    /// Fail the `n`th fetch call, counting from 1.
    pub fn fail_fetch_at(mut self, n: usize) -> Self {
        self.fail_fetch_at = Some(n);
        self
    }

    pub fn fail_execute(mut self) -> Self {
        self.fail_execute = true;
        self
    }

    pub fn fail_describe(mut self) -> Self {
        self.fail_describe = true;
        self
    }

    fn end_transaction(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(GdaError::Transport("no transaction in progress".into()));
        }
        self.in_transaction = false;
        Ok(())
    }

    fn statement(&mut self, statement: StatementId) -> Result<&mut BufferedResult> {
        self.statements
            .get_mut(&statement.0)
            .ok_or_else(|| GdaError::Transport(format!("unknown statement {}", statement.0)))
    }
}

impl Transport for ScriptedTransport {
    fn execute(&mut self, _command: &Command) -> Result<Executed> {
        if self.fail_execute {
            return Err(GdaError::Transport("scripted execute failure".into()));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.statements
            .insert(id, BufferedResult::new(self.columns.clone(), self.rows.clone()));
        Ok(Executed {
            statement: StatementId(id),
            affected_rows: -1,
        })
    }

    fn begin_transaction(&mut self, _name: Option<&str>) -> Result<()> {
        if self.in_transaction {
            return Err(GdaError::Transport("transaction already started".into()));
        }
        self.in_transaction = true;
        Ok(())
    }

    fn commit_transaction(&mut self, _name: Option<&str>) -> Result<()> {
        self.end_transaction()
    }

    fn rollback_transaction(&mut self, _name: Option<&str>) -> Result<()> {
        self.end_transaction()
    }

    fn describe(&mut self, statement: StatementId) -> Result<Vec<ColumnDescriptor>> {
        if self.fail_describe {
            return Err(GdaError::Transport("scripted describe failure".into()));
        }
        Ok(self.statement(statement)?.columns().to_vec())
    }

    fn fetch(&mut self, statement: StatementId, count: usize) -> Result<Vec<Row>> {
        let call = self.counters.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_fetch_at == Some(call) {
            return Err(GdaError::Transport("scripted fetch failure".into()));
        }
        Ok(self.statement(statement)?.fetch(count))
    }

    fn move_absolute(&mut self, statement: StatementId, index: u64) -> Result<()> {
        self.counters.moves.fetch_add(1, Ordering::SeqCst);
        self.statement(statement)?.seek(index);
        Ok(())
    }

    fn close(&mut self, statement: StatementId) -> Result<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.statements
            .remove(&statement.0)
            .map(|_| ())
            .ok_or_else(|| GdaError::Transport(format!("unknown statement {}", statement.0)))
    }
}

/// A connection whose transport is `transport`.
pub fn connection(transport: ScriptedTransport) -> Arc<Connection> {
    let provider = MemoryProvider::new(&MemoryConfig::default()).unwrap();
    Connection::with_transport(
        Box::new(provider),
        Box::new(transport),
        RecordsetDefaults::default(),
    )
}
