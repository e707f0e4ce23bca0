use std::sync::{Arc, Mutex, PoisonError};

use crate::command::Command;
use crate::config::{ConnectionConfig, ProviderConfig, RecordsetDefaults};
use crate::debug::debug_log;
use crate::error::{ErrorRecord, GdaError, Result};
use crate::operation::ServerOperation;
use crate::provider::{MemoryProvider, MssqlProvider, Provider};
use crate::recordset::{CursorLocation, CursorType, LockType, Recordset};
use crate::registry::{ConstraintKind, SchemaKind};
use crate::transport::Transport;
use crate::value::Value;

/// An open session with a provider, shared by the recordsets that use it.
///
/// Transport failures are appended to the connection's error list as
/// they happen, so a caller that only sees a sentinel can read what
/// went wrong afterwards.
pub struct Connection {
    provider: Box<dyn Provider>,
    transport: Mutex<Box<dyn Transport>>,
    errors: Mutex<Vec<ErrorRecord>>,
    defaults: RecordsetDefaults,
}

impl Connection {
    pub fn open(config: &ConnectionConfig) -> Result<Arc<Self>> {
        let provider: Box<dyn Provider> = match &config.provider {
            ProviderConfig::Mssql(cfg) => {
                debug_log!("Opening mssql connection to {}:{}", cfg.server, cfg.port);
                Box::new(MssqlProvider::new(cfg.clone())?)
            }
            ProviderConfig::Memory(cfg) => Box::new(MemoryProvider::new(cfg)?),
        };
        Self::with_provider(provider, config.recordset)
    }

    pub fn with_provider(provider: Box<dyn Provider>, defaults: RecordsetDefaults) -> Result<Arc<Self>> {
        let transport = provider.open_connection()?;
        Ok(Self::with_transport(provider, transport, defaults))
    }

    pub fn with_transport(
        provider: Box<dyn Provider>,
        transport: Box<dyn Transport>,
        defaults: RecordsetDefaults,
    ) -> Arc<Self> {
        Arc::new(Self {
            provider,
            transport: Mutex::new(transport),
            errors: Mutex::new(Vec::new()),
            defaults,
        })
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn defaults(&self) -> &RecordsetDefaults {
        &self.defaults
    }

    /// Run `f` on the transport. A failure is recorded under `source`
    /// and returned.
    pub fn call<T>(&self, source: &str, f: impl FnOnce(&mut dyn Transport) -> Result<T>) -> Result<T> {
        let result = {
            let mut transport = self.transport.lock().unwrap_or_else(PoisonError::into_inner);
            f(transport.as_mut())
        };
        result.inspect_err(|e| self.add_error(e, source))
    }

    pub fn add_error(&self, error: &GdaError, source: &str) {
        debug_log!("{}: {}", source, error);
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error.to_record(source));
    }

    pub fn errors(&self) -> Vec<ErrorRecord> {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Drain the error list.
    pub fn take_errors(&self) -> Vec<ErrorRecord> {
        std::mem::take(&mut *self.errors.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn clear_errors(&self) {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// A closed recordset bound to this connection, with its defaults applied.
    pub fn new_recordset(self: &Arc<Self>) -> Recordset {
        let mut rs = Recordset::with_connection(Arc::clone(self));
        let d = self.defaults;
        // a fresh recordset is closed, so these cannot fail
        let _ = rs.set_cursor_location(d.cursor_location);
        let _ = rs.set_cursor_type(d.cursor_type);
        let _ = rs.set_cache_size(d.cache_size);
        rs.set_max_rows(d.max_rows);
        rs
    }

    /// Open a scrollable client-side recordset over database metadata.
    pub fn open_schema(
        self: &Arc<Self>,
        kind: SchemaKind,
        constraints: &[(ConstraintKind, Value)],
    ) -> Result<Recordset> {
        let command = self
            .provider
            .statements()
            .command(kind, constraints)
            .inspect_err(|e| self.add_error(e, "open_schema"))?;

        let mut rs = Recordset::with_connection(Arc::clone(self));
        rs.set_cursor_location(CursorLocation::Client)?;
        rs.set_name(format!("{kind:?}").to_lowercase());
        rs.open(&command, CursorType::Scrollable, LockType::ReadOnly)?;
        Ok(rs)
    }

    /// Open `command` in a new recordset using this connection's defaults.
    pub fn execute(self: &Arc<Self>, command: &Command) -> Result<Recordset> {
        let mut rs = self.new_recordset();
        rs.open(command, self.defaults.cursor_type, LockType::ReadOnly)?;
        Ok(rs)
    }

    pub fn begin_transaction(&self, name: Option<&str>) -> Result<()> {
        debug_log!("begin_transaction {:?}", name);
        self.call("begin_transaction", |t| t.begin_transaction(name))
    }

    pub fn commit_transaction(&self, name: Option<&str>) -> Result<()> {
        self.call("commit_transaction", |t| t.commit_transaction(name))
    }

    pub fn rollback_transaction(&self, name: Option<&str>) -> Result<()> {
        self.call("rollback_transaction", |t| t.rollback_transaction(name))
    }

    /// Run a command for its side effects; returns the affected row count.
    pub fn execute_non_query(&self, command: &Command) -> Result<i64> {
        self.call("execute", |t| t.execute_non_query(command))
    }

    pub fn render_operation(&self, op: &ServerOperation) -> Result<String> {
        self.provider
            .render_operation(op)
            .inspect_err(|e| self.add_error(e, "render_operation"))
    }

    /// Render `op` and execute it.
    pub fn perform_operation(&self, op: &ServerOperation) -> Result<i64> {
        let sql = self.render_operation(op)?;
        debug_log!("perform_operation: {}", sql);
        self.execute_non_query(&Command::text(sql))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::ColumnSpec;
    use crate::testing::{connection, ScriptedTransport};
    use crate::value::FieldType;
    use serde_json::json;

    fn memory() -> Arc<Connection> {
        let config = ConnectionConfig::from_json(
            &json!({
                "provider": {
                    "type": "memory",
                    "result_sets": [{
                        "name": "people",
                        "columns": [
                            {"name": "id", "type": "integer"},
                            {"name": "name", "type": "varchar"}
                        ],
                        "rows": [[1, "ann"], [2, "bob"]]
                    }, {
                        "name": "pets",
                        "columns": [{"name": "name", "type": "varchar"}],
                        "rows": []
                    }]
                },
                "recordset": {"cursor_type": "scrollable", "cache_size": 8}
            })
            .to_string(),
        )
        .unwrap();
        Connection::open(&config).unwrap()
    }

    #[test]
    fn new_recordset_applies_defaults() {
        let conn = memory();
        let rs = conn.new_recordset();
        assert_eq!(rs.cursor_type(), CursorType::Scrollable);
        assert_eq!(rs.cursor_location(), CursorLocation::Client);
        assert_eq!(rs.cache_size(), 8);
        assert!(!rs.is_open());
    }

    #[test]
    fn schema_tables_lists_every_result_set() {
        let conn = memory();
        let mut rs = conn.open_schema(SchemaKind::Tables, &[]).unwrap();
        assert_eq!(rs.name(), Some("tables"));
        let mut names = Vec::new();
        rs.move_next().unwrap();
        while !rs.eof() {
            names.push(rs.field_by_name("table_name").unwrap().as_str().unwrap().to_string());
            rs.move_next().unwrap();
        }
        assert!(names.contains(&"people".to_string()));
        assert!(names.contains(&"pets".to_string()));
    }

    #[test]
    fn schema_columns_filters_by_table() {
        let conn = memory();
        let mut rs = conn
            .open_schema(
                SchemaKind::Columns,
                &[(ConstraintKind::TableName, Value::Varchar("pets".into()))],
            )
            .unwrap();
        assert_eq!(rs.move_last().unwrap(), 1);
        assert_eq!(rs.field(1).unwrap().as_str().unwrap(), "name");
        assert_eq!(rs.field(2).unwrap().as_str().unwrap(), "varchar");
    }

    #[test]
    fn unsupported_schema_requests_are_recorded() {
        let conn = memory();
        let err = conn.open_schema(SchemaKind::Procedures, &[]).unwrap_err();
        assert!(matches!(err, GdaError::Unsupported(_)));
        let err = conn
            .open_schema(
                SchemaKind::Tables,
                &[(ConstraintKind::SchemaName, Value::Varchar("dbo".into()))],
            )
            .unwrap_err();
        assert!(matches!(err, GdaError::Unsupported(_)));
        assert_eq!(conn.take_errors().len(), 2);
        assert!(conn.errors().is_empty());
    }

    #[test]
    fn render_and_perform_operation() {
        let conn = memory();
        let op = ServerOperation::DropTable {
            name: "pets".into(),
            if_exists: false,
        };
        assert_eq!(conn.render_operation(&op).unwrap(), "DROP TABLE \"pets\"");
        // the memory provider cannot run DDL
        assert!(conn.perform_operation(&op).is_err());
        let errors = conn.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].source, "execute");
    }

    #[test]
    fn invalid_operation_is_recorded() {
        let conn = memory();
        let op = ServerOperation::CreateTable {
            name: "t".into(),
            columns: vec![],
            if_not_exists: false,
        };
        assert!(conn.render_operation(&op).is_err());
        assert_eq!(conn.errors()[0].source, "render_operation");

        let op = ServerOperation::CreateTable {
            name: "t".into(),
            columns: vec![ColumnSpec::new("x", FieldType::Null)],
            if_not_exists: false,
        };
        assert!(conn.render_operation(&op).is_err());
    }

    #[test]
    fn execute_non_query_reports_affected_rows() {
        let conn = memory();
        assert_eq!(conn.execute_non_query(&Command::text("people")).unwrap(), 2);
    }

    #[test]
    fn transport_errors_accumulate() {
        let conn = connection(ScriptedTransport::numbered(1).fail_execute());
        let mut rs = conn.new_recordset();
        assert!(rs.open_text("a", CursorType::Scrollable, LockType::ReadOnly).is_err());
        assert!(rs.open_text("b", CursorType::Scrollable, LockType::ReadOnly).is_err());
        let errors = conn.errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].number, GdaError::Transport(String::new()).code());
        conn.clear_errors();
        assert!(conn.errors().is_empty());
    }

    #[test]
    fn recordsets_share_one_connection() {
        let conn = memory();
        let mut a = conn.new_recordset();
        let mut b = conn.new_recordset();
        a.open_text("people", CursorType::Scrollable, LockType::ReadOnly).unwrap();
        b.open_text("people", CursorType::Scrollable, LockType::ReadOnly).unwrap();
        a.move_last().unwrap();
        b.move_first().unwrap();
        assert_eq!(a.field(0).unwrap().as_integer().unwrap(), 2);
        assert_eq!(b.field(0).unwrap().as_integer().unwrap(), 1);
        assert_eq!(Arc::strong_count(&conn), 3);
        drop(a);
        assert_eq!(Arc::strong_count(&conn), 2);
    }

    #[test]
    fn execute_opens_a_recordset_with_defaults() {
        let conn = memory();
        let mut rs = conn.execute(&Command::text("people")).unwrap();
        assert!(rs.is_open());
        assert_eq!(rs.cursor_type(), CursorType::Scrollable);
        assert_eq!(rs.move_last().unwrap(), 2);
        assert_eq!(rs.field_by_name("name").unwrap().as_str().unwrap(), "bob");

        assert!(conn.execute(&Command::text("nowhere")).is_err());
        assert_eq!(conn.take_errors()[0].source, "execute");
    }

    #[test]
    fn transactions_begin_and_end() {
        let conn = connection(ScriptedTransport::numbered(1));
        conn.begin_transaction(Some("load")).unwrap();
        assert!(conn.begin_transaction(None).is_err());
        conn.commit_transaction(Some("load")).unwrap();
        assert!(conn.rollback_transaction(None).is_err());
        conn.begin_transaction(None).unwrap();
        conn.rollback_transaction(None).unwrap();

        let errors = conn.take_errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].source, "begin_transaction");
        assert_eq!(errors[1].source, "rollback_transaction");
    }

    #[test]
    fn memory_provider_has_no_transactions() {
        let conn = memory();
        let err = conn.begin_transaction(None).unwrap_err();
        assert!(matches!(err, GdaError::Unsupported(_)));
        assert_eq!(conn.errors().len(), 1);
    }
}
