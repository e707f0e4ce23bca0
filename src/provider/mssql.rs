use std::collections::HashMap;
use std::sync::Arc;

use mssql_client::{Client, Ready};
use mssql_driver_pool::PooledConnection;

use crate::command::{Command, CommandType};
use crate::config::MssqlConfig;
use crate::debug::debug_log;
use crate::error::{GdaError, Result};
use crate::operation::ServerOperation;
use crate::pool::{self, SharedPool};
use crate::provider::Provider;
use crate::query::{self, bracket_escape, sql_type_for, value_to_literal};
use crate::registry::{ConstraintKind, SchemaKind, SchemaStatement, StatementRegistry};
use crate::row_store::Row;
use crate::transport::{BufferedResult, ColumnDescriptor, Executed, StatementId, Transport};
use crate::value::{FieldType, Value};

/// SQL Server through mssql-client. With a `pool` section in the config
/// sessions come from a shared pool, otherwise each session is a bare
/// connection.
pub struct MssqlProvider {
    config: MssqlConfig,
    pool: Option<Arc<SharedPool>>,
    statements: StatementRegistry,
}

impl MssqlProvider {
    pub fn new(config: MssqlConfig) -> Result<Self> {
        let pool = match config.pool {
            Some(_) => Some(pool::acquire_shared_pool(&config)?),
            None => None,
        };
        Ok(Self {
            config,
            pool,
            statements: registry(),
        })
    }
}

impl Drop for MssqlProvider {
    fn drop(&mut self) {
        if let Some(shared) = self.pool.take() {
            pool::release_shared_pool(&shared);
        }
    }
}

impl Provider for MssqlProvider {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn open_connection(&self) -> Result<Box<dyn Transport>> {
        let client = match &self.pool {
            Some(shared) => {
                debug_log!("Acquiring connection from pool {}", shared.dedup_key);
                let pooled = crate::rt()
                    .block_on(shared.pool.get())
                    .map_err(GdaError::from)?;
                MssqlClient::Pooled(Box::new(pooled))
            }
            None => {
                let client = crate::rt().block_on(pool::create_single(&self.config))?;
                MssqlClient::Bare(Box::new(client))
            }
        };
        Ok(Box::new(MssqlTransport {
            client,
            statements: HashMap::new(),
            next_id: 1,
        }))
    }

    fn render_operation(&self, op: &ServerOperation) -> Result<String> {
        render_tsql(op)
    }

    fn statements(&self) -> &StatementRegistry {
        &self.statements
    }
}

// ── Schema statements ─────────────────────────────────────────

const TABLES_SQL: &str = "SELECT TABLE_SCHEMA AS table_schema, TABLE_NAME AS table_name \
     FROM INFORMATION_SCHEMA.TABLES \
     WHERE TABLE_TYPE = 'BASE TABLE' \
     AND (@schema_name IS NULL OR TABLE_SCHEMA = @schema_name) \
     AND (@table_name IS NULL OR TABLE_NAME = @table_name) \
     ORDER BY TABLE_SCHEMA, TABLE_NAME";

const VIEWS_SQL: &str = "SELECT TABLE_SCHEMA AS table_schema, TABLE_NAME AS view_name, \
     VIEW_DEFINITION AS definition \
     FROM INFORMATION_SCHEMA.VIEWS \
     WHERE (@schema_name IS NULL OR TABLE_SCHEMA = @schema_name) \
     AND (@table_name IS NULL OR TABLE_NAME = @table_name) \
     ORDER BY TABLE_SCHEMA, TABLE_NAME";

const COLUMNS_SQL: &str = "SELECT TABLE_NAME AS table_name, COLUMN_NAME AS column_name, \
     DATA_TYPE AS data_type, CHARACTER_MAXIMUM_LENGTH AS defined_size, \
     NUMERIC_SCALE AS scale, IS_NULLABLE AS nullable \
     FROM INFORMATION_SCHEMA.COLUMNS \
     WHERE (@schema_name IS NULL OR TABLE_SCHEMA = @schema_name) \
     AND (@table_name IS NULL OR TABLE_NAME = @table_name) \
     AND (@column_name IS NULL OR COLUMN_NAME = @column_name) \
     ORDER BY TABLE_SCHEMA, TABLE_NAME, ORDINAL_POSITION";

const PROCEDURES_SQL: &str = "SELECT ROUTINE_SCHEMA AS procedure_schema, ROUTINE_NAME AS procedure_name \
     FROM INFORMATION_SCHEMA.ROUTINES \
     WHERE ROUTINE_TYPE = 'PROCEDURE' \
     AND (@schema_name IS NULL OR ROUTINE_SCHEMA = @schema_name) \
     ORDER BY ROUTINE_SCHEMA, ROUTINE_NAME";

fn registry() -> StatementRegistry {
    use ConstraintKind::*;

    let mut reg = StatementRegistry::new();
    reg.register(
        SchemaKind::Tables,
        SchemaStatement::new(TABLES_SQL, &[SchemaName, TableName]),
    );
    reg.register(
        SchemaKind::Views,
        SchemaStatement::new(VIEWS_SQL, &[SchemaName, TableName]),
    );
    reg.register(
        SchemaKind::Columns,
        SchemaStatement::new(COLUMNS_SQL, &[SchemaName, TableName, ColumnName]),
    );
    reg.register(
        SchemaKind::Procedures,
        SchemaStatement::new(PROCEDURES_SQL, &[SchemaName]),
    );
    reg
}

// ── Transport ─────────────────────────────────────────────────

/// Either a pool-managed connection or a standalone one.
pub enum MssqlClient {
    Pooled(Box<PooledConnection>),
    Bare(Box<Client<Ready>>),
}

impl MssqlClient {
    fn as_client_mut(&mut self) -> Result<&mut Client<Ready>> {
        match self {
            MssqlClient::Pooled(pc) => pc
                .client_mut()
                .ok_or_else(|| GdaError::Connection("Connection not available".into())),
            MssqlClient::Bare(c) => Ok(c.as_mut()),
        }
    }
}

/// One SQL Server session. mssql-client returns a query's rows in full,
/// so each statement keeps them and serves fetches from the buffer.
pub struct MssqlTransport {
    client: MssqlClient,
    statements: HashMap<u64, BufferedResult>,
    next_id: u64,
}

impl MssqlTransport {
    fn statement(&mut self, statement: StatementId) -> Result<&mut BufferedResult> {
        self.statements
            .get_mut(&statement.0)
            .ok_or_else(|| GdaError::Transport(format!("Statement {} not found", statement.0)))
    }
}

fn command_sql(command: &Command) -> String {
    match command.command_type {
        CommandType::Text => command.text.clone(),
        CommandType::Table => format!("SELECT * FROM {}", bracket_escape(&command.text)),
    }
}

/// `BEGIN`/`COMMIT`/`ROLLBACK TRANSACTION`, with the name bracket-quoted.
fn transaction_sql(verb: &str, name: Option<&str>) -> String {
    match name.filter(|n| !n.is_empty()) {
        Some(n) => format!("{verb} TRANSACTION {}", bracket_escape(n)),
        None => format!("{verb} TRANSACTION"),
    }
}

/// Column descriptors for a buffered result. The type of a column is
/// that of its first non-null value; an all-null column reports `Null`.
fn describe_rows(names: &[String], rows: &[Row]) -> Vec<ColumnDescriptor> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let field_type = rows
                .iter()
                .filter_map(|r| r.get(i))
                .find(|v| !v.is_null())
                .map_or(FieldType::Null, Value::field_type);
            let size = rows
                .iter()
                .filter_map(|r| r.get(i))
                .map(Value::actual_size)
                .max()
                .unwrap_or(0);
            ColumnDescriptor::new(name.clone(), field_type).with_size(size as u32)
        })
        .collect()
}

impl Transport for MssqlTransport {
    fn execute(&mut self, command: &Command) -> Result<Executed> {
        let sql = command_sql(command);
        debug_log!("execute: {}", sql);

        let client = self.client.as_client_mut()?;
        let raw = crate::rt().block_on(query::query_rows(client, &sql, &command.params))?;

        let mut names = Vec::new();
        let mut rows = Vec::with_capacity(raw.len());
        for row in &raw {
            let (row_names, values) = query::split_row(row);
            if names.is_empty() {
                names = row_names;
            }
            rows.push(Row::new(values));
        }

        let columns = describe_rows(&names, &rows);
        let id = self.next_id;
        self.next_id += 1;
        let affected_rows = rows.len() as i64;
        self.statements.insert(id, BufferedResult::new(columns, rows));
        Ok(Executed {
            statement: StatementId(id),
            affected_rows,
        })
    }

    fn execute_non_query(&mut self, command: &Command) -> Result<i64> {
        let sql = command_sql(command);
        debug_log!("execute_non_query: {}", sql);
        let client = self.client.as_client_mut()?;
        crate::rt().block_on(query::execute_non_query(client, &sql, &command.params))
    }

    fn begin_transaction(&mut self, name: Option<&str>) -> Result<()> {
        self.execute_non_query(&Command::text(transaction_sql("BEGIN", name)))
            .map(|_| ())
    }

    fn commit_transaction(&mut self, name: Option<&str>) -> Result<()> {
        self.execute_non_query(&Command::text(transaction_sql("COMMIT", name)))
            .map(|_| ())
    }

    fn rollback_transaction(&mut self, name: Option<&str>) -> Result<()> {
        self.execute_non_query(&Command::text(transaction_sql("ROLLBACK", name)))
            .map(|_| ())
    }

    fn describe(&mut self, statement: StatementId) -> Result<Vec<ColumnDescriptor>> {
        Ok(self.statement(statement)?.columns().to_vec())
    }

    fn fetch(&mut self, statement: StatementId, count: usize) -> Result<Vec<Row>> {
        Ok(self.statement(statement)?.fetch(count))
    }

    fn move_absolute(&mut self, statement: StatementId, index: u64) -> Result<()> {
        self.statement(statement)?.seek(index);
        Ok(())
    }

    fn close(&mut self, statement: StatementId) -> Result<()> {
        self.statements
            .remove(&statement.0)
            .map(|_| ())
            .ok_or_else(|| GdaError::Transport(format!("Statement {} not found", statement.0)))
    }
}

// ── T-SQL DDL ─────────────────────────────────────────────────

fn render_tsql(op: &ServerOperation) -> Result<String> {
    op.validate()?;
    Ok(match op {
        ServerOperation::CreateTable {
            name,
            columns,
            if_not_exists,
        } => {
            let mut sql = String::new();
            if *if_not_exists {
                sql.push_str(&format!(
                    "IF OBJECT_ID(N'{}', N'U') IS NULL ",
                    name.replace('\'', "''")
                ));
            }
            sql.push_str("CREATE TABLE ");
            sql.push_str(&bracket_escape(name));
            sql.push_str(" (");
            for (i, col) in columns.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&bracket_escape(&col.name));
                sql.push(' ');
                sql.push_str(&sql_type_for(col.field_type, col.size)?);
                if let Some(default) = &col.default {
                    sql.push_str(" DEFAULT ");
                    sql.push_str(&value_to_literal(default));
                }
                sql.push_str(if col.nullable { " NULL" } else { " NOT NULL" });
            }
            let keys: Vec<String> = columns
                .iter()
                .filter(|c| c.primary_key)
                .map(|c| bracket_escape(&c.name))
                .collect();
            if !keys.is_empty() {
                sql.push_str(", PRIMARY KEY (");
                sql.push_str(&keys.join(", "));
                sql.push(')');
            }
            sql.push(')');
            sql
        }
        ServerOperation::DropTable { name, if_exists } => format!(
            "DROP TABLE {}{}",
            if *if_exists { "IF EXISTS " } else { "" },
            bracket_escape(name)
        ),
        ServerOperation::CreateIndex {
            name,
            table,
            columns,
            unique,
        } => format!(
            "CREATE {}INDEX {} ON {} ({})",
            if *unique { "UNIQUE " } else { "" },
            bracket_escape(name),
            bracket_escape(table),
            columns
                .iter()
                .map(|c| bracket_escape(c))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        ServerOperation::DropIndex { name, table } => format!(
            "DROP INDEX {} ON {}",
            bracket_escape(name),
            bracket_escape(table)
        ),
    })
}
