use std::collections::HashMap;
use std::sync::Arc;

use crate::command::{Command, CommandType};
use crate::config::{MemoryConfig, MemoryResultSet};
use crate::debug::debug_log;
use crate::error::{GdaError, Result};
use crate::operation::{ColumnSpec, ServerOperation};
use crate::provider::Provider;
use crate::registry::{ConstraintKind, SchemaKind, SchemaStatement, StatementRegistry};
use crate::row_store::Row;
use crate::transport::{BufferedResult, ColumnDescriptor, Executed, StatementId, Transport};
use crate::value::{FieldType, Value};

pub const TABLES_RESULT: &str = "gda_tables";
pub const COLUMNS_RESULT: &str = "gda_columns";

/// A result set held in memory.
#[derive(Debug, Clone)]
struct Table {
    name: String,
    columns: Vec<ColumnDescriptor>,
    rows: Vec<Row>,
}

impl Table {
    fn from_config(set: &MemoryResultSet) -> Result<Self> {
        let mut rows = Vec::with_capacity(set.rows.len());
        for (i, raw) in set.rows.iter().enumerate() {
            if raw.len() != set.columns.len() {
                return Err(GdaError::Config(format!(
                    "result set {}: row {} has {} values for {} columns",
                    set.name,
                    i + 1,
                    raw.len(),
                    set.columns.len()
                )));
            }
            let mut values = Vec::with_capacity(raw.len());
            for (json, column) in raw.iter().zip(&set.columns) {
                values.push(Value::from_json(json, Some(column.field_type))?);
            }
            rows.push(Row::new(values));
        }
        Ok(Self {
            name: set.name.clone(),
            columns: set.columns.clone(),
            rows,
        })
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Serves result sets declared in the configuration. Every table also
/// shows up in the `gda_tables` and `gda_columns` result sets, which
/// back schema queries.
pub struct MemoryProvider {
    tables: Arc<Vec<Table>>,
    statements: StatementRegistry,
}

impl MemoryProvider {
    pub fn new(config: &MemoryConfig) -> Result<Self> {
        let mut tables = Vec::with_capacity(config.result_sets.len() + 2);
        for set in &config.result_sets {
            tables.push(Table::from_config(set)?);
        }
        let catalog = catalog_tables(&tables);
        tables.extend(catalog);

        debug_log!("Memory provider with {} result sets", config.result_sets.len());

        Ok(Self {
            tables: Arc::new(tables),
            statements: registry(),
        })
    }
}

fn registry() -> StatementRegistry {
    let mut reg = StatementRegistry::new();
    reg.register(
        SchemaKind::Tables,
        SchemaStatement::new(TABLES_RESULT, &[ConstraintKind::TableName]),
    );
    reg.register(
        SchemaKind::Columns,
        SchemaStatement::new(
            COLUMNS_RESULT,
            &[ConstraintKind::TableName, ConstraintKind::ColumnName],
        ),
    );
    reg
}

fn catalog_tables(tables: &[Table]) -> [Table; 2] {
    let list = Table {
        name: TABLES_RESULT.into(),
        columns: vec![ColumnDescriptor::new("table_name", FieldType::Varchar)],
        rows: tables
            .iter()
            .map(|t| Row::new(vec![Value::Varchar(t.name.clone())]))
            .collect(),
    };
    let columns = Table {
        name: COLUMNS_RESULT.into(),
        columns: vec![
            ColumnDescriptor::new("table_name", FieldType::Varchar),
            ColumnDescriptor::new("column_name", FieldType::Varchar),
            ColumnDescriptor::new("data_type", FieldType::Varchar),
            ColumnDescriptor::new("defined_size", FieldType::Integer),
            ColumnDescriptor::new("scale", FieldType::Integer),
        ],
        rows: tables
            .iter()
            .flat_map(|t| {
                t.columns.iter().map(move |c| {
                    Row::new(vec![
                        Value::Varchar(t.name.clone()),
                        Value::Varchar(c.name.clone()),
                        Value::Varchar(c.field_type.as_str().into()),
                        Value::Integer(c.defined_size as i32),
                        Value::Integer(c.scale as i32),
                    ])
                })
            })
            .collect(),
    };
    [list, columns]
}

impl Provider for MemoryProvider {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn open_connection(&self) -> Result<Box<dyn Transport>> {
        Ok(Box::new(MemoryTransport {
            tables: Arc::clone(&self.tables),
            cursors: HashMap::new(),
            next_id: 1,
        }))
    }

    fn render_operation(&self, op: &ServerOperation) -> Result<String> {
        render_ansi(op)
    }

    fn statements(&self) -> &StatementRegistry {
        &self.statements
    }
}

// ── Transport ─────────────────────────────────────────────────

/// One session on a memory provider. Each executed command gets its own
/// cursor over a filtered copy of the rows.
pub struct MemoryTransport {
    tables: Arc<Vec<Table>>,
    cursors: HashMap<u64, BufferedResult>,
    next_id: u64,
}

const WRITE_KEYWORDS: [&str; 6] = ["CREATE", "DROP", "ALTER", "INSERT", "UPDATE", "DELETE"];

impl MemoryTransport {
    fn cursor(&mut self, statement: StatementId) -> Result<&mut BufferedResult> {
        self.cursors
            .get_mut(&statement.0)
            .ok_or_else(|| GdaError::Transport(format!("Statement {} not found", statement.0)))
    }
}

impl Transport for MemoryTransport {
    fn execute(&mut self, command: &Command) -> Result<Executed> {
        let name = command.text.trim();
        let first_word = name.split_whitespace().next().unwrap_or("");
        if command.command_type == CommandType::Text
            && WRITE_KEYWORDS.iter().any(|k| first_word.eq_ignore_ascii_case(k))
        {
            return Err(GdaError::Unsupported(
                "the memory provider only serves named result sets".into(),
            ));
        }

        let table = self
            .tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| GdaError::Command(format!("No result set named '{name}'")))?;

        // non-null parameters filter on the column of the same name
        let mut filters = Vec::new();
        for param in &command.params {
            if param.value.is_null() {
                continue;
            }
            let idx = table.column_index(param.bare_name()).ok_or_else(|| {
                GdaError::Command(format!(
                    "Result set '{}' has no column '{}'",
                    table.name,
                    param.bare_name()
                ))
            })?;
            filters.push((idx, &param.value));
        }

        let rows: Vec<Row> = table
            .rows
            .iter()
            .filter(|row| filters.iter().all(|(idx, v)| row.get(*idx) == Some(*v)))
            .cloned()
            .collect();

        let id = self.next_id;
        self.next_id += 1;
        let affected_rows = rows.len() as i64;
        self.cursors
            .insert(id, BufferedResult::new(table.columns.clone(), rows));
        Ok(Executed {
            statement: StatementId(id),
            affected_rows,
        })
    }

    fn describe(&mut self, statement: StatementId) -> Result<Vec<ColumnDescriptor>> {
        Ok(self.cursor(statement)?.columns().to_vec())
    }

    fn fetch(&mut self, statement: StatementId, count: usize) -> Result<Vec<Row>> {
        Ok(self.cursor(statement)?.fetch(count))
    }

    fn move_absolute(&mut self, statement: StatementId, index: u64) -> Result<()> {
        self.cursor(statement)?.seek(index);
        Ok(())
    }

    fn close(&mut self, statement: StatementId) -> Result<()> {
        self.cursors
            .remove(&statement.0)
            .map(|_| ())
            .ok_or_else(|| GdaError::Transport(format!("Statement {} not found", statement.0)))
    }
}

// ── ANSI DDL ──────────────────────────────────────────────────

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn ansi_type(spec: &ColumnSpec) -> Result<String> {
    Ok(match spec.field_type {
        FieldType::Tinyint | FieldType::Smallint => "SMALLINT".into(),
        FieldType::Integer => "INTEGER".into(),
        FieldType::Bigint => "BIGINT".into(),
        FieldType::Single => "REAL".into(),
        FieldType::Double => "DOUBLE PRECISION".into(),
        FieldType::Boolean => "BOOLEAN".into(),
        FieldType::Date => "DATE".into(),
        FieldType::Time => "TIME".into(),
        FieldType::Timestamp => "TIMESTAMP".into(),
        FieldType::Varchar => match spec.size {
            Some(n) if n > 0 => format!("VARCHAR({n})"),
            _ => "VARCHAR".into(),
        },
        FieldType::Longvarchar => "TEXT".into(),
        FieldType::Binary => "BLOB".into(),
        FieldType::Guid => "CHAR(36)".into(),
        FieldType::Null => {
            return Err(GdaError::Command(format!(
                "Column {} has no type",
                spec.name
            )))
        }
    })
}

fn ansi_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".into(),
        Value::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.into(),
        Value::Varchar(s) | Value::Longvarchar(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Date(d) => format!("DATE '{d}'"),
        Value::Time(t) => format!("TIME '{t}'"),
        Value::Timestamp(dt) => format!("TIMESTAMP '{dt}'"),
        Value::Guid(u) => format!("'{u}'"),
        Value::Binary(_) => format!("X'{value}'"),
        other => other.to_string(),
    }
}

fn render_ansi(op: &ServerOperation) -> Result<String> {
    op.validate()?;
    Ok(match op {
        ServerOperation::CreateTable {
            name,
            columns,
            if_not_exists,
        } => {
            let mut defs = Vec::with_capacity(columns.len() + 1);
            for col in columns {
                let mut def = format!("{} {}", quote_ident(&col.name), ansi_type(col)?);
                if let Some(default) = &col.default {
                    def.push_str(&format!(" DEFAULT {}", ansi_literal(default)));
                }
                if !col.nullable {
                    def.push_str(" NOT NULL");
                }
                defs.push(def);
            }
            let keys: Vec<String> = columns
                .iter()
                .filter(|c| c.primary_key)
                .map(|c| quote_ident(&c.name))
                .collect();
            if !keys.is_empty() {
                defs.push(format!("PRIMARY KEY ({})", keys.join(", ")));
            }
            format!(
                "CREATE TABLE {}{} ({})",
                if *if_not_exists { "IF NOT EXISTS " } else { "" },
                quote_ident(name),
                defs.join(", ")
            )
        }
        ServerOperation::DropTable { name, if_exists } => format!(
            "DROP TABLE {}{}",
            if *if_exists { "IF EXISTS " } else { "" },
            quote_ident(name)
        ),
        ServerOperation::CreateIndex {
            name,
            table,
            columns,
            unique,
        } => format!(
            "CREATE {}INDEX {} ON {} ({})",
            if *unique { "UNIQUE " } else { "" },
            quote_ident(name),
            quote_ident(table),
            columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        ServerOperation::DropIndex { name, .. } => format!("DROP INDEX {}", quote_ident(name)),
    })
}
