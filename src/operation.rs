use serde::Deserialize;

use crate::error::{GdaError, Result};
use crate::value::{FieldType, Value};

/// Column definition used by `CreateTable`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub field_type: FieldType,
    pub size: Option<u32>,
    pub nullable: bool,
    pub primary_key: bool,
    pub default: Option<Value>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            size: None,
            nullable: true,
            primary_key: false,
            default: None,
        }
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// A DDL intent, rendered into SQL by each provider.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerOperation {
    CreateTable {
        name: String,
        columns: Vec<ColumnSpec>,
        if_not_exists: bool,
    },
    DropTable {
        name: String,
        if_exists: bool,
    },
    CreateIndex {
        name: String,
        table: String,
        columns: Vec<String>,
        unique: bool,
    },
    DropIndex {
        name: String,
        table: String,
    },
}

impl ServerOperation {
    /// Reject operations no dialect can render.
    pub fn validate(&self) -> Result<()> {
        match self {
            ServerOperation::CreateTable { name, columns, .. } => {
                if name.is_empty() {
                    return Err(GdaError::Command("CREATE TABLE needs a table name".into()));
                }
                if columns.is_empty() {
                    return Err(GdaError::Command(format!(
                        "CREATE TABLE {name} needs at least one column"
                    )));
                }
                Ok(())
            }
            ServerOperation::CreateIndex { name, columns, .. } => {
                if columns.is_empty() {
                    return Err(GdaError::Command(format!(
                        "CREATE INDEX {name} needs at least one column"
                    )));
                }
                Ok(())
            }
            ServerOperation::DropTable { name, .. } | ServerOperation::DropIndex { name, .. } => {
                if name.is_empty() {
                    return Err(GdaError::Command("DROP needs an object name".into()));
                }
                Ok(())
            }
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let wire: SerializedOperation = serde_json::from_str(json)
            .map_err(|e| GdaError::Command(format!("Invalid operation JSON: {e}")))?;
        wire.into_operation()
    }
}

// ── Serialized operation from the C ABI ───────────────────────

#[derive(Debug, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
enum SerializedOperation {
    CreateTable {
        name: String,
        columns: Vec<SerializedColumn>,
        #[serde(default)]
        if_not_exists: bool,
    },
    DropTable {
        name: String,
        #[serde(default)]
        if_exists: bool,
    },
    CreateIndex {
        name: String,
        table: String,
        columns: Vec<String>,
        #[serde(default)]
        unique: bool,
    },
    DropIndex {
        name: String,
        table: String,
    },
}

#[derive(Debug, Deserialize)]
struct SerializedColumn {
    name: String,
    #[serde(rename = "type")]
    col_type: String,
    size: Option<u32>,
    #[serde(default = "default_true")]
    nullable: bool,
    #[serde(default)]
    primary_key: bool,
    default: Option<serde_json::Value>,
}

fn default_true() -> bool {
    true
}

impl SerializedOperation {
    fn into_operation(self) -> Result<ServerOperation> {
        Ok(match self {
            SerializedOperation::CreateTable {
                name,
                columns,
                if_not_exists,
            } => {
                let mut specs = Vec::with_capacity(columns.len());
                for col in columns {
                    let field_type: FieldType = col.col_type.parse()?;
                    let default = match col.default {
                        Some(json) => Some(Value::from_json(&json, Some(field_type))?),
                        None => None,
                    };
                    specs.push(ColumnSpec {
                        name: col.name,
                        field_type,
                        size: col.size,
                        nullable: col.nullable && !col.primary_key,
                        primary_key: col.primary_key,
                        default,
                    });
                }
                ServerOperation::CreateTable {
                    name,
                    columns: specs,
                    if_not_exists,
                }
            }
            SerializedOperation::DropTable { name, if_exists } => {
                ServerOperation::DropTable { name, if_exists }
            }
            SerializedOperation::CreateIndex {
                name,
                table,
                columns,
                unique,
            } => ServerOperation::CreateIndex {
                name,
                table,
                columns,
                unique,
            },
            SerializedOperation::DropIndex { name, table } => {
                ServerOperation::DropIndex { name, table }
            }
        })
    }
}
