use serde::Deserialize;

use crate::error::{GdaError, Result};
use crate::value::{FieldType, Value};

/// How a command's text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    /// Text in the provider's dialect.
    #[default]
    Text,
    /// The text names a table; the provider reads all of its rows.
    Table,
}

/// A named parameter bound to a command.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub value: Value,
}

impl Param {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Parameter name without a leading `@`.
    pub fn bare_name(&self) -> &str {
        self.name.trim_start_matches('@')
    }
}

/// A statement to run on a connection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Command {
    pub text: String,
    pub command_type: CommandType,
    pub params: Vec<Param>,
}

impl Command {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            command_type: CommandType::Text,
            params: Vec::new(),
        }
    }

    pub fn table(name: impl Into<String>) -> Self {
        Self {
            text: name.into(),
            command_type: CommandType::Table,
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.push(Param::new(name, value));
        self
    }

    /// First parameter whose name matches `name`, ignoring case and `@`.
    pub fn param(&self, name: &str) -> Option<&Param> {
        let name = name.trim_start_matches('@');
        self.params
            .iter()
            .find(|p| p.bare_name().eq_ignore_ascii_case(name))
    }
}

// ── Serialized command from the C ABI ─────────────────────────

#[derive(Debug, Deserialize)]
pub struct SerializedCommand {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<SerializedParam>,
    #[serde(default)]
    pub command_type: CommandType,
}

#[derive(Debug, Deserialize)]
pub struct SerializedParam {
    pub name: String,
    pub value: serde_json::Value,
    #[serde(rename = "type")]
    pub param_type: Option<String>,
}

impl SerializedCommand {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| GdaError::Command(format!("Invalid command JSON: {e}")))
    }

    pub fn into_command(self) -> Result<Command> {
        let mut params = Vec::with_capacity(self.params.len());
        for p in self.params {
            let hint = match p.param_type.as_deref() {
                Some(t) => Some(t.parse::<FieldType>()?),
                None => None,
            };
            params.push(Param::new(p.name, Value::from_json(&p.value, hint)?));
        }
        Ok(Command {
            text: self.sql,
            command_type: self.command_type,
            params,
        })
    }
}
