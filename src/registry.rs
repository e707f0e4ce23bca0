use std::collections::HashMap;

use serde::Deserialize;

use crate::command::{Command, Param};
use crate::error::{GdaError, Result};
use crate::value::Value;

/// Kinds of database metadata a provider can list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    Tables,
    Views,
    Columns,
    Procedures,
}

/// Filters accepted by schema statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    SchemaName,
    TableName,
    ColumnName,
}

impl ConstraintKind {
    /// Parameter name a constraint is bound to.
    pub fn param_name(&self) -> &'static str {
        match self {
            ConstraintKind::SchemaName => "schema_name",
            ConstraintKind::TableName => "table_name",
            ConstraintKind::ColumnName => "column_name",
        }
    }
}

/// Statement text for one schema kind and the constraints it accepts.
#[derive(Debug, Clone)]
pub struct SchemaStatement {
    pub text: String,
    pub constraints: Vec<ConstraintKind>,
}

impl SchemaStatement {
    pub fn new(text: impl Into<String>, constraints: &[ConstraintKind]) -> Self {
        Self {
            text: text.into(),
            constraints: constraints.to_vec(),
        }
    }
}

/// The internal statements a provider uses for metadata queries. Each
/// provider owns its registry.
#[derive(Debug, Clone, Default)]
pub struct StatementRegistry {
    statements: HashMap<SchemaKind, SchemaStatement>,
}

impl StatementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: SchemaKind, statement: SchemaStatement) {
        self.statements.insert(kind, statement);
    }

    pub fn get(&self, kind: SchemaKind) -> Option<&SchemaStatement> {
        self.statements.get(&kind)
    }

    /// Build the command for `kind`. Every accepted constraint is bound in
    /// declaration order, as NULL when the caller did not supply it.
    pub fn command(&self, kind: SchemaKind, constraints: &[(ConstraintKind, Value)]) -> Result<Command> {
        let statement = self
            .get(kind)
            .ok_or_else(|| GdaError::Unsupported(format!("schema kind {kind:?}")))?;

        for (constraint, _) in constraints {
            if !statement.constraints.contains(constraint) {
                return Err(GdaError::Unsupported(format!(
                    "constraint {constraint:?} for schema kind {kind:?}"
                )));
            }
        }

        let params = statement
            .constraints
            .iter()
            .map(|accepted| {
                let value = constraints
                    .iter()
                    .rev()
                    .find(|(c, _)| c == accepted)
                    .map(|(_, v)| v.clone())
                    .unwrap_or(Value::Null);
                Param::new(accepted.param_name(), value)
            })
            .collect();

        Ok(Command {
            text: statement.text.clone(),
            command_type: Default::default(),
            params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> StatementRegistry {
        let mut reg = StatementRegistry::new();
        reg.register(
            SchemaKind::Columns,
            SchemaStatement::new(
                "columns",
                &[ConstraintKind::TableName, ConstraintKind::ColumnName],
            ),
        );
        reg
    }

    #[test]
    fn binds_every_accepted_constraint() {
        let cmd = registry()
            .command(
                SchemaKind::Columns,
                &[(ConstraintKind::TableName, Value::Varchar("people".into()))],
            )
            .unwrap();
        assert_eq!(cmd.text, "columns");
        assert_eq!(cmd.params.len(), 2);
        assert_eq!(cmd.params[0].name, "table_name");
        assert_eq!(cmd.params[0].value, Value::Varchar("people".into()));
        assert_eq!(cmd.params[1].name, "column_name");
        assert!(cmd.params[1].value.is_null());
    }

    #[test]
    fn later_constraint_wins() {
        let cmd = registry()
            .command(
                SchemaKind::Columns,
                &[
                    (ConstraintKind::TableName, Value::Varchar("a".into())),
                    (ConstraintKind::TableName, Value::Varchar("b".into())),
                ],
            )
            .unwrap();
        assert_eq!(cmd.params[0].value, Value::Varchar("b".into()));
    }

    #[test]
    fn rejects_unaccepted_constraint() {
        let result = registry().command(
            SchemaKind::Columns,
            &[(ConstraintKind::SchemaName, Value::Varchar("dbo".into()))],
        );
        assert!(matches!(result, Err(GdaError::Unsupported(_))));
    }

    #[test]
    fn rejects_unregistered_kind() {
        let result = registry().command(SchemaKind::Procedures, &[]);
        assert!(matches!(result, Err(GdaError::Unsupported(_))));
    }
}
