use std::collections::HashMap;

use mssql_client::{Client, Ready, Row as SqlRow, SqlValue, ToSql};

use crate::command::Param;
use crate::error::{GdaError, Result};
use crate::value::{FieldType, Value};

// ── Named param rewriting (@name → @P1) ──────────────────────

fn is_sql_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Rewrite named @param placeholders to positional @P1, @P2, ... markers.
/// Returns the rewritten SQL and the parameter index behind each marker.
pub fn rewrite_named_params(sql: &str, params: &[Param]) -> (String, Vec<usize>) {
    if params.is_empty() {
        return (sql.to_string(), vec![]);
    }

    let mut name_to_idx: HashMap<String, usize> = HashMap::new();
    for (i, param) in params.iter().enumerate() {
        name_to_idx.insert(param.bare_name().to_lowercase(), i);
    }

    let chars: Vec<char> = sql.chars().collect();
    let len = chars.len();
    let mut result = String::with_capacity(sql.len());
    let mut order: Vec<usize> = Vec::new();
    let mut pos = 0;
    let mut i = 0;

    while i < len {
        // single-quoted literals pass through untouched
        if chars[i] == '\'' {
            result.push(chars[i]);
            i += 1;
            while i < len {
                if chars[i] == '\'' {
                    result.push(chars[i]);
                    i += 1;
                    if i < len && chars[i] == '\'' {
                        result.push(chars[i]);
                        i += 1;
                    } else {
                        break;
                    }
                } else {
                    result.push(chars[i]);
                    i += 1;
                }
            }
            continue;
        }

        if chars[i] == '@' {
            // @@ system variables
            if i + 1 < len && chars[i + 1] == '@' {
                result.push(chars[i]);
                result.push(chars[i + 1]);
                i += 2;
                while i < len && is_sql_ident_char(chars[i]) {
                    result.push(chars[i]);
                    i += 1;
                }
                continue;
            }

            let start = i + 1;
            let mut end = start;
            while end < len && is_sql_ident_char(chars[end]) {
                end += 1;
            }

            if end > start {
                let name: String = chars[start..end].iter().collect();
                if let Some(&idx) = name_to_idx.get(&name.to_lowercase()) {
                    pos += 1;
                    result.push_str(&format!("@P{pos}"));
                    order.push(idx);
                    i = end;
                    continue;
                }
            }
        }

        result.push(chars[i]);
        i += 1;
    }

    (result, order)
}

// ── Parameter conversion ──────────────────────────────────────

/// Convert a value to a boxed ToSql for parameterized queries.
pub fn value_to_boxed(value: &Value) -> Box<dyn ToSql + Sync> {
    match value {
        Value::Null => Box::new(Option::<String>::None),
        Value::Tinyint(n) => Box::new(*n),
        Value::Smallint(n) => Box::new(*n),
        Value::Integer(n) => Box::new(*n),
        Value::Bigint(n) => Box::new(*n),
        Value::Single(n) => Box::new(*n as f64),
        Value::Double(n) => Box::new(*n),
        Value::Boolean(b) => Box::new(*b),
        Value::Date(d) => Box::new(*d),
        Value::Time(t) => Box::new(*t),
        Value::Timestamp(dt) => Box::new(*dt),
        Value::Varchar(s) | Value::Longvarchar(s) => Box::new(s.clone()),
        Value::Binary(bytes) => Box::new(bytes.clone()),
        Value::Guid(u) => Box::new(*u),
    }
}

/// Boxed parameters in marker order.
pub fn build_param_boxes(params: &[Param], order: &[usize]) -> Vec<Box<dyn ToSql + Sync>> {
    order
        .iter()
        .filter_map(|&idx| params.get(idx))
        .map(|p| value_to_boxed(&p.value))
        .collect()
}

// ── Result conversion ─────────────────────────────────────────

/// Convert a driver value to a `Value`.
pub fn sql_value_to_value(raw: Option<SqlValue>) -> Value {
    match raw {
        None | Some(SqlValue::Null) => Value::Null,
        Some(SqlValue::Bool(b)) => Value::Boolean(b),
        Some(SqlValue::TinyInt(n)) => Value::Tinyint(n),
        Some(SqlValue::SmallInt(n)) => Value::Smallint(n),
        Some(SqlValue::Int(n)) => Value::Integer(n),
        Some(SqlValue::BigInt(n)) => Value::Bigint(n),
        Some(SqlValue::Float(n)) => Value::Single(n),
        Some(SqlValue::Double(n)) => Value::Double(n),
        Some(SqlValue::String(s)) => Value::Varchar(s),
        Some(SqlValue::Binary(bytes)) => Value::Binary(bytes.to_vec()),
        Some(SqlValue::Uuid(u)) => Value::Guid(u),
        Some(SqlValue::Date(d)) => Value::Date(d),
        Some(SqlValue::Time(t)) => Value::Time(t),
        Some(SqlValue::DateTime(dt)) => Value::Timestamp(dt),
        Some(SqlValue::DateTimeOffset(dt)) => Value::Timestamp(dt.naive_utc()),
        Some(SqlValue::Xml(s)) => Value::Longvarchar(s),
        Some(other) => Value::Varchar(format!("{other:?}")),
    }
}

/// Column names and values of a driver row, in column order.
pub fn split_row(row: &SqlRow) -> (Vec<String>, Vec<Value>) {
    let mut names = Vec::new();
    let mut values = Vec::new();
    for col in row.columns() {
        names.push(col.name.clone());
        values.push(sql_value_to_value(row.get_raw(col.index)));
    }
    (names, values)
}

// ── Query execution ───────────────────────────────────────────

/// Run a query and buffer every row it returns.
pub async fn query_rows(client: &mut Client<Ready>, sql: &str, params: &[Param]) -> Result<Vec<SqlRow>> {
    let (rewritten_sql, order) = rewrite_named_params(sql, params);
    let owned_values = build_param_boxes(params, &order);
    let param_refs: Vec<&(dyn ToSql + Sync)> = owned_values
        .iter()
        .map(|v| &**v as &(dyn ToSql + Sync))
        .collect();

    let stream = if param_refs.is_empty() {
        client.query(sql, &[]).await
    } else {
        client.query(&rewritten_sql, &param_refs).await
    }
    .map_err(GdaError::from)?;

    let mut rows = Vec::new();
    for result in stream {
        let row: SqlRow = result.map_err(GdaError::from)?;
        rows.push(row);
    }
    Ok(rows)
}

/// Run a statement that returns no rows; yields the affected row count.
pub async fn execute_non_query(client: &mut Client<Ready>, sql: &str, params: &[Param]) -> Result<i64> {
    let (rewritten_sql, order) = rewrite_named_params(sql, params);
    let owned_values = build_param_boxes(params, &order);
    let param_refs: Vec<&(dyn ToSql + Sync)> = owned_values
        .iter()
        .map(|v| &**v as &(dyn ToSql + Sync))
        .collect();

    let rows_affected = if param_refs.is_empty() {
        client.execute(sql, &[]).await
    } else {
        client.execute(&rewritten_sql, &param_refs).await
    }
    .map_err(GdaError::from)?;

    Ok(rows_affected as i64)
}

// ── SQL rendering ─────────────────────────────────────────────

/// Render a value as a T-SQL literal.
pub fn value_to_literal(val: &Value) -> String {
    match val {
        Value::Null => "NULL".to_string(),
        Value::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Tinyint(n) => n.to_string(),
        Value::Smallint(n) => n.to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Bigint(n) => n.to_string(),
        Value::Single(n) => {
            if n.is_nan() || n.is_infinite() {
                "NULL".to_string()
            } else {
                n.to_string()
            }
        }
        Value::Double(n) => {
            if n.is_nan() || n.is_infinite() {
                "NULL".to_string()
            } else {
                n.to_string()
            }
        }
        Value::Varchar(s) | Value::Longvarchar(s) => format!("N'{}'", s.replace('\'', "''")),
        Value::Binary(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
            format!("0x{hex}")
        }
        Value::Guid(u) => format!("'{u}'"),
        Value::Date(d) => format!("'{d}'"),
        Value::Time(t) => format!("'{t}'"),
        Value::Timestamp(dt) => format!("'{dt}'"),
    }
}

/// Map a field type to a T-SQL column type.
pub fn sql_type_for(field_type: FieldType, size: Option<u32>) -> Result<String> {
    let sized = |name: &str| match size {
        Some(n) if n > 0 => format!("{name}({n})"),
        _ => format!("{name}(MAX)"),
    };
    match field_type {
        FieldType::Tinyint => Ok("TINYINT".into()),
        FieldType::Smallint => Ok("SMALLINT".into()),
        FieldType::Integer => Ok("INT".into()),
        FieldType::Bigint => Ok("BIGINT".into()),
        FieldType::Single => Ok("REAL".into()),
        FieldType::Double => Ok("FLOAT".into()),
        FieldType::Boolean => Ok("BIT".into()),
        FieldType::Date => Ok("DATE".into()),
        FieldType::Time => Ok("TIME".into()),
        FieldType::Timestamp => Ok("DATETIME2".into()),
        FieldType::Varchar => Ok(sized("NVARCHAR")),
        FieldType::Longvarchar => Ok("NVARCHAR(MAX)".into()),
        FieldType::Binary => Ok(sized("VARBINARY")),
        FieldType::Guid => Ok("UNIQUEIDENTIFIER".into()),
        FieldType::Null => Err(GdaError::Command("Column type cannot be null".into())),
    }
}

/// Bracket-escape a SQL identifier.
pub fn bracket_escape(name: &str) -> String {
    let clean = name.trim_start_matches('[').trim_end_matches(']');
    format!("[{}]", clean.replace(']', "]]"))
}
