use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use crate::error::Result;
use crate::transport::ColumnDescriptor;
use crate::value::{FieldType, Value};

static NULL: Value = Value::Null;

/// One column of the current row, borrowed from its recordset.
///
/// A field does not copy its value. It lives only until the recordset
/// moves again, which matters for server cursors: their next fetch
/// replaces the buffer the field points into.
#[derive(Debug, Clone, Copy)]
pub struct Field<'a> {
    column: &'a ColumnDescriptor,
    value: &'a Value,
    index: usize,
}

impl<'a> Field<'a> {
    /// A column the row has no slot for reads as NULL.
    pub(crate) fn new(column: &'a ColumnDescriptor, value: Option<&'a Value>, index: usize) -> Self {
        Self {
            column,
            value: value.unwrap_or(&NULL),
            index,
        }
    }

    pub fn name(&self) -> &'a str {
        &self.column.name
    }

    /// Declared column type, even when the value is NULL.
    pub fn field_type(&self) -> FieldType {
        self.column.field_type
    }

    pub fn defined_size(&self) -> u32 {
        self.column.defined_size
    }

    pub fn scale(&self) -> u32 {
        self.column.scale
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn actual_size(&self) -> usize {
        self.value.actual_size()
    }

    pub fn value(&self) -> &'a Value {
        self.value
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    pub fn as_tinyint(&self) -> Result<u8> {
        self.value.as_tinyint()
    }

    pub fn as_smallint(&self) -> Result<i16> {
        self.value.as_smallint()
    }

    pub fn as_integer(&self) -> Result<i32> {
        self.value.as_integer()
    }

    pub fn as_bigint(&self) -> Result<i64> {
        self.value.as_bigint()
    }

    pub fn as_single(&self) -> Result<f32> {
        self.value.as_single()
    }

    pub fn as_double(&self) -> Result<f64> {
        self.value.as_double()
    }

    pub fn as_boolean(&self) -> Result<bool> {
        self.value.as_boolean()
    }

    pub fn as_date(&self) -> Result<NaiveDate> {
        self.value.as_date()
    }

    pub fn as_time(&self) -> Result<NaiveTime> {
        self.value.as_time()
    }

    pub fn as_timestamp(&self) -> Result<NaiveDateTime> {
        self.value.as_timestamp()
    }

    pub fn as_guid(&self) -> Result<Uuid> {
        self.value.as_guid()
    }

    pub fn as_str(&self) -> Result<&'a str> {
        self.value.as_str()
    }

    pub fn as_binary(&self) -> Result<&'a [u8]> {
        self.value.as_binary()
    }

    /// Column metadata and value, for the C ABI.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.column.name,
            "type": self.column.field_type.as_str(),
            "defined_size": self.column.defined_size,
            "scale": self.column.scale,
            "actual_size": self.actual_size(),
            "value": self.value.to_json(),
        })
    }
}

impl fmt::Display for Field<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.value, f)
    }
}
