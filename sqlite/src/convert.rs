//! Conversion between [`SqlValue`] and rusqlite values.

use rusqlite::ToSql;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use sqlweave_core::SqlValue;

/// Borrowing adapter so a slice of [`SqlValue`] can be bound as parameters.
pub(crate) struct Param<'a>(pub(crate) &'a SqlValue);

impl ToSql for Param<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self.0 {
            SqlValue::Null => ValueRef::Null,
            SqlValue::Integer(i) => ValueRef::Integer(*i),
            SqlValue::Real(r) => ValueRef::Real(*r),
            SqlValue::Text(s) => ValueRef::Text(s.as_bytes()),
            SqlValue::Blob(b) => ValueRef::Blob(b),
        };
        Ok(ToSqlOutput::Borrowed(value))
    }
}

/// Converts a column value read from a row.
pub(crate) fn from_value_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Integer(i),
        ValueRef::Real(r) => SqlValue::Real(r),
        ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
    }
}

/// Converts an owned rusqlite value.
pub fn from_value(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(i),
        Value::Real(r) => SqlValue::Real(r),
        Value::Text(s) => SqlValue::Text(s),
        Value::Blob(b) => SqlValue::Blob(b),
    }
}

/// Converts to an owned rusqlite value.
pub fn to_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Integer(*i),
        SqlValue::Real(r) => Value::Real(*r),
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Blob(b) => Value::Blob(b.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_round_trip() {
        let values = vec![
            SqlValue::Null,
            SqlValue::Integer(-3),
            SqlValue::Real(2.5),
            SqlValue::Text("a'b".into()),
            SqlValue::Blob(vec![0, 255]),
        ];
        for value in values {
            assert_eq!(from_value(to_value(&value)), value);
        }
    }

    #[test]
    fn test_bound_params_read_back() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let values = [SqlValue::Integer(7), SqlValue::Text("x".into()), SqlValue::Null];
        let params: Vec<Param<'_>> = values.iter().map(Param).collect();
        let row: Vec<SqlValue> = conn
            .query_row(
                "SELECT ?, ?, ?",
                rusqlite::params_from_iter(params.iter()),
                |row| {
                    Ok((0..3)
                        .map(|i| from_value_ref(row.get_ref_unwrap(i)))
                        .collect())
                },
            )
            .unwrap();
        assert_eq!(row, values);
    }
}
