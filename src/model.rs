//! The model contract and positional row decoding.

use crate::error::ScanError;
use crate::schema::ModelDef;
use crate::value::{self, FromValue, Value};

/// A type that maps onto one table.
///
/// `values` and `from_row` work positionally: the n-th value is the n-th
/// column attribute declared in `definition`, and the first is the primary
/// key.
///
/// ```
/// use relq::prelude::*;
///
/// struct Team {
///     id: i64,
///     name: String,
/// }
///
/// impl Model for Team {
///     fn definition() -> ModelDef {
///         ModelDef::new("teams").column("id").column("name")
///     }
///
///     fn values(&self) -> Vec<Value> {
///         vec![self.id.into(), self.name.clone().into()]
///     }
///
///     fn from_row(row: &mut RowReader) -> Result<Self, ScanError> {
///         Ok(Team {
///             id: row.next()?,
///             name: row.next()?,
///         })
///     }
/// }
/// ```
pub trait Model: Sized {
    fn definition() -> ModelDef;

    fn values(&self) -> Vec<Value>;

    fn from_row(row: &mut RowReader) -> Result<Self, ScanError>;
}

/// Anything that can hand back a result row as positional values.
pub trait RowSource {
    fn into_values(self) -> Result<Vec<Value>, ScanError>;
}

impl RowSource for Vec<Value> {
    fn into_values(self) -> Result<Vec<Value>, ScanError> {
        Ok(self)
    }
}

impl RowSource for &[Value] {
    fn into_values(self) -> Result<Vec<Value>, ScanError> {
        Ok(self.to_vec())
    }
}

/// Sequential decoder over one row.
#[derive(Debug)]
pub struct RowReader {
    values: std::vec::IntoIter<Value>,
    position: usize,
}

impl RowReader {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values: values.into_iter(),
            position: 0,
        }
    }

    /// Decode the next column.
    pub fn next<T: FromValue>(&mut self) -> Result<T, ScanError> {
        let position = self.position;
        let value = self.values.next().ok_or(ScanError::ColumnCount {
            expected: position + 1,
            got: position,
        })?;
        self.position += 1;
        value::decode(position, value)
    }

    /// Take the next column without decoding it.
    pub fn next_value(&mut self) -> Result<Value, ScanError> {
        self.next::<RawValue>().map(|raw| raw.0)
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

struct RawValue(Value);

impl FromValue for RawValue {
    const EXPECTED: &'static str = "value";

    fn from_value(value: Value) -> Option<Self> {
        Some(RawValue(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_decodes_in_order() {
        let mut row = RowReader::new(vec![Value::Int(1), Value::from("x"), Value::Null]);
        let id: i64 = row.next().unwrap();
        let name: String = row.next().unwrap();
        let note: Option<String> = row.next().unwrap();
        assert_eq!((id, name.as_str(), note), (1, "x", None));
        assert_eq!(row.position(), 3);
    }

    #[test]
    fn test_reader_reports_short_rows() {
        let mut row = RowReader::new(vec![Value::Int(1)]);
        row.next_value().unwrap();
        let err = row.next::<String>().unwrap_err();
        assert!(matches!(err, ScanError::ColumnCount { expected: 2, got: 1 }));
    }
}
